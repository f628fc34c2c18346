//! Directory of numbered save slots.
//!
//! Layout inside the store directory:
//! ```text
//! slots.json        - slot index: description, tick, map and digest per slot
//! slot-001.pntcsave - savegame files
//! ```

use std::path::{Path, PathBuf};

use pentacle_world::{ShapeTable, World, WorldConfig};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::savegame::{LoadedGame, SaveInfo, load_world, save_world, sha256_hex};
use crate::SaveError;

const INDEX_FILE: &str = "slots.json";
const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub slot: u32,
    pub filename: String,
    pub id: Uuid,
    pub description: String,
    pub saved_at: u64,
    pub tick: u32,
    pub map_num: u32,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlotIndex {
    version: u32,
    slots: Vec<SlotEntry>,
}

impl Default for SlotIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            slots: Vec::new(),
        }
    }
}

pub struct SaveStore {
    root: PathBuf,
    index: SlotIndex,
}

impl SaveStore {
    /// Open or create a save store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SaveError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            let index: SlotIndex = serde_json::from_reader(std::fs::File::open(&index_path)?)?;
            if index.version != INDEX_VERSION {
                return Err(SaveError::UnsupportedVersion {
                    found: index.version,
                    expected: INDEX_VERSION,
                });
            }
            index
        } else {
            let index = SlotIndex::default();
            serde_json::to_writer_pretty(std::fs::File::create(&index_path)?, &index)?;
            index
        };
        tracing::debug!(root = %root.display(), slots = index.slots.len(), "save store opened");
        Ok(Self { root, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Occupied slots, lowest number first.
    pub fn slots(&self) -> &[SlotEntry] {
        &self.index.slots
    }

    pub fn entry(&self, slot: u32) -> Option<&SlotEntry> {
        self.index.slots.iter().find(|e| e.slot == slot)
    }

    /// Save `world` into `slot`, replacing whatever was there.
    pub fn save<A: Serialize + ?Sized>(
        &mut self,
        slot: u32,
        world: &World,
        description: &str,
        app: &A,
    ) -> Result<SaveInfo, SaveError> {
        let (bytes, info) = save_world(world, description, app)?;
        let filename = format!("slot-{slot:03}.pntcsave");
        std::fs::write(self.root.join(&filename), &bytes)?;

        let entry = SlotEntry {
            slot,
            filename,
            id: info.id,
            description: info.description.clone(),
            saved_at: info.saved_at,
            tick: info.tick,
            map_num: info.map_num,
            sha256: sha256_hex(&bytes),
        };
        self.index.slots.retain(|e| e.slot != slot);
        let at = self.index.slots.partition_point(|e| e.slot < slot);
        self.index.slots.insert(at, entry);
        self.save_index()?;
        Ok(info)
    }

    /// Load the game in `slot`. The file must match the digest in the index.
    pub fn load(
        &self,
        slot: u32,
        config: WorldConfig,
        shapes: ShapeTable,
    ) -> Result<LoadedGame, SaveError> {
        let entry = self.entry(slot).ok_or(SaveError::EmptySlot(slot))?;
        let bytes = std::fs::read(self.root.join(&entry.filename))?;
        if sha256_hex(&bytes) != entry.sha256 {
            return Err(SaveError::SlotMismatch {
                filename: entry.filename.clone(),
            });
        }
        load_world(&bytes, config, shapes)
    }

    pub fn delete(&mut self, slot: u32) -> Result<(), SaveError> {
        let entry = self.entry(slot).ok_or(SaveError::EmptySlot(slot))?.clone();
        let path = self.root.join(&entry.filename);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        self.index.slots.retain(|e| e.slot != slot);
        self.save_index()
    }

    /// Check every slot file against its recorded digest.
    pub fn verify_integrity(&self) -> Result<(), SaveError> {
        for entry in &self.index.slots {
            let data = std::fs::read(self.root.join(&entry.filename))?;
            if sha256_hex(&data) != entry.sha256 {
                return Err(SaveError::SlotMismatch {
                    filename: entry.filename.clone(),
                });
            }
        }
        Ok(())
    }

    fn save_index(&self) -> Result<(), SaveError> {
        let path = self.root.join(INDEX_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.index)?;
        Ok(())
    }
}
