//! Sectioned savegame container.
//!
//! Layout:
//! ```text
//! b"PNTCSAVE"        - signature
//! u32 (LE)           - format version
//! zstd(CBOR archive) - ordered list of named sections
//! ```
//! Each section holds the CBOR encoding of one piece of state plus the
//! SHA-256 of those bytes, checked before anything is decoded.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use pentacle_kernel::KernelState;
use pentacle_world::{
    CurrentMapState, Globals, ListsState, Map, ObjectsState, ShapeTable, StringsState, World,
    WorldConfig, WorldSnapshot, WorldState,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::SaveError;

pub const SAVE_MAGIC: &[u8; 8] = b"PNTCSAVE";
pub const SAVE_VERSION: u32 = 1;

/// Section names, in the order they are written.
pub mod section {
    pub const GAME: &str = "GAME";
    pub const INFO: &str = "INFO";
    pub const KERNEL: &str = "KERNEL";
    pub const OBJECTS: &str = "OBJECTS";
    pub const WORLD: &str = "WORLD";
    pub const MAPS: &str = "MAPS";
    pub const CURRENTMAP: &str = "CURRENTMAP";
    pub const UCSTRINGS: &str = "UCSTRINGS";
    pub const UCGLOBALS: &str = "UCGLOBALS";
    pub const UCLISTS: &str = "UCLISTS";
    pub const APP: &str = "APP";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSection {
    name: String,
    sha256: String,
    data: ciborium::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Archive {
    sections: Vec<RawSection>,
}

/// Which game and configuration a save was made with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameHeader {
    pub config: WorldConfig,
}

/// Human-facing description of a save, also copied into slot listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveInfo {
    pub id: Uuid,
    pub description: String,
    /// Seconds since the Unix epoch.
    pub saved_at: u64,
    pub tick: u32,
    pub map_num: u32,
    pub objects: usize,
}

/// Builds a savegame one section at a time.
#[derive(Debug, Default)]
pub struct SaveWriter {
    archive: Archive,
}

impl SaveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<(), SaveError> {
        let bytes = cbor_serialize(value)?;
        tracing::trace!(section = name, bytes = bytes.len(), "section written");
        self.archive.sections.push(RawSection {
            name: name.to_string(),
            sha256: sha256_hex(&bytes),
            data: ciborium::Value::Bytes(bytes),
        });
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>, SaveError> {
        let body = zstd_compress(&cbor_serialize(&self.archive)?)?;
        let mut out = Vec::with_capacity(body.len() + 12);
        out.extend_from_slice(SAVE_MAGIC);
        out.extend_from_slice(&SAVE_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }
}

/// A parsed savegame whose section digests have all been verified.
#[derive(Debug)]
pub struct SaveReader {
    version: u32,
    sections: BTreeMap<String, Vec<u8>>,
}

impl SaveReader {
    pub fn parse(bytes: &[u8]) -> Result<Self, SaveError> {
        if bytes.len() < 12 || &bytes[..8] != SAVE_MAGIC {
            return Err(SaveError::BadSignature);
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[8..12]);
        let version = u32::from_le_bytes(version);
        if version != SAVE_VERSION {
            return Err(SaveError::UnsupportedVersion {
                found: version,
                expected: SAVE_VERSION,
            });
        }

        let archive: Archive = cbor_deserialize("archive", &zstd_decompress(&bytes[12..])?)?;
        let mut sections = BTreeMap::new();
        for raw in archive.sections {
            let ciborium::Value::Bytes(data) = raw.data else {
                return Err(SaveError::CborDecode {
                    section: raw.name,
                    reason: "payload is not a byte string".into(),
                });
            };
            if sha256_hex(&data) != raw.sha256 {
                return Err(SaveError::DigestMismatch { section: raw.name });
            }
            sections.insert(raw.name, data);
        }
        Ok(Self { version, sections })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn section<T: DeserializeOwned>(&self, name: &str) -> Result<T, SaveError> {
        let data = self
            .sections
            .get(name)
            .ok_or_else(|| SaveError::MissingSection(name.to_string()))?;
        cbor_deserialize(name, data)
    }
}

/// Serialize the whole world, plus opaque host state for the `APP` section.
pub fn save_world<A: Serialize + ?Sized>(
    world: &World,
    description: &str,
    app: &A,
) -> Result<(Vec<u8>, SaveInfo), SaveError> {
    let snapshot = world.snapshot()?;
    let info = SaveInfo {
        id: Uuid::new_v4(),
        description: description.to_string(),
        saved_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        tick: snapshot.kernel.tick,
        map_num: world.current_map().map_num(),
        objects: world.objects().len(),
    };

    let mut writer = SaveWriter::new();
    writer.add(
        section::GAME,
        &GameHeader {
            config: world.config().clone(),
        },
    )?;
    writer.add(section::INFO, &info)?;
    writer.add(section::KERNEL, &snapshot.kernel)?;
    writer.add(section::OBJECTS, &snapshot.objects)?;
    writer.add(section::WORLD, &snapshot.world)?;
    writer.add(section::MAPS, &snapshot.maps)?;
    writer.add(section::CURRENTMAP, &snapshot.current_map)?;
    writer.add(section::UCSTRINGS, &snapshot.strings)?;
    writer.add(section::UCGLOBALS, &snapshot.globals)?;
    writer.add(section::UCLISTS, &snapshot.lists)?;
    writer.add(section::APP, app)?;
    let bytes = writer.finish()?;

    tracing::info!(
        id = %info.id,
        tick = info.tick,
        map = info.map_num,
        bytes = bytes.len(),
        "game saved"
    );
    Ok((bytes, info))
}

/// A world rebuilt from a savegame.
pub struct LoadedGame {
    pub world: World,
    pub info: SaveInfo,
    pub app: ciborium::Value,
}

impl LoadedGame {
    pub fn app_state<T: DeserializeOwned>(&self) -> Result<T, SaveError> {
        self.app
            .deserialized()
            .map_err(|e: ciborium::value::Error| SaveError::CborDecode {
                section: section::APP.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Read just the `INFO` section.
pub fn read_info(bytes: &[u8]) -> Result<SaveInfo, SaveError> {
    SaveReader::parse(bytes)?.section(section::INFO)
}

/// Rebuild a world from `bytes`. The caller's session is untouched on error.
pub fn load_world(
    bytes: &[u8],
    config: WorldConfig,
    shapes: ShapeTable,
) -> Result<LoadedGame, SaveError> {
    let reader = SaveReader::parse(bytes)?;
    let header: GameHeader = reader.section(section::GAME)?;
    if header.config.game != config.game {
        return Err(SaveError::WrongGame {
            saved: header.config.game,
            configured: config.game,
        });
    }
    let info: SaveInfo = reader.section(section::INFO)?;

    let strings: StringsState = reader.section(section::UCSTRINGS)?;
    let globals: Globals = reader.section(section::UCGLOBALS)?;
    let lists: ListsState = reader.section(section::UCLISTS)?;
    let kernel: KernelState = reader.section(section::KERNEL)?;
    let world_state: WorldState = reader.section(section::WORLD)?;
    let objects: ObjectsState = reader.section(section::OBJECTS)?;
    let maps: Vec<Map> = reader.section(section::MAPS)?;
    let current_map: CurrentMapState = reader.section(section::CURRENTMAP)?;
    let app: ciborium::Value = reader.section(section::APP)?;

    let world = World::restore(
        config,
        shapes,
        WorldSnapshot {
            kernel,
            world: world_state,
            objects,
            maps,
            current_map,
            strings,
            globals,
            lists,
        },
    )?;
    tracing::info!(id = %info.id, tick = info.tick, map = info.map_num, "game loaded");
    Ok(LoadedGame { world, info, app })
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, SaveError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| SaveError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: DeserializeOwned>(section: &str, data: &[u8]) -> Result<T, SaveError> {
    ciborium::from_reader(data).map_err(|e| SaveError::CborDecode {
        section: section.to_string(),
        reason: e.to_string(),
    })
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, SaveError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, SaveError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
