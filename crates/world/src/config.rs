use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::WorldError;

/// Which game's rules the world follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameVariant {
    #[default]
    Ultima8,
    Crusader,
}

impl GameVariant {
    pub fn chunk_size(self) -> i32 {
        match self {
            GameVariant::Ultima8 => 512,
            GameVariant::Crusader => 1024,
        }
    }

    /// World units per step of an egg's x/y range nibble.
    pub fn egg_range_mul(self) -> i32 {
        match self {
            GameVariant::Ultima8 => 32,
            GameVariant::Crusader => 64,
        }
    }

    /// Vertical reach of eggs; 0 disables the height check.
    pub fn egg_z_range(self) -> i32 {
        match self {
            GameVariant::Ultima8 => 48,
            GameVariant::Crusader => 0,
        }
    }

    pub fn is_crusader(self) -> bool {
        self == GameVariant::Crusader
    }
}

/// Largest accepted chunk grid side.
pub const MAX_MAP_CHUNKS: i32 = 512;

/// Static parameters of a world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub game: GameVariant,
    /// Overrides the variant's chunk size.
    pub chunk_size: Option<i32>,
    /// Chunks per side of the map grid.
    pub map_chunks: i32,
    pub viewport_width: i32,
    pub viewport_height: i32,
    pub ticks_per_second: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            game: GameVariant::Ultima8,
            chunk_size: None,
            map_chunks: 64,
            viewport_width: 320,
            viewport_height: 200,
            ticks_per_second: 30,
        }
    }
}

impl WorldConfig {
    pub fn crusader() -> Self {
        Self {
            game: GameVariant::Crusader,
            viewport_width: 640,
            viewport_height: 480,
            ..Self::default()
        }
    }

    pub fn chunk_size(&self) -> i32 {
        self.chunk_size.unwrap_or_else(|| self.game.chunk_size())
    }

    /// Side length of the whole map in world units.
    pub fn map_extent(&self) -> i32 {
        self.chunk_size().saturating_mul(self.map_chunks)
    }

    /// Reject grids that are empty, too large, or whose extent leaves `i32`.
    pub fn validate(&self) -> Result<(), WorldError> {
        if !(1..=MAX_MAP_CHUNKS).contains(&self.map_chunks) {
            return Err(WorldError::InvalidConfig(format!(
                "map_chunks {} is outside 1..={MAX_MAP_CHUNKS}",
                self.map_chunks
            )));
        }
        let chunk_size = self.chunk_size();
        if chunk_size <= 0 {
            return Err(WorldError::InvalidConfig(format!(
                "chunk_size {chunk_size} must be positive"
            )));
        }
        if chunk_size.checked_mul(self.map_chunks).is_none() {
            return Err(WorldError::InvalidConfig(format!(
                "{} chunks of {chunk_size} overflow the coordinate range",
                self.map_chunks
            )));
        }
        Ok(())
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, WorldError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, WorldError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_variant() {
        let u8 = WorldConfig::default();
        assert_eq!(u8.chunk_size(), 512);
        assert_eq!(u8.map_extent(), 512 * 64);
        let cru = WorldConfig::crusader();
        assert_eq!(cru.chunk_size(), 1024);
        assert_eq!(cru.game.egg_range_mul(), 64);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = WorldConfig::from_yaml_str("game: crusader\nchunk_size: 256\n").unwrap();
        assert_eq!(cfg.game, GameVariant::Crusader);
        assert_eq!(cfg.chunk_size(), 256);
        assert_eq!(cfg.map_chunks, 64);
        assert_eq!(cfg.ticks_per_second, 30);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.yaml");
        std::fs::write(&path, "map_chunks: 16\n").unwrap();
        let cfg = WorldConfig::load(&path).unwrap();
        assert_eq!(cfg.map_chunks, 16);
        assert!(WorldConfig::load(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn oversized_grid_is_rejected() {
        for text in ["map_chunks: 100000\n", "map_chunks: 0\n", "chunk_size: -4\n"] {
            assert!(matches!(
                WorldConfig::from_yaml_str(text),
                Err(WorldError::InvalidConfig(_))
            ));
        }
        let huge = "chunk_size: 100000000\nmap_chunks: 512\n";
        assert!(matches!(
            WorldConfig::from_yaml_str(huge),
            Err(WorldError::InvalidConfig(_))
        ));
        assert!(WorldConfig::from_yaml_str("map_chunks: 512\n").is_ok());
    }
}
