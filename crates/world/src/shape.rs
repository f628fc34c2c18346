use std::collections::BTreeMap;

use pentacle_common::Dims;
use serde::{Deserialize, Serialize};

use crate::WorldError;

bitflags::bitflags! {
    /// Static properties of a shape.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ShapeFlags: u32 {
        const FIXED      = 0x0001;
        const SOLID      = 0x0002;
        const SEA        = 0x0004;
        const LAND       = 0x0008;
        const OCCLUDES   = 0x0010;
        const BAG        = 0x0020;
        const DAMAGING   = 0x0040;
        const NOISY      = 0x0080;
        const DRAW       = 0x0100;
        const IGNORE     = 0x0200;
        const ROOF       = 0x0400;
        const TRANSL     = 0x0800;
        const EDITOR     = 0x1000;
        const EXPLODE    = 0x2000;
        const TARGETABLE = 0x8000;
    }
}

/// Shape families.
pub mod family {
    pub const GENERIC: u8 = 0;
    pub const QUALITY: u8 = 1;
    pub const QUANTITY: u8 = 2;
    pub const GLOB_EGG: u8 = 3;
    pub const UNK_EGG: u8 = 4;
    pub const BREAKABLE: u8 = 5;
    pub const CONTAINER: u8 = 6;
    pub const MONSTER_EGG: u8 = 7;
    pub const TELEPORT: u8 = 8;
    pub const REAGENT: u8 = 9;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShapeInfo {
    pub flags: ShapeFlags,
    /// Footpad in world units, unflipped.
    pub dims: Dims,
    pub family: u8,
}

impl ShapeInfo {
    pub fn new(dims: Dims, flags: ShapeFlags) -> Self {
        Self {
            flags,
            dims,
            family: family::GENERIC,
        }
    }

    pub fn with_family(mut self, family: u8) -> Self {
        self.family = family;
        self
    }

    pub fn is_solid(&self) -> bool {
        self.flags.contains(ShapeFlags::SOLID)
    }

    pub fn is_roof(&self) -> bool {
        self.flags.contains(ShapeFlags::ROOF)
    }

    pub fn is_noisy(&self) -> bool {
        self.flags.contains(ShapeFlags::NOISY)
    }
}

/// Shape number to [`ShapeInfo`] lookup. Unknown shapes resolve to an empty,
/// non-solid info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeTable {
    shapes: BTreeMap<u32, ShapeInfo>,
    #[serde(skip)]
    fallback: ShapeInfo,
}

impl ShapeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, shape: u32, info: ShapeInfo) {
        self.shapes.insert(shape, info);
    }

    pub fn with(mut self, shape: u32, info: ShapeInfo) -> Self {
        self.insert(shape, info);
        self
    }

    pub fn get(&self, shape: u32) -> &ShapeInfo {
        self.shapes.get(&shape).unwrap_or(&self.fallback)
    }

    pub fn contains(&self, shape: u32) -> bool {
        self.shapes.contains_key(&shape)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, WorldError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    #[test]
    fn unknown_shape_is_empty() {
        let table = ShapeTable::new().with(
            3,
            ShapeInfo::new(IVec3::new(64, 64, 16), ShapeFlags::SOLID),
        );
        assert!(table.get(3).is_solid());
        assert!(!table.get(4).is_solid());
        assert_eq!(table.get(4).dims, IVec3::ZERO);
    }

    #[test]
    fn table_from_yaml() {
        let yaml = "shapes:\n  10:\n    flags: SOLID | ROOF\n    dims: [32, 32, 8]\n    family: 0\n";
        let table = ShapeTable::from_yaml_str(yaml).unwrap();
        let info = table.get(10);
        assert!(info.is_solid());
        assert!(info.is_roof());
        assert_eq!(info.dims, IVec3::new(32, 32, 8));
    }
}
