use pentacle_common::{BoundingBox, Dims, ObjId, Point3, ProcId};
use serde::{Deserialize, Serialize};

use crate::shape::{ShapeInfo, ShapeTable, family};

bitflags::bitflags! {
    /// Per-item state bits; the low 16 bits of an item's usecode status.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ItemFlags: u16 {
        const DISPOSABLE  = 0x0001;
        const OWNED       = 0x0002;
        const CONTAINED   = 0x0004;
        const INVISIBLE   = 0x0008;
        const FLIPPED     = 0x0010;
        const IN_NPC_LIST = 0x0020;
        const FAST_ONLY   = 0x0040;
        const GUMP_OPEN   = 0x0080;
        const EQUIPPED    = 0x0100;
        const BOUNCING    = 0x0200;
        const ETHEREAL    = 0x0400;
        const HANGING     = 0x0800;
        const FASTAREA    = 0x1000;
        const LOW_FRICTION = 0x2000;
        const BROKEN      = 0x8000;
    }
}

bitflags::bitflags! {
    /// Engine-side bits that are not visible to usecode.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ExtFlags: u16 {
        const FIXED       = 0x0001;
        const IN_CURMAP   = 0x0002;
        const LERP_NOPREV = 0x0008;
        const HIGHLIGHT   = 0x0010;
        const CAMERA      = 0x0020;
        const SPRITE      = 0x0040;
        const PERMANENT_NPC = 0x0100;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EggData {
    pub hatched: bool,
}

/// What the actor is currently doing; a small usecode-visible number.
pub type ActivityNo = u16;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorData {
    pub hp: i16,
    pub mana: i16,
    pub strength: u8,
    pub dexterity: u8,
    pub intelligence: u8,
    pub alignment: u16,
    pub enemy_alignment: u16,
    pub in_combat: bool,
    pub dead: bool,
    /// Main actor only: a teleport egg fired and has not been left yet.
    pub just_teleported: bool,
    pub activity: ActivityNo,
    pub last_activity: ActivityNo,
}

impl ActorData {
    pub fn with_stats(hp: i16, strength: u8, dexterity: u8, intelligence: u8) -> Self {
        Self {
            hp,
            strength,
            dexterity,
            intelligence,
            ..Self::default()
        }
    }

    pub fn set_activity(&mut self, activity: ActivityNo) {
        self.last_activity = self.activity;
        self.activity = activity;
    }

    /// Go back to the activity that was active before the last `set_activity`.
    pub fn restore_last_activity(&mut self) {
        let last = std::mem::take(&mut self.last_activity);
        self.activity = last;
    }

    pub fn clear_in_combat(&mut self) {
        self.in_combat = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Plain,
    Container,
    Egg(EggData),
    Actor(Box<ActorData>),
}

/// A world object: something with a shape, a location and an owner.
///
/// An item is owned by exactly one of: a current-map chunk list
/// (`ExtFlags::IN_CURMAP`), a container (`ItemFlags::CONTAINED` plus `parent`),
/// the NPC list (`ItemFlags::IN_NPC_LIST`) or the ethereal void
/// (`ItemFlags::ETHEREAL`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ObjId,
    pub shape: u32,
    pub frame: u32,
    pub pos: Point3,
    /// Quality, or the count for quantity and reagent families.
    pub quality: u16,
    pub npc_num: u16,
    pub map_num: u16,
    pub flags: ItemFlags,
    pub ext_flags: ExtFlags,
    pub parent: ObjId,
    pub gravity_pid: ProcId,
    /// Items held by a container or carried by an actor, most recent last.
    pub contents: Vec<ObjId>,
    pub kind: ItemKind,
}

impl Item {
    pub fn new(shape: u32, frame: u32) -> Self {
        Self {
            id: 0,
            shape,
            frame,
            pos: Point3::ZERO,
            quality: 0,
            npc_num: 0,
            map_num: 0,
            flags: ItemFlags::empty(),
            ext_flags: ExtFlags::empty(),
            parent: 0,
            gravity_pid: 0,
            contents: Vec::new(),
            kind: ItemKind::Plain,
        }
    }

    pub fn container(shape: u32, frame: u32) -> Self {
        Self {
            kind: ItemKind::Container,
            ..Self::new(shape, frame)
        }
    }

    /// An egg with the given x/y range nibbles.
    pub fn egg(shape: u32, x_range: u8, y_range: u8) -> Self {
        Self {
            npc_num: ((x_range as u16 & 0xF) << 4) | (y_range as u16 & 0xF),
            kind: ItemKind::Egg(EggData::default()),
            ..Self::new(shape, 0)
        }
    }

    /// A teleport egg. Frame 1 marks a teleporter, frame 0 a destination.
    pub fn teleport_egg(shape: u32, teleport_id: u8, dest_map: u16, teleporter: bool) -> Self {
        Self {
            frame: teleporter as u32,
            quality: teleport_id as u16,
            map_num: dest_map,
            ..Self::egg(shape, 0, 0)
        }
    }

    pub fn actor(shape: u32, data: ActorData) -> Self {
        Self {
            kind: ItemKind::Actor(Box::new(data)),
            ..Self::new(shape, 0)
        }
    }

    pub fn at(mut self, pos: Point3) -> Self {
        self.pos = pos;
        self
    }

    pub fn with_flags(mut self, flags: ItemFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_quality(mut self, quality: u16) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_map(mut self, map_num: u16) -> Self {
        self.map_num = map_num;
        self
    }

    pub fn location(&self) -> Point3 {
        self.pos
    }

    pub fn shape_info<'a>(&self, shapes: &'a ShapeTable) -> &'a ShapeInfo {
        shapes.get(self.shape)
    }

    /// Footpad in world units with x and y swapped for flipped items.
    pub fn footpad_world(&self, shapes: &ShapeTable) -> Dims {
        let dims = shapes.get(self.shape).dims;
        if self.flags.contains(ItemFlags::FLIPPED) {
            Dims::new(dims.y, dims.x, dims.z)
        } else {
            dims
        }
    }

    pub fn world_box(&self, shapes: &ShapeTable) -> BoundingBox {
        BoundingBox::new(self.pos, self.footpad_world(shapes))
    }

    /// Centre of the item's box.
    pub fn centre(&self, shapes: &ShapeTable) -> Point3 {
        let d = self.footpad_world(shapes);
        Point3::new(self.pos.x - d.x / 2, self.pos.y - d.y / 2, self.pos.z + d.z / 2)
    }

    pub fn family(&self, shapes: &ShapeTable) -> u8 {
        shapes.get(self.shape).family
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, ItemKind::Container | ItemKind::Actor(_))
    }

    pub fn is_egg(&self) -> bool {
        matches!(self.kind, ItemKind::Egg(_))
    }

    pub fn is_actor(&self) -> bool {
        matches!(self.kind, ItemKind::Actor(_))
    }

    pub fn egg_data(&self) -> Option<&EggData> {
        match &self.kind {
            ItemKind::Egg(egg) => Some(egg),
            _ => None,
        }
    }

    pub fn egg_data_mut(&mut self) -> Option<&mut EggData> {
        match &mut self.kind {
            ItemKind::Egg(egg) => Some(egg),
            _ => None,
        }
    }

    pub fn actor_data(&self) -> Option<&ActorData> {
        match &self.kind {
            ItemKind::Actor(actor) => Some(actor),
            _ => None,
        }
    }

    pub fn actor_data_mut(&mut self) -> Option<&mut ActorData> {
        match &mut self.kind {
            ItemKind::Actor(actor) => Some(actor),
            _ => None,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.actor_data().is_some_and(|a| a.dead)
    }

    pub fn egg_x_range(&self) -> i32 {
        ((self.npc_num >> 4) & 0xF) as i32
    }

    pub fn egg_y_range(&self) -> i32 {
        (self.npc_num & 0xF) as i32
    }

    pub fn is_teleport_egg(&self, shapes: &ShapeTable) -> bool {
        self.is_egg() && self.family(shapes) == family::TELEPORT
    }

    pub fn teleport_id(&self) -> u8 {
        (self.quality & 0xFF) as u8
    }

    /// Teleporters send the avatar away; other teleport eggs are destinations.
    pub fn is_teleporter(&self) -> bool {
        self.frame != 0
    }

    pub fn q_lo(&self) -> u16 {
        self.quality & 0xFF
    }

    pub fn q_hi(&self) -> u16 {
        self.quality >> 8
    }

    /// Chunk coordinates of the item's location.
    pub fn chunk(&self, chunk_size: i32) -> (i32, i32) {
        (self.pos.x.div_euclid(chunk_size), self.pos.y.div_euclid(chunk_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeFlags;
    use glam::IVec3;

    fn shapes() -> ShapeTable {
        ShapeTable::new().with(1, ShapeInfo::new(IVec3::new(64, 32, 8), ShapeFlags::SOLID))
    }

    #[test]
    fn flipped_footpad_swaps_xy() {
        let shapes = shapes();
        let item = Item::new(1, 0);
        assert_eq!(item.footpad_world(&shapes), IVec3::new(64, 32, 8));
        let flipped = Item::new(1, 0).with_flags(ItemFlags::FLIPPED);
        assert_eq!(flipped.footpad_world(&shapes), IVec3::new(32, 64, 8));
    }

    #[test]
    fn egg_ranges_come_from_npc_num() {
        let egg = Item::egg(20, 2, 1);
        assert_eq!(egg.npc_num, 0x21);
        assert_eq!(egg.egg_x_range(), 2);
        assert_eq!(egg.egg_y_range(), 1);
        assert!(!egg.egg_data().unwrap().hatched);
    }

    #[test]
    fn teleport_egg_fields() {
        let egg = Item::teleport_egg(30, 0x17, 5, true);
        assert_eq!(egg.teleport_id(), 0x17);
        assert_eq!(egg.map_num, 5);
        assert!(egg.is_teleporter());
    }

    #[test]
    fn activity_remembers_previous() {
        let mut actor = ActorData::with_stats(20, 10, 10, 10);
        actor.set_activity(3);
        actor.set_activity(7);
        assert_eq!(actor.last_activity, 3);
        actor.restore_last_activity();
        assert_eq!(actor.activity, 3);
        assert_eq!(actor.last_activity, 0);
    }
}
