//! Native item intrinsics callable from usecode.
//!
//! Usecode addresses intrinsics by index into a per-game table; the
//! [`IntrinsicTable`] maps those indices to [`Intrinsic`]s and
//! [`World::call_intrinsic`] runs them. Arguments arrive already decoded as
//! `i32`s, the item the intrinsic is invoked on is passed separately.
//! A missing item yields 0, the way usecode expects.

use pentacle_common::{ObjId, Point3};

use crate::collision::SWEEP_END;
use crate::item::ItemFlags;
use crate::objects::MAIN_ACTOR_ID;
use crate::shape::family;
use crate::world::World;
use crate::WorldError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Touch,
    GetX,
    GetY,
    GetZ,
    GetCX,
    GetCY,
    GetCZ,
    GetShape,
    SetShape,
    GetFrame,
    SetFrame,
    GetQuality,
    GetQuantity,
    GetContainer,
    GetRootContainer,
    GetQ,
    GetQLo,
    GetQHi,
    SetQ,
    SetQLo,
    SetQHi,
    SetQuality,
    SetQuantity,
    GetFamily,
    GetStatus,
    OrStatus,
    AndStatus,
    GetMapArray,
    GetMap,
    Destroy,
    DestroyContents,
    InFastArea,
    GetEggId,
    IsNpc,
    IsDead,
    SetDead,
    GetHp,
    GetMana,
    SetNpcNum,
    GetEtherealTop,
    LegalMoveToPoint,
    CanExistAtPoint,
    IsOn,
    IsCompletelyOn,
    // Audio and camera belong to the host.
    PlaySfx,
    StopSfx,
    PlayMusic,
    CameraMoveTo,
    Explode,
}

impl Intrinsic {
    /// Number of arguments after the item.
    pub fn arity(self) -> usize {
        use Intrinsic::*;
        match self {
            SetShape | SetFrame | SetQ | SetQLo | SetQHi | SetQuality | SetQuantity
            | OrStatus | AndStatus | SetNpcNum | IsOn | IsCompletelyOn | PlaySfx | StopSfx
            | PlayMusic => 1,
            CameraMoveTo => 3,
            LegalMoveToPoint | CanExistAtPoint => 4,
            _ => 0,
        }
    }

    pub fn is_native(self) -> bool {
        !matches!(
            self,
            Intrinsic::PlaySfx
                | Intrinsic::StopSfx
                | Intrinsic::PlayMusic
                | Intrinsic::CameraMoveTo
                | Intrinsic::Explode
        )
    }
}

/// Intrinsic numbers of one game's usecode.
#[derive(Debug, Clone, Default)]
pub struct IntrinsicTable {
    entries: Vec<Option<Intrinsic>>,
}

impl IntrinsicTable {
    fn from_pairs(pairs: &[(usize, Intrinsic)]) -> Self {
        let len = pairs.iter().map(|(i, _)| i + 1).max().unwrap_or(0);
        let mut entries = vec![None; len];
        for &(index, intrinsic) in pairs {
            entries[index] = Some(intrinsic);
        }
        Self { entries }
    }

    /// No Remorse.
    pub fn remorse() -> Self {
        use Intrinsic::*;
        Self::from_pairs(&[
            (0x01, GetFrame),
            (0x02, SetFrame),
            (0x03, GetMapArray),
            (0x04, GetStatus),
            (0x05, OrStatus),
            (0x08, IsNpc),
            (0x09, GetZ),
            (0x0A, Destroy),
            (0x10, GetQLo),
            (0x11, GetMap),
            (0x12, PlayMusic),
            (0x13, GetX),
            (0x14, GetY),
            (0x15, PlaySfx),
            (0x16, GetShape),
            (0x17, Explode),
            (0x1A, AndStatus),
            (0x21, SetDead),
            (0x23, GetEtherealTop),
            (0x24, SetShape),
            (0x25, Touch),
            (0x26, GetQHi),
            (0x2B, GetQLo),
            (0x2C, InFastArea),
            (0x2D, SetQHi),
            (0x2E, LegalMoveToPoint),
            (0x2F, CanExistAtPoint),
            (0x31, AndStatus),
            (0x38, StopSfx),
            (0x39, IsDead),
            (0x3B, SetQLo),
            (0x3C, GetFamily),
            (0x3D, DestroyContents),
            (0x3F, GetEggId),
            (0x40, CameraMoveTo),
            (0x44, IsOn),
            (0x45, GetQHi),
        ])
    }

    /// No Regret.
    pub fn regret() -> Self {
        use Intrinsic::*;
        Self::from_pairs(&[
            (0x01, GetFrame),
            (0x02, SetFrame),
            (0x03, GetMapArray),
            (0x04, GetStatus),
            (0x05, OrStatus),
            (0x08, IsNpc),
            (0x09, GetZ),
            (0x0B, GetQLo),
            (0x0C, Destroy),
            (0x0E, GetX),
            (0x0F, GetY),
            (0x10, PlaySfx),
            (0x11, GetShape),
            (0x12, Explode),
            (0x15, AndStatus),
            (0x1C, SetDead),
            (0x1E, GetEtherealTop),
            (0x1F, GetQLo),
            (0x20, SetQLo),
            (0x21, GetQHi),
            (0x22, SetQHi),
            (0x25, GetCY),
            (0x26, GetCX),
            (0x28, SetNpcNum),
            (0x2A, SetShape),
            (0x2C, StopSfx),
            (0x2D, IsCompletelyOn),
            (0x2F, GetHp),
            (0x30, GetMana),
            (0x31, GetFamily),
            (0x32, DestroyContents),
            (0x38, AndStatus),
            (0x3A, Touch),
            (0x3B, GetEggId),
            (0x3D, GetMap),
            (0x41, IsOn),
            (0x42, GetQHi),
        ])
    }

    pub fn get(&self, index: usize) -> Option<Intrinsic> {
        self.entries.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices with a native implementation.
    pub fn native_count(&self) -> usize {
        self.entries
            .iter()
            .flatten()
            .filter(|i| i.is_native())
            .count()
    }
}

fn bool_ret(b: bool) -> i32 {
    b as i32
}

impl World {
    fn to_usecode_coord(&self, v: i32) -> i32 {
        if self.config.game.is_crusader() { v / 2 } else { v }
    }

    fn from_usecode_coord(&self, v: i32) -> i32 {
        if self.config.game.is_crusader() { v * 2 } else { v }
    }

    /// Call the intrinsic at `index` of `table`.
    pub fn call_intrinsic_index(
        &mut self,
        table: &IntrinsicTable,
        index: usize,
        item: ObjId,
        args: &[i32],
    ) -> Result<i32, WorldError> {
        match table.get(index) {
            Some(intrinsic) => self.call_intrinsic(intrinsic, item, args),
            None => {
                tracing::debug!(index, "unmapped intrinsic");
                Ok(0)
            }
        }
    }

    pub fn call_intrinsic(
        &mut self,
        intrinsic: Intrinsic,
        item: ObjId,
        args: &[i32],
    ) -> Result<i32, WorldError> {
        if args.len() != intrinsic.arity() {
            return Err(WorldError::IntrinsicArgs {
                name: intrinsic_name(intrinsic),
                expected: intrinsic.arity(),
                got: args.len(),
            });
        }
        if !intrinsic.is_native() {
            return Err(WorldError::UnsupportedIntrinsic(intrinsic));
        }
        tracing::trace!(?intrinsic, item, ?args, "intrinsic");

        use Intrinsic::*;
        // Intrinsics that do not read the item.
        match intrinsic {
            Touch => return Ok(0),
            GetEtherealTop => return Ok(self.ethereal_top() as i32),
            _ => {}
        }

        let Some(it) = self.objects.get(item) else {
            return Ok(0);
        };
        let fam = it.family(&self.shapes);
        let abs = self.objects.location_absolute(item).unwrap_or(it.pos);
        let foot = it.footpad_world(&self.shapes);

        let ret = match intrinsic {
            GetX => self.to_usecode_coord(abs.x),
            GetY => self.to_usecode_coord(abs.y),
            GetZ => abs.z,
            GetCX => self.to_usecode_coord(abs.x - foot.x / 2),
            GetCY => self.to_usecode_coord(abs.y - foot.y / 2),
            GetCZ => abs.z + foot.z / 2,
            GetShape => it.shape as i32,
            GetFrame => it.frame as i32,
            GetQuality => {
                if fam == family::QUALITY {
                    it.quality as i32
                } else {
                    0
                }
            }
            GetQuantity => {
                if fam == family::QUANTITY || fam == family::REAGENT {
                    it.quality as i32
                } else {
                    0
                }
            }
            GetContainer => it.parent as i32,
            GetRootContainer => self.objects.root_container(item).unwrap_or(0) as i32,
            GetQ => it.quality as i32,
            GetQLo => it.q_lo() as i32,
            GetQHi => it.q_hi() as i32,
            GetFamily => fam as i32,
            GetStatus => it.flags.bits() as i32,
            GetMapArray => it.map_num as i32,
            GetMap => match it.actor_data() {
                Some(_) => it.map_num as i32,
                None => 0,
            },
            InFastArea => bool_ret(it.flags.contains(ItemFlags::FASTAREA)),
            GetEggId => {
                if it.is_egg() {
                    it.map_num as i32
                } else {
                    0
                }
            }
            IsNpc => bool_ret(it.is_actor()),
            IsDead => bool_ret(it.is_dead()),
            GetHp => it.actor_data().map_or(0, |a| a.hp as i32),
            GetMana => it.actor_data().map_or(0, |a| a.mana as i32),
            IsOn | IsCompletelyOn => {
                let Some(other) = self.objects.get(args[0] as ObjId) else {
                    return Ok(0);
                };
                let on = if intrinsic == IsOn {
                    is_on(it.pos, foot, other.pos, other.footpad_world(&self.shapes))
                } else {
                    !it.flags.contains(ItemFlags::CONTAINED)
                        && !other.flags.contains(ItemFlags::CONTAINED)
                        && is_completely_on(
                            it.pos,
                            foot,
                            other.pos,
                            other.footpad_world(&self.shapes),
                        )
                };
                bool_ret(on)
            }
            CanExistAtPoint => {
                let info = *self.shapes.get(args[0] as u32);
                let at = Point3::new(
                    self.from_usecode_coord(args[1]),
                    self.from_usecode_coord(args[2]),
                    args[3],
                );
                bool_ret(self.current_map.is_valid_position(
                    &self.objects,
                    &self.shapes,
                    at,
                    None,
                    info.dims,
                    info.flags,
                    item,
                ))
            }
            _ => return self.call_mutating_intrinsic(intrinsic, item, args),
        };
        Ok(ret)
    }

    fn call_mutating_intrinsic(
        &mut self,
        intrinsic: Intrinsic,
        item: ObjId,
        args: &[i32],
    ) -> Result<i32, WorldError> {
        use Intrinsic::*;
        let shapes = &self.shapes;
        let Some(it) = self.objects.get_mut(item) else {
            return Ok(0);
        };
        let fam = it.family(shapes);
        let v = args.first().copied().unwrap_or(0);
        match intrinsic {
            SetShape => it.shape = v as u32,
            SetFrame => it.frame = v as u32,
            SetQ => it.quality = v as u16,
            SetQLo => it.quality = (it.quality & 0xFF00) | (v as u16 & 0x00FF),
            SetQHi => it.quality = (it.quality & 0x00FF) | ((v as u16 & 0x00FF) << 8),
            SetQuality => {
                if fam != family::GENERIC {
                    it.quality = v as u16;
                }
            }
            SetQuantity => {
                if fam == family::QUANTITY || fam == family::REAGENT {
                    it.quality = v as u16;
                }
            }
            OrStatus => it.flags |= ItemFlags::from_bits_retain(v as u16),
            AndStatus => it.flags &= ItemFlags::from_bits_retain(v as u16),
            SetDead => {
                if let Some(actor) = it.actor_data_mut() {
                    actor.dead = true;
                }
            }
            SetNpcNum => it.npc_num = v as u16,
            Destroy => {
                if item != MAIN_ACTOR_ID {
                    self.destroy_item(item)?;
                }
            }
            DestroyContents => {
                let contents = it.contents.clone();
                for child in contents {
                    self.destroy_item(child)?;
                }
            }
            LegalMoveToPoint => return self.legal_move_to_point(item, args),
            other => {
                return Err(WorldError::Inconsistent(format!(
                    "intrinsic {other:?} dispatched to the wrong handler"
                )));
            }
        }
        Ok(0)
    }

    /// Returns 1 if nothing blocks the straight path. Unless `abort_if_blocked`
    /// is set the item moves as far as it can either way.
    fn legal_move_to_point(&mut self, item: ObjId, args: &[i32]) -> Result<i32, WorldError> {
        let target = Point3::new(
            self.from_usecode_coord(args[0]),
            self.from_usecode_coord(args[1]),
            args[2],
        );
        let abort_if_blocked = args[3] != 0;
        let Some(it) = self.objects.get(item) else {
            return Ok(0);
        };
        let sweep = self.current_map.sweep_test(
            &self.objects,
            &self.shapes,
            it.pos,
            target,
            it.footpad_world(&self.shapes),
            it.shape_info(&self.shapes).flags,
            item,
            true,
        );
        let blocked = sweep
            .iter()
            .any(|s| s.blocking && !s.touching && s.end_time > 0);
        if blocked && abort_if_blocked {
            return Ok(0);
        }
        let outcome = self.collide_move(item, target, false, false)?;
        tracing::trace!(item, hit = outcome.hit, end = SWEEP_END, "legal move");
        Ok(bool_ret(!blocked))
    }
}

/// Resting on top of `other` with any overlap in x and y.
fn is_on(pos: Point3, foot: Point3, other: Point3, other_foot: Point3) -> bool {
    let (x1a, y1a) = (pos.x - foot.x, pos.y - foot.y);
    let (x2a, y2a) = (other.x - other_foot.x, other.y - other_foot.y);
    if pos.x <= x2a || other.x <= x1a {
        return false;
    }
    if pos.y <= y2a || other.y <= y1a {
        return false;
    }
    other.z + other_foot.z == pos.z
}

/// Resting on top of `other` with the whole footpad inside its top.
fn is_completely_on(pos: Point3, foot: Point3, other: Point3, other_foot: Point3) -> bool {
    let (x1a, y1a) = (pos.x - foot.x, pos.y - foot.y);
    let (x2a, y2a) = (other.x - other_foot.x, other.y - other_foot.y);
    pos.x <= other.x
        && x2a <= x1a
        && pos.y <= other.y
        && y2a <= y1a
        && other.z + other_foot.z == pos.z
}

fn intrinsic_name(intrinsic: Intrinsic) -> &'static str {
    use Intrinsic::*;
    match intrinsic {
        Touch => "touch",
        GetX => "getX",
        GetY => "getY",
        GetZ => "getZ",
        GetCX => "getCX",
        GetCY => "getCY",
        GetCZ => "getCZ",
        GetShape => "getShape",
        SetShape => "setShape",
        GetFrame => "getFrame",
        SetFrame => "setFrame",
        GetQuality => "getQuality",
        GetQuantity => "getQuantity",
        GetContainer => "getContainer",
        GetRootContainer => "getRootContainer",
        GetQ => "getQ",
        GetQLo => "getQLo",
        GetQHi => "getQHi",
        SetQ => "setQ",
        SetQLo => "setQLo",
        SetQHi => "setQHi",
        SetQuality => "setQuality",
        SetQuantity => "setQuantity",
        GetFamily => "getFamily",
        GetStatus => "getStatus",
        OrStatus => "orStatus",
        AndStatus => "andStatus",
        GetMapArray => "getMapArray",
        GetMap => "getMap",
        Destroy => "destroy",
        DestroyContents => "destroyContents",
        InFastArea => "isInFastArea",
        GetEggId => "getEggId",
        IsNpc => "isNpc",
        IsDead => "isDead",
        SetDead => "setDead",
        GetHp => "getHp",
        GetMana => "getMana",
        SetNpcNum => "setNpcNum",
        GetEtherealTop => "getEtherealTop",
        LegalMoveToPoint => "legalMoveToPoint",
        CanExistAtPoint => "canExistAtPoint",
        IsOn => "isOn",
        IsCompletelyOn => "isCompletelyOn",
        PlaySfx => "playSFX",
        StopSfx => "stopSFX",
        PlayMusic => "playMusic",
        CameraMoveTo => "cameraMoveTo",
        Explode => "explode",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::item::{ActorData, Item};
    use crate::shape::{ShapeFlags, ShapeInfo, ShapeTable};
    use glam::IVec3;

    const AVATAR: u32 = 1;
    const TABLE: u32 = 2;
    const CUP: u32 = 3;
    const COINS: u32 = 4;
    const CHEST: u32 = 5;

    fn world(config: WorldConfig) -> World {
        let shapes = ShapeTable::new()
            .with(AVATAR, ShapeInfo::new(IVec3::new(64, 64, 80), ShapeFlags::SOLID))
            .with(TABLE, ShapeInfo::new(IVec3::new(128, 64, 32), ShapeFlags::SOLID))
            .with(CUP, ShapeInfo::new(IVec3::new(16, 16, 8), ShapeFlags::empty()).with_family(family::QUALITY))
            .with(COINS, ShapeInfo::new(IVec3::new(16, 16, 2), ShapeFlags::empty()).with_family(family::QUANTITY))
            .with(CHEST, ShapeInfo::new(IVec3::new(64, 64, 32), ShapeFlags::SOLID).with_family(family::CONTAINER));
        let mut world = World::new(config, shapes);
        world.add_map(3);
        world.switch_map(3).unwrap();
        world
            .set_main_actor(
                Item::actor(AVATAR, ActorData::with_stats(40, 10, 10, 10))
                    .with_map(3)
                    .at(IVec3::new(20000, 20000, 0)),
            )
            .unwrap();
        world
    }

    #[test]
    fn tables_map_known_indices() {
        let remorse = IntrinsicTable::remorse();
        assert_eq!(remorse.get(0x13), Some(Intrinsic::GetX));
        assert_eq!(remorse.get(0x2E), Some(Intrinsic::LegalMoveToPoint));
        assert_eq!(remorse.get(0x00), None);
        assert_eq!(remorse.get(0x1000), None);
        let regret = IntrinsicTable::regret();
        assert_eq!(regret.get(0x0E), Some(Intrinsic::GetX));
        assert_eq!(regret.get(0x26), Some(Intrinsic::GetCX));
        assert!(regret.native_count() < regret.len());
    }

    #[test]
    fn crusader_coordinates_are_halved() {
        let mut world = world(WorldConfig::crusader());
        let cup = world.spawn_item(Item::new(CUP, 0).at(IVec3::new(1000, 2000, 24))).unwrap();
        assert_eq!(world.call_intrinsic(Intrinsic::GetX, cup, &[]).unwrap(), 500);
        assert_eq!(world.call_intrinsic(Intrinsic::GetY, cup, &[]).unwrap(), 1000);
        assert_eq!(world.call_intrinsic(Intrinsic::GetZ, cup, &[]).unwrap(), 24);
        assert_eq!(world.call_intrinsic(Intrinsic::GetCX, cup, &[]).unwrap(), 496);
        assert_eq!(world.call_intrinsic(Intrinsic::GetCZ, cup, &[]).unwrap(), 28);
    }

    #[test]
    fn contained_items_report_root_location() {
        let mut world = world(WorldConfig::default());
        let chest = world.spawn_item(Item::container(CHEST, 0).at(IVec3::new(3000, 3000, 0))).unwrap();
        let cup = world.spawn_item(Item::new(CUP, 0).at(IVec3::new(100, 100, 0))).unwrap();
        world.move_to_container(cup, chest).unwrap();
        assert_eq!(world.call_intrinsic(Intrinsic::GetX, cup, &[]).unwrap(), 3000);
        assert_eq!(world.call_intrinsic(Intrinsic::GetContainer, cup, &[]).unwrap(), chest as i32);
        world.move_to_container(chest, MAIN_ACTOR_ID).unwrap();
        assert_eq!(
            world.call_intrinsic(Intrinsic::GetRootContainer, cup, &[]).unwrap(),
            MAIN_ACTOR_ID as i32
        );
    }

    #[test]
    fn quality_and_quantity_respect_family() {
        let mut world = world(WorldConfig::default());
        let cup = world.spawn_item(Item::new(CUP, 0).with_quality(0x1234).at(IVec3::new(500, 500, 0))).unwrap();
        let coins = world.spawn_item(Item::new(COINS, 0).with_quality(30).at(IVec3::new(600, 500, 0))).unwrap();
        let table = world.spawn_item(Item::new(TABLE, 0).with_quality(7).at(IVec3::new(800, 500, 0))).unwrap();

        assert_eq!(world.call_intrinsic(Intrinsic::GetQuality, cup, &[]).unwrap(), 0x1234);
        assert_eq!(world.call_intrinsic(Intrinsic::GetQuantity, cup, &[]).unwrap(), 0);
        assert_eq!(world.call_intrinsic(Intrinsic::GetQuantity, coins, &[]).unwrap(), 30);
        assert_eq!(world.call_intrinsic(Intrinsic::GetQLo, cup, &[]).unwrap(), 0x34);
        assert_eq!(world.call_intrinsic(Intrinsic::GetQHi, cup, &[]).unwrap(), 0x12);

        world.call_intrinsic(Intrinsic::SetQHi, cup, &[0xAB]).unwrap();
        assert_eq!(world.objects().get(cup).unwrap().quality, 0xAB34);
        world.call_intrinsic(Intrinsic::SetQuantity, cup, &[9]).unwrap();
        assert_eq!(world.objects().get(cup).unwrap().quality, 0xAB34);
        world.call_intrinsic(Intrinsic::SetQuality, table, &[99]).unwrap();
        assert_eq!(world.objects().get(table).unwrap().quality, 7);
        world.call_intrinsic(Intrinsic::SetQuantity, coins, &[31]).unwrap();
        assert_eq!(world.objects().get(coins).unwrap().quality, 31);
    }

    #[test]
    fn status_bits_and_or() {
        let mut world = world(WorldConfig::default());
        let cup = world.spawn_item(Item::new(CUP, 0).at(IVec3::new(500, 500, 0))).unwrap();
        world
            .call_intrinsic(Intrinsic::OrStatus, cup, &[ItemFlags::INVISIBLE.bits() as i32])
            .unwrap();
        let status = world.call_intrinsic(Intrinsic::GetStatus, cup, &[]).unwrap();
        assert_ne!(status & ItemFlags::INVISIBLE.bits() as i32, 0);
        world
            .call_intrinsic(Intrinsic::AndStatus, cup, &[!ItemFlags::INVISIBLE.bits() as i32])
            .unwrap();
        assert!(!world.objects().get(cup).unwrap().flags.contains(ItemFlags::INVISIBLE));
    }

    #[test]
    fn surface_relations() {
        let mut world = world(WorldConfig::default());
        let table = world.spawn_item(Item::new(TABLE, 0).at(IVec3::new(1000, 1000, 0))).unwrap();
        let cup = world.spawn_item(Item::new(CUP, 0).at(IVec3::new(990, 990, 32))).unwrap();
        let edge = world.spawn_item(Item::new(CUP, 1).at(IVec3::new(1008, 990, 32))).unwrap();
        assert_eq!(world.call_intrinsic(Intrinsic::IsOn, cup, &[table as i32]).unwrap(), 1);
        assert_eq!(world.call_intrinsic(Intrinsic::IsCompletelyOn, cup, &[table as i32]).unwrap(), 1);
        assert_eq!(world.call_intrinsic(Intrinsic::IsOn, edge, &[table as i32]).unwrap(), 1);
        assert_eq!(world.call_intrinsic(Intrinsic::IsCompletelyOn, edge, &[table as i32]).unwrap(), 0);
        assert_eq!(world.call_intrinsic(Intrinsic::IsOn, table, &[cup as i32]).unwrap(), 0);
    }

    #[test]
    fn destroy_spares_the_avatar() {
        let mut world = world(WorldConfig::default());
        let chest = world.spawn_item(Item::container(CHEST, 0).at(IVec3::new(3000, 3000, 0))).unwrap();
        let cup = world.spawn_item(Item::new(CUP, 0).at(IVec3::new(100, 100, 0))).unwrap();
        world.move_to_container(cup, chest).unwrap();

        world.call_intrinsic(Intrinsic::DestroyContents, chest, &[]).unwrap();
        assert!(!world.objects().contains(cup));
        assert!(world.objects().contains(chest));
        world.call_intrinsic(Intrinsic::Destroy, MAIN_ACTOR_ID, &[]).unwrap();
        assert!(world.objects().contains(MAIN_ACTOR_ID));
        world.call_intrinsic(Intrinsic::Destroy, chest, &[]).unwrap();
        assert!(!world.objects().contains(chest));
    }

    #[test]
    fn legal_move_reports_blockers() {
        let mut world = world(WorldConfig::default());
        world.spawn_item(Item::new(TABLE, 0).at(IVec3::new(20300, 20010, 0))).unwrap();
        let blocked = world
            .call_intrinsic(Intrinsic::LegalMoveToPoint, MAIN_ACTOR_ID, &[20500, 20000, 0, 1])
            .unwrap();
        assert_eq!(blocked, 0);
        assert_eq!(world.objects().get(MAIN_ACTOR_ID).unwrap().pos, IVec3::new(20000, 20000, 0));

        let partial = world
            .call_intrinsic(Intrinsic::LegalMoveToPoint, MAIN_ACTOR_ID, &[20500, 20000, 0, 0])
            .unwrap();
        assert_eq!(partial, 0);
        assert_eq!(world.objects().get(MAIN_ACTOR_ID).unwrap().pos.x, 20172);

        let clear = world
            .call_intrinsic(Intrinsic::LegalMoveToPoint, MAIN_ACTOR_ID, &[20172, 20500, 0, 1])
            .unwrap();
        assert_eq!(clear, 1);
        assert_eq!(world.objects().get(MAIN_ACTOR_ID).unwrap().pos, IVec3::new(20172, 20500, 0));
    }

    #[test]
    fn can_exist_checks_the_given_shape() {
        let mut world = world(WorldConfig::default());
        world.spawn_item(Item::new(TABLE, 0).at(IVec3::new(1000, 1000, 0))).unwrap();
        let any = MAIN_ACTOR_ID;
        let args_inside = [CHEST as i32, 990, 990, 0];
        let args_on_top = [CHEST as i32, 990, 990, 32];
        assert_eq!(world.call_intrinsic(Intrinsic::CanExistAtPoint, any, &args_inside).unwrap(), 0);
        assert_eq!(world.call_intrinsic(Intrinsic::CanExistAtPoint, any, &args_on_top).unwrap(), 1);
    }

    #[test]
    fn arity_and_host_intrinsics_are_checked() {
        let mut world = world(WorldConfig::default());
        assert!(matches!(
            world.call_intrinsic(Intrinsic::SetFrame, MAIN_ACTOR_ID, &[]),
            Err(WorldError::IntrinsicArgs { expected: 1, got: 0, .. })
        ));
        assert!(matches!(
            world.call_intrinsic(Intrinsic::PlaySfx, MAIN_ACTOR_ID, &[3]),
            Err(WorldError::UnsupportedIntrinsic(Intrinsic::PlaySfx))
        ));
        assert_eq!(world.call_intrinsic(Intrinsic::GetShape, 4000, &[]).unwrap(), 0);
        let table = IntrinsicTable::remorse();
        assert_eq!(world.call_intrinsic_index(&table, 0x16, MAIN_ACTOR_ID, &[]).unwrap(), AVATAR as i32);
        assert_eq!(world.call_intrinsic_index(&table, 0x7F, MAIN_ACTOR_ID, &[]).unwrap(), 0);
    }

    #[test]
    fn actor_intrinsics() {
        let mut world = world(WorldConfig::default());
        assert_eq!(world.call_intrinsic(Intrinsic::IsNpc, MAIN_ACTOR_ID, &[]).unwrap(), 1);
        assert_eq!(world.call_intrinsic(Intrinsic::GetHp, MAIN_ACTOR_ID, &[]).unwrap(), 40);
        assert_eq!(world.call_intrinsic(Intrinsic::GetMap, MAIN_ACTOR_ID, &[]).unwrap(), 3);
        world.call_intrinsic(Intrinsic::SetDead, MAIN_ACTOR_ID, &[]).unwrap();
        assert_eq!(world.call_intrinsic(Intrinsic::IsDead, MAIN_ACTOR_ID, &[]).unwrap(), 1);
        assert_eq!(world.call_intrinsic(Intrinsic::GetEtherealTop, 0, &[]).unwrap(), 0);
    }
}
