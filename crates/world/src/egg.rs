//! Eggs: invisible trigger items that hatch when the avatar walks into
//! their range.

use pentacle_common::{ObjId, ProcId};
use pentacle_kernel::{KernelError, Process, ProcessCore, encode_payload};
use serde::{Deserialize, Serialize};

use crate::objects::MAIN_ACTOR_ID;
use crate::usecode::UsecodeEvent;
use crate::world::World;

pub const EGG_HATCHER_PROCESS_TYPE: u16 = 0x0000;
/// Survives map switches.
pub const TELEPORT_PROCESS_TYPE: u16 = 0x0001;

/// Checks every egg of the current map against the avatar once per tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EggHatcherProcess {
    eggs: Vec<ObjId>,
}

impl EggHatcherProcess {
    pub const CLASS: &'static str = "EggHatcherProcess";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_egg(&mut self, egg: ObjId) {
        if !self.eggs.contains(&egg) {
            self.eggs.push(egg);
        }
    }

    pub fn eggs(&self) -> &[ObjId] {
        &self.eggs
    }
}

impl Process<World> for EggHatcherProcess {
    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn run(&mut self, _pid: ProcId, world: &mut World) {
        world.check_eggs(&self.eggs);
    }

    fn save_payload(&self) -> Result<ciborium::Value, KernelError> {
        encode_payload(self)
    }
}

/// Sends the avatar to the destination egg with a given id, switching maps
/// first if needed. Runs once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeleportToEggProcess {
    pub map: u32,
    pub teleport_id: u8,
}

impl TeleportToEggProcess {
    pub const CLASS: &'static str = "TeleportToEggProcess";

    pub fn new(map: u32, teleport_id: u8) -> Self {
        Self { map, teleport_id }
    }
}

impl Process<World> for TeleportToEggProcess {
    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn run(&mut self, pid: ProcId, world: &mut World) {
        if let Err(err) = world.teleport_main_actor(self.map, self.teleport_id) {
            tracing::warn!(map = self.map, teleport_id = self.teleport_id, %err, "teleport failed");
        }
        world.kernel.terminate(pid);
    }

    fn save_payload(&self) -> Result<ciborium::Value, KernelError> {
        encode_payload(self)
    }
}

impl World {
    /// One hatcher pass over `eggs`.
    ///
    /// An egg's trigger area is its location extended by `mul * range` in
    /// both directions on x and y, and by the game's z range vertically. The
    /// avatar is inside when its location is in the area and its footpad
    /// starts before the far edge. Vertically its box must reach above
    /// `z - z_range` while its base is at most `z + z_range`.
    pub(crate) fn check_eggs(&mut self, eggs: &[ObjId]) {
        let Some(avatar) = self.objects.get(MAIN_ACTOR_ID) else {
            return;
        };
        let Some(just_teleported) = avatar.actor_data().map(|a| a.just_teleported) else {
            return;
        };
        let apos = avatar.pos;
        let afoot = avatar.footpad_world(&self.shapes);
        let mul = self.config.game.egg_range_mul();
        let z_range = self.config.game.egg_z_range();

        let mut near_teleporter = false;
        for &id in eggs {
            let Some(egg) = self.objects.egg(id) else {
                continue;
            };
            let p = egg.pos;
            let x1 = p.x - mul * egg.egg_x_range();
            let x2 = p.x + mul * egg.egg_x_range();
            let y1 = p.y - mul * egg.egg_y_range();
            let y2 = p.y + mul * egg.egg_y_range();
            let inside = x1 <= apos.x
                && apos.x - afoot.x < x2
                && y1 <= apos.y
                && apos.y - afoot.y < y2
                && (z_range == 0 || (apos.z + afoot.z > p.z - z_range && apos.z <= p.z + z_range));

            let teleport = egg.is_teleport_egg(&self.shapes);
            if inside {
                if teleport && egg.is_teleporter() {
                    near_teleporter = true;
                }
                if teleport && just_teleported {
                    continue;
                }
                self.hatch_egg(id);
            } else {
                self.unhatch_egg(id);
            }
        }

        if !near_teleporter {
            if let Some(actor) = self.objects.actor_mut(MAIN_ACTOR_ID) {
                actor.just_teleported = false;
            }
        }
    }

    /// Fire an egg. Plain eggs raise `Hatch` once until unhatched; teleporter
    /// eggs start a [`TeleportToEggProcess`] every time. Returns whether
    /// anything fired.
    pub fn hatch_egg(&mut self, id: ObjId) -> bool {
        let Some(egg) = self.objects.egg(id) else {
            return false;
        };
        if egg.is_teleport_egg(&self.shapes) {
            if !egg.is_teleporter() {
                return false;
            }
            let process = TeleportToEggProcess::new(egg.map_num as u32, egg.teleport_id());
            tracing::debug!(egg = id, map = process.map, teleport_id = process.teleport_id, "teleporter hatched");
            let pid = self.kernel.add_process(
                ProcessCore::new(0, TELEPORT_PROCESS_TYPE),
                Box::new(process),
            );
            return pid != 0;
        }

        let Some(data) = self.objects.get_mut(id).and_then(|e| e.egg_data_mut()) else {
            return false;
        };
        if data.hatched {
            return false;
        }
        data.hatched = true;
        self.events.push(UsecodeEvent::Hatch { egg: id });
        true
    }

    /// The avatar left the egg's area.
    pub fn unhatch_egg(&mut self, id: ObjId) {
        let crusader = self.config.game.is_crusader();
        let Some(data) = self.objects.get_mut(id).and_then(|e| e.egg_data_mut()) else {
            return;
        };
        let was_hatched = std::mem::take(&mut data.hatched);
        if crusader && was_hatched {
            self.events.push(UsecodeEvent::Unhatch { egg: id });
        }
    }

    /// Forget that an egg hatched, without telling usecode.
    pub fn reset_egg(&mut self, id: ObjId) {
        if let Some(data) = self.objects.get_mut(id).and_then(|e| e.egg_data_mut()) {
            data.hatched = false;
        }
    }

    /// Hand an egg to the current map's hatcher.
    pub(crate) fn register_egg(&mut self, id: ObjId) {
        let pid = self.current_map.egg_hatcher();
        match self.kernel.get_process_as_mut::<EggHatcherProcess>(pid) {
            Some(hatcher) => hatcher.add_egg(id),
            None => tracing::warn!(egg = id, pid, "no egg hatcher to register with"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GameVariant, WorldConfig};
    use crate::item::{ActorData, Item};
    use crate::shape::{ShapeFlags, ShapeInfo, ShapeTable, family};
    use glam::IVec3;

    const AVATAR: u32 = 1;
    const EGG: u32 = 20;
    const TELEPORT: u32 = 21;

    fn shapes() -> ShapeTable {
        ShapeTable::new()
            .with(AVATAR, ShapeInfo::new(IVec3::new(32, 32, 40), ShapeFlags::SOLID))
            .with(EGG, ShapeInfo::new(IVec3::ZERO, ShapeFlags::empty()).with_family(family::GLOB_EGG))
            .with(TELEPORT, ShapeInfo::new(IVec3::ZERO, ShapeFlags::empty()).with_family(family::TELEPORT))
    }

    fn world(game: GameVariant) -> World {
        let config = WorldConfig {
            game,
            ..WorldConfig::default()
        };
        let mut world = World::new(config, shapes());
        world.add_map(1);
        world.switch_map(1).unwrap();
        world
            .set_main_actor(Item::actor(AVATAR, ActorData::with_stats(30, 20, 20, 20)).with_map(1))
            .unwrap();
        world
    }

    fn place_avatar(world: &mut World, x: i32, y: i32, z: i32) {
        world.move_item(MAIN_ACTOR_ID, IVec3::new(x, y, z)).unwrap();
        world.drain_events();
    }

    fn hatches(world: &mut World) -> usize {
        world
            .drain_events()
            .iter()
            .filter(|e| matches!(e, UsecodeEvent::Hatch { .. }))
            .count()
    }

    #[test]
    fn egg_hatches_once_per_entry() {
        let mut world = world(GameVariant::Ultima8);
        // x range 2, y range 1 at (1000, 1000, 0): area [936, 1064) x [968, 1032)
        let egg = world
            .spawn_item(Item::egg(EGG, 2, 1).at(IVec3::new(1000, 1000, 0)))
            .unwrap();
        world.drain_events();

        place_avatar(&mut world, 500, 500, 0);
        world.run_frame();
        assert_eq!(hatches(&mut world), 0);

        place_avatar(&mut world, 1000, 1000, 0);
        world.run_frame();
        assert_eq!(hatches(&mut world), 1);
        assert!(world.objects().get(egg).unwrap().egg_data().unwrap().hatched);

        // staying inside does not fire again
        world.run_frame();
        world.run_frame();
        assert_eq!(hatches(&mut world), 0);

        place_avatar(&mut world, 1200, 1000, 0);
        world.run_frame();
        assert!(!world.objects().get(egg).unwrap().egg_data().unwrap().hatched);

        place_avatar(&mut world, 1010, 990, 0);
        world.run_frame();
        assert_eq!(hatches(&mut world), 1);
    }

    #[test]
    fn egg_area_edges() {
        let mut world = world(GameVariant::Ultima8);
        world
            .spawn_item(Item::egg(EGG, 2, 1).at(IVec3::new(1000, 1000, 0)))
            .unwrap();

        // just short of the west edge
        place_avatar(&mut world, 935, 1000, 0);
        world.run_frame();
        assert_eq!(hatches(&mut world), 0);

        // footpad reaches back to the east edge
        place_avatar(&mut world, 1096, 1000, 0);
        world.run_frame();
        assert_eq!(hatches(&mut world), 0);
        place_avatar(&mut world, 1095, 1000, 0);
        world.run_frame();
        assert_eq!(hatches(&mut world), 1);

        // too far above
        place_avatar(&mut world, 1000, 1000, 48);
        world.run_frame();
        place_avatar(&mut world, 1000, 1000, 49);
        world.run_frame();
        assert_eq!(hatches(&mut world), 0);
    }

    #[test]
    fn tall_avatar_reaching_below_the_egg_hatches_once() {
        const TALL: u32 = 2;
        let shapes = shapes().with(TALL, ShapeInfo::new(IVec3::new(20, 10, 96), ShapeFlags::SOLID));
        let mut world = World::new(WorldConfig::default(), shapes);
        world.add_map(1);
        world.switch_map(1).unwrap();
        let egg = world
            .spawn_item(Item::egg(EGG, 2, 1).at(IVec3::new(1000, 1000, 0)))
            .unwrap();
        // box spans x 990..1010, y 995..1005, z -48..48
        world
            .set_main_actor(
                Item::actor(TALL, ActorData::with_stats(30, 20, 20, 20))
                    .with_map(1)
                    .at(IVec3::new(1010, 1005, -48)),
            )
            .unwrap();
        world.drain_events();

        let mut fired = 0;
        for _ in 0..5 {
            world.run_frame();
            fired += hatches(&mut world);
        }
        assert_eq!(fired, 1);
        assert!(world.objects().get(egg).unwrap().egg_data().unwrap().hatched);

        // leaving and coming back is a new entry
        place_avatar(&mut world, 1500, 1005, -48);
        world.run_frame();
        place_avatar(&mut world, 1010, 1005, -48);
        world.run_frame();
        world.run_frame();
        assert_eq!(hatches(&mut world), 1);
    }

    #[test]
    fn egg_height_window() {
        let mut world = world(GameVariant::Ultima8);
        world
            .spawn_item(Item::egg(EGG, 2, 1).at(IVec3::new(1000, 1000, 0)))
            .unwrap();

        // a 40-high avatar whose top stops exactly at z - 48 stays outside
        place_avatar(&mut world, 1000, 1000, -88);
        world.run_frame();
        assert_eq!(hatches(&mut world), 0);
        place_avatar(&mut world, 1000, 1000, -87);
        world.run_frame();
        assert_eq!(hatches(&mut world), 1);
    }

    #[test]
    fn crusader_unhatch_notifies_usecode() {
        let mut world = world(GameVariant::Crusader);
        let egg = world
            .spawn_item(Item::egg(EGG, 1, 1).at(IVec3::new(4000, 4000, 0)))
            .unwrap();
        place_avatar(&mut world, 4000, 4000, 200);
        world.run_frame();
        // no height check in this variant
        assert_eq!(hatches(&mut world), 1);

        place_avatar(&mut world, 6000, 6000, 0);
        world.run_frame();
        let events = world.drain_events();
        assert!(events.contains(&UsecodeEvent::Unhatch { egg }));
    }

    #[test]
    fn teleporter_moves_avatar_and_is_suppressed_afterwards() {
        let mut world = world(GameVariant::Ultima8);
        world
            .spawn_item(Item::teleport_egg(TELEPORT, 4, 1, true).at(IVec3::new(2000, 2000, 0)))
            .unwrap();
        world
            .spawn_item(Item::teleport_egg(TELEPORT, 4, 1, false).at(IVec3::new(8000, 8000, 0)))
            .unwrap();
        // a second teleporter right at the destination
        world
            .spawn_item(Item::teleport_egg(TELEPORT, 5, 1, true).at(IVec3::new(8000, 8000, 0)))
            .unwrap();
        world
            .spawn_item(Item::teleport_egg(TELEPORT, 5, 1, false).at(IVec3::new(3000, 3000, 0)))
            .unwrap();

        place_avatar(&mut world, 2000, 2000, 0);
        world.run_frame();
        let avatar = world.objects().get(MAIN_ACTOR_ID).unwrap();
        assert_eq!(avatar.pos, IVec3::new(8000, 8000, 0));
        assert!(avatar.actor_data().unwrap().just_teleported);

        // standing on the destination teleporter does not bounce back
        world.run_frame();
        world.run_frame();
        assert_eq!(world.objects().get(MAIN_ACTOR_ID).unwrap().pos, IVec3::new(8000, 8000, 0));

        // walking off clears the flag
        place_avatar(&mut world, 9000, 9000, 0);
        world.run_frame();
        let avatar = world.objects().get(MAIN_ACTOR_ID).unwrap();
        assert!(!avatar.actor_data().unwrap().just_teleported);
    }

    #[test]
    fn hatcher_payload_round_trip() {
        let mut hatcher = EggHatcherProcess::new();
        hatcher.add_egg(300);
        hatcher.add_egg(301);
        hatcher.add_egg(300);
        let payload = Process::<World>::save_payload(&hatcher).unwrap();
        let back: EggHatcherProcess = payload.deserialized().unwrap();
        assert_eq!(back.eggs(), &[300, 301]);
    }
}
