//! The built-in scenario the CLI commands run against.
//!
//! Map 1 holds the avatar, a chest with coins, a glob egg on the avatar's
//! walking line, a wall off to the side and a teleporter to map 2.

use glam::IVec3;
use pentacle_common::Point3;
use pentacle_world::{
    ActorData, Item, MAIN_ACTOR_ID, MapItem, ShapeFlags, ShapeInfo, ShapeTable, World,
    WorldConfig, WorldError, family,
};
use serde::{Deserialize, Serialize};

pub const AVATAR: u32 = 1;
pub const WALL: u32 = 2;
pub const CHEST: u32 = 3;
pub const COIN: u32 = 4;
pub const EGG: u32 = 5;
pub const TELEPORT_EGG: u32 = 6;

pub const START: Point3 = IVec3::new(800, 1000, 0);
/// Distance the avatar walks east per frame.
pub const STEP: i32 = 16;

const TELEPORT_ID: u8 = 7;

/// CLI state carried in a savegame's `APP` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub frames: u32,
    pub walking: bool,
}

pub fn shapes() -> ShapeTable {
    ShapeTable::new()
        .with(AVATAR, ShapeInfo::new(IVec3::new(64, 64, 80), ShapeFlags::SOLID))
        .with(WALL, ShapeInfo::new(IVec3::new(32, 256, 64), ShapeFlags::SOLID))
        .with(
            CHEST,
            ShapeInfo::new(IVec3::new(64, 64, 32), ShapeFlags::SOLID)
                .with_family(family::CONTAINER),
        )
        .with(
            COIN,
            ShapeInfo::new(IVec3::new(8, 8, 2), ShapeFlags::empty())
                .with_family(family::QUANTITY),
        )
        .with(
            EGG,
            ShapeInfo::new(IVec3::ZERO, ShapeFlags::empty()).with_family(family::GLOB_EGG),
        )
        .with(
            TELEPORT_EGG,
            ShapeInfo::new(IVec3::ZERO, ShapeFlags::empty()).with_family(family::TELEPORT),
        )
}

pub fn build(config: WorldConfig) -> Result<World, WorldError> {
    let mut world = World::new(config, shapes());
    world.add_map(1);
    world.add_map(2);

    world.add_map_item(
        1,
        MapItem::new(Item::container(CHEST, 0).at(IVec3::new(700, 900, 0)))
            .with_contents(vec![MapItem::new(Item::new(COIN, 0).with_quality(25))]),
    )?;
    world.add_map_item(1, MapItem::new(Item::egg(EGG, 2, 1).at(IVec3::new(1000, 1000, 0))))?;
    world.add_map_item(1, MapItem::new(Item::new(WALL, 0).at(IVec3::new(1400, 1300, 0))))?;
    let mut teleporter = Item::teleport_egg(TELEPORT_EGG, TELEPORT_ID, 2, true);
    teleporter.npc_num = 0x11;
    world.add_map_item(1, MapItem::new(teleporter.at(IVec3::new(1600, 1000, 0))))?;
    world.add_map_item(
        2,
        MapItem::new(
            Item::teleport_egg(TELEPORT_EGG, TELEPORT_ID, 0, false).at(IVec3::new(2000, 2000, 0)),
        ),
    )?;

    world.switch_map(1)?;
    world.set_main_actor(
        Item::actor(AVATAR, ActorData::with_stats(30, 12, 14, 10))
            .with_map(1)
            .at(START),
    )?;
    Ok(world)
}

/// Advance one frame, walking the avatar east while `session.walking`.
pub fn step(world: &mut World, session: &mut Session) -> Result<(), WorldError> {
    if session.walking {
        if let Some(avatar) = world.objects().get(MAIN_ACTOR_ID) {
            let target = avatar.pos + IVec3::new(STEP, 0, 0);
            let outcome = world.collide_move(MAIN_ACTOR_ID, target, false, false)?;
            if !outcome.completed() {
                tracing::info!(blocker = outcome.hit_item, "avatar stopped");
                session.walking = false;
            }
        }
    }
    let map = world.current_map().map_num();
    world.run_frame();
    session.frames += 1;
    if world.current_map().map_num() != map {
        tracing::info!(from = map, to = world.current_map().map_num(), "avatar teleported");
        session.walking = false;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentacle_world::UsecodeEvent;

    #[test]
    fn scenario_starts_on_map_one() {
        let world = build(WorldConfig::default()).unwrap();
        let summary = world.summary();
        assert_eq!(summary.map_num, 1);
        assert_eq!(summary.actors, 1);
        assert_eq!(world.objects().get(MAIN_ACTOR_ID).unwrap().pos, START);
    }

    #[test]
    fn walking_hatches_the_egg_once_then_teleports() {
        let mut world = build(WorldConfig::default()).unwrap();
        let mut session = Session {
            frames: 0,
            walking: true,
        };
        let mut hatches = 0;
        for _ in 0..60 {
            step(&mut world, &mut session).unwrap();
            hatches += world
                .drain_events()
                .iter()
                .filter(|e| matches!(e, UsecodeEvent::Hatch { .. }))
                .count();
        }
        assert_eq!(hatches, 1);
        assert_eq!(session.frames, 60);
        assert_eq!(world.current_map().map_num(), 2);
        assert_eq!(
            world.objects().get(MAIN_ACTOR_ID).unwrap().pos,
            IVec3::new(2000, 2000, 0)
        );
    }
}
