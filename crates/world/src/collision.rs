use pentacle_common::{BoundingBox, Dims, Direction, ObjId, Point3};

use crate::current_map::CurrentMap;
use crate::item::ExtFlags;
use crate::objects::ObjectManager;
use crate::shape::{ShapeFlags, ShapeTable};

/// Sweep times are fixed point: `SWEEP_END` is the end of the move.
pub const SWEEP_END: i32 = 0x4000;

/// Outcome of a placement test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionInfo {
    pub valid: bool,
    /// First item that makes the position invalid.
    pub blocker: ObjId,
    /// A solid item whose top is level with our bottom.
    pub support: ObjId,
    /// The lowest roof item at or above our top.
    pub roof: ObjId,
}

impl PositionInfo {
    pub fn is_supported(&self) -> bool {
        self.support != 0
    }
}

/// One item touched by a swept box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepItem {
    pub item: ObjId,
    /// When contact starts, `0..=SWEEP_END`; -1 means before the move began.
    pub hit_time: i32,
    /// When contact ends; `SWEEP_END` means still in contact at the end.
    pub end_time: i32,
    /// The boxes share a face but never overlap.
    pub touching: bool,
    /// We rest on top of the item.
    pub touching_floor: bool,
    pub blocking: bool,
    /// Axes that produced the first contact (bit 0 = x, 1 = y, 2 = z).
    pub dirs: u8,
}

impl SweepItem {
    /// Position of the moving item at `hit_time` along `start -> end`.
    pub fn interpolated(&self, start: Point3, end: Point3) -> Point3 {
        let t = self.hit_time.max(0) as i64;
        let lerp = |a: i32, b: i32| -> i32 {
            let delta = (b - a) as i64;
            let round = if b > a { 0x2000 } else { -0x2000 };
            a + ((delta * t + round) / SWEEP_END as i64) as i32
        };
        Point3::new(
            lerp(start.x, end.x),
            lerp(start.y, end.y),
            lerp(start.z, end.z),
        )
    }
}

/// Shape flags that take part in sweeps.
const SWEEP_BLOCK_MASK: ShapeFlags = ShapeFlags::SOLID
    .union(ShapeFlags::DAMAGING)
    .union(ShapeFlags::LAND);

/// Shape flags that make a placement invalid.
const PLACE_BLOCK_MASK: ShapeFlags = ShapeFlags::SOLID.union(ShapeFlags::DAMAGING);

/// Contact interval of a moving box against a static one along one axis.
struct AxisHit {
    u0: i64,
    u1: i64,
    touch: bool,
    touch_floor: bool,
}

fn axis_hit(a0: i32, a1: i32, b0: i32, b1: i32, v: i32, is_z: bool) -> Option<AxisHit> {
    let (a0, a1, b0, b1, v) = (a0 as i64, a1 as i64, b0 as i64, b1 as i64, v as i64);
    let end = SWEEP_END as i64;
    if v > 0 {
        return Some(AxisHit {
            u0: (b0 - a1) * end / v,
            u1: (b1 - a0) * end / v,
            touch: false,
            touch_floor: false,
        });
    }
    if v < 0 {
        return Some(AxisHit {
            u0: (b1 - a0) * end / v,
            u1: (b0 - a1) * end / v,
            touch: false,
            touch_floor: false,
        });
    }
    if a1 >= b0 && a0 <= b1 {
        let touch = a1 == b0 || a0 == b1;
        return Some(AxisHit {
            u0: -1,
            u1: end + 1,
            touch,
            touch_floor: is_z && a0 == b1,
        });
    }
    None
}

impl CurrentMap {
    /// Test whether a box of `dims` can stand at `pos`.
    ///
    /// Only items whose shape flags share SOLID or DAMAGING with `shapeflags`
    /// block. When `start` is given, items that already overlap the box at
    /// `start` are ignored so an item stuck in something can still move out.
    #[allow(clippy::too_many_arguments)]
    pub fn position_info(
        &self,
        objects: &ObjectManager,
        shapes: &ShapeTable,
        pos: Point3,
        start: Option<Point3>,
        dims: Dims,
        shapeflags: ShapeFlags,
        ignore: ObjId,
    ) -> PositionInfo {
        let target = BoundingBox::new(pos, dims);
        let start_box = start.map(|s| BoundingBox::new(s, dims));
        let mut info = PositionInfo {
            valid: true,
            ..PositionInfo::default()
        };
        let mut roof_z = i32::MAX;

        let candidates = self.items_near(pos.x - dims.x, pos.y - dims.y, pos.x, pos.y);
        for id in candidates {
            if id == ignore {
                continue;
            }
            let Some(other) = objects.get(id) else {
                continue;
            };
            if other.ext_flags.contains(ExtFlags::SPRITE) {
                continue;
            }
            let si = other.shape_info(shapes);
            let ob = other.world_box(shapes);

            if info.valid
                && si.flags.intersects(shapeflags & PLACE_BLOCK_MASK)
                && target.overlaps(&ob)
                && !start_box.is_some_and(|sb| sb.overlaps(&ob))
            {
                info.valid = false;
                info.blocker = id;
            }

            if !target.overlaps_xy(&ob) {
                continue;
            }
            if info.support == 0 && si.is_solid() && ob.max_z() == target.min_z() {
                info.support = id;
            }
            if si.is_roof() && ob.min_z() >= target.max_z() && ob.min_z() < roof_z {
                roof_z = ob.min_z();
                info.roof = id;
            }
        }
        info
    }

    #[allow(clippy::too_many_arguments)]
    pub fn is_valid_position(
        &self,
        objects: &ObjectManager,
        shapes: &ShapeTable,
        pos: Point3,
        start: Option<Point3>,
        dims: Dims,
        shapeflags: ShapeFlags,
        ignore: ObjId,
    ) -> bool {
        self.position_info(objects, shapes, pos, start, dims, shapeflags, ignore)
            .valid
    }

    /// Find the nearest valid spot for `item` around `pos`.
    ///
    /// Scans 17 heights (`-8..=8`) by 17 sideways offsets perpendicular to
    /// `movedir`, closest first. A supported spot always wins; an unsupported
    /// one is only returned when `want_support` is false.
    pub fn scan_for_valid_position(
        &self,
        objects: &ObjectManager,
        shapes: &ShapeTable,
        pos: Point3,
        item: ObjId,
        movedir: Direction,
        want_support: bool,
    ) -> Option<Point3> {
        let it = objects.get(item)?;
        let dims = it.footpad_world(shapes);
        let shapeflags = it.shape_info(shapes).flags;
        let side = movedir.perpendicular();

        let mut offsets: Vec<(i32, i32)> = (-8..=8)
            .flat_map(|v| (-8..=8).map(move |h| (h, v)))
            .collect();
        offsets.sort_by_key(|&(h, v)| (h.abs() + v.abs(), v.abs(), h.abs(), v, h));

        let mut floating = None;
        for (h, v) in offsets {
            let candidate = Point3::new(pos.x + h * side.dx(), pos.y + h * side.dy(), pos.z + v);
            let info =
                self.position_info(objects, shapes, candidate, None, dims, shapeflags, item);
            if !info.valid {
                continue;
            }
            if info.is_supported() {
                return Some(candidate);
            }
            if floating.is_none() {
                floating = Some(candidate);
            }
        }
        if want_support { None } else { floating }
    }

    /// Sweep a box of `dims` from `start` to `end` and report every item it
    /// touches, ordered by first contact.
    ///
    /// Items already overlapping the box's interior at `start` are left out
    /// unless they merely touch it. With `blocking_only`, only the earliest
    /// blocking item that the box actually runs into is returned; touching
    /// contacts are left out.
    #[allow(clippy::too_many_arguments)]
    pub fn sweep_test(
        &self,
        objects: &ObjectManager,
        shapes: &ShapeTable,
        start: Point3,
        end: Point3,
        dims: Dims,
        shapeflags: ShapeFlags,
        ignore: ObjId,
        blocking_only: bool,
    ) -> Vec<SweepItem> {
        let moving = BoundingBox::new(start, dims);
        let vel = end - start;
        let lo = start.min(end);
        let hi = start.max(end);
        let candidates = self.items_near(lo.x - dims.x, lo.y - dims.y, hi.x, hi.y);

        let mut hits: Vec<SweepItem> = Vec::new();
        for id in candidates {
            if id == ignore {
                continue;
            }
            let Some(other) = objects.get(id) else {
                continue;
            };
            if other.ext_flags.contains(ExtFlags::SPRITE) {
                continue;
            }
            let other_flags = other.shape_info(shapes).flags;
            let blocking = other_flags.intersects(shapeflags & SWEEP_BLOCK_MASK);
            if blocking_only && !blocking {
                continue;
            }
            let ob = other.world_box(shapes);

            let mut first = i64::MIN;
            let mut last = i64::MAX;
            let mut touch = false;
            let mut touch_floor = false;
            let mut starts = [0i64; 3];
            let mut missed = false;
            for axis in 0..3 {
                let (a0, a1) = moving.axis(axis);
                let (b0, b1) = ob.axis(axis);
                let Some(h) = axis_hit(a0, a1, b0, b1, vel[axis], axis == 2) else {
                    missed = true;
                    break;
                };
                touch |= h.touch;
                touch_floor |= h.touch_floor;
                starts[axis] = h.u0;
                first = first.max(h.u0);
                last = last.min(h.u1);
            }
            if missed || first > last || first > SWEEP_END as i64 || last < 0 {
                continue;
            }
            if first == last {
                touch = true;
            }
            if first < 0 && !touch {
                // interior overlap at the start
                continue;
            }
            if blocking_only && touch {
                continue;
            }

            let dirs = (0..3)
                .filter(|a| starts[*a] == first)
                .fold(0u8, |acc, a| acc | (1 << a));
            let hit = SweepItem {
                item: id,
                hit_time: first.max(-1) as i32,
                end_time: last.min(SWEEP_END as i64) as i32,
                touching: touch,
                touching_floor: touch_floor,
                blocking,
                dirs,
            };
            let at = hits.partition_point(|h| h.hit_time <= hit.hit_time);
            hits.insert(at, hit);
        }
        if blocking_only {
            hits.truncate(1);
        }
        hits
    }

    /// True if anything blocking lies in the way of the sweep.
    #[allow(clippy::too_many_arguments)]
    pub fn sweep_blocked(
        &self,
        objects: &ObjectManager,
        shapes: &ShapeTable,
        start: Point3,
        end: Point3,
        dims: Dims,
        shapeflags: ShapeFlags,
        ignore: ObjId,
    ) -> bool {
        self.sweep_test(objects, shapes, start, end, dims, shapeflags, ignore, true)
            .iter()
            .any(|h| !h.touching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::item::Item;
    use crate::shape::ShapeInfo;
    use glam::IVec3;

    const WALL: u32 = 10;
    const FLOOR: u32 = 11;
    const MOVER: u32 = 12;
    const DECOR: u32 = 13;
    const CEILING: u32 = 14;

    fn shapes() -> ShapeTable {
        ShapeTable::new()
            .with(WALL, ShapeInfo::new(IVec3::new(32, 128, 40), ShapeFlags::SOLID))
            .with(FLOOR, ShapeInfo::new(IVec3::new(256, 256, 8), ShapeFlags::SOLID | ShapeFlags::LAND))
            .with(MOVER, ShapeInfo::new(IVec3::new(32, 32, 40), ShapeFlags::SOLID))
            .with(DECOR, ShapeInfo::new(IVec3::new(16, 16, 16), ShapeFlags::empty()))
            .with(CEILING, ShapeInfo::new(IVec3::new(256, 256, 8), ShapeFlags::ROOF))
    }

    fn world_with(items: &[(u32, IVec3)]) -> (CurrentMap, ObjectManager, Vec<ObjId>) {
        let mut map = CurrentMap::new(&WorldConfig::default());
        let mut objects = ObjectManager::new();
        let ids = items
            .iter()
            .map(|(shape, pos)| {
                let id = objects.assign_object_id(Item::new(*shape, 0).at(*pos));
                map.add_item(&mut objects, id);
                id
            })
            .collect();
        (map, objects, ids)
    }

    fn mover_dims() -> Dims {
        IVec3::new(32, 32, 40)
    }

    #[test]
    fn empty_space_is_valid() {
        let (map, objects, _) = world_with(&[]);
        let pos = IVec3::new(3000, 3000, 0);
        assert!(map.is_valid_position(&objects, &shapes(), pos, None, mover_dims(), ShapeFlags::SOLID, 0));
        let far = IVec3::new(30000, 100, 64);
        let info = map.position_info(&objects, &shapes(), far, None, mover_dims(), ShapeFlags::SOLID, 0);
        assert!(info.valid);
        assert!(!info.is_supported());
    }

    #[test]
    fn overlap_with_solid_blocks() {
        let (map, objects, ids) = world_with(&[(WALL, IVec3::new(1000, 1000, 0))]);
        let shapes = shapes();
        let info = map.position_info(&objects, &shapes, IVec3::new(1010, 1000, 0), None, mover_dims(), ShapeFlags::SOLID, 0);
        assert!(!info.valid);
        assert_eq!(info.blocker, ids[0]);
        // sharing a face is fine
        let beside = IVec3::new(1032, 1000, 0);
        assert!(map.is_valid_position(&objects, &shapes, beside, None, mover_dims(), ShapeFlags::SOLID, 0));
        // a non-solid mover passes through
        assert!(map.is_valid_position(&objects, &shapes, IVec3::new(1010, 1000, 0), None, mover_dims(), ShapeFlags::empty(), 0));
    }

    #[test]
    fn overlap_present_at_start_is_grandfathered() {
        let (map, objects, _) = world_with(&[(WALL, IVec3::new(1000, 1000, 0))]);
        let shapes = shapes();
        let stuck = IVec3::new(1010, 1000, 0);
        let nudged = IVec3::new(1012, 1000, 0);
        assert!(map.is_valid_position(&objects, &shapes, nudged, Some(stuck), mover_dims(), ShapeFlags::SOLID, 0));
        assert!(!map.is_valid_position(&objects, &shapes, nudged, None, mover_dims(), ShapeFlags::SOLID, 0));
    }

    #[test]
    fn support_and_roof_are_reported() {
        let (map, objects, ids) = world_with(&[
            (FLOOR, IVec3::new(2048, 2048, 0)),
            (CEILING, IVec3::new(2048, 2048, 100)),
        ]);
        let info = map.position_info(&objects, &shapes(), IVec3::new(2000, 2000, 8), None, mover_dims(), ShapeFlags::SOLID, 0);
        assert!(info.valid);
        assert_eq!(info.support, ids[0]);
        assert_eq!(info.roof, ids[1]);
    }

    #[test]
    fn scan_prefers_supported_spot() {
        let (mut map, mut objects, _) = world_with(&[(FLOOR, IVec3::new(2048, 2048, 0))]);
        let mover = objects.assign_object_id(Item::new(MOVER, 0).at(IVec3::new(2000, 2000, 20)));
        map.add_item(&mut objects, mover);
        let shapes = shapes();
        let found = map
            .scan_for_valid_position(&objects, &shapes, IVec3::new(2000, 2000, 5), mover, Direction::North, true)
            .unwrap();
        assert_eq!(found, IVec3::new(2000, 2000, 8));

        // far from any floor nothing is supported
        let nowhere = IVec3::new(9000, 9000, 50);
        assert_eq!(
            map.scan_for_valid_position(&objects, &shapes, nowhere, mover, Direction::North, true),
            None
        );
        assert_eq!(
            map.scan_for_valid_position(&objects, &shapes, nowhere, mover, Direction::North, false),
            Some(nowhere)
        );
    }

    #[test]
    fn sweep_hits_wall_at_contact_time() {
        let (map, objects, ids) = world_with(&[(WALL, IVec3::new(1100, 1064, 0))]);
        let shapes = shapes();
        let start = IVec3::new(1000, 1000, 0);
        let end = IVec3::new(1200, 1000, 0);
        let hits = map.sweep_test(&objects, &shapes, start, end, mover_dims(), ShapeFlags::SOLID, 0, false);
        assert_eq!(hits.len(), 1);
        let hit = hits[0];
        assert_eq!(hit.item, ids[0]);
        assert!(hit.blocking);
        assert!(!hit.touching);
        assert_eq!(hit.dirs, 0b001);
        // wall spans x 1068..1100, our right face starts at 1000
        assert_eq!(hit.hit_time, (68 * SWEEP_END) / 200);
        assert_eq!(hit.interpolated(start, end), IVec3::new(1068, 1000, 0));
    }

    #[test]
    fn sweep_results_are_time_ordered() {
        let (map, objects, ids) = world_with(&[
            (WALL, IVec3::new(1400, 1064, 0)),
            (WALL, IVec3::new(1100, 1064, 0)),
            (DECOR, IVec3::new(1250, 1000, 0)),
        ]);
        let hits = map.sweep_test(&objects, &shapes(), IVec3::new(1000, 1000, 0), IVec3::new(1500, 1000, 0), mover_dims(), ShapeFlags::SOLID, 0, false);
        let order: Vec<ObjId> = hits.iter().map(|h| h.item).collect();
        assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
        assert!(!hits[1].blocking);
        assert!(hits.windows(2).all(|w| w[0].hit_time <= w[1].hit_time));
    }

    #[test]
    fn zero_displacement_reports_only_existing_contacts() {
        let (map, objects, ids) = world_with(&[
            (FLOOR, IVec3::new(2048, 2048, 0)),
            (WALL, IVec3::new(2010, 2010, 8)),
            (WALL, IVec3::new(2500, 2100, 8)),
        ]);
        let pos = IVec3::new(2000, 2000, 8);
        let hits = map.sweep_test(&objects, &shapes(), pos, pos, mover_dims(), ShapeFlags::SOLID, 0, false);
        // resting on the floor is a touch; the wall at 2010 overlaps our
        // interior and is excluded; the far wall is never reached.
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item, ids[0]);
        assert!(hits[0].touching);
        assert!(hits[0].touching_floor);
        assert!(hits.iter().all(|h| h.hit_time < 0));
    }

    #[test]
    fn sweep_out_of_overlap_is_ignored() {
        let (map, objects, _) = world_with(&[(WALL, IVec3::new(1000, 1064, 0))]);
        let hits = map.sweep_test(&objects, &shapes(), IVec3::new(990, 1000, 0), IVec3::new(900, 1000, 0), mover_dims(), ShapeFlags::SOLID, 0, false);
        assert!(hits.is_empty());
    }

    #[test]
    fn blocking_only_stops_at_first_blocker() {
        let (map, objects, _) = world_with(&[
            (DECOR, IVec3::new(1050, 1000, 0)),
            (WALL, IVec3::new(1100, 1064, 0)),
        ]);
        let shapes = shapes();
        let start = IVec3::new(1000, 1000, 0);
        let end = IVec3::new(1200, 1000, 0);
        let hits = map.sweep_test(&objects, &shapes, start, end, mover_dims(), ShapeFlags::SOLID, 0, true);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].blocking);
        assert!(map.sweep_blocked(&objects, &shapes, start, end, mover_dims(), ShapeFlags::SOLID, 0));
        let clear_end = IVec3::new(1000, 900, 0);
        assert!(!map.sweep_blocked(&objects, &shapes, start, clear_end, mover_dims(), ShapeFlags::SOLID, 0));
    }

    #[test]
    fn blocking_only_skips_the_floor_underfoot() {
        // wall first, so the floor sits ahead of it in the chunk lists
        let (map, objects, ids) = world_with(&[
            (WALL, IVec3::new(1100, 1064, 8)),
            (FLOOR, IVec3::new(1200, 1100, 0)),
        ]);
        let shapes = shapes();
        let start = IVec3::new(1000, 1000, 8);
        let end = IVec3::new(1200, 1000, 8);

        let all = map.sweep_test(&objects, &shapes, start, end, mover_dims(), ShapeFlags::SOLID, 0, false);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].item, ids[1]);
        assert!(all[0].touching_floor);

        let blocking = map.sweep_test(&objects, &shapes, start, end, mover_dims(), ShapeFlags::SOLID, 0, true);
        assert_eq!(blocking.len(), 1);
        assert_eq!(blocking[0].item, ids[0]);
        assert!(!blocking[0].touching);
        assert_eq!(blocking[0].hit_time, (68 * SWEEP_END) / 200);
        assert!(map.sweep_blocked(&objects, &shapes, start, end, mover_dims(), ShapeFlags::SOLID, 0));
    }

    #[test]
    fn blocking_only_returns_the_earliest_blocker() {
        let (map, objects, ids) = world_with(&[
            (WALL, IVec3::new(1100, 1064, 0)),
            (WALL, IVec3::new(1400, 1064, 0)),
        ]);
        let hits = map.sweep_test(&objects, &shapes(), IVec3::new(1000, 1000, 0), IVec3::new(1500, 1000, 0), mover_dims(), ShapeFlags::SOLID, 0, true);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item, ids[0]);
    }
}
