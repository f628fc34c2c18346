//! Loopscript-filtered item queries over the current map.

use pentacle_common::{ObjId, Point3, Rect};

use crate::current_map::CurrentMap;
use crate::item::ExtFlags;
use crate::loopscript::LoopScript;
use crate::objects::ObjectManager;
use crate::shape::ShapeTable;

/// Centre of an area search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOrigin {
    /// The footpad of an item, at its absolute location.
    Item(ObjId),
    Point { x: i32, y: i32 },
}

fn push_unique(out: &mut Vec<ObjId>, id: ObjId) {
    if !out.contains(&id) {
        out.push(id);
    }
}

/// Append matching contents of `container` to `out`, descending into nested
/// containers when `recurse` is set.
pub fn container_search(
    objects: &ObjectManager,
    shapes: &ShapeTable,
    script: &LoopScript,
    container: ObjId,
    recurse: bool,
    out: &mut Vec<ObjId>,
) {
    let Some(item) = objects.get(container) else {
        return;
    };
    for &id in &item.contents {
        let Some(child) = objects.get(id) else {
            continue;
        };
        if script.matches(child, shapes) {
            push_unique(out, id);
        }
        if recurse && child.is_container() {
            container_search(objects, shapes, script, id, recurse, out);
        }
    }
}

impl CurrentMap {
    /// Items whose footpad rectangle intersects the origin's footpad grown by
    /// `range` on every side and that satisfy `script`.
    ///
    /// Sprites are skipped. Results are unique and in chunk order.
    pub fn area_search(
        &self,
        objects: &ObjectManager,
        shapes: &ShapeTable,
        script: &LoopScript,
        origin: SearchOrigin,
        range: i32,
        recurse: bool,
    ) -> Vec<ObjId> {
        let (x, y, xd, yd) = match origin {
            SearchOrigin::Item(id) => {
                let Some(item) = objects.get(id) else {
                    return Vec::new();
                };
                let Some(loc) = objects.location_absolute(id) else {
                    return Vec::new();
                };
                let d = item.footpad_world(shapes);
                (loc.x, loc.y, d.x, d.y)
            }
            SearchOrigin::Point { x, y } => (x, y, 0, 0),
        };
        let range_rect = Rect::new(x - xd - range, y - yd - range, x + range, y + range);

        let mut out = Vec::new();
        for id in self.items_near(x - xd - range, y - yd - range, x + range, y + range) {
            let Some(item) = objects.get(id) else {
                continue;
            };
            if item.ext_flags.contains(ExtFlags::SPRITE) {
                continue;
            }
            let d = item.footpad_world(shapes);
            let item_rect = Rect::new(item.pos.x - d.x, item.pos.y - d.y, item.pos.x, item.pos.y);
            if !item_rect.intersects(&range_rect) {
                continue;
            }
            if script.matches(item, shapes) {
                push_unique(&mut out, id);
            }
            if recurse && item.is_container() {
                container_search(objects, shapes, script, id, true, &mut out);
            }
        }
        out
    }

    /// Items resting directly on top of `check` (`above`) or directly under
    /// it (`below`) that satisfy `script`.
    ///
    /// With `recurse`, stacks are followed: whatever rests on a found item is
    /// searched too, unless the found item is flat with respect to `check`.
    #[allow(clippy::too_many_arguments)]
    pub fn surface_search(
        &self,
        objects: &ObjectManager,
        shapes: &ShapeTable,
        script: &LoopScript,
        check: ObjId,
        above: bool,
        below: bool,
        recurse: bool,
    ) -> Vec<ObjId> {
        let mut out = Vec::new();
        self.surface_search_into(objects, shapes, script, check, above, below, recurse, &mut out);
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn surface_search_into(
        &self,
        objects: &ObjectManager,
        shapes: &ShapeTable,
        script: &LoopScript,
        check: ObjId,
        above: bool,
        below: bool,
        recurse: bool,
        out: &mut Vec<ObjId>,
    ) {
        let (Some(item), Some(origin)) = (objects.get(check), objects.location_absolute(check))
        else {
            return;
        };
        let dims = item.footpad_world(shapes);
        self.surface_search_at(
            objects, shapes, script, check, origin, dims, above, below, recurse, out,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn surface_search_at(
        &self,
        objects: &ObjectManager,
        shapes: &ShapeTable,
        script: &LoopScript,
        check: ObjId,
        origin: Point3,
        dims: Point3,
        above: bool,
        below: bool,
        recurse: bool,
        out: &mut Vec<ObjId>,
    ) {
        let range_rect = Rect::new(origin.x - dims.x, origin.y - dims.y, origin.x, origin.y);
        let top = origin.z + dims.z;

        for id in self.items_near(origin.x - dims.x, origin.y - dims.y, origin.x, origin.y) {
            if id == check {
                continue;
            }
            let Some(item) = objects.get(id) else {
                continue;
            };
            if item.ext_flags.contains(ExtFlags::SPRITE) {
                continue;
            }
            let d = item.footpad_world(shapes);
            let p = item.pos;
            let item_rect = Rect::new(p.x - d.x, p.y - d.y, p.x, p.y);
            if !item_rect.intersects(&range_rect) {
                continue;
            }

            let mut hit = false;
            if above && p.z == top {
                hit = true;
                if recurse && p.z + d.z != top {
                    self.surface_search_into(objects, shapes, script, id, true, false, true, out);
                }
            }
            if below && origin.z == p.z + d.z {
                hit = true;
                if recurse && d.z != dims.z {
                    self.surface_search_into(objects, shapes, script, id, false, true, true, out);
                }
            }
            if hit && script.matches(item, shapes) {
                push_unique(out, id);
            }
        }
    }

    /// The destination teleport egg with `teleport_id` on this map.
    pub fn find_destination(
        &self,
        objects: &ObjectManager,
        shapes: &ShapeTable,
        teleport_id: u8,
    ) -> Option<ObjId> {
        for cx in 0..self.map_chunks() {
            for cy in 0..self.map_chunks() {
                let found = self.chunk_items(cx, cy).find(|id| {
                    objects.get(*id).is_some_and(|egg| {
                        egg.is_teleport_egg(shapes)
                            && !egg.is_teleporter()
                            && egg.teleport_id() == teleport_id
                    })
                });
                if found.is_some() {
                    return found;
                }
            }
        }
        None
    }
}
