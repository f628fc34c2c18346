use std::collections::VecDeque;

use pentacle_common::{ObjId, Point3, ProcId, Rect};
use serde::{Deserialize, Serialize};

use crate::config::{MAX_MAP_CHUNKS, WorldConfig};
use crate::item::ExtFlags;
use crate::objects::ObjectManager;
use crate::WorldError;

/// Chunk coordinates `(cx, cy)`.
pub type ChunkCoord = (i32, i32);

/// Chunks whose fast bit changed in one fast-area update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastAreaDelta {
    pub entered: Vec<ChunkCoord>,
    pub left: Vec<ChunkCoord>,
}

impl FastAreaDelta {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }
}

/// Spatial index of the map that is currently loaded.
///
/// World space is split into `map_chunks * map_chunks` square chunks of
/// `chunk_size` units. Every item on the map sits in exactly one chunk list,
/// the one its location falls in. Each chunk also carries a "fast" bit: items
/// in fast chunks are simulated, the rest are dormant.
#[derive(Debug, Clone)]
pub struct CurrentMap {
    map_num: u32,
    chunk_size: i32,
    map_chunks: i32,
    viewport: (i32, i32),
    chunks: Vec<VecDeque<ObjId>>,
    fast: Vec<u32>,
    /// Screen-space rectangle used by the last fast-area update.
    fast_rect: Option<Rect>,
    egg_hatcher: ProcId,
}

impl CurrentMap {
    pub fn new(config: &WorldConfig) -> Self {
        let map_chunks = config.map_chunks.clamp(1, MAX_MAP_CHUNKS);
        let cells = map_chunks as usize * map_chunks as usize;
        Self {
            map_num: 0,
            chunk_size: config.chunk_size().max(1),
            map_chunks,
            viewport: (config.viewport_width, config.viewport_height),
            chunks: vec![VecDeque::new(); cells],
            fast: vec![0; cells.div_ceil(32)],
            fast_rect: None,
            egg_hatcher: 0,
        }
    }

    pub fn map_num(&self) -> u32 {
        self.map_num
    }

    pub(crate) fn set_map_num(&mut self, map_num: u32) {
        self.map_num = map_num;
    }

    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    pub fn map_chunks(&self) -> i32 {
        self.map_chunks
    }

    pub fn egg_hatcher(&self) -> ProcId {
        self.egg_hatcher
    }

    pub(crate) fn set_egg_hatcher(&mut self, pid: ProcId) {
        self.egg_hatcher = pid;
    }

    /// Chunk containing world position `(x, y)`, or `None` off the map.
    pub fn chunk_at(&self, x: i32, y: i32) -> Option<ChunkCoord> {
        let extent = self.chunk_size * self.map_chunks;
        if x < 0 || y < 0 || x >= extent || y >= extent {
            return None;
        }
        Some((x / self.chunk_size, y / self.chunk_size))
    }

    fn index(&self, cx: i32, cy: i32) -> Option<usize> {
        let n = self.map_chunks;
        (cx >= 0 && cy >= 0 && cx < n && cy < n).then(|| (cy * n + cx) as usize)
    }

    /// Items in one chunk, front to back.
    pub fn chunk_items(&self, cx: i32, cy: i32) -> impl Iterator<Item = ObjId> + '_ {
        self.index(cx, cy)
            .and_then(|i| self.chunks.get(i))
            .into_iter()
            .flatten()
            .copied()
    }

    /// Items in every chunk of the inclusive chunk rectangle, clipped to the map.
    pub(crate) fn items_in_chunks(&self, cx0: i32, cy0: i32, cx1: i32, cy1: i32) -> Vec<ObjId> {
        let last = self.map_chunks - 1;
        let mut out = Vec::new();
        for cy in cy0.max(0)..=cy1.min(last) {
            for cx in cx0.max(0)..=cx1.min(last) {
                out.extend(self.chunk_items(cx, cy));
            }
        }
        out
    }

    /// Candidate items near the world-space xy box `[x0, x1] x [y0, y1]`,
    /// padded by one chunk on every side.
    pub(crate) fn items_near(&self, x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<ObjId> {
        let cs = self.chunk_size;
        self.items_in_chunks(
            x0.div_euclid(cs) - 1,
            y0.div_euclid(cs) - 1,
            x1.div_euclid(cs) + 1,
            y1.div_euclid(cs) + 1,
        )
    }

    /// Chunk whose list holds `id`, found by scanning.
    pub fn find_chunk_of(&self, id: ObjId) -> Option<ChunkCoord> {
        let n = self.map_chunks;
        self.chunks
            .iter()
            .position(|list| list.contains(&id))
            .map(|i| (i as i32 % n, i as i32 / n))
    }

    pub fn item_count(&self) -> usize {
        self.chunks.iter().map(VecDeque::len).sum()
    }

    /// Put an item at the front of its chunk list.
    pub fn add_item(&mut self, objects: &mut ObjectManager, id: ObjId) -> bool {
        self.insert(objects, id, false)
    }

    /// Put an item at the back of its chunk list.
    pub fn add_item_to_end(&mut self, objects: &mut ObjectManager, id: ObjId) -> bool {
        self.insert(objects, id, true)
    }

    fn insert(&mut self, objects: &mut ObjectManager, id: ObjId, at_end: bool) -> bool {
        let Some(item) = objects.get_mut(id) else {
            tracing::warn!(id, "adding a missing object to the map");
            return false;
        };
        let Some((cx, cy)) = self.chunk_at(item.pos.x, item.pos.y) else {
            tracing::warn!(
                id,
                x = item.pos.x,
                y = item.pos.y,
                "item position out of map range, skipping"
            );
            return false;
        };
        let Some(idx) = self.index(cx, cy) else {
            return false;
        };
        if item.ext_flags.contains(ExtFlags::IN_CURMAP) {
            tracing::warn!(id, "item is already on the map");
            return false;
        }
        item.ext_flags.insert(ExtFlags::IN_CURMAP);
        let list = &mut self.chunks[idx];
        if at_end {
            list.push_back(id);
        } else {
            list.push_front(id);
        }
        true
    }

    /// Take an item out of its chunk list and clear `IN_CURMAP`.
    pub fn remove_item(&mut self, objects: &mut ObjectManager, id: ObjId) -> bool {
        let Some(item) = objects.get_mut(id) else {
            return false;
        };
        item.ext_flags.remove(ExtFlags::IN_CURMAP);
        let pos = item.pos;
        self.remove_item_from_list(id, pos)
    }

    /// Unlink `id` from the chunk list for `pos`, falling back to a full scan.
    pub(crate) fn remove_item_from_list(&mut self, id: ObjId, pos: Point3) -> bool {
        let idx = self
            .chunk_at(pos.x, pos.y)
            .and_then(|(cx, cy)| self.index(cx, cy));
        if let Some(idx) = idx {
            let list = &mut self.chunks[idx];
            if let Some(at) = list.iter().position(|o| *o == id) {
                list.remove(at);
                return true;
            }
        }
        for list in &mut self.chunks {
            if let Some(at) = list.iter().position(|o| *o == id) {
                tracing::warn!(id, "item was filed under the wrong chunk");
                list.remove(at);
                return true;
            }
        }
        false
    }

    /// Every item id on the map, chunk by chunk.
    pub fn all_items(&self) -> Vec<ObjId> {
        self.chunks.iter().flatten().copied().collect()
    }

    /// Forget all items and fast state. The caller owns the items themselves.
    pub(crate) fn clear(&mut self) {
        for list in &mut self.chunks {
            list.clear();
        }
        self.fast.iter_mut().for_each(|w| *w = 0);
        self.fast_rect = None;
        self.egg_hatcher = 0;
    }

    pub fn is_chunk_fast(&self, cx: i32, cy: i32) -> bool {
        self.index(cx, cy)
            .is_some_and(|i| self.fast[i / 32] & (1 << (i % 32)) != 0)
    }

    /// Whether the chunk containing world position `(x, y)` is fast.
    pub fn is_fast_at(&self, x: i32, y: i32) -> bool {
        self.chunk_at(x, y)
            .is_some_and(|(cx, cy)| self.is_chunk_fast(cx, cy))
    }

    fn set_chunk_fast(&mut self, cx: i32, cy: i32, fast: bool) {
        if let Some(i) = self.index(cx, cy) {
            if fast {
                self.fast[i / 32] |= 1 << (i % 32);
            } else {
                self.fast[i / 32] &= !(1 << (i % 32));
            }
        }
    }

    pub fn fast_chunk_count(&self) -> usize {
        self.fast.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Mark every chunk fast; returns the chunks that were slow before.
    pub fn set_whole_map_fast(&mut self) -> Vec<ChunkCoord> {
        let mut entered = Vec::new();
        for cy in 0..self.map_chunks {
            for cx in 0..self.map_chunks {
                if !self.is_chunk_fast(cx, cy) {
                    self.set_chunk_fast(cx, cy, true);
                    entered.push((cx, cy));
                }
            }
        }
        self.fast_rect = None;
        entered
    }

    pub fn fast_rect(&self) -> Option<Rect> {
        self.fast_rect
    }

    /// Screen-space rectangle covering the box swept between `from` and `to`,
    /// padded by half the viewport plus a quarter chunk horizontally and an
    /// eighth of a chunk vertically.
    pub fn fast_screen_rect(&self, from: Point3, to: Point3) -> Rect {
        let min = from.min(to);
        let max = from.max(to);
        let (w, h) = self.viewport;
        let pad_x = w / 2 + self.chunk_size / 4;
        let pad_y = h / 2 + self.chunk_size / 8;
        Rect::new(
            (min.x - min.y) / 4 - pad_x,
            (min.x + min.y) / 8 - max.z - pad_y,
            (max.x - max.y) / 4 + pad_x,
            (max.x + max.y) / 8 - min.z + pad_y,
        )
    }

    /// Screen-space footprint of a chunk, extended upwards for tall items.
    fn chunk_screen_rect(&self, cx: i32, cy: i32) -> Rect {
        let cs = self.chunk_size;
        let (x0, y0) = (cx * cs, cy * cs);
        let (x1, y1) = (x0 + cs, y0 + cs);
        Rect::new((x0 - y1) / 4, (x0 + y0) / 8 - 256, (x1 - y0) / 4, (x1 + y1) / 8)
    }

    /// Recompute which chunks are fast for a view swept from `from` to `to`.
    ///
    /// Does nothing when the padded screen rectangle is unchanged. The returned
    /// delta lists the chunks whose items must enter or leave the fast area.
    pub fn update_fast_area(&mut self, from: Point3, to: Point3) -> FastAreaDelta {
        let rect = self.fast_screen_rect(from, to);
        if self.fast_rect == Some(rect) {
            return FastAreaDelta::default();
        }
        self.fast_rect = Some(rect);

        let mut delta = FastAreaDelta::default();
        for cy in 0..self.map_chunks {
            for cx in 0..self.map_chunks {
                let c = self.chunk_screen_rect(cx, cy);
                let want = !(c.right < rect.left
                    || c.left > rect.right
                    || c.bottom < rect.top
                    || c.top > rect.bottom);
                let is = self.is_chunk_fast(cx, cy);
                if want && !is {
                    self.set_chunk_fast(cx, cy, true);
                    delta.entered.push((cx, cy));
                } else if !want && is {
                    self.set_chunk_fast(cx, cy, false);
                    delta.left.push((cx, cy));
                }
            }
        }
        if !delta.is_empty() {
            tracing::debug!(
                entered = delta.entered.len(),
                left = delta.left.len(),
                "fast area changed"
            );
        }
        delta
    }

    pub fn save_state(&self) -> CurrentMapState {
        CurrentMapState {
            map_num: self.map_num,
            chunk_size: self.chunk_size,
            map_chunks: self.map_chunks,
            fast: self.fast.clone(),
            chunks: self
                .chunks
                .iter()
                .enumerate()
                .filter(|(_, list)| !list.is_empty())
                .map(|(i, list)| (i as u32, list.iter().copied().collect()))
                .collect(),
            fast_rect: self.fast_rect,
            egg_hatcher: self.egg_hatcher,
        }
    }

    /// Restore from saved state. The grid geometry must match `config`.
    pub fn from_state(config: &WorldConfig, state: CurrentMapState) -> Result<Self, WorldError> {
        let mut map = Self::new(config);
        if state.chunk_size != map.chunk_size || state.map_chunks != map.map_chunks {
            return Err(WorldError::Inconsistent(format!(
                "saved map grid {}x{} of {} does not match configured {}x{} of {}",
                state.map_chunks,
                state.map_chunks,
                state.chunk_size,
                map.map_chunks,
                map.map_chunks,
                map.chunk_size
            )));
        }
        if state.fast.len() != map.fast.len() {
            return Err(WorldError::Inconsistent("fast bitmask size".into()));
        }
        for (idx, list) in state.chunks {
            let slot = map
                .chunks
                .get_mut(idx as usize)
                .ok_or_else(|| WorldError::Inconsistent(format!("chunk index {idx}")))?;
            *slot = list.into();
        }
        map.map_num = state.map_num;
        map.fast = state.fast;
        map.fast_rect = state.fast_rect;
        map.egg_hatcher = state.egg_hatcher;
        Ok(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentMapState {
    pub map_num: u32,
    pub chunk_size: i32,
    pub map_chunks: i32,
    pub fast: Vec<u32>,
    /// Non-empty chunk lists keyed by row-major chunk index.
    pub chunks: Vec<(u32, Vec<ObjId>)>,
    pub fast_rect: Option<Rect>,
    pub egg_hatcher: ProcId,
}
