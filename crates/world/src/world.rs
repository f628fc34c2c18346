use std::collections::BTreeMap;
use std::fmt;

use pentacle_common::{ObjId, Point3};
use pentacle_kernel::{
    DelayProcess, Kernel, KernelHost, KernelState, PROC_TYPE_ALL, ProcessCore, ProcessRegistry,
};
use serde::{Deserialize, Serialize};

use crate::collision::SWEEP_END;
use crate::config::{GameVariant, WorldConfig};
use crate::current_map::{CurrentMap, CurrentMapState};
use crate::egg::{
    EGG_HATCHER_PROCESS_TYPE, EggHatcherProcess, TELEPORT_PROCESS_TYPE, TeleportToEggProcess,
};
use crate::item::{ExtFlags, Item, ItemFlags};
use crate::loopscript::LoopScript;
use crate::objects::{LAST_ACTOR_ID, MAIN_ACTOR_ID, ObjectManager, ObjectsState};
use crate::search::SearchOrigin;
use crate::shape::ShapeTable;
use crate::usecode::{EventLog, Globals, ListsState, StringsState, UsecodeEvent, UsecodeHeap};
use crate::WorldError;

/// An item stored in a map that is not loaded, with its container contents.
///
/// Stored items have no object id; one is assigned when the map loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapItem {
    pub item: Item,
    pub contents: Vec<MapItem>,
}

impl MapItem {
    pub fn new(item: Item) -> Self {
        Self {
            item,
            contents: Vec::new(),
        }
    }

    pub fn with_contents(mut self, contents: Vec<MapItem>) -> Self {
        self.contents = contents;
        self
    }
}

/// The stored items of one map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Map {
    pub num: u32,
    pub items: Vec<MapItem>,
}

impl Map {
    pub fn new(num: u32) -> Self {
        Self {
            num,
            items: Vec::new(),
        }
    }
}

/// Result of [`World::collide_move`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollideOutcome {
    /// How far the move got, `0..=SWEEP_END`.
    pub hit: i32,
    /// The item that stopped the move, if any.
    pub hit_item: ObjId,
    pub dirs: u8,
}

impl CollideOutcome {
    pub fn completed(&self) -> bool {
        self.hit == SWEEP_END
    }
}

/// Global state outside the object arena that a savegame must restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    pub game: GameVariant,
    pub ethereal: Vec<ObjId>,
    pub camera: ObjId,
    pub camera_pos: Option<Point3>,
}

/// Everything needed to rebuild a [`World`], split the way savegames store it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub kernel: KernelState,
    pub world: WorldState,
    pub objects: ObjectsState,
    pub maps: Vec<Map>,
    pub current_map: CurrentMapState,
    pub strings: StringsState,
    pub globals: Globals,
    pub lists: ListsState,
}

/// The simulation: every piece of state a tick can touch, passed explicitly.
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) shapes: ShapeTable,
    pub(crate) kernel: Kernel<World>,
    pub(crate) objects: ObjectManager,
    pub(crate) maps: BTreeMap<u32, Map>,
    pub(crate) current_map: CurrentMap,
    /// Items held outside the world; the last entry is the top.
    pub(crate) ethereal: Vec<ObjId>,
    pub(crate) heap: UsecodeHeap,
    pub(crate) events: EventLog,
    pub(crate) camera: ObjId,
    camera_pos: Option<Point3>,
}

impl KernelHost for World {
    fn kernel(&self) -> &Kernel<Self> {
        &self.kernel
    }

    fn kernel_mut(&mut self) -> &mut Kernel<Self> {
        &mut self.kernel
    }
}

impl World {
    /// An empty world with no map loaded (map 0).
    pub fn new(config: WorldConfig, shapes: ShapeTable) -> Self {
        let current_map = CurrentMap::new(&config);
        let heap = UsecodeHeap::new(config.game);
        Self {
            config,
            shapes,
            kernel: Kernel::new(),
            objects: ObjectManager::new(),
            maps: BTreeMap::new(),
            current_map,
            ethereal: Vec::new(),
            heap,
            events: EventLog::default(),
            camera: 0,
            camera_pos: None,
        }
    }

    /// Loaders for every process class the world can save.
    pub fn process_registry() -> ProcessRegistry<World> {
        let mut registry = ProcessRegistry::new();
        registry.register_serde::<EggHatcherProcess>(EggHatcherProcess::CLASS);
        registry.register_serde::<TeleportToEggProcess>(TeleportToEggProcess::CLASS);
        registry.register_serde::<DelayProcess>(DelayProcess::CLASS);
        registry
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn shapes(&self) -> &ShapeTable {
        &self.shapes
    }

    pub fn objects(&self) -> &ObjectManager {
        &self.objects
    }

    pub fn current_map(&self) -> &CurrentMap {
        &self.current_map
    }

    pub fn heap(&self) -> &UsecodeHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut UsecodeHeap {
        &mut self.heap
    }

    pub fn camera(&self) -> ObjId {
        self.camera
    }

    pub fn ethereal_top(&self) -> ObjId {
        self.ethereal.last().copied().unwrap_or(0)
    }

    pub fn map(&self, num: u32) -> Option<&Map> {
        self.maps.get(&num)
    }

    /// Create an empty stored map if it does not exist yet.
    pub fn add_map(&mut self, num: u32) -> &mut Map {
        self.maps.entry(num).or_insert_with(|| Map::new(num))
    }

    /// Store an item in a map. If that map is loaded the item appears at once.
    pub fn add_map_item(&mut self, map: u32, item: MapItem) -> Result<ObjId, WorldError> {
        if map != 0 && map == self.current_map.map_num() {
            let id = self.adopt(item, 0);
            if id == 0 {
                return Err(WorldError::IdSpaceExhausted);
            }
            self.add_to_map(id, true);
            if self.is_item_in_fast_chunk(id) {
                self.enter_fast_area(id);
            }
            return Ok(id);
        }
        self.maps
            .get_mut(&map)
            .ok_or(WorldError::NoSuchMap(map))?
            .items
            .push(item);
        Ok(0)
    }

    /// Create an item on the current map at its location.
    pub fn spawn_item(&mut self, mut item: Item) -> Result<ObjId, WorldError> {
        item.flags
            .remove(ItemFlags::CONTAINED | ItemFlags::EQUIPPED | ItemFlags::ETHEREAL | ItemFlags::FASTAREA);
        item.ext_flags.remove(ExtFlags::IN_CURMAP);
        item.parent = 0;
        let at_end = item
            .flags
            .intersects(ItemFlags::DISPOSABLE | ItemFlags::FAST_ONLY);
        let id = self.objects.assign_object_id(item);
        if id == 0 {
            return Err(WorldError::IdSpaceExhausted);
        }
        self.add_to_map(id, at_end);
        if self.is_item_in_fast_chunk(id) {
            self.enter_fast_area(id);
        }
        Ok(id)
    }

    /// Register an NPC under its fixed number. It joins the current map if
    /// its `map_num` matches.
    pub fn spawn_npc(&mut self, id: ObjId, mut item: Item) -> Result<(), WorldError> {
        if !item.is_actor() || id == 0 || id > LAST_ACTOR_ID {
            return Err(WorldError::Inconsistent(format!(
                "object {id} is not a valid NPC"
            )));
        }
        item.flags.insert(ItemFlags::IN_NPC_LIST);
        item.npc_num = id;
        let map_num = item.map_num as u32;
        self.objects.insert_with_id(id, item)?;
        if map_num != 0 && map_num == self.current_map.map_num() {
            self.add_to_map(id, false);
            if self.is_item_in_fast_chunk(id) {
                self.enter_fast_area(id);
            }
        }
        Ok(())
    }

    /// Register the avatar and point the camera at it.
    pub fn set_main_actor(&mut self, item: Item) -> Result<(), WorldError> {
        self.spawn_npc(MAIN_ACTOR_ID, item)?;
        self.set_camera(MAIN_ACTOR_ID);
        Ok(())
    }

    /// Follow `id` with the camera; 0 detaches it.
    pub fn set_camera(&mut self, id: ObjId) {
        if let Some(old) = self.objects.get_mut(self.camera) {
            old.ext_flags.remove(ExtFlags::CAMERA);
        }
        self.camera = 0;
        if let Some(item) = self.objects.get_mut(id) {
            item.ext_flags.insert(ExtFlags::CAMERA);
            self.camera = id;
        }
        self.camera_pos = None;
    }

    fn camera_moved(&mut self) {
        let Some(pos) = self.objects.location_absolute(self.camera) else {
            return;
        };
        let from = self.camera_pos.unwrap_or(pos);
        self.update_fast_area(from, pos);
        self.camera_pos = Some(pos);
    }

    fn is_item_in_fast_chunk(&self, id: ObjId) -> bool {
        self.objects
            .get(id)
            .is_some_and(|item| self.current_map.is_fast_at(item.pos.x, item.pos.y))
    }

    /// File an item in the current map and hand eggs to the hatcher.
    fn add_to_map(&mut self, id: ObjId, at_end: bool) -> bool {
        let added = if at_end {
            self.current_map.add_item_to_end(&mut self.objects, id)
        } else {
            self.current_map.add_item(&mut self.objects, id)
        };
        if added && self.objects.egg(id).is_some() {
            self.register_egg(id);
        }
        added
    }

    fn ethereal_remove(&mut self, id: ObjId) {
        self.ethereal.retain(|e| *e != id);
    }

    fn detach_from_parent(&mut self, id: ObjId, parent: ObjId) {
        if let Some(container) = self.objects.get_mut(parent) {
            container.contents.retain(|c| *c != id);
        }
    }

    fn set_flag_recursively(&mut self, id: ObjId, flag: ItemFlags) {
        let Some(item) = self.objects.get_mut(id) else {
            return;
        };
        item.flags.insert(flag);
        let contents = item.contents.clone();
        for child in contents {
            self.set_flag_recursively(child, flag);
        }
    }

    /// Move an item to a world location.
    ///
    /// Takes it out of the ethereal void or its container if needed, refiles
    /// it in the right chunk, raises `JustMoved`, and handles entering or
    /// leaving the fast area.
    pub fn move_item(&mut self, id: ObjId, to: Point3) -> Result<(), WorldError> {
        let item = self.objects.get(id).ok_or(WorldError::NoSuchObject(id))?;
        let flags = item.flags;
        let parent = item.parent;
        let old = item.pos;
        let in_curmap = item.ext_flags.contains(ExtFlags::IN_CURMAP);

        if id == MAIN_ACTOR_ID && to.z < 0 {
            tracing::warn!(x = to.x, y = to.y, z = to.z, "moving main actor below z=0");
        }
        if flags.contains(ItemFlags::ETHEREAL) {
            self.ethereal_remove(id);
        }

        let mut no_lerp = false;
        if flags.intersects(ItemFlags::CONTAINED | ItemFlags::EQUIPPED) {
            if parent != 0 {
                if !flags.contains(ItemFlags::ETHEREAL) {
                    self.detach_from_parent(id, parent);
                }
            } else {
                tracing::warn!(id, "contained item has no parent");
            }
            no_lerp = true;
        } else if in_curmap {
            let cs = self.current_map.chunk_size();
            let moved_chunk = old.x.div_euclid(cs) != to.x.div_euclid(cs)
                || old.y.div_euclid(cs) != to.y.div_euclid(cs);
            if moved_chunk {
                self.current_map.remove_item(&mut self.objects, id);
            }
        }

        let Some(item) = self.objects.get_mut(id) else {
            return Err(WorldError::NoSuchObject(id));
        };
        if flags.intersects(ItemFlags::CONTAINED | ItemFlags::EQUIPPED) {
            item.parent = 0;
        }
        item.flags
            .remove(ItemFlags::CONTAINED | ItemFlags::EQUIPPED | ItemFlags::ETHEREAL);
        item.pos = to;
        if !item.ext_flags.contains(ExtFlags::IN_CURMAP) {
            let at_end = item
                .flags
                .intersects(ItemFlags::DISPOSABLE | ItemFlags::FAST_ONLY);
            self.add_to_map(id, at_end);
        }

        self.events.push(UsecodeEvent::JustMoved { item: id });

        let dest_fast = self.current_map.is_fast_at(to.x, to.y);
        let Some(item) = self.objects.get_mut(id) else {
            return Ok(());
        };
        if no_lerp {
            item.ext_flags.insert(ExtFlags::LERP_NOPREV);
        }
        let in_fast = item.flags.contains(ItemFlags::FASTAREA);
        let is_camera = item.ext_flags.contains(ExtFlags::CAMERA);
        if !dest_fast && in_fast {
            item.ext_flags.insert(ExtFlags::LERP_NOPREV);
            if is_camera {
                self.camera_moved();
            } else {
                self.leave_fast_area(id);
            }
            return Ok(());
        }
        if dest_fast && !in_fast {
            item.ext_flags.insert(ExtFlags::LERP_NOPREV);
            self.enter_fast_area(id);
        }
        if is_camera {
            self.camera_moved();
        }
        Ok(())
    }

    /// Put an item into a container (or an actor's inventory).
    pub fn move_to_container(&mut self, id: ObjId, container: ObjId) -> Result<(), WorldError> {
        let target = self
            .objects
            .get(container)
            .ok_or(WorldError::NoSuchObject(container))?;
        if !target.is_container() {
            return Err(WorldError::NotAContainer(container));
        }
        let dest_fast = target.flags.contains(ItemFlags::GUMP_OPEN);
        let item = self.objects.get(id).ok_or(WorldError::NoSuchObject(id))?;
        let flags = item.flags;
        let parent = item.parent;

        let mut ethereal_same = false;
        if container == parent {
            if !flags.contains(ItemFlags::ETHEREAL) {
                return Ok(());
            }
            ethereal_same = true;
        }
        if self.objects.is_within(container, id) {
            return Err(WorldError::ContainerLoop {
                item: id,
                container,
            });
        }

        if flags.contains(ItemFlags::ETHEREAL) {
            self.ethereal_remove(id);
        }
        if flags.intersects(ItemFlags::CONTAINED | ItemFlags::EQUIPPED) {
            if parent != 0 {
                if !flags.contains(ItemFlags::ETHEREAL) {
                    self.detach_from_parent(id, parent);
                }
            } else {
                tracing::warn!(id, "contained item has no parent");
            }
        } else if self
            .objects
            .get(id)
            .is_some_and(|i| i.ext_flags.contains(ExtFlags::IN_CURMAP))
        {
            self.current_map.remove_item(&mut self.objects, id);
        }

        let Some(item) = self.objects.get_mut(id) else {
            return Err(WorldError::NoSuchObject(id));
        };
        item.flags
            .remove(ItemFlags::CONTAINED | ItemFlags::EQUIPPED | ItemFlags::ETHEREAL);
        if !ethereal_same {
            item.pos.x = 0;
            item.pos.y = 0;
        }
        item.pos.z = 0;
        item.parent = container;
        item.flags.insert(ItemFlags::CONTAINED);
        item.ext_flags.insert(ExtFlags::LERP_NOPREV);
        let in_fast = item.flags.contains(ItemFlags::FASTAREA);
        if let Some(target) = self.objects.get_mut(container) {
            target.contents.push(id);
        }

        if self.objects.root_container(id) == Some(MAIN_ACTOR_ID) {
            self.set_flag_recursively(id, ItemFlags::OWNED);
        }
        self.events.push(UsecodeEvent::JustMoved { item: id });

        if !dest_fast && in_fast {
            self.leave_fast_area(id);
        } else if dest_fast && !in_fast {
            self.enter_fast_area(id);
        }
        Ok(())
    }

    /// Park an item outside the world, keeping its flags and location.
    pub fn move_to_ethereal_void(&mut self, id: ObjId) -> Result<(), WorldError> {
        let item = self.objects.get(id).ok_or(WorldError::NoSuchObject(id))?;
        if item.flags.contains(ItemFlags::ETHEREAL) {
            return Ok(());
        }
        let flags = item.flags;
        let parent = item.parent;
        let in_curmap = item.ext_flags.contains(ExtFlags::IN_CURMAP);

        self.ethereal.push(id);
        if flags.intersects(ItemFlags::CONTAINED | ItemFlags::EQUIPPED) {
            if parent != 0 {
                self.detach_from_parent(id, parent);
            } else {
                tracing::warn!(id, "contained item has no parent");
            }
        } else if in_curmap {
            self.current_map.remove_item(&mut self.objects, id);
        }
        if let Some(item) = self.objects.get_mut(id) {
            item.flags.insert(ItemFlags::ETHEREAL);
        }
        Ok(())
    }

    /// Send an ethereal item back to its container, or to its world location.
    pub fn return_from_ethereal_void(&mut self, id: ObjId) -> Result<(), WorldError> {
        let item = self.objects.get(id).ok_or(WorldError::NoSuchObject(id))?;
        if !item.flags.contains(ItemFlags::ETHEREAL) {
            return Ok(());
        }
        if item
            .flags
            .intersects(ItemFlags::CONTAINED | ItemFlags::EQUIPPED)
        {
            let parent = item.parent;
            if parent == 0 {
                return Err(WorldError::Inconsistent(format!(
                    "contained item {id} has no parent"
                )));
            }
            self.move_to_container(id, parent)
        } else {
            let pos = item.pos;
            self.move_item(id, pos)
        }
    }

    /// Remove an item and its contents from the world for good, killing
    /// their processes.
    pub fn destroy_item(&mut self, id: ObjId) -> Result<(), WorldError> {
        let item = self.objects.get(id).ok_or(WorldError::NoSuchObject(id))?;
        let contents = item.contents.clone();
        for child in contents {
            self.destroy_item(child)?;
        }

        let Some(item) = self.objects.get(id) else {
            return Err(WorldError::NoSuchObject(id));
        };
        let flags = item.flags;
        let parent = item.parent;
        let pos = item.pos;
        let in_curmap = item.ext_flags.contains(ExtFlags::IN_CURMAP);
        let is_camera = item.ext_flags.contains(ExtFlags::CAMERA);

        if flags.contains(ItemFlags::ETHEREAL) {
            self.ethereal_remove(id);
        } else if parent != 0 {
            self.detach_from_parent(id, parent);
        } else if in_curmap {
            self.current_map.remove_item_from_list(id, pos);
        }
        if is_camera {
            self.camera = 0;
            self.camera_pos = None;
        }

        let killed = self.kernel.kill_processes(id, PROC_TYPE_ALL, true);
        self.objects.remove(id);
        tracing::trace!(id, killed, "item destroyed");
        Ok(())
    }

    /// Wake an item up: it is now simulated.
    pub fn enter_fast_area(&mut self, id: ObjId) {
        let crusader = self.config.game.is_crusader();
        let Some(item) = self.objects.get_mut(id) else {
            return;
        };
        if !item.flags.contains(ItemFlags::FASTAREA) && !item.is_dead() {
            if id != MAIN_ACTOR_ID {
                if let Some(actor) = item.actor_data_mut() {
                    if crusader {
                        let last = std::mem::take(&mut actor.last_activity);
                        actor.clear_in_combat();
                        actor.set_activity(last);
                    } else {
                        actor.clear_in_combat();
                    }
                }
            }
            self.events.push(UsecodeEvent::EnterFastArea { item: id });
        }
        item.flags.insert(ItemFlags::FASTAREA);
    }

    /// Put an item to sleep. Fast-only items that are not contained are
    /// destroyed; falling items land at z=0.
    pub fn leave_fast_area(&mut self, id: ObjId) {
        let Some(item) = self.objects.get_mut(id) else {
            return;
        };
        if id == MAIN_ACTOR_ID {
            tracing::debug!("main actor leaving fast area");
        }
        let noisy = self.shapes.get(item.shape).is_noisy();
        let fast_only = item.flags.contains(ItemFlags::FAST_ONLY);
        if (!fast_only || noisy) && item.flags.contains(ItemFlags::FASTAREA) {
            self.events.push(UsecodeEvent::LeaveFastArea { item: id });
        }
        item.flags.remove(ItemFlags::FASTAREA);
        let parent = item.parent;
        let gravity = item.gravity_pid;
        let pos = item.pos;

        if fast_only && parent == 0 {
            if let Err(err) = self.destroy_item(id) {
                tracing::warn!(id, %err, "could not destroy fast-only item");
            }
        } else if gravity != 0 && self.kernel.get_process(gravity).is_some() {
            self.kernel.terminate_deferred(gravity);
            item_gravity_reset(&mut self.objects, id);
            if let Err(err) = self.collide_move(id, Point3::new(pos.x, pos.y, 0), true, false) {
                tracing::warn!(id, %err, "could not drop item to the ground");
            }
        }
    }

    /// Move an item towards `target`, stopping at the first blocking item.
    ///
    /// With `teleport` (always for contained items) only the destination is
    /// checked. `force` moves through anything. Raises `Hit` on the mover,
    /// `GotHit` on what it ran into, and `Release` on both when contact ends.
    pub fn collide_move(
        &mut self,
        id: ObjId,
        target: Point3,
        teleport: bool,
        force: bool,
    ) -> Result<CollideOutcome, WorldError> {
        let item = self.objects.get(id).ok_or(WorldError::NoSuchObject(id))?;
        let parent = item.parent;
        let start = if parent == 0 { item.pos } else { target };
        let dims = item.footpad_world(&self.shapes);
        let shapeflags = item.shape_info(&self.shapes).flags;
        let sweep = self.current_map.sweep_test(
            &self.objects,
            &self.shapes,
            start,
            target,
            dims,
            shapeflags,
            id,
            false,
        );

        let dx = (start.x - target.x).abs() / 4;
        let dy = (start.y - target.y).abs() / 4;
        let dz = (start.z - target.z).abs();
        let force_of_hit = (dx + dy + dz + dx.max(dy).max(dz)) / 2;
        let crusader = self.config.game.is_crusader();

        if teleport || parent != 0 {
            if !force {
                if let Some(b) = sweep
                    .iter()
                    .find(|s| s.end_time == SWEEP_END && !s.touching && s.blocking)
                {
                    return Ok(CollideOutcome {
                        hit: 0,
                        hit_item: b.item,
                        dirs: b.dirs,
                    });
                }
            }

            let mut released = false;
            for s in &sweep {
                if !self.objects.contains(s.item) {
                    continue;
                }
                if parent == 0 && s.hit_time == 0 && s.end_time == SWEEP_END {
                    continue;
                } else if s.end_time == SWEEP_END {
                    self.raise_hit(id, s.item, force_of_hit);
                } else if parent == 0 && s.hit_time == 0 {
                    released = true;
                    self.events.push(UsecodeEvent::Release { item: s.item });
                }
            }
            if released {
                self.events.push(UsecodeEvent::Release { item: id });
            }
            self.move_item(id, target)?;
            return Ok(CollideOutcome {
                hit: SWEEP_END,
                ..CollideOutcome::default()
            });
        }

        let mut outcome = CollideOutcome {
            hit: SWEEP_END,
            ..CollideOutcome::default()
        };
        let mut end = target;
        if !force {
            if let Some(b) = sweep.iter().find(|s| s.blocking && !s.touching) {
                outcome.hit_item = b.item;
                outcome.dirs = b.dirs;
                outcome.hit = b.hit_time.max(0);
                if outcome.hit != SWEEP_END {
                    end = b.interpolated(start, target);
                }
            }
        }

        let mut released = false;
        for s in &sweep {
            if !self.objects.contains(s.item) {
                continue;
            }
            if s.hit_time > outcome.hit {
                break;
            }
            let call_hit = s.hit_time >= 0 || crusader;
            if (!s.touching || s.touching_floor) && call_hit {
                self.raise_hit(id, s.item, force_of_hit);
            }
            if s.end_time < outcome.hit {
                released = true;
                self.events.push(UsecodeEvent::Release { item: s.item });
            }
        }
        if released {
            self.events.push(UsecodeEvent::Release { item: id });
        }
        self.move_item(id, end)?;
        Ok(outcome)
    }

    fn raise_hit(&mut self, mover: ObjId, other: ObjId, force: i32) {
        self.events.push(UsecodeEvent::GotHit {
            item: other,
            by: mover,
            force,
        });
        self.events.push(UsecodeEvent::Hit {
            item: mover,
            other,
            force,
        });
    }

    /// Recompute the fast area for a view swept from `from` to `to` and wake
    /// or sleep the items of every chunk that changed.
    pub fn update_fast_area(&mut self, from: Point3, to: Point3) {
        let delta = self.current_map.update_fast_area(from, to);
        for (cx, cy) in delta.entered {
            let ids: Vec<ObjId> = self.current_map.chunk_items(cx, cy).collect();
            for id in ids {
                self.enter_fast_area(id);
            }
        }
        for (cx, cy) in delta.left {
            let ids: Vec<ObjId> = self.current_map.chunk_items(cx, cy).collect();
            for id in ids {
                self.leave_fast_area(id);
            }
        }
    }

    /// Make the whole map fast, waking every item on it.
    pub fn set_whole_map_fast(&mut self) {
        for (cx, cy) in self.current_map.set_whole_map_fast() {
            let ids: Vec<ObjId> = self.current_map.chunk_items(cx, cy).collect();
            for id in ids {
                self.enter_fast_area(id);
            }
        }
    }

    /// Unload the current map and load `num`. Persistent (type 1) processes
    /// and processes without an owner survive; everything else is killed.
    pub fn switch_map(&mut self, num: u32) -> Result<(), WorldError> {
        let old = self.current_map.map_num();
        if old == num {
            return Ok(());
        }
        if !self.maps.contains_key(&num) {
            return Err(WorldError::NoSuchMap(num));
        }
        tracing::info!(from = old, to = num, "switching map");

        self.kernel
            .kill_processes_not_of_type(0, TELEPORT_PROCESS_TYPE, true);
        while let Some(id) = self.ethereal.pop() {
            let ethereal = self
                .objects
                .get(id)
                .is_some_and(|i| i.flags.contains(ItemFlags::ETHEREAL));
            if ethereal {
                self.destroy_item(id)?;
            }
        }
        if old != 0 {
            self.write_back();
        }
        self.load_map(num);
        if self.objects.contains(MAIN_ACTOR_ID) {
            self.set_camera(MAIN_ACTOR_ID);
        }
        Ok(())
    }

    /// Move the current map's items back into storage.
    ///
    /// Disposable and fast-only items are destroyed, eggs are reset, NPCs stay
    /// in the object table, and the egg hatcher is terminated.
    fn write_back(&mut self) {
        let num = self.current_map.map_num();
        let mut stored = Vec::new();
        for id in self.current_map.all_items() {
            let Some(item) = self.objects.get_mut(id) else {
                continue;
            };
            item.ext_flags.remove(ExtFlags::IN_CURMAP);
            if item
                .flags
                .intersects(ItemFlags::FAST_ONLY | ItemFlags::DISPOSABLE)
            {
                if let Err(err) = self.destroy_item(id) {
                    tracing::warn!(id, %err, "could not destroy item on unload");
                }
                continue;
            }
            if let Some(egg) = item.egg_data_mut() {
                egg.hatched = false;
            }
            if item.flags.contains(ItemFlags::IN_NPC_LIST) {
                continue;
            }
            if let Some(stored_item) = self.take_map_item(id) {
                stored.push(stored_item);
            }
        }

        let hatcher = self.current_map.egg_hatcher();
        if hatcher != 0 {
            self.kernel.terminate(hatcher);
        }
        self.current_map.clear();
        tracing::debug!(map = num, items = stored.len(), "map written back");
        self.add_map(num).items.extend(stored);
    }

    /// Pull an item and its contents out of the object table.
    fn take_map_item(&mut self, id: ObjId) -> Option<MapItem> {
        self.kernel.kill_processes(id, PROC_TYPE_ALL, true);
        let mut item = self.objects.remove(id)?;
        let contents = std::mem::take(&mut item.contents)
            .into_iter()
            .filter_map(|child| self.take_map_item(child))
            .collect();
        item.parent = 0;
        item.gravity_pid = 0;
        item.flags.remove(ItemFlags::FASTAREA);
        item.ext_flags
            .remove(ExtFlags::IN_CURMAP | ExtFlags::CAMERA | ExtFlags::LERP_NOPREV);
        Some(MapItem { item, contents })
    }

    /// Give a stored item (and its contents) object ids.
    fn adopt(&mut self, stored: MapItem, parent: ObjId) -> ObjId {
        let MapItem { mut item, contents } = stored;
        item.flags.remove(ItemFlags::FASTAREA);
        item.ext_flags.remove(ExtFlags::IN_CURMAP);
        item.contents.clear();
        item.parent = parent;
        let id = self.objects.assign_object_id(item);
        if id == 0 {
            return 0;
        }
        let children: Vec<ObjId> = contents
            .into_iter()
            .map(|child| self.adopt(child, id))
            .filter(|child| *child != 0)
            .collect();
        if let Some(item) = self.objects.get_mut(id) {
            item.contents = children;
        }
        id
    }

    fn load_map(&mut self, num: u32) {
        self.current_map.clear();
        self.current_map.set_map_num(num);
        let hatcher = self.kernel.add_process(
            ProcessCore::new(0, EGG_HATCHER_PROCESS_TYPE),
            Box::new(EggHatcherProcess::new()),
        );
        self.current_map.set_egg_hatcher(hatcher);

        let stored = self
            .maps
            .get_mut(&num)
            .map(|m| std::mem::take(&mut m.items))
            .unwrap_or_default();
        let count = stored.len();
        for item in stored {
            let id = self.adopt(item, 0);
            if id != 0 {
                self.add_to_map(id, true);
            }
        }

        for npc in 1..=LAST_ACTOR_ID {
            let joins = self.objects.get(npc).is_some_and(|a| {
                a.is_actor()
                    && a.map_num as u32 == num
                    && !a.ext_flags.contains(ExtFlags::IN_CURMAP)
                    && !a.flags.intersects(
                        ItemFlags::CONTAINED | ItemFlags::EQUIPPED | ItemFlags::ETHEREAL,
                    )
            });
            if joins {
                self.add_to_map(npc, false);
            }
        }
        tracing::info!(map = num, items = count, hatcher, "map loaded");
    }

    /// Send the avatar to the destination egg `teleport_id` on `map`.
    /// Returns false if the map has no such egg.
    pub fn teleport_main_actor(&mut self, map: u32, teleport_id: u8) -> Result<bool, WorldError> {
        self.switch_map(map)?;
        let actor = self
            .objects
            .get_mut(MAIN_ACTOR_ID)
            .ok_or(WorldError::NoSuchObject(MAIN_ACTOR_ID))?;
        actor.map_num = map as u16;

        let dest = self
            .current_map
            .find_destination(&self.objects, &self.shapes, teleport_id)
            .and_then(|egg| self.objects.get(egg))
            .map(|egg| egg.pos);
        let found = match dest {
            Some(pos) => {
                self.move_item(MAIN_ACTOR_ID, pos)?;
                true
            }
            None => {
                tracing::warn!(map, teleport_id, "no destination egg");
                false
            }
        };
        if let Some(actor) = self.objects.actor_mut(MAIN_ACTOR_ID) {
            actor.just_teleported = true;
        }
        Ok(found)
    }

    /// One simulation frame: refresh the fast area around the camera, then
    /// run every process once.
    pub fn run_frame(&mut self) {
        if let Some(pos) = self.objects.location_absolute(self.camera) {
            self.update_fast_area(pos, pos);
            self.camera_pos = Some(pos);
        }
        Kernel::run_processes(self);
    }

    pub fn pending_events(&self) -> &EventLog {
        &self.events
    }

    /// Hand the events raised since the last drain to the usecode host.
    pub fn drain_events(&mut self) -> Vec<UsecodeEvent> {
        self.events.drain()
    }

    pub fn area_search(
        &self,
        script: &LoopScript,
        origin: SearchOrigin,
        range: i32,
        recurse: bool,
    ) -> Vec<ObjId> {
        self.current_map
            .area_search(&self.objects, &self.shapes, script, origin, range, recurse)
    }

    pub fn surface_search(
        &self,
        script: &LoopScript,
        check: ObjId,
        above: bool,
        below: bool,
        recurse: bool,
    ) -> Vec<ObjId> {
        self.current_map.surface_search(
            &self.objects,
            &self.shapes,
            script,
            check,
            above,
            below,
            recurse,
        )
    }

    pub fn summary(&self) -> WorldSummary {
        WorldSummary {
            game: self.config.game,
            map_num: self.current_map.map_num(),
            map_items: self.current_map.item_count(),
            objects: self.objects.len(),
            actors: self.objects.actor_count(),
            fast_chunks: self.current_map.fast_chunk_count(),
            total_chunks: (self.current_map.map_chunks() * self.current_map.map_chunks()) as usize,
            processes: self.kernel.live_count(),
            tick: self.kernel.tick(),
            ethereal: self.ethereal.len(),
            stored_maps: self.maps.len(),
            pending_events: self.events.len(),
        }
    }

    pub fn snapshot(&self) -> Result<WorldSnapshot, WorldError> {
        Ok(WorldSnapshot {
            kernel: self.kernel.save_state()?,
            world: WorldState {
                game: self.config.game,
                ethereal: self.ethereal.clone(),
                camera: self.camera,
                camera_pos: self.camera_pos,
            },
            objects: self.objects.save_state(),
            maps: self.maps.values().cloned().collect(),
            current_map: self.current_map.save_state(),
            strings: self.heap.save_strings(),
            globals: self.heap.globals().clone(),
            lists: self.heap.save_lists(),
        })
    }

    /// Rebuild a world from a snapshot taken with the same configuration.
    pub fn restore(
        config: WorldConfig,
        shapes: ShapeTable,
        snapshot: WorldSnapshot,
    ) -> Result<Self, WorldError> {
        if snapshot.world.game != config.game {
            return Err(WorldError::Inconsistent(format!(
                "saved game {:?} does not match configured {:?}",
                snapshot.world.game, config.game
            )));
        }
        let heap = UsecodeHeap::from_parts(snapshot.strings, snapshot.globals, snapshot.lists);
        let kernel = Kernel::from_state(snapshot.kernel, &Self::process_registry())?;
        let objects = ObjectManager::from_state(snapshot.objects)?;
        let maps = snapshot.maps.into_iter().map(|m| (m.num, m)).collect();
        let current_map = CurrentMap::from_state(&config, snapshot.current_map)?;

        for id in current_map.all_items() {
            if !objects.contains(id) {
                return Err(WorldError::Inconsistent(format!(
                    "map lists missing object {id}"
                )));
            }
        }
        for id in &snapshot.world.ethereal {
            if !objects.contains(*id) {
                return Err(WorldError::Inconsistent(format!(
                    "ethereal void lists missing object {id}"
                )));
            }
        }

        Ok(Self {
            config,
            shapes,
            kernel,
            objects,
            maps,
            current_map,
            ethereal: snapshot.world.ethereal,
            heap,
            events: EventLog::default(),
            camera: snapshot.world.camera,
            camera_pos: snapshot.world.camera_pos,
        })
    }
}

fn item_gravity_reset(objects: &mut ObjectManager, id: ObjId) {
    if let Some(item) = objects.get_mut(id) {
        item.gravity_pid = 0;
    }
}

/// Counters shown by `info` style inspectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSummary {
    pub game: GameVariant,
    pub map_num: u32,
    pub map_items: usize,
    pub objects: usize,
    pub actors: usize,
    pub fast_chunks: usize,
    pub total_chunks: usize,
    pub processes: usize,
    pub tick: u32,
    pub ethereal: usize,
    pub stored_maps: usize,
    pub pending_events: usize,
}

impl fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "game:        {:?}", self.game)?;
        writeln!(f, "map:         {} ({} stored)", self.map_num, self.stored_maps)?;
        writeln!(f, "map items:   {}", self.map_items)?;
        writeln!(f, "objects:     {} ({} actors)", self.objects, self.actors)?;
        writeln!(f, "fast chunks: {}/{}", self.fast_chunks, self.total_chunks)?;
        writeln!(f, "processes:   {}", self.processes)?;
        writeln!(f, "tick:        {}", self.tick)?;
        writeln!(f, "ethereal:    {}", self.ethereal)?;
        write!(f, "events:      {}", self.pending_events)
    }
}
