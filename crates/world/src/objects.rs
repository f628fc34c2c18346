use std::collections::{BTreeMap, BTreeSet};

use pentacle_common::{ObjId, Point3};
use pentacle_kernel::IdMan;
use serde::{Deserialize, Serialize};

use crate::item::{ActorData, Item};
use crate::WorldError;

/// The avatar.
pub const MAIN_ACTOR_ID: ObjId = 1;
/// Highest id handed to NPCs; everything above is an ordinary object.
pub const LAST_ACTOR_ID: ObjId = 255;
pub const FIRST_OBJECT_ID: ObjId = 256;
pub const LAST_OBJECT_ID: ObjId = 32766;
/// Never handed out; some game data treats it specially.
pub const RESERVED_OBJ_ID: ObjId = 666;

/// Stale-detecting reference to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjHandle {
    pub id: ObjId,
    pub generation: u32,
}

/// Owner of every live object, keyed by [`ObjId`].
///
/// Actors (NPCs) draw ids from `1..=255`, everything else from
/// `256..=32766`. Ids of removed objects are recycled.
#[derive(Debug, Clone)]
pub struct ObjectManager {
    objects: BTreeMap<ObjId, Item>,
    actor_ids: IdMan,
    object_ids: IdMan,
    reserved: BTreeSet<ObjId>,
}

impl Default for ObjectManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectManager {
    pub fn new() -> Self {
        let mut man = Self {
            objects: BTreeMap::new(),
            actor_ids: IdMan::new(1, LAST_ACTOR_ID, LAST_ACTOR_ID),
            object_ids: IdMan::new(FIRST_OBJECT_ID, LAST_OBJECT_ID, 8192),
            reserved: BTreeSet::new(),
        };
        man.reserve_id(RESERVED_OBJ_ID);
        man
    }

    fn ids_for(&mut self, id: ObjId) -> &mut IdMan {
        if id <= LAST_ACTOR_ID {
            &mut self.actor_ids
        } else {
            &mut self.object_ids
        }
    }

    fn ids_for_ref(&self, id: ObjId) -> &IdMan {
        if id <= LAST_ACTOR_ID {
            &self.actor_ids
        } else {
            &self.object_ids
        }
    }

    /// Keep `id` out of circulation for good.
    pub fn reserve_id(&mut self, id: ObjId) -> bool {
        if id == 0 || !self.ids_for(id).reserve_id(id) {
            return false;
        }
        self.reserved.insert(id);
        true
    }

    /// Reserve every free id in `[first, last]`; returns how many were taken.
    pub fn reserve_range(&mut self, first: ObjId, last: ObjId) -> usize {
        (first..=last).filter(|id| self.reserve_id(*id)).count()
    }

    pub fn is_reserved(&self, id: ObjId) -> bool {
        self.reserved.contains(&id)
    }

    /// Store `item` under a fresh object id. Returns 0 if the id space is full.
    pub fn assign_object_id(&mut self, item: Item) -> ObjId {
        let id = self.object_ids.get_new_id();
        if id == 0 {
            tracing::warn!(shape = item.shape, "object id space exhausted");
            return 0;
        }
        self.store(id, item);
        id
    }

    /// Store an actor under a fresh NPC id. Returns 0 if all NPC slots are taken.
    pub fn assign_actor_id(&mut self, item: Item) -> ObjId {
        let id = self.actor_ids.get_new_id();
        if id == 0 {
            tracing::warn!(shape = item.shape, "actor id space exhausted");
            return 0;
        }
        self.store(id, item);
        id
    }

    /// Store `item` under a caller-chosen id (NPC numbers, savegames).
    pub fn insert_with_id(&mut self, id: ObjId, item: Item) -> Result<(), WorldError> {
        if id == 0 || self.reserved.contains(&id) || self.objects.contains_key(&id) {
            return Err(WorldError::IdInUse(id));
        }
        if !self.ids_for(id).reserve_id(id) {
            return Err(WorldError::IdInUse(id));
        }
        self.store(id, item);
        Ok(())
    }

    fn store(&mut self, id: ObjId, mut item: Item) {
        item.id = id;
        self.objects.insert(id, item);
    }

    /// Take an object out of the arena and release its id.
    pub fn remove(&mut self, id: ObjId) -> Option<Item> {
        let mut item = self.objects.remove(&id)?;
        if !self.reserved.contains(&id) {
            self.ids_for(id).clear_id(id);
        }
        item.id = 0;
        Some(item)
    }

    pub fn get(&self, id: ObjId) -> Option<&Item> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjId) -> Option<&mut Item> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn actor(&self, id: ObjId) -> Option<&ActorData> {
        self.get(id).and_then(Item::actor_data)
    }

    pub fn actor_mut(&mut self, id: ObjId) -> Option<&mut ActorData> {
        self.get_mut(id).and_then(Item::actor_data_mut)
    }

    /// Only returns `Some` for eggs.
    pub fn egg(&self, id: ObjId) -> Option<&Item> {
        self.get(id).filter(|item| item.is_egg())
    }

    pub fn handle(&self, id: ObjId) -> Option<ObjHandle> {
        self.contains(id).then(|| ObjHandle {
            id,
            generation: self.ids_for_ref(id).generation(id),
        })
    }

    pub fn get_by_handle(&self, handle: ObjHandle) -> Option<&Item> {
        if self.ids_for_ref(handle.id).generation(handle.id) != handle.generation {
            return None;
        }
        self.get(handle.id)
    }

    /// Outermost container holding `id`, or `None` if it is not contained.
    pub fn root_container(&self, id: ObjId) -> Option<ObjId> {
        let mut cur = self.get(id)?.parent;
        let mut root = None;
        // bounded walk; a parent cycle is a corrupt world
        for _ in 0..=self.objects.len() {
            if cur == 0 {
                return root;
            }
            root = Some(cur);
            cur = self.get(cur)?.parent;
        }
        None
    }

    /// World location of `id`, or of its outermost container if contained.
    pub fn location_absolute(&self, id: ObjId) -> Option<Point3> {
        let at = self.root_container(id).unwrap_or(id);
        self.get(at).map(|item| item.pos)
    }

    /// True if `ancestor` is `id` or holds it, directly or indirectly.
    pub fn is_within(&self, id: ObjId, ancestor: ObjId) -> bool {
        let mut cur = id;
        for _ in 0..=self.objects.len() {
            if cur == 0 {
                return false;
            }
            if cur == ancestor {
                return true;
            }
            cur = match self.get(cur) {
                Some(item) => item.parent,
                None => return false,
            };
        }
        false
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.objects.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn actor_count(&self) -> usize {
        self.objects.values().filter(|i| i.is_actor()).count()
    }

    /// Drop every object and start over with fresh allocators.
    pub fn reset(&mut self) {
        let reserved: Vec<ObjId> = self.reserved.iter().copied().collect();
        *self = Self::new();
        for id in reserved {
            self.reserve_id(id);
        }
    }

    pub fn save_state(&self) -> ObjectsState {
        ObjectsState {
            actor_ids: self.actor_ids.clone(),
            object_ids: self.object_ids.clone(),
            reserved: self.reserved.iter().copied().collect(),
            items: self.objects.values().cloned().collect(),
        }
    }

    pub fn from_state(state: ObjectsState) -> Result<Self, WorldError> {
        let mut objects = BTreeMap::new();
        for item in state.items {
            let id = item.id;
            let ids = if id <= LAST_ACTOR_ID {
                &state.actor_ids
            } else {
                &state.object_ids
            };
            if id == 0 || !ids.is_id_used(id) {
                return Err(WorldError::Inconsistent(format!(
                    "object {id} is not allocated"
                )));
            }
            if objects.insert(id, item).is_some() {
                return Err(WorldError::IdInUse(id));
            }
        }
        Ok(Self {
            objects,
            actor_ids: state.actor_ids,
            object_ids: state.object_ids,
            reserved: state.reserved.into_iter().collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectsState {
    pub actor_ids: IdMan,
    pub object_ids: IdMan,
    pub reserved: Vec<ObjId>,
    pub items: Vec<Item>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_and_actors_use_separate_ranges() {
        let mut objects = ObjectManager::new();
        let obj = objects.assign_object_id(Item::new(1, 0));
        let npc = objects.assign_actor_id(Item::actor(2, ActorData::default()));
        assert_eq!(obj, FIRST_OBJECT_ID);
        assert_eq!(npc, 1);
        assert_eq!(objects.get(obj).unwrap().id, obj);
        assert!(objects.actor(npc).is_some());
        assert!(objects.actor(obj).is_none());
    }

    #[test]
    fn reserved_id_is_never_assigned() {
        let mut objects = ObjectManager::new();
        for _ in 0..600 {
            assert_ne!(objects.assign_object_id(Item::new(1, 0)), RESERVED_OBJ_ID);
        }
        assert!(objects.insert_with_id(RESERVED_OBJ_ID, Item::new(1, 0)).is_err());
    }

    #[test]
    fn reserve_range_skips_used_ids() {
        let mut objects = ObjectManager::new();
        let first = objects.assign_object_id(Item::new(1, 0));
        assert_eq!(objects.reserve_range(first, first + 9), 9);
        assert_eq!(objects.assign_object_id(Item::new(1, 0)), first + 10);
    }

    #[test]
    fn removed_id_gets_new_generation() {
        let mut objects = ObjectManager::new();
        let id = objects.assign_object_id(Item::new(1, 0));
        let handle = objects.handle(id).unwrap();
        let item = objects.remove(id).unwrap();
        assert_eq!(item.id, 0);
        assert!(objects.get_by_handle(handle).is_none());
        assert!(objects.remove(id).is_none());
    }

    #[test]
    fn insert_with_id_rejects_duplicates() {
        let mut objects = ObjectManager::new();
        objects.insert_with_id(MAIN_ACTOR_ID, Item::actor(1, ActorData::default())).unwrap();
        assert!(matches!(
            objects.insert_with_id(MAIN_ACTOR_ID, Item::new(1, 0)),
            Err(WorldError::IdInUse(MAIN_ACTOR_ID))
        ));
        // the next fresh actor id skips the taken one
        assert_eq!(objects.assign_actor_id(Item::actor(1, ActorData::default())), 2);
    }

    #[test]
    fn state_round_trip() {
        let mut objects = ObjectManager::new();
        let a = objects.assign_object_id(Item::new(7, 2));
        objects.assign_actor_id(Item::actor(3, ActorData::default()));
        let restored = ObjectManager::from_state(objects.save_state()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(a).unwrap().shape, 7);
        assert!(restored.is_reserved(RESERVED_OBJ_ID));
    }

    #[test]
    fn reset_keeps_reservations() {
        let mut objects = ObjectManager::new();
        objects.reserve_id(300);
        objects.assign_object_id(Item::new(1, 0));
        objects.reset();
        assert!(objects.is_empty());
        assert!(objects.is_reserved(300));
        assert!(objects.is_reserved(RESERVED_OBJ_ID));
    }
}
