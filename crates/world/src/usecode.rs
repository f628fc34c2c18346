//! The boundary to the usecode VM: events raised by the world, and the
//! heaps (strings, lists, globals) that scripts read and write.
//!
//! The VM itself lives in the host. The world only records what happened in
//! an [`EventLog`] and hands out heap ids.

use std::collections::BTreeMap;

use pentacle_common::ObjId;
use pentacle_kernel::IdMan;
use serde::{Deserialize, Serialize};

use crate::config::GameVariant;

/// Something usecode should react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsecodeEvent {
    Hatch { egg: ObjId },
    Unhatch { egg: ObjId },
    EnterFastArea { item: ObjId },
    LeaveFastArea { item: ObjId },
    JustMoved { item: ObjId },
    /// `item` ran into `other`.
    Hit { item: ObjId, other: ObjId, force: i32 },
    /// `item` was run into by `by`.
    GotHit { item: ObjId, by: ObjId, force: i32 },
    /// `item` stopped touching something it rested against.
    Release { item: ObjId },
}

impl UsecodeEvent {
    /// The item whose usecode handles the event.
    pub fn target(&self) -> ObjId {
        match *self {
            UsecodeEvent::Hatch { egg } | UsecodeEvent::Unhatch { egg } => egg,
            UsecodeEvent::EnterFastArea { item }
            | UsecodeEvent::LeaveFastArea { item }
            | UsecodeEvent::JustMoved { item }
            | UsecodeEvent::Hit { item, .. }
            | UsecodeEvent::GotHit { item, .. }
            | UsecodeEvent::Release { item } => item,
        }
    }
}

/// Events in the order they were raised.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<UsecodeEvent>,
}

impl EventLog {
    pub fn push(&mut self, event: UsecodeEvent) {
        tracing::trace!(?event, "usecode event");
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<UsecodeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UsecodeEvent> {
        self.events.iter()
    }
}

/// A usecode list: a packed array of fixed-size elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UcList {
    element_size: u16,
    data: Vec<u8>,
}

impl UcList {
    pub fn new(element_size: u16) -> Self {
        Self {
            element_size: element_size.max(1),
            data: Vec::new(),
        }
    }

    /// A list of 2-byte object ids.
    pub fn from_ids(ids: &[ObjId]) -> Self {
        let mut list = Self::new(2);
        for id in ids {
            list.append(&id.to_le_bytes());
        }
        list
    }

    pub fn element_size(&self) -> u16 {
        self.element_size
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.element_size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        let size = self.element_size as usize;
        self.data.get(index * size..(index + 1) * size)
    }

    /// Element `index` read as a little-endian u16.
    pub fn get_u16(&self, index: usize) -> Option<u16> {
        match self.get(index)? {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            [lo] => Some(*lo as u16),
            [] => None,
        }
    }

    /// Append one element; shorter input is zero-padded, longer is cut.
    pub fn append(&mut self, element: &[u8]) {
        let size = self.element_size as usize;
        let start = self.data.len();
        self.data.resize(start + size, 0);
        let n = element.len().min(size);
        self.data[start..start + n].copy_from_slice(&element[..n]);
    }

    pub fn contains(&self, element: &[u8]) -> bool {
        (0..self.len()).any(|i| self.get(i) == Some(element))
    }

    pub fn append_unique(&mut self, element: &[u8]) {
        if element.len() == self.element_size as usize && self.contains(element) {
            return;
        }
        self.append(element);
    }

    pub fn remove(&mut self, element: &[u8]) {
        let size = self.element_size as usize;
        if let Some(i) = (0..self.len()).find(|i| self.get(*i) == Some(element)) {
            self.data.drain(i * size..(i + 1) * size);
        }
    }
}

/// Game-wide usecode globals.
///
/// U8 addresses single bits; Crusader addresses bytes. Both read and write
/// little-endian runs of up to 32 entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Globals {
    bytes_mode: bool,
    size: u32,
    data: Vec<u8>,
}

impl Globals {
    pub const SIZE: u32 = 0x1000;

    pub fn new(game: GameVariant) -> Self {
        let bytes_mode = game.is_crusader();
        let len = if bytes_mode {
            Self::SIZE as usize
        } else {
            (Self::SIZE as usize).div_ceil(8)
        };
        let mut globals = Self {
            bytes_mode,
            size: Self::SIZE,
            data: vec![0; len],
        };
        if bytes_mode {
            // avatar number
            globals.set_entries(0x3C, 2, 1);
        }
        globals
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn get_entries(&self, pos: u32, n: u32) -> u32 {
        let n = n.min(32);
        let mut value = 0u32;
        if self.bytes_mode {
            for i in 0..n.min(4) {
                let byte = self.data.get((pos + i) as usize).copied().unwrap_or(0);
                value |= (byte as u32) << (8 * i);
            }
        } else {
            for i in 0..n {
                let bit = pos + i;
                let byte = self.data.get((bit / 8) as usize).copied().unwrap_or(0);
                if byte & (1 << (bit % 8)) != 0 {
                    value |= 1 << i;
                }
            }
        }
        value
    }

    pub fn set_entries(&mut self, pos: u32, n: u32, value: u32) {
        let n = n.min(32);
        if self.bytes_mode {
            for i in 0..n.min(4) {
                if let Some(byte) = self.data.get_mut((pos + i) as usize) {
                    *byte = (value >> (8 * i)) as u8;
                }
            }
        } else {
            for i in 0..n {
                let bit = pos + i;
                if let Some(byte) = self.data.get_mut((bit / 8) as usize) {
                    if value & (1 << i) != 0 {
                        *byte |= 1 << (bit % 8);
                    } else {
                        *byte &= !(1 << (bit % 8));
                    }
                }
            }
        }
    }
}

/// Saved form of the string heap (`UCSTRINGS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringsState {
    pub ids: IdMan,
    pub strings: Vec<(u16, String)>,
}

/// Saved form of the list heap (`UCLISTS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListsState {
    pub ids: IdMan,
    pub lists: Vec<(u16, UcList)>,
}

/// Strings, lists and globals owned by usecode.
#[derive(Debug, Clone)]
pub struct UsecodeHeap {
    string_ids: IdMan,
    strings: BTreeMap<u16, String>,
    list_ids: IdMan,
    lists: BTreeMap<u16, UcList>,
    globals: Globals,
}

impl UsecodeHeap {
    pub fn new(game: GameVariant) -> Self {
        Self {
            string_ids: IdMan::new(1, 65534, 256),
            strings: BTreeMap::new(),
            list_ids: IdMan::new(1, 65534, 128),
            lists: BTreeMap::new(),
            globals: Globals::new(game),
        }
    }

    /// Returns 0 if no id is left.
    pub fn assign_string(&mut self, s: impl Into<String>) -> u16 {
        let id = self.string_ids.get_new_id();
        if id == 0 {
            tracing::warn!("usecode string heap is full");
            return 0;
        }
        self.strings.insert(id, s.into());
        id
    }

    pub fn duplicate_string(&mut self, id: u16) -> u16 {
        let s = self.strings.get(&id).cloned().unwrap_or_default();
        self.assign_string(s)
    }

    pub fn string(&self, id: u16) -> Option<&str> {
        self.strings.get(&id).map(String::as_str)
    }

    pub fn free_string(&mut self, id: u16) {
        if self.strings.remove(&id).is_some() {
            self.string_ids.clear_id(id);
        }
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// Returns 0 if no id is left.
    pub fn assign_list(&mut self, list: UcList) -> u16 {
        let id = self.list_ids.get_new_id();
        if id == 0 {
            tracing::warn!("usecode list heap is full");
            return 0;
        }
        self.lists.insert(id, list);
        id
    }

    /// Store the result of an item search as a list of object ids.
    pub fn assign_item_list(&mut self, ids: &[ObjId]) -> u16 {
        self.assign_list(UcList::from_ids(ids))
    }

    pub fn list(&self, id: u16) -> Option<&UcList> {
        self.lists.get(&id)
    }

    pub fn list_mut(&mut self, id: u16) -> Option<&mut UcList> {
        self.lists.get_mut(&id)
    }

    pub fn free_list(&mut self, id: u16) {
        if self.lists.remove(&id).is_some() {
            self.list_ids.clear_id(id);
        }
    }

    /// Free a list of string ids together with the strings it names.
    pub fn free_string_list(&mut self, id: u16) {
        let Some(list) = self.lists.remove(&id) else {
            return;
        };
        self.list_ids.clear_id(id);
        for i in 0..list.len() {
            if let Some(s) = list.get_u16(i) {
                self.free_string(s);
            }
        }
    }

    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut Globals {
        &mut self.globals
    }

    /// Clear strings, lists and globals.
    pub fn reset(&mut self, game: GameVariant) {
        *self = Self::new(game);
    }

    pub fn save_strings(&self) -> StringsState {
        StringsState {
            ids: self.string_ids.clone(),
            strings: self.strings.iter().map(|(k, v)| (*k, v.clone())).collect(),
        }
    }

    pub fn save_lists(&self) -> ListsState {
        ListsState {
            ids: self.list_ids.clone(),
            lists: self.lists.iter().map(|(k, v)| (*k, v.clone())).collect(),
        }
    }

    pub fn from_parts(strings: StringsState, globals: Globals, lists: ListsState) -> Self {
        Self {
            string_ids: strings.ids,
            strings: strings.strings.into_iter().collect(),
            list_ids: lists.ids,
            lists: lists.lists.into_iter().collect(),
            globals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_drains_in_order() {
        let mut log = EventLog::default();
        log.push(UsecodeEvent::Hatch { egg: 300 });
        log.push(UsecodeEvent::JustMoved { item: 301 });
        assert_eq!(log.len(), 2);
        let events = log.drain();
        assert_eq!(events[0].target(), 300);
        assert_eq!(events[1], UsecodeEvent::JustMoved { item: 301 });
        assert!(log.is_empty());
    }

    #[test]
    fn bit_globals() {
        let mut g = Globals::new(GameVariant::Ultima8);
        g.set_entries(10, 3, 0b101);
        assert_eq!(g.get_entries(10, 3), 0b101);
        assert_eq!(g.get_entries(11, 1), 0);
        assert_eq!(g.get_entries(12, 1), 1);
        g.set_entries(10, 3, 0);
        assert_eq!(g.get_entries(8, 8), 0);
    }

    #[test]
    fn byte_globals_start_with_avatar_number() {
        let mut g = Globals::new(GameVariant::Crusader);
        assert_eq!(g.get_entries(0x3C, 2), 1);
        g.set_entries(0x100, 2, 0xBEEF);
        assert_eq!(g.get_entries(0x100, 2), 0xBEEF);
        assert_eq!(g.get_entries(0x101, 1), 0xBE);
    }

    #[test]
    fn list_append_unique_and_remove() {
        let mut list = UcList::from_ids(&[5, 6]);
        list.append_unique(&5u16.to_le_bytes());
        list.append_unique(&7u16.to_le_bytes());
        assert_eq!(list.len(), 3);
        list.remove(&6u16.to_le_bytes());
        assert_eq!(list.get_u16(0), Some(5));
        assert_eq!(list.get_u16(1), Some(7));
        assert_eq!(list.get_u16(2), None);
    }

    #[test]
    fn freed_string_list_releases_strings() {
        let mut heap = UsecodeHeap::new(GameVariant::Ultima8);
        let a = heap.assign_string("avatar");
        let b = heap.duplicate_string(a);
        assert_ne!(a, b);
        assert_eq!(heap.string(b), Some("avatar"));
        let mut names = UcList::new(2);
        names.append(&a.to_le_bytes());
        names.append(&b.to_le_bytes());
        let list = heap.assign_list(names);
        heap.free_string_list(list);
        assert_eq!(heap.string_count(), 0);
        assert_eq!(heap.list_count(), 0);
    }

    #[test]
    fn heap_state_round_trip() {
        let mut heap = UsecodeHeap::new(GameVariant::Ultima8);
        let s = heap.assign_string("ankh");
        let l = heap.assign_item_list(&[256, 300]);
        heap.globals_mut().set_entries(3, 1, 1);
        let restored = UsecodeHeap::from_parts(
            heap.save_strings(),
            heap.globals().clone(),
            heap.save_lists(),
        );
        assert_eq!(restored.string(s), Some("ankh"));
        assert_eq!(restored.list(l).and_then(|l| l.get_u16(1)), Some(300));
        assert_eq!(restored.globals().get_entries(3, 1), 1);
    }
}
