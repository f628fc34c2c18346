use serde::{Deserialize, Serialize};

/// Free-list allocator for small integer ids.
///
/// Ids are handed out from `[begin, max_end]`. The backing table starts small
/// and doubles on demand. Released ids go to the back of the free list so a
/// freshly freed id is the last one to be reused, and every release bumps the
/// slot's generation so stale handles can be detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMan {
    begin: u16,
    end: u16,
    max_end: u16,
    /// `next[id]` links free ids; 0 terminates the list.
    next: Vec<u16>,
    used: Vec<bool>,
    generations: Vec<u32>,
    first: u16,
    last: u16,
    count: u16,
}

impl IdMan {
    /// Create an allocator for `[begin, max_end]` with `start_count` ids available
    /// before the first expansion.
    pub fn new(begin: u16, max_end: u16, start_count: u16) -> Self {
        assert!(begin > 0, "id 0 is reserved as the null id");
        assert!(begin <= max_end, "empty id range");
        let start_count = start_count.max(1) as u32;
        let end = (begin as u32 + start_count - 1).min(max_end as u32) as u16;
        let mut man = Self {
            begin,
            end: begin - 1,
            max_end,
            next: vec![0; begin as usize],
            used: vec![false; begin as usize],
            generations: vec![0; begin as usize],
            first: 0,
            last: 0,
            count: 0,
        };
        man.grow_to(end);
        man
    }

    pub fn begin(&self) -> u16 {
        self.begin
    }

    pub fn max_end(&self) -> u16 {
        self.max_end
    }

    /// Number of ids currently handed out.
    pub fn count(&self) -> u16 {
        self.count
    }

    /// True once every id in the range is in use.
    pub fn is_full(&self) -> bool {
        self.first == 0 && self.end == self.max_end
    }

    /// Allocate a fresh id, or 0 if the id space is exhausted.
    pub fn get_new_id(&mut self) -> u16 {
        if self.first == 0 && !self.expand() {
            return 0;
        }
        let id = self.first;
        self.first = self.next[id as usize];
        self.next[id as usize] = 0;
        if self.first == 0 {
            self.last = 0;
        }
        self.used[id as usize] = true;
        self.count += 1;
        id
    }

    /// Take a specific id out of the free pool.
    ///
    /// Returns false when the id is outside the range or already in use.
    pub fn reserve_id(&mut self, id: u16) -> bool {
        if id < self.begin || id > self.max_end {
            return false;
        }
        while id > self.end {
            if !self.expand() {
                return false;
            }
        }
        if self.used[id as usize] {
            return false;
        }

        // unlink from the singly linked free list
        let mut prev = 0u16;
        let mut cur = self.first;
        while cur != 0 && cur != id {
            prev = cur;
            cur = self.next[cur as usize];
        }
        if cur == 0 {
            return false;
        }
        let after = self.next[id as usize];
        if prev == 0 {
            self.first = after;
        } else {
            self.next[prev as usize] = after;
        }
        if self.last == id {
            self.last = prev;
        }
        self.next[id as usize] = 0;
        self.used[id as usize] = true;
        self.count += 1;
        true
    }

    /// Return an id to the free pool. Releasing an unused id is ignored.
    pub fn clear_id(&mut self, id: u16) {
        if !self.is_id_used(id) {
            tracing::warn!(id, "releasing an id that is not in use");
            return;
        }
        let slot = id as usize;
        self.used[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.next[slot] = 0;
        if self.last != 0 {
            self.next[self.last as usize] = id;
        } else {
            self.first = id;
        }
        self.last = id;
        self.count -= 1;
    }

    pub fn is_id_used(&self, id: u16) -> bool {
        id >= self.begin && id <= self.end && self.used[id as usize]
    }

    /// Number of times `id` has been released.
    pub fn generation(&self, id: u16) -> u32 {
        self.generations.get(id as usize).copied().unwrap_or(0)
    }

    /// Grow the table (doubling, capped at `max_end`). False if already at the cap.
    fn expand(&mut self) -> bool {
        if self.end >= self.max_end {
            return false;
        }
        let doubled = (self.end as u32 * 2).max(self.begin as u32);
        let new_end = doubled.min(self.max_end as u32) as u16;
        tracing::debug!(old_end = self.end, new_end, "expanding id table");
        self.grow_to(new_end);
        true
    }

    fn grow_to(&mut self, new_end: u16) {
        let old_end = self.end;
        if new_end <= old_end {
            return;
        }
        let len = new_end as usize + 1;
        self.next.resize(len, 0);
        self.used.resize(len, false);
        self.generations.resize(len, 0);
        for id in (old_end + 1)..new_end {
            self.next[id as usize] = id + 1;
        }
        self.next[new_end as usize] = 0;
        if self.last != 0 {
            self.next[self.last as usize] = old_end + 1;
        } else {
            self.first = old_end + 1;
        }
        self.last = new_end;
        self.end = new_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_out_ids_in_order() {
        let mut ids = IdMan::new(1, 100, 10);
        assert_eq!(ids.get_new_id(), 1);
        assert_eq!(ids.get_new_id(), 2);
        assert_eq!(ids.count(), 2);
        assert!(ids.is_id_used(1));
        assert!(!ids.is_id_used(3));
    }

    #[test]
    fn released_ids_are_reused_last() {
        let mut ids = IdMan::new(1, 4, 4);
        let a = ids.get_new_id();
        ids.clear_id(a);
        // the other free ids come first
        assert_eq!(ids.get_new_id(), 2);
        assert_eq!(ids.get_new_id(), 3);
        assert_eq!(ids.get_new_id(), 4);
        assert_eq!(ids.get_new_id(), a);
    }

    #[test]
    fn exhaustion_returns_zero() {
        let mut ids = IdMan::new(1, 3, 1);
        assert_eq!(ids.get_new_id(), 1);
        assert_eq!(ids.get_new_id(), 2);
        assert_eq!(ids.get_new_id(), 3);
        assert!(ids.is_full());
        assert_eq!(ids.get_new_id(), 0);
    }

    #[test]
    fn table_expands_up_to_max() {
        let mut ids = IdMan::new(256, 32766, 8);
        for expected in 256..300 {
            assert_eq!(ids.get_new_id(), expected);
        }
        assert_eq!(ids.count(), 44);
    }

    #[test]
    fn reserve_specific_id() {
        let mut ids = IdMan::new(256, 32766, 16);
        assert!(ids.reserve_id(666));
        assert!(!ids.reserve_id(666));
        assert!(ids.is_id_used(666));
        assert!(!ids.reserve_id(10));
        // ordinary allocation skips the reserved one
        for _ in 0..1000 {
            assert_ne!(ids.get_new_id(), 666);
        }
    }

    #[test]
    fn reserving_the_tail_keeps_list_consistent() {
        let mut ids = IdMan::new(1, 3, 3);
        assert!(ids.reserve_id(3));
        assert_eq!(ids.get_new_id(), 1);
        assert_eq!(ids.get_new_id(), 2);
        assert_eq!(ids.get_new_id(), 0);
        ids.clear_id(2);
        assert_eq!(ids.get_new_id(), 2);
    }

    #[test]
    fn generation_advances_on_release() {
        let mut ids = IdMan::new(1, 2, 2);
        let id = ids.get_new_id();
        assert_eq!(ids.generation(id), 0);
        ids.clear_id(id);
        assert_eq!(ids.generation(id), 1);
        ids.clear_id(id);
        assert_eq!(ids.generation(id), 1);
    }
}
