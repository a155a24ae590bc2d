//! Slot arena backing cache entry storage.
//!
//! Entries live in a `Vec<Option<T>>`; freed slots are pushed on a free list
//! and reused by the next insert, so index maps can refer to entries by a
//! compact [`EntryId`] instead of cloning values per index.

/// Stable handle to an entry in an [`Arena`].
///
/// Ids are reused after removal; holders must drop an id in the same critical
/// section that removes its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u32);

impl EntryId {
    /// Returns the slot index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Free-list arena of cache entries.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    /// Creates an empty arena with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Stores `value`, reusing a freed slot when one is available.
    pub fn insert(&mut self, value: T) -> EntryId {
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx as usize] = Some(value);
                idx
            },
            None => {
                self.slots.push(Some(value));
                (self.slots.len() - 1) as u32
            },
        };
        self.len += 1;
        EntryId(idx)
    }

    /// Removes and returns the entry, freeing its slot.
    pub fn remove(&mut self, id: EntryId) -> Option<T> {
        let value = self.slots.get_mut(id.index())?.take()?;
        self.free.push(id.0);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, id: EntryId) -> Option<&T> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every entry. Slot storage is released down to `keep` slots.
    pub fn clear(&mut self, keep: usize) {
        self.slots.clear();
        self.slots.shrink_to(keep);
        self.free.clear();
        self.free.shrink_to(0);
        self.len = 0;
    }

    /// Iterates live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|value| (EntryId(idx as u32), value)))
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_insert_remove_reuse() {
        let mut arena = Arena::default();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));

        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.remove(a), None);
        assert!(!arena.contains(a));

        let c = arena.insert("c");
        assert_eq!(c.index(), a.index());
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn arena_iter_skips_holes() {
        let mut arena = Arena::with_capacity(4);
        let ids: Vec<_> = (0..4).map(|i| arena.insert(i)).collect();
        arena.remove(ids[1]);
        arena.remove(ids[2]);

        let live: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec![0, 3]);
    }

    #[test]
    fn arena_clear_resets() {
        let mut arena = Arena::with_capacity(8);
        for i in 0..8 {
            arena.insert(i);
        }
        arena.clear(2);
        assert!(arena.is_empty());
        assert_eq!(arena.iter().count(), 0);
        let id = arena.insert(42);
        assert_eq!(id.index(), 0);
    }
}
