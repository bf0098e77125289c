//! Open-file handle table.
//!
//! Handles are allocated from an incrementing counter. ID 0 is reserved as
//! the invalid handle and is never returned, even after the counter wraps.
//!
//! The table is a plain map with `&mut self` mutation. It lives next to the
//! [`PathTable`](crate::path_mapper::PathTable) under the caller's lock, so
//! the two can be updated together.

use std::collections::HashMap;

/// Map from handle ID to per-open state, with auto-incrementing IDs.
///
/// # Example
///
/// ```
/// use mailfs_mount::HandleTable;
///
/// let mut table: HandleTable<String> = HandleTable::new();
///
/// let id1 = table.insert_auto("body one".to_string());
/// let id2 = table.insert_auto("body two".to_string());
///
/// assert_ne!(id1, id2);
/// assert_eq!(table.remove(id1), Some("body one".to_string()));
/// assert_eq!(table.len(), 1);
/// ```
#[derive(Debug)]
pub struct HandleTable<V> {
    handles: HashMap<u64, V>,
    /// Next ID to try. Starts at 1.
    next_id: u64,
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HandleTable<V> {
    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
            next_id: 1,
        }
    }

    /// Inserts `value` under a fresh ID and returns the ID.
    ///
    /// Skips 0 and any ID still in use after a wrap-around.
    pub fn insert_auto(&mut self, value: V) -> u64 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if id == 0 || self.handles.contains_key(&id) {
                continue;
            }
            self.handles.insert(id, value);
            return id;
        }
    }

    pub fn get(&self, id: u64) -> Option<&V> {
        self.handles.get(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<V> {
        self.handles.remove(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.handles.values()
    }

    /// Drops every handle for which `keep` returns false.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(u64, &mut V) -> bool,
    {
        self.handles.retain(|id, v| keep(*id, v));
    }

    /// Removes all handles. The counter keeps going.
    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_id_insert() {
        let mut table: HandleTable<String> = HandleTable::new();

        let id1 = table.insert_auto("a".to_string());
        let id2 = table.insert_auto("b".to_string());
        let id3 = table.insert_auto("c".to_string());

        assert_eq!((id1, id2, id3), (1, 2, 3));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_get() {
        let mut table: HandleTable<String> = HandleTable::new();
        let id = table.insert_auto("hello".to_string());

        assert_eq!(table.get(id).map(String::as_str), Some("hello"));
        assert!(table.get(999).is_none());
    }

    #[test]
    fn test_remove() {
        let mut table: HandleTable<u32> = HandleTable::new();
        let id = table.insert_auto(7);

        assert!(table.contains(id));
        assert_eq!(table.remove(id), Some(7));
        assert!(!table.contains(id));
        assert!(table.is_empty());
        assert_eq!(table.remove(id), None);
    }

    #[test]
    fn test_ids_not_reused_after_remove() {
        let mut table: HandleTable<u32> = HandleTable::new();
        let id1 = table.insert_auto(1);
        table.remove(id1);
        let id2 = table.insert_auto(2);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_clear_then_insert() {
        let mut table: HandleTable<&str> = HandleTable::new();
        table.insert_auto("a");
        table.insert_auto("b");
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.insert_auto("c"), 3, "counter continues after clear");
    }

    #[test]
    fn test_retain_and_values() {
        let mut table: HandleTable<u32> = HandleTable::new();
        for v in 1..=4 {
            table.insert_auto(v);
        }
        table.retain(|_, v| *v % 2 == 0);
        let mut left: Vec<u32> = table.values().copied().collect();
        left.sort_unstable();
        assert_eq!(left, vec![2, 4]);
    }

    #[test]
    fn test_id_overflow_guarded() {
        let mut table: HandleTable<&str> = HandleTable::new();
        let first = table.insert_auto("first");
        assert_eq!(first, 1);
        table.next_id = u64::MAX;

        assert_eq!(table.insert_auto("max"), u64::MAX);
        // Wraps past 0 and past the still-open handle 1.
        let after = table.insert_auto("after");
        assert_eq!(after, 2);
        assert_eq!(table.get(1), Some(&"first"));
    }
}
