//! Concurrent map from session id to live handle.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::pty::SessionId;

/// Mapping of session ids to handles.
///
/// Cloning a registry yields another view of the same map, so the manager
/// and every session pump operate on one shared set of entries.
pub struct SessionRegistry<H> {
    entries: Arc<DashMap<SessionId, Arc<H>>>,
}

impl<H> SessionRegistry<H> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Registers `handle` under `id`.
    ///
    /// Ids are generated fresh for every session, so a duplicate indicates a
    /// bug. The existing entry is kept.
    pub fn insert(&self, id: SessionId, handle: Arc<H>) {
        match self.entries.entry(id) {
            Entry::Occupied(entry) => {
                debug_assert!(false, "duplicate session id {}", entry.key());
                tracing::error!(
                    session_id = %entry.key(),
                    "Duplicate session id, keeping existing entry"
                );
            }
            Entry::Vacant(entry) => {
                entry.insert(handle);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<H>> {
        self.entries.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes and returns the entry for `id`, if any.
    pub fn remove(&self, id: &str) -> Option<Arc<H>> {
        self.entries.remove(id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the registered ids, in no particular order.
    pub fn ids(&self) -> Vec<SessionId> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl<H> Clone for SessionRegistry<H> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<H> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> std::fmt::Debug for SessionRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct FakeHandle(u32);

    fn registry() -> SessionRegistry<FakeHandle> {
        SessionRegistry::new()
    }

    #[test]
    fn test_insert_and_get() {
        let reg = registry();
        reg.insert("a".to_string(), Arc::new(FakeHandle(1)));

        assert_eq!(reg.get("a").as_deref(), Some(&FakeHandle(1)));
        assert!(reg.get("b").is_none());
        assert!(reg.contains("a"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_remove() {
        let reg = registry();
        reg.insert("a".to_string(), Arc::new(FakeHandle(1)));

        assert_eq!(reg.remove("a").as_deref(), Some(&FakeHandle(1)));
        assert!(reg.is_empty());
        // Removing again is a no-op
        assert!(reg.remove("a").is_none());
    }

    #[test]
    fn test_clone_shares_entries() {
        let reg = registry();
        let view = reg.clone();

        reg.insert("a".to_string(), Arc::new(FakeHandle(1)));
        assert!(view.contains("a"));

        view.remove("a");
        assert!(!reg.contains("a"));
    }

    #[test]
    fn test_ids() {
        let reg = registry();
        reg.insert("a".to_string(), Arc::new(FakeHandle(1)));
        reg.insert("b".to_string(), Arc::new(FakeHandle(2)));

        let mut ids = reg.ids();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_duplicate_keeps_existing() {
        let reg = registry();
        reg.insert("a".to_string(), Arc::new(FakeHandle(1)));
        reg.insert("a".to_string(), Arc::new(FakeHandle(2)));
        assert_eq!(reg.get("a").as_deref(), Some(&FakeHandle(1)));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "duplicate session id")]
    fn test_duplicate_panics_in_debug() {
        let reg = registry();
        reg.insert("a".to_string(), Arc::new(FakeHandle(1)));
        reg.insert("a".to_string(), Arc::new(FakeHandle(2)));
    }

    #[test]
    fn test_concurrent_inserts() {
        let reg: SessionRegistry<FakeHandle> = registry();
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        reg.insert(format!("{}-{}", t, i), Arc::new(FakeHandle(i)));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(reg.len(), 800);
    }
}
