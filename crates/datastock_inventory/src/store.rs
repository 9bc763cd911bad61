//! Key/value side-store contract.
//!
//! Collaborators persist small per-file artifacts (index summaries, proto
//! metadata) through this interface. The inventory itself never uses it.

use std::collections::HashMap;
use std::sync::RwLock;

pub trait SideStore: Send + Sync {
    fn put(&self, key: &str, value: Vec<u8>);

    fn get(&self, key: &str) -> Option<Vec<u8>>;
}

/// In-process store backed by a map.
#[derive(Debug, Default)]
pub struct MemorySideStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SideStore for MemorySideStore {
    fn put(&self, key: &str, value: Vec<u8>) {
        match self.entries.write() {
            Ok(mut guard) => guard.insert(key.to_string(), value),
            Err(poisoned) => poisoned.into_inner().insert(key.to_string(), value),
        };
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.entries.read() {
            Ok(guard) => guard.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let store = MemorySideStore::new();
        assert!(store.is_empty());
        store.put("/data/a.nc", b"summary".to_vec());
        assert_eq!(store.get("/data/a.nc"), Some(b"summary".to_vec()));
        assert_eq!(store.get("/data/b.nc"), None);
        assert_eq!(store.len(), 1);
    }
}
