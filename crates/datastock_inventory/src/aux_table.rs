//! Typed per-inventory side table for collaborator data.
//!
//! The inventory stores these values but never reads them.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
pub struct AuxTable {
    entries: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl AuxTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn put<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        let value: Arc<dyn Any + Send + Sync> = Arc::new(value);
        match self.entries.write() {
            Ok(mut guard) => guard.insert(key.into(), value),
            Err(poisoned) => poisoned.into_inner().insert(key.into(), value),
        };
    }

    /// Fetch the value under `key` if it exists and has type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = match self.entries.read() {
            Ok(guard) => guard.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }?;
        value.downcast::<T>().ok()
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.entries.write() {
            Ok(mut guard) => guard.remove(key).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(key).is_some(),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        match self.entries.read() {
            Ok(guard) => guard.contains_key(key),
            Err(poisoned) => poisoned.into_inner().contains_key(key),
        }
    }
}

impl std::fmt::Debug for AuxTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = match self.entries.read() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        };
        f.debug_struct("AuxTable").field("keys", &keys).finish()
    }
}
