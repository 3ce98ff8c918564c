use std::collections::HashMap;

use parking_lot::Mutex;

use crate::Result;

pub mod adapter;
pub mod file_storage;

pub use adapter::PersistentStore;
pub use file_storage::FileStore;

/// Durable string key-value storage, the equivalent of browser local storage.
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`, `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Create or replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile storage; contents live as long as the instance.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
