use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::storage::KeyValueStore;
use crate::Result;

/// JSON view over a [`KeyValueStore`] that never fails its caller.
///
/// In-memory state stays authoritative for the running session, so read
/// problems degrade to the default value and write problems are only logged.
#[derive(Clone)]
pub struct PersistentStore {
    log_prefix: String,
    backend: Arc<dyn KeyValueStore>,
}

impl PersistentStore {
    pub fn new(label: String, backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            log_prefix: format!("storage/{}", label),
            backend,
        }
    }

    /// Decode the value under `key`, or `T::default()` when it is missing,
    /// malformed or storage is unavailable.
    pub fn load<T>(&self, key: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        match self.backend.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => {
                    log::warn!(
                        "{}: discarding malformed value for key {}: {}",
                        self.log_prefix,
                        key,
                        err
                    );
                    T::default()
                }
            },
            Ok(None) => T::default(),
            Err(err) => {
                log::warn!(
                    "{}: storage unavailable while reading key {}: {}",
                    self.log_prefix,
                    key,
                    err
                );
                T::default()
            }
        }
    }

    /// Encode and store `value` under `key`. Failures are logged and
    /// swallowed.
    pub fn save<T>(&self, key: &str, value: &T)
    where
        T: Serialize + ?Sized,
    {
        if let Err(err) = self.try_save(key, value) {
            log::error!(
                "{}: failed to persist key {}: {}",
                self.log_prefix,
                key,
                err
            );
        }
    }

    pub fn try_save<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_json::to_string(value)?;
        self.backend.set(key, &encoded)
    }

    /// Best-effort removal of `key`.
    pub fn remove(&self, key: &str) {
        if let Err(err) = self.backend.remove(key) {
            log::error!(
                "{}: failed to remove key {}: {}",
                self.log_prefix,
                key,
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::testing::Unavailable;

    #[test_log::test]
    fn round_trip() {
        let store =
            PersistentStore::new("test".into(), Arc::new(MemoryStore::new()));
        store.save("numbers", &vec![1, 2, 3]);
        let loaded: Vec<u32> = store.load("numbers");
        assert_eq!(loaded, vec![1, 2, 3]);
    }

    #[test_log::test]
    fn missing_key_yields_default() {
        let store =
            PersistentStore::new("test".into(), Arc::new(MemoryStore::new()));
        let loaded: Vec<u32> = store.load("numbers");
        assert!(loaded.is_empty());
    }

    #[test_log::test]
    fn malformed_value_yields_default() {
        let backend = Arc::new(MemoryStore::new());
        backend.set("numbers", "{not json").unwrap();
        let store = PersistentStore::new("test".into(), backend);
        let loaded: Vec<u32> = store.load("numbers");
        assert!(loaded.is_empty());
    }

    #[test_log::test]
    fn unavailable_storage_is_not_fatal() {
        let store = PersistentStore::new("test".into(), Arc::new(Unavailable));
        store.save("numbers", &vec![1]);
        store.remove("numbers");
        let loaded: Vec<u32> = store.load("numbers");
        assert!(loaded.is_empty());
        assert!(store.try_save("numbers", &vec![1]).is_err());
    }
}
