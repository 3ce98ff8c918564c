use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::storage::KeyValueStore;
use crate::{Result, StoreError};

const LOG_PREFIX: &str = "storage";
const TEMP_SUFFIX: &str = ".tmp";

/// Folder-backed key-value storage.
///
/// Every key is kept in its own file named after the key. Values are written
/// to a temporary sibling first and then renamed over the destination, so a
/// reader sees either the old or the new value.
pub struct FileStore {
    log_prefix: String,
    label: String,
    path: PathBuf,
}

impl FileStore {
    /// Create a new file storage with a diagnostic label and folder path.
    /// The folder is created on first write.
    pub fn new(label: String, path: &Path) -> Self {
        Self {
            log_prefix: format!("{}/{}", LOG_PREFIX, label),
            label,
            path: PathBuf::from(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::Storage(
                self.label.clone(),
                format!("Invalid key {:?}", key),
            ));
        }
        Ok(self.path.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::debug!("{}: no entry for key {}", self.log_prefix, key);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        fs::create_dir_all(&self.path)?;

        let temp = self.path.join(format!("{}{}", key, TEMP_SUFFIX));
        fs::write(&temp, value.as_bytes())?;
        if let Err(err) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(StoreError::Storage(
                self.label.clone(),
                format!("Failed to replace {}: {}", path.display(), err),
            ));
        }

        log::debug!(
            "{}: {} bytes written for key {}",
            self.log_prefix,
            value.len(),
            key
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Storage(self.label.clone(), err.to_string())),
        }
    }
}
