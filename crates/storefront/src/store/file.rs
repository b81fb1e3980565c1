//! File-backed cart store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{CART_STORAGE_KEY, CartStore, PersistedCart, StoreError};
use crate::cart::CartSnapshot;

/// Stores the anonymous cart as `<dir>/cart.json`.
///
/// Writes go to a temporary sibling that is renamed into place, so a crash
/// mid-write never leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{CART_STORAGE_KEY}.json")),
        }
    }

    /// Path of the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CartStore for FileStore {
    fn load(&self) -> Result<Option<CartSnapshot>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        PersistedCart::decode(&raw).map(|record| Some(record.into_snapshot()))
    }

    fn save(&self, snapshot: &CartSnapshot) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let raw = PersistedCart::from_snapshot(snapshot).encode()?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
