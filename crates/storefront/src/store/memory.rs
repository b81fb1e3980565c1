//! In-memory cart store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{CartStore, PersistedCart, StoreError};
use crate::cart::CartSnapshot;

/// Keeps the serialized record in memory.
///
/// Used for ephemeral carts and in tests; it counts writes and can be told
/// to fail so degraded persistence can be exercised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<String>>,
    saves: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialize`] if the snapshot cannot be encoded.
    pub fn with_snapshot(snapshot: &CartSnapshot) -> Result<Self, StoreError> {
        let store = Self::new();
        *store.lock() = Some(PersistedCart::from_snapshot(snapshot).encode()?);
        Ok(store)
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every subsequent load and save fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The raw record, if any.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("storage unavailable")));
        }
        Ok(())
    }
}

impl CartStore for MemoryStore {
    fn load(&self) -> Result<Option<CartSnapshot>, StoreError> {
        self.check_available()?;
        self.lock()
            .as_deref()
            .map(|raw| PersistedCart::decode(raw).map(PersistedCart::into_snapshot))
            .transpose()
    }

    fn save(&self, snapshot: &CartSnapshot) -> Result<(), StoreError> {
        self.check_available()?;
        let raw = PersistedCart::from_snapshot(snapshot).encode()?;
        *self.lock() = Some(raw);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
