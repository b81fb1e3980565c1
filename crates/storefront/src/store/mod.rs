//! Local Persistent Store for anonymous carts.
//!
//! The store is a mirror of the in-memory cart, never its owner: the cart
//! engine writes the full snapshot after every local mutation and reads it
//! back only at cold start (or on an explicit sync) while no identity is
//! present. Store failures are never fatal to the cart.
//!
//! # Record format
//!
//! One JSON record under the fixed key [`CART_STORAGE_KEY`]:
//!
//! ```json
//! {"version": 1, "saved_at": "2026-01-01T00:00:00Z", "lines": [...]}
//! ```

mod file;
mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::{CartLine, CartSnapshot};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Well-known key the anonymous cart is stored under.
pub const CART_STORAGE_KEY: &str = "cart";

/// Current record format version.
pub const RECORD_VERSION: u32 = 1;

/// Errors raised by a [`CartStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage could not be read or written.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be serialized.
    #[error("Failed to serialize cart record: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Stored record exists but cannot be understood.
    #[error("Corrupt cart record: {0}")]
    Corrupt(String),
}

/// Durable key/value storage for the anonymous cart.
pub trait CartStore: Send + Sync + 'static {
    /// Read the persisted cart, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage is unavailable or the record is corrupt.
    fn load(&self) -> Result<Option<CartSnapshot>, StoreError>;

    /// Persist the full snapshot, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage is unavailable.
    fn save(&self, snapshot: &CartSnapshot) -> Result<(), StoreError>;
}

impl<S: CartStore> CartStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<CartSnapshot>, StoreError> {
        (**self).load()
    }

    fn save(&self, snapshot: &CartSnapshot) -> Result<(), StoreError> {
        (**self).save(snapshot)
    }
}

/// Serialized form of an anonymous cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCart {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub lines: Vec<CartLine>,
}

impl PersistedCart {
    #[must_use]
    pub fn from_snapshot(snapshot: &CartSnapshot) -> Self {
        Self {
            version: RECORD_VERSION,
            saved_at: Utc::now(),
            lines: snapshot.lines().to_vec(),
        }
    }

    /// Rebuild the snapshot. Totals are re-derived from the lines.
    #[must_use]
    pub fn into_snapshot(self) -> CartSnapshot {
        CartSnapshot::from_lines(self.lines)
    }

    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialize`] if encoding fails.
    pub fn encode(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(StoreError::Serialize)
    }

    /// Decode a JSON record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the record does not parse or has an
    /// unsupported version.
    pub fn decode(raw: &str) -> Result<Self, StoreError> {
        let record: Self =
            serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if record.version != RECORD_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported record version {}",
                record.version
            )));
        }
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;

    use ebasi_core::ProductId;
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_record_rederives_totals() {
        let snapshot = CartSnapshot::from_server(
            [CartLine::new(
                ProductId::parse("SKU-1").unwrap(),
                "Saree",
                Decimal::new(100, 0),
                NonZeroU32::new(2).unwrap(),
            )],
            Some(Decimal::new(150, 0)),
        );

        let raw = PersistedCart::from_snapshot(&snapshot).encode().unwrap();
        let restored = PersistedCart::decode(&raw).unwrap().into_snapshot();

        assert_eq!(restored.lines(), snapshot.lines());
        assert_eq!(restored.quoted_total(), None);
        assert_eq!(restored.total(), Decimal::new(200, 0));
    }

    #[test]
    fn test_decode_rejects_garbage_and_versions() {
        assert!(matches!(
            PersistedCart::decode("not json"),
            Err(StoreError::Corrupt(_))
        ));

        let future = r#"{"version": 99, "saved_at": "2026-01-01T00:00:00Z", "lines": []}"#;
        assert!(matches!(
            PersistedCart::decode(future),
            Err(StoreError::Corrupt(_))
        ));
    }
}
