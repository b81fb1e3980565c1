//! Cart data model.
//!
//! - [`CartLine`] - one purchasable selection, identified by [`LineKey`]
//! - [`CartSnapshot`] - the ordered line set with derived totals
//! - [`CartSummary`] - checkout breakdown derived from a snapshot

mod line;
mod snapshot;
mod summary;

pub use line::{CartLine, LineKey, PLACEHOLDER_IMAGE, Product};
pub use snapshot::{CartSnapshot, QuantityChange};
pub use summary::{CartSummary, PricingRules};
