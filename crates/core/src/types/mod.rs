//! Core types for Ebasi.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod price;
pub mod status;

pub use id::{ProductId, ProductIdError, UserId};
pub use price::{CurrencyCode, Price};
pub use status::StockStatus;
