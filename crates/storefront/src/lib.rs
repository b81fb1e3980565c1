//! Ebasi cart synchronization engine.
//!
//! Keeps a shopping cart consistent across two storage tiers: a local store
//! for anonymous shoppers and the backend cart for signed-in ones. Mutations
//! apply optimistically; server replies replace the cart wholesale.
//!
//! # Architecture
//!
//! - [`cart`] - lines, snapshots and checkout summaries
//! - [`machine`] - pure state machine deciding what every operation does
//! - [`facade`] - [`Cart`], which drives the machine on Tokio
//! - [`gateway`] - backend cart API
//! - [`store`] - local persistence for anonymous carts
//! - [`session`] - identity and the session observer

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod error;
pub mod facade;
pub mod gateway;
pub mod machine;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cart::{CartLine, CartSnapshot, CartSummary, LineKey, PricingRules, Product};
pub use config::CartConfig;
pub use facade::{Cart, CartNotice};
pub use machine::{CartMode, CartStatus, CartView, Phase, StaleResponsePolicy};
pub use session::{AuthIdentity, Credential, SessionObserver};
