//! Remote Cart Gateway: the narrow interface to the backend cart resource.
//!
//! # Architecture
//!
//! - [`CartGateway`] is the seam the cart engine is generic over
//! - [`HttpCartGateway`] talks to the storefront backend over `reqwest`
//! - Every call requires a [`Credential`]; anonymous carts never reach the
//!   gateway
//!
//! # Example
//!
//! ```rust,ignore
//! use ebasi_storefront::gateway::{CartGateway, HttpCartGateway};
//!
//! let gateway = HttpCartGateway::new(&config.api_base_url);
//! let cart = gateway.fetch_cart(&credential).await?;
//! let cart = gateway.add_item(&credential, &product_id, 2).await?;
//! ```

mod http;
mod wire;

use std::future::Future;
use std::sync::Arc;

use ebasi_core::ProductId;
use thiserror::Error;

use crate::cart::CartSnapshot;
use crate::session::Credential;

pub use http::HttpCartGateway;

/// Errors that can occur when talking to the backend cart.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed (connection refused, timeout, TLS, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("Backend returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// Backend rejected the credential.
    #[error("Unauthorized: backend rejected the credential")]
    Unauthorized,

    /// Cart or cart item not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Gateway could not be reached for another reason.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// Operations on the authenticated user's server-held cart.
///
/// Each call may fail or never resolve; callers treat the returned snapshot
/// as canonical and replace their local state with it wholesale.
pub trait CartGateway: Send + Sync + 'static {
    /// Fetch the canonical server cart.
    fn fetch_cart(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<CartSnapshot, GatewayError>> + Send;

    /// Add `quantity` units of a product (the server merges with an
    /// existing item).
    fn add_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<CartSnapshot, GatewayError>> + Send;

    /// Set the absolute quantity of a product.
    fn update_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<CartSnapshot, GatewayError>> + Send;

    /// Remove a product from the cart.
    fn remove_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Remove every item from the cart.
    fn clear_cart(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

impl<G: CartGateway> CartGateway for Arc<G> {
    fn fetch_cart(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<CartSnapshot, GatewayError>> + Send {
        (**self).fetch_cart(credential)
    }

    fn add_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<CartSnapshot, GatewayError>> + Send {
        (**self).add_item(credential, product_id, quantity)
    }

    fn update_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<CartSnapshot, GatewayError>> + Send {
        (**self).update_item(credential, product_id, quantity)
    }

    fn remove_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send {
        (**self).remove_item(credential, product_id)
    }

    fn clear_cart(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send {
        (**self).clear_cart(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "Backend returned HTTP 502: bad gateway");

        let err = GatewayError::NotFound("cart item 42".to_string());
        assert_eq!(err.to_string(), "Not found: cart item 42");
    }
}
