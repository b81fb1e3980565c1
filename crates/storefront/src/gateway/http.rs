//! HTTP implementation of the Remote Cart Gateway.
//!
//! Talks JSON to the storefront backend's `/orders/cart/` resource using
//! `reqwest`. Every request carries the caller's token and a fresh request id.

use std::sync::Arc;

use ebasi_core::ProductId;
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::wire::{AddItemBody, UpdateItemBody, WireCart, WireId};
use super::{CartGateway, GatewayError};
use crate::cart::CartSnapshot;
use crate::session::Credential;

/// Maximum number of response body characters kept for diagnostics.
const BODY_PREVIEW_CHARS: usize = 200;

/// Client for the backend cart API.
///
/// Cheaply cloneable; clones share one connection pool.
#[derive(Clone)]
pub struct HttpCartGateway {
    inner: Arc<HttpCartGatewayInner>,
}

struct HttpCartGatewayInner {
    client: reqwest::Client,
    /// API base without trailing slash, e.g. `http://127.0.0.1:8000/api/v1`.
    base_url: String,
}

impl std::fmt::Debug for HttpCartGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCartGateway")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpCartGateway {
    /// Create a gateway for the given API base URL.
    #[must_use]
    pub fn new(base_url: &url::Url) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a gateway reusing an existing `reqwest` client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &url::Url) -> Self {
        Self {
            inner: Arc::new(HttpCartGatewayInner {
                client,
                base_url: base_url.as_str().trim_end_matches('/').to_string(),
            }),
        }
    }

    fn cart_url(&self) -> String {
        format!("{}/orders/cart/", self.inner.base_url)
    }

    fn item_url(&self, product_id: &ProductId) -> String {
        format!("{}/orders/cart/item/{product_id}/", self.inner.base_url)
    }

    /// Send a request and return the response body of a successful call.
    async fn execute<B: Serialize + Sync>(
        &self,
        method: Method,
        url: &str,
        credential: &Credential,
        body: Option<&B>,
    ) -> Result<String, GatewayError> {
        let request_id = Uuid::new_v4();
        let mut request = self
            .inner
            .client
            .request(method.clone(), url)
            .header("Authorization", credential.authorization_header())
            .header("Content-Type", "application/json")
            .header("X-Request-Id", request_id.to_string());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        debug!(%method, url, %status, %request_id, "Cart API response");

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GatewayError::Unauthorized);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let preview: String = response_text.chars().take(BODY_PREVIEW_CHARS).collect();
            tracing::error!(
                status = %status,
                body = %preview,
                %request_id,
                "Cart API returned non-success status"
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }

        Ok(response_text)
    }

    async fn execute_cart<B: Serialize + Sync>(
        &self,
        method: Method,
        url: &str,
        credential: &Credential,
        body: Option<&B>,
    ) -> Result<CartSnapshot, GatewayError> {
        let text = self.execute(method, url, credential, body).await?;
        let cart: WireCart = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(BODY_PREVIEW_CHARS).collect::<String>(),
                "Failed to parse cart response"
            );
            GatewayError::Parse(e)
        })?;
        Ok(cart.into_snapshot())
    }
}

impl CartGateway for HttpCartGateway {
    #[instrument(skip(self, credential), fields(user_id = %credential.user_id))]
    async fn fetch_cart(&self, credential: &Credential) -> Result<CartSnapshot, GatewayError> {
        self.execute_cart::<()>(Method::GET, &self.cart_url(), credential, None)
            .await
    }

    #[instrument(skip(self, credential), fields(user_id = %credential.user_id))]
    async fn add_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot, GatewayError> {
        let body = AddItemBody {
            product_id: WireId::from(product_id),
            quantity,
        };
        self.execute_cart(Method::POST, &self.cart_url(), credential, Some(&body))
            .await
    }

    #[instrument(skip(self, credential), fields(user_id = %credential.user_id))]
    async fn update_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot, GatewayError> {
        let body = UpdateItemBody { quantity };
        self.execute_cart(Method::PATCH, &self.item_url(product_id), credential, Some(&body))
            .await
    }

    #[instrument(skip(self, credential), fields(user_id = %credential.user_id))]
    async fn remove_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
    ) -> Result<(), GatewayError> {
        self.execute::<()>(Method::DELETE, &self.item_url(product_id), credential, None)
            .await
            .map(drop)
    }

    #[instrument(skip(self, credential), fields(user_id = %credential.user_id))]
    async fn clear_cart(&self, credential: &Credential) -> Result<(), GatewayError> {
        self.execute::<()>(Method::DELETE, &self.cart_url(), credential, None)
            .await
            .map(drop)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_handle_trailing_slash() {
        let with_slash = HttpCartGateway::new(&url::Url::parse("http://api.test/api/v1/").unwrap());
        let without = HttpCartGateway::new(&url::Url::parse("http://api.test/api/v1").unwrap());

        assert_eq!(with_slash.cart_url(), "http://api.test/api/v1/orders/cart/");
        assert_eq!(without.cart_url(), with_slash.cart_url());
        assert_eq!(
            without.item_url(&ProductId::parse("42").unwrap()),
            "http://api.test/api/v1/orders/cart/item/42/"
        );
    }
}
