//! Integration tests for the Ebasi cart engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p ebasi-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_sync` - cart engine against the in-memory gateway and store
//! - `http_gateway` - HTTP gateway against a mock backend
//!
//! Shared fixtures live here.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use ebasi_core::{ProductId, StockStatus, UserId};
use ebasi_storefront::store::MemoryStore;
use ebasi_storefront::testing::ScriptedGateway;
use ebasi_storefront::{
    AuthIdentity, Cart, CartLine, CartMode, Credential, LineKey, Product, SessionObserver,
    StaleResponsePolicy,
};
use rust_decimal::Decimal;
use secrecy::SecretString;
use tokio::task::JoinHandle;

/// Backend-style token used by every fixture credential.
pub const TOKEN: &str = "4f9a0c2e7b1d58e3a6c9f0b2d4e7a1c3b5d8f026";

/// Cart wired to the in-memory gateway and store.
pub type TestCart = Cart<ScriptedGateway, Arc<MemoryStore>>;

#[must_use]
pub fn product_id(id: &str) -> ProductId {
    ProductId::parse(id).unwrap()
}

#[must_use]
pub fn key(id: &str) -> LineKey {
    LineKey::new(product_id(id))
}

#[must_use]
pub fn product(id: &str, price: i64) -> Product {
    Product {
        id: product_id(id),
        name: format!("Product {id}"),
        price: Decimal::new(price, 0),
        compare_price: None,
        image: None,
        stock_status: StockStatus::InStock,
    }
}

#[must_use]
pub fn line(id: &str, price: i64, quantity: u32) -> CartLine {
    CartLine::from_product(
        &product(id, price),
        std::num::NonZeroU32::new(quantity).unwrap(),
        None,
        None,
    )
}

#[must_use]
pub fn credential(user: &str) -> Credential {
    Credential::new(UserId::new(user), SecretString::from(TOKEN))
}

#[must_use]
pub fn signed_in(user: &str) -> AuthIdentity {
    AuthIdentity::Authenticated(credential(user))
}

/// Gateway whose catalog holds `SKU-1` (100), `SKU-2` (50) and `SKU-3` (10).
#[must_use]
pub fn catalog_gateway() -> ScriptedGateway {
    ScriptedGateway::new()
        .with_product(product("SKU-1", 100))
        .with_product(product("SKU-2", 50))
        .with_product(product("SKU-3", 10))
}

/// A cart following a session, plus handles on everything around it.
pub struct Harness {
    pub gateway: ScriptedGateway,
    pub store: Arc<MemoryStore>,
    pub session: SessionObserver,
    pub cart: TestCart,
    follower: JoinHandle<()>,
}

impl Harness {
    /// Start a harness. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn start(
        gateway: ScriptedGateway,
        store: MemoryStore,
        identity: AuthIdentity,
        stale_responses: StaleResponsePolicy,
    ) -> Self {
        let store = Arc::new(store);
        let session = SessionObserver::new(identity);
        let cart = Cart::new(gateway.clone(), Arc::clone(&store), stale_responses);
        let follower = cart.follow_session(&session);

        Self {
            gateway,
            store,
            session,
            cart,
            follower,
        }
    }

    /// Anonymous shopper with an empty local store.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::start(
            catalog_gateway(),
            MemoryStore::new(),
            AuthIdentity::Anonymous,
            StaleResponsePolicy::Discard,
        )
    }

    /// Signed-in shopper; waits for the initial fetch.
    pub async fn signed_in(user: &str) -> Self {
        let harness = Self::start(
            catalog_gateway(),
            MemoryStore::new(),
            signed_in(user),
            StaleResponsePolicy::Discard,
        );
        harness.cart.settle().await;
        harness
    }

    /// Sign in through the session and wait until the cart has switched.
    pub async fn sign_in(&self, user: &str) {
        let mut views = self.cart.subscribe();
        self.session.sign_in(credential(user));
        views
            .wait_for(|view| view.user_id.as_ref().map(UserId::as_str) == Some(user))
            .await
            .unwrap();
    }

    /// Sign out through the session and wait until the cart is local again.
    pub async fn sign_out(&self) {
        let mut views = self.cart.subscribe();
        self.session.sign_out();
        views
            .wait_for(|view| view.status.mode == CartMode::Local)
            .await
            .unwrap();
    }

    /// Drop the session and wait for the follower to stop.
    pub async fn shutdown(self) {
        self.cart.settle().await;
        drop(self.session);
        self.follower.await.unwrap();
    }
}
