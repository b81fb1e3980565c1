//! In-memory gateway for exercising the cart engine without a backend.
//!
//! [`ScriptedGateway`] keeps one server cart per user and applies calls the
//! way the storefront backend does: products come from a catalog, adds merge
//! by product, and every cart-returning call answers with the full cart and
//! its total. Calls can be made to fail, and replies can be held back and
//! released in any order to reproduce out-of-order network responses.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ebasi_core::{ProductId, UserId};
use rust_decimal::Decimal;
use tokio::sync::{oneshot, watch};

use crate::cart::{CartLine, CartSnapshot, LineKey, Product, QuantityChange};
use crate::gateway::{CartGateway, GatewayError};
use crate::machine::RemoteCall;
use crate::session::Credential;

/// A call the gateway received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub user_id: UserId,
    pub call: RemoteCall,
}

/// Scriptable in-memory [`CartGateway`].
///
/// Cheaply cloneable; clones share the same server state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    inner: Arc<ScriptedInner>,
}

#[derive(Debug)]
struct ScriptedInner {
    state: Mutex<ServerState>,
    held: watch::Sender<usize>,
}

impl Default for ScriptedInner {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            held: watch::channel(0).0,
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    catalog: HashMap<ProductId, Product>,
    carts: HashMap<UserId, CartSnapshot>,
    calls: Vec<RecordedCall>,
    failing: bool,
    quoted_total: Option<Decimal>,
    holding: bool,
    gates: Vec<Option<oneshot::Sender<()>>>,
}

impl ScriptedGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product to the catalog the server adds items from.
    #[must_use]
    pub fn with_product(self, product: Product) -> Self {
        self.state().catalog.insert(product.id.clone(), product);
        self
    }

    /// Replace a user's server cart.
    pub fn seed_cart(&self, user_id: &UserId, lines: impl IntoIterator<Item = CartLine>) {
        self.state()
            .carts
            .insert(user_id.clone(), CartSnapshot::from_lines(lines));
    }

    /// A user's server cart as the server would return it.
    #[must_use]
    pub fn server_cart(&self, user_id: &UserId) -> CartSnapshot {
        self.state().reply(user_id)
    }

    /// Make every subsequent call fail.
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Override the total the server quotes. `None` quotes the subtotal.
    pub fn set_quoted_total(&self, total: Option<Decimal>) {
        self.state().quoted_total = total;
    }

    /// Hold every subsequent reply until released.
    ///
    /// Held calls are applied to the server cart on arrival; only the reply
    /// is delayed.
    pub fn hold_replies(&self, holding: bool) {
        self.state().holding = holding;
    }

    /// Wait until at least `count` replies are being held.
    pub async fn wait_for_held(&self, count: usize) {
        let mut held = self.inner.held.subscribe();
        // The sender lives as long as `self`, so this cannot close.
        let _ = held.wait_for(|n| *n >= count).await;
    }

    /// Release the reply of the `index`th held call (in arrival order).
    /// Returns `false` if there is no such call or it was already released.
    pub fn release(&self, index: usize) -> bool {
        let gate = self.state().gates.get_mut(index).and_then(Option::take);
        gate.is_some_and(|gate| gate.send(()).is_ok())
    }

    /// Release every held reply in arrival order.
    pub fn release_all(&self) {
        let gates = std::mem::take(&mut self.state().gates);
        for gate in gates.into_iter().flatten() {
            let _ = gate.send(());
        }
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Operation names of every call received so far.
    #[must_use]
    pub fn call_names(&self) -> Vec<&'static str> {
        self.state().calls.iter().map(|c| c.call.name()).collect()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, apply it, then hold the reply if asked to.
    async fn respond<T>(
        &self,
        credential: &Credential,
        call: RemoteCall,
        apply: impl FnOnce(&mut ServerState, &UserId) -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let (result, gate) = {
            let mut state = self.state();
            state.calls.push(RecordedCall {
                user_id: credential.user_id.clone(),
                call,
            });
            let result = if state.failing {
                Err(GatewayError::Unavailable("scripted failure".to_string()))
            } else {
                apply(&mut *state, &credential.user_id)
            };
            let gate = state.holding.then(|| {
                let (tx, rx) = oneshot::channel();
                state.gates.push(Some(tx));
                rx
            });
            (result, gate)
        };

        if let Some(gate) = gate {
            self.inner.held.send_modify(|n| *n += 1);
            let _ = gate.await;
        }
        result
    }
}

impl ServerState {
    fn cart(&mut self, user_id: &UserId) -> &mut CartSnapshot {
        self.carts.entry(user_id.clone()).or_default()
    }

    fn reply(&self, user_id: &UserId) -> CartSnapshot {
        let cart = self.carts.get(user_id).cloned().unwrap_or_default();
        let total = self.quoted_total.unwrap_or_else(|| cart.subtotal());
        CartSnapshot::from_server(cart.lines().to_vec(), Some(total))
    }
}

fn not_found(product_id: &ProductId) -> GatewayError {
    GatewayError::NotFound(format!("cart item {product_id}"))
}

impl CartGateway for ScriptedGateway {
    async fn fetch_cart(&self, credential: &Credential) -> Result<CartSnapshot, GatewayError> {
        self.respond(credential, RemoteCall::Fetch, |state, user| Ok(state.reply(user)))
            .await
    }

    async fn add_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot, GatewayError> {
        let call = RemoteCall::AddItem {
            product_id: product_id.clone(),
            quantity,
        };
        self.respond(credential, call, |state, user| {
            let product = state
                .catalog
                .get(product_id)
                .cloned()
                .ok_or_else(|| GatewayError::NotFound(format!("product {product_id}")))?;
            let quantity = NonZeroU32::new(quantity).ok_or_else(|| GatewayError::Status {
                status: 400,
                body: "quantity must be positive".to_string(),
            })?;
            state
                .cart(user)
                .add(CartLine::from_product(&product, quantity, None, None));
            Ok(state.reply(user))
        })
        .await
    }

    async fn update_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot, GatewayError> {
        let call = RemoteCall::UpdateItem {
            product_id: product_id.clone(),
            quantity,
        };
        self.respond(credential, call, |state, user| {
            let key = LineKey::new(product_id.clone());
            match state.cart(user).set_quantity(&key, i64::from(quantity)) {
                QuantityChange::Missing => Err(not_found(product_id)),
                QuantityChange::Updated | QuantityChange::Removed => Ok(state.reply(user)),
            }
        })
        .await
    }

    async fn remove_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
    ) -> Result<(), GatewayError> {
        let call = RemoteCall::RemoveItem {
            product_id: product_id.clone(),
        };
        self.respond(credential, call, |state, user| {
            let key = LineKey::new(product_id.clone());
            if state.cart(user).remove(&key) {
                Ok(())
            } else {
                Err(not_found(product_id))
            }
        })
        .await
    }

    async fn clear_cart(&self, credential: &Credential) -> Result<(), GatewayError> {
        self.respond(credential, RemoteCall::Clear, |state, user| {
            state.cart(user).clear();
            Ok(())
        })
        .await
    }
}
