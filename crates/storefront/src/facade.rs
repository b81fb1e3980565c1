//! Cart facade: the single entry point UI code talks to.
//!
//! [`Cart`] wraps the [`CartStateMachine`] and executes the effects it asks
//! for. Local store reads and writes happen inline; gateway calls run as
//! background Tokio tasks whose replies are fed back through
//! [`CartStateMachine::reconcile`]. Callers never see a `Result`: every
//! operation returns the snapshot as it stands right after the optimistic
//! update, and failures surface as [`CartNotice::SyncFailed`] plus the
//! `degraded` flag on [`CartStatus`].
//!
//! # Example
//!
//! ```rust,ignore
//! let session = SessionObserver::new(config.identity());
//! let cart = Cart::new(gateway, store, config.stale_responses);
//! let _follower = cart.follow_session(&session);
//!
//! cart.add(&product, 1, None, None);
//! cart.settle().await;
//! ```

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ebasi_core::ProductId;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::cart::{CartLine, CartSnapshot, CartSummary, LineKey, PricingRules, Product};
use crate::error::{self, CartError};
use crate::gateway::{CartGateway, GatewayError};
use crate::machine::{
    CartStateMachine, CartStatus, CartView, Effect, Mutation, Phase, RemoteCall, RemoteRequest,
    Reply, StaleResponsePolicy,
};
use crate::session::{AuthIdentity, Credential, SessionObserver};
use crate::store::CartStore;

/// Capacity of the notice channel. Slow subscribers miss old notices.
const NOTICE_CAPACITY: usize = 64;

/// User-facing cart events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartNotice {
    /// A product was added (fired on the optimistic update).
    ItemAdded {
        product_id: ProductId,
        name: String,
        unit_price: Decimal,
        quantity: u32,
    },
    /// A gateway call failed; the cart kept its optimistic state.
    SyncFailed {
        operation: &'static str,
        message: String,
    },
}

/// Handle to the cart engine.
///
/// Cheaply cloneable; clones share the same cart.
pub struct Cart<G, S> {
    inner: Arc<CartInner<G, S>>,
}

struct CartInner<G, S> {
    machine: Mutex<CartStateMachine>,
    gateway: G,
    store: S,
    view: watch::Sender<CartView>,
    notices: broadcast::Sender<CartNotice>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Session being followed. Unseen identities are applied before any
    /// other transition runs.
    session: Mutex<Option<watch::Receiver<AuthIdentity>>>,
}

impl<G, S> Clone for Cart<G, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G, S> std::fmt::Debug for Cart<G, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cart")
            .field("status", &self.inner.view.borrow().status)
            .finish_non_exhaustive()
    }
}

impl<G: CartGateway, S: CartStore> Cart<G, S> {
    /// Create an inactive cart. Nothing happens until it is activated.
    #[must_use]
    pub fn new(gateway: G, store: S, stale_responses: StaleResponsePolicy) -> Self {
        let machine = CartStateMachine::new(stale_responses);
        let (view, _) = watch::channel(machine.view());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            inner: Arc::new(CartInner {
                machine: Mutex::new(machine),
                gateway,
                store,
                view,
                notices,
                tasks: Mutex::new(Vec::new()),
                session: Mutex::new(None),
            }),
        }
    }

    /// Create a cart and activate it with `identity`.
    ///
    /// # Panics
    ///
    /// Panics if `identity` is authenticated and no Tokio runtime is running.
    #[must_use]
    pub fn start(
        gateway: G,
        store: S,
        stale_responses: StaleResponsePolicy,
        identity: &AuthIdentity,
    ) -> Self {
        let cart = Self::new(gateway, store, stale_responses);
        cart.activate(identity);
        cart
    }

    /// First activation: load the local record or fetch the server cart.
    pub fn activate(&self, identity: &AuthIdentity) -> CartSnapshot {
        track_sentry_user(identity);
        self.dispatch(|machine| machine.activate(identity))
    }

    /// React to an identity reported by the session.
    ///
    /// Signing in replaces the cart with the server's, signing out discards
    /// it, and a token refresh for the same user only swaps the credential.
    #[instrument(skip_all, fields(authenticated = identity.is_authenticated()))]
    pub fn handle_identity(&self, identity: &AuthIdentity) -> CartSnapshot {
        track_sentry_user(identity);
        self.dispatch(|machine| machine.identity_changed(identity))
    }

    /// Follow the session's identity until the observer is dropped.
    ///
    /// The current identity is applied immediately. Later transitions are
    /// applied by the next cart operation or read, whichever comes first,
    /// so a mutation issued right after `sign_in`/`sign_out` already runs
    /// under the new identity. The returned task applies transitions that
    /// happen while the cart is idle.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn follow_session(&self, session: &SessionObserver) -> JoinHandle<()> {
        let mut wakeups = session.subscribe();
        let mut identities = session.subscribe();
        let current = identities.borrow_and_update().clone();
        *self.session() = Some(identities);
        self.handle_identity(&current);

        let cart = self.clone();
        tokio::spawn(async move {
            while wakeups.changed().await.is_ok() {
                cart.catch_up_identity();
            }
            debug!("Session observer closed, no longer following identity");
        })
    }

    /// Add `quantity` units of a product. Zero is a no-op.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub fn add(
        &self,
        product: &Product,
        quantity: u32,
        color: Option<String>,
        size: Option<String>,
    ) -> CartSnapshot {
        let Some(quantity) = NonZeroU32::new(quantity) else {
            debug!("Ignoring add with zero quantity");
            return self.snapshot();
        };

        let line = CartLine::from_product(product, quantity, color, size);
        let notice = CartNotice::ItemAdded {
            product_id: line.product_id.clone(),
            name: line.name.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity(),
        };
        error::add_breadcrumb(
            "cart",
            "Added item",
            Some(&[("product_id", product.id.as_str())][..]),
        );

        if self.status().phase != Phase::Uninitialized {
            // No subscribers is fine.
            let _ = self.inner.notices.send(notice);
        }
        self.dispatch(|machine| machine.apply(Mutation::Add(line)))
    }

    /// Remove a line. Absent lines are a no-op.
    #[instrument(skip(self), fields(line = %key))]
    pub fn remove(&self, key: &LineKey) -> CartSnapshot {
        error::add_breadcrumb(
            "cart",
            "Removed item",
            Some(&[("product_id", key.product_id.as_str())][..]),
        );
        self.dispatch(|machine| machine.apply(Mutation::Remove(key.clone())))
    }

    /// Set a line's quantity. Zero or below removes it.
    #[instrument(skip(self), fields(line = %key))]
    pub fn set_quantity(&self, key: &LineKey, quantity: i64) -> CartSnapshot {
        self.dispatch(|machine| {
            machine.apply(Mutation::SetQuantity {
                key: key.clone(),
                quantity,
            })
        })
    }

    /// Empty the cart.
    #[instrument(skip(self))]
    pub fn clear(&self) -> CartSnapshot {
        error::add_breadcrumb("cart", "Cleared cart", None);
        self.dispatch(|machine| machine.apply(Mutation::Clear))
    }

    /// Reload from the authoritative source for the current mode.
    ///
    /// Returns the interim snapshot; the reloaded one arrives through
    /// [`Cart::subscribe`] (or after [`Cart::settle`]).
    #[instrument(skip(self))]
    pub fn sync(&self) -> CartSnapshot {
        self.dispatch(CartStateMachine::sync)
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.catch_up_identity();
        self.inner.view.borrow().snapshot.clone()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> CartStatus {
        self.catch_up_identity();
        self.inner.view.borrow().status
    }

    /// Current snapshot and status together.
    #[must_use]
    pub fn view(&self) -> CartView {
        self.catch_up_identity();
        self.inner.view.borrow().clone()
    }

    /// Checkout breakdown of the current snapshot.
    #[must_use]
    pub fn summary(&self, rules: &PricingRules) -> CartSummary {
        self.catch_up_identity();
        CartSummary::from_snapshot(&self.inner.view.borrow().snapshot, rules)
    }

    /// Observe every published snapshot and status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartView> {
        self.inner.view.subscribe()
    }

    /// Observe user-facing notices.
    #[must_use]
    pub fn notices(&self) -> broadcast::Receiver<CartNotice> {
        self.inner.notices.subscribe()
    }

    /// Wait until every gateway call issued so far has been reconciled.
    pub async fn settle(&self) {
        loop {
            let pending = std::mem::take(&mut *self.tasks());
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Cart sync task ended abnormally");
                }
            }
        }
    }

    /// Apply a session transition the cart has not seen yet, if any.
    fn catch_up_identity(&self) {
        let pending = self
            .session()
            .as_ref()
            .is_some_and(|identities| identities.has_changed().unwrap_or(false));
        if pending {
            self.dispatch(|_| Effect::None);
        }
    }

    /// Take the followed session's identity if it changed since last seen.
    fn unseen_identity(&self) -> Option<AuthIdentity> {
        let mut session = self.session();
        let identities = session.as_mut()?;
        if !identities.has_changed().unwrap_or(false) {
            return None;
        }
        Some(identities.borrow_and_update().clone())
    }

    /// Run a transition and execute its effect.
    ///
    /// A pending session transition is applied first, under the same lock,
    /// so the transition never runs against a stale identity. The view is
    /// published under the machine lock so subscribers observe transitions
    /// in order, and after any gateway task is tracked so that
    /// [`Cart::settle`] never misses a call a subscriber has already seen.
    fn dispatch(&self, transition: impl FnOnce(&mut CartStateMachine) -> Effect) -> CartSnapshot {
        let mut machine = self.machine();
        self.apply_unseen_identity(&mut machine);

        let effect = transition(&mut machine);
        self.execute(&mut machine, effect);

        let view = machine.view();
        let snapshot = view.snapshot.clone();
        self.inner.view.send_replace(view);
        snapshot
    }

    fn apply_unseen_identity(&self, machine: &mut CartStateMachine) {
        if let Some(identity) = self.unseen_identity() {
            debug!(
                authenticated = identity.is_authenticated(),
                "Applying session transition"
            );
            track_sentry_user(&identity);
            let effect = machine.identity_changed(&identity);
            self.execute(machine, effect);
        }
    }

    fn execute(&self, machine: &mut CartStateMachine, effect: Effect) {
        if let Some(request) = self.run_local_effect(machine, effect) {
            self.spawn_remote(request);
        }
    }

    /// Execute store effects inline. Returns the gateway call to issue, if any.
    fn run_local_effect(
        &self,
        machine: &mut CartStateMachine,
        effect: Effect,
    ) -> Option<RemoteRequest> {
        match effect {
            Effect::None => None,
            Effect::LoadLocal => {
                let loaded = self.inner.store.load().unwrap_or_else(|e| {
                    error::report_failure("load_local_cart", &CartError::from(e));
                    None
                });
                machine.finish_local_load(loaded);
                None
            }
            Effect::Persist(snapshot) => {
                if let Err(e) = self.inner.store.save(&snapshot) {
                    error::report_failure("save_local_cart", &CartError::from(e));
                }
                None
            }
            Effect::Remote(request) => Some(request),
        }
    }

    fn spawn_remote(&self, request: RemoteRequest) {
        let cart = self.clone();
        let handle = tokio::spawn(async move { cart.complete_remote(request).await });

        let mut tasks = self.tasks();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    async fn complete_remote(&self, request: RemoteRequest) {
        let RemoteRequest {
            epoch,
            credential,
            call,
        } = request;

        let reply = match execute_call(&self.inner.gateway, &credential, &call).await {
            Ok(Some(snapshot)) => Reply::Snapshot(snapshot),
            Ok(None) => Reply::Acknowledged,
            Err(e) => {
                let message = error::report_failure(call.name(), &CartError::from(e));
                let _ = self.inner.notices.send(CartNotice::SyncFailed {
                    operation: call.name(),
                    message,
                });
                Reply::Failed
            }
        };

        let mut machine = self.machine();
        self.apply_unseen_identity(&mut machine);
        let outcome = machine.reconcile(epoch, &call, reply);
        debug!(call = call.name(), epoch = epoch.get(), ?outcome, "Reconciled gateway reply");
        self.inner.view.send_replace(machine.view());
    }

    fn machine(&self) -> MutexGuard<'_, CartStateMachine> {
        self.inner
            .machine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> MutexGuard<'_, Option<watch::Receiver<AuthIdentity>>> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Issue one gateway call. `Ok(None)` means the call returns no cart.
async fn execute_call<G: CartGateway>(
    gateway: &G,
    credential: &Credential,
    call: &RemoteCall,
) -> Result<Option<CartSnapshot>, GatewayError> {
    match call {
        RemoteCall::Fetch => gateway.fetch_cart(credential).await.map(Some),
        RemoteCall::AddItem {
            product_id,
            quantity,
        } => gateway
            .add_item(credential, product_id, *quantity)
            .await
            .map(Some),
        RemoteCall::UpdateItem {
            product_id,
            quantity,
        } => gateway
            .update_item(credential, product_id, *quantity)
            .await
            .map(Some),
        RemoteCall::RemoveItem { product_id } => {
            gateway.remove_item(credential, product_id).await?;
            gateway.fetch_cart(credential).await.map(Some)
        }
        RemoteCall::Clear => gateway.clear_cart(credential).await.map(|()| None),
    }
}

fn track_sentry_user(identity: &AuthIdentity) {
    match identity.user_id() {
        Some(user_id) => error::set_sentry_user(user_id),
        None => error::clear_sentry_user(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ebasi_core::{StockStatus, UserId};
    use secrecy::SecretString;

    use super::*;
    use crate::machine::CartMode;
    use crate::store::MemoryStore;
    use crate::testing::ScriptedGateway;

    fn product(id: &str, price: i64) -> Product {
        Product {
            id: ProductId::parse(id).unwrap(),
            name: format!("Product {id}"),
            price: Decimal::new(price, 0),
            compare_price: None,
            image: None,
            stock_status: StockStatus::InStock,
        }
    }

    fn key(id: &str) -> LineKey {
        LineKey::new(ProductId::parse(id).unwrap())
    }

    fn signed_in(user: &str) -> AuthIdentity {
        AuthIdentity::Authenticated(Credential::new(
            UserId::new(user),
            SecretString::from("4f9a0c2e7b1d58e3a6c9"),
        ))
    }

    fn local_cart(store: MemoryStore) -> Cart<ScriptedGateway, MemoryStore> {
        Cart::start(
            ScriptedGateway::new(),
            store,
            StaleResponsePolicy::Discard,
            &AuthIdentity::Anonymous,
        )
    }

    #[tokio::test]
    async fn test_local_add_persists_and_notifies() {
        let cart = local_cart(MemoryStore::new());
        let mut notices = cart.notices();

        let snapshot = cart.add(&product("SKU-1", 100), 2, None, None);

        assert_eq!(snapshot.item_count(), 2);
        assert_eq!(cart.inner.store.save_count(), 1);
        assert_eq!(cart.inner.store.load().unwrap().unwrap(), snapshot);
        assert!(matches!(
            notices.try_recv().unwrap(),
            CartNotice::ItemAdded { quantity: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_zero_quantity_add_is_noop() {
        let cart = local_cart(MemoryStore::new());

        let snapshot = cart.add(&product("SKU-1", 100), 0, None, None);

        assert!(snapshot.is_empty());
        assert_eq!(cart.inner.store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_cold_start_restores_local_record() {
        let stored = CartSnapshot::from_lines([CartLine::from_product(
            &product("SKU-1", 100),
            NonZeroU32::new(3).unwrap(),
            None,
            None,
        )]);
        let cart = local_cart(MemoryStore::with_snapshot(&stored).unwrap());

        assert_eq!(cart.snapshot(), stored);
        assert_eq!(cart.status().phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_not_fatal() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let cart = local_cart(store);

        let snapshot = cart.add(&product("SKU-1", 100), 1, None, None);

        assert_eq!(snapshot.item_count(), 1);
        assert_eq!(cart.status().phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_remote_add_reconciles_with_server_snapshot() {
        let gateway = ScriptedGateway::new().with_product(product("SKU-1", 50));
        gateway.set_quoted_total(Some(Decimal::new(90, 0)));
        let cart = Cart::start(
            gateway.clone(),
            MemoryStore::new(),
            StaleResponsePolicy::Discard,
            &signed_in("asha"),
        );

        let optimistic = cart.add(&product("SKU-1", 50), 2, None, None);
        assert_eq!(optimistic.total(), Decimal::new(100, 0));

        cart.settle().await;

        assert_eq!(cart.snapshot().total(), Decimal::new(90, 0));
        assert_eq!(cart.snapshot().item_count(), 2);
        assert_eq!(cart.inner.store.save_count(), 0);
        assert_eq!(gateway.call_names(), vec!["fetch_cart", "add_item"]);
    }

    #[tokio::test]
    async fn test_gateway_failure_degrades_and_notifies() {
        let gateway = ScriptedGateway::new();
        let cart = Cart::start(
            gateway.clone(),
            MemoryStore::new(),
            StaleResponsePolicy::Discard,
            &signed_in("asha"),
        );
        cart.settle().await;

        let mut notices = cart.notices();
        gateway.set_failing(true);
        cart.add(&product("SKU-1", 50), 1, None, None);
        cart.settle().await;

        assert_eq!(cart.snapshot().item_count(), 1);
        assert!(cart.status().degraded);
        assert!(matches!(notices.try_recv().unwrap(), CartNotice::ItemAdded { .. }));
        assert!(matches!(
            notices.try_recv().unwrap(),
            CartNotice::SyncFailed { operation: "add_item", .. }
        ));
    }

    #[tokio::test]
    async fn test_remove_refetches() {
        let gateway = ScriptedGateway::new().with_product(product("SKU-1", 50));
        let cart = Cart::start(
            gateway.clone(),
            MemoryStore::new(),
            StaleResponsePolicy::Discard,
            &signed_in("asha"),
        );
        cart.add(&product("SKU-1", 50), 1, None, None);
        cart.settle().await;

        cart.remove(&key("SKU-1"));
        cart.settle().await;

        assert!(cart.snapshot().is_empty());
        assert_eq!(
            gateway.call_names(),
            vec!["fetch_cart", "add_item", "remove_item", "fetch_cart"]
        );
    }

    #[tokio::test]
    async fn test_follow_session_switches_modes() {
        let gateway = ScriptedGateway::new();
        let session = SessionObserver::default();
        let cart = Cart::new(gateway.clone(), MemoryStore::new(), StaleResponsePolicy::Discard);
        let follower = cart.follow_session(&session);
        assert_eq!(cart.status().mode, CartMode::Local);

        let mut views = cart.subscribe();
        session.sign_in(Credential::new(
            UserId::new("asha"),
            SecretString::from("4f9a0c2e7b1d58e3a6c9"),
        ));
        views
            .wait_for(|view| view.status.mode == CartMode::Remote)
            .await
            .unwrap();
        cart.settle().await;
        assert_eq!(cart.status().phase, Phase::Ready);

        session.sign_out();
        views
            .wait_for(|view| view.status.mode == CartMode::Local)
            .await
            .unwrap();
        assert!(cart.snapshot().is_empty());

        drop(session);
        follower.await.unwrap();
    }

    #[tokio::test]
    async fn test_mutation_after_sign_out_runs_locally() {
        let gateway = ScriptedGateway::new().with_product(product("SKU-1", 50));
        let session = SessionObserver::new(signed_in("asha"));
        let cart = Cart::new(gateway.clone(), MemoryStore::new(), StaleResponsePolicy::Discard);
        let follower = cart.follow_session(&session);
        cart.settle().await;

        session.sign_out();
        let snapshot = cart.add(&product("SKU-1", 50), 1, None, None);
        cart.settle().await;

        assert_eq!(snapshot.item_count(), 1);
        assert_eq!(cart.status().mode, CartMode::Local);
        assert_eq!(gateway.call_names(), vec!["fetch_cart"]);
        assert_eq!(cart.inner.store.save_count(), 1);

        drop(session);
        follower.await.unwrap();
    }
}
