//! Cart state machine.
//!
//! Every operation is a pure transition over `(phase, mode, operation)` that
//! mutates the in-memory snapshot and returns an [`Effect`] describing the
//! I/O the driver must perform. The machine itself never touches the network
//! or storage, so the synchronization policy is testable without either.
//!
//! # States
//!
//! ```text
//! Uninitialized ──activate──▶ Loading ──reply──▶ Ready
//!                                ▲                 │
//!                                └──sync / login───┘
//! ```
//!
//! `Ready` runs in [`CartMode::Local`] (no identity, persisted to the local
//! store) or [`CartMode::Remote`] (identity present, gateway authoritative).
//!
//! # Reconciliation policy
//!
//! Remote-mode mutations are applied optimistically. A successful gateway
//! reply replaces the whole snapshot (last network response wins, never a
//! field-level merge). A failed reply leaves the optimistic state in place
//! with no compensating rollback and marks the cart degraded until the next
//! successful reconciliation.
//!
//! Identity transitions bump an epoch. With [`StaleResponsePolicy::Discard`]
//! replies to calls issued under an earlier epoch are dropped on arrival.

use ebasi_core::{ProductId, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cart::{CartLine, CartSnapshot, LineKey, QuantityChange};
use crate::session::{AuthIdentity, Credential};

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    Loading,
    Ready,
}

/// Where the cart treats state as authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartMode {
    /// No identity: in-memory snapshot mirrored to the local store.
    Local,
    /// Identity present: server cart is authoritative.
    Remote,
}

/// What to do with gateway replies issued under a previous identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleResponsePolicy {
    /// Drop them on arrival.
    #[default]
    Discard,
    /// Apply them like any other reply (last response wins across identities).
    Apply,
}

impl std::str::FromStr for StaleResponsePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discard" => Ok(Self::Discard),
            "apply" => Ok(Self::Apply),
            _ => Err(format!("invalid stale response policy: {s} (expected discard or apply)")),
        }
    }
}

/// Observable status of the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartStatus {
    pub phase: Phase,
    pub mode: CartMode,
    /// A gateway call failed since the last successful reconciliation.
    pub degraded: bool,
}

/// Snapshot plus status, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartView {
    pub snapshot: CartSnapshot,
    pub status: CartStatus,
    /// User the cart is acting for, `None` in local mode.
    pub user_id: Option<UserId>,
}

/// Identity epoch. Bumped on every identity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// A caller intent against the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Add a line, merging with an existing line of the same key.
    Add(CartLine),
    /// Remove a line if present.
    Remove(LineKey),
    /// Set an absolute quantity; zero or below removes the line.
    SetQuantity { key: LineKey, quantity: i64 },
    /// Empty the cart.
    Clear,
}

/// A gateway call the driver must issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Fetch,
    AddItem { product_id: ProductId, quantity: u32 },
    UpdateItem { product_id: ProductId, quantity: u32 },
    /// Remove, then re-fetch to reconcile (the removal itself returns nothing).
    RemoveItem { product_id: ProductId },
    /// Clear without a follow-up fetch.
    Clear,
}

impl RemoteCall {
    /// Short operation name for logs and notices.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch_cart",
            Self::AddItem { .. } => "add_item",
            Self::UpdateItem { .. } => "update_item",
            Self::RemoveItem { .. } => "remove_item",
            Self::Clear => "clear_cart",
        }
    }
}

/// A gateway call tagged with the epoch and credential it was issued under.
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub epoch: Epoch,
    pub credential: Credential,
    pub call: RemoteCall,
}

/// I/O the driver performs after a transition.
#[derive(Debug, Clone)]
pub enum Effect {
    None,
    /// Read the local store and feed the result to
    /// [`CartStateMachine::finish_local_load`].
    LoadLocal,
    /// Write this snapshot to the local store.
    Persist(CartSnapshot),
    /// Issue a gateway call in the background and feed the reply to
    /// [`CartStateMachine::reconcile`].
    Remote(RemoteRequest),
}

/// Gateway reply as seen by the machine.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Canonical server snapshot.
    Snapshot(CartSnapshot),
    /// Call succeeded without returning a cart.
    Acknowledged,
    /// Call failed; the error has already been reported.
    Failed,
}

/// What [`CartStateMachine::reconcile`] did with a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Snapshot replaced wholesale.
    Replaced,
    /// Nothing to apply.
    Acknowledged,
    /// Call failed; optimistic state kept.
    Degraded,
    /// Reply belonged to an earlier identity epoch and was dropped.
    DiscardedStale,
}

#[derive(Debug, Clone)]
enum Mode {
    Local,
    Remote(Credential),
}

/// The cart state machine. Exclusively owns the in-memory snapshot.
#[derive(Debug)]
pub struct CartStateMachine {
    phase: Phase,
    mode: Mode,
    snapshot: CartSnapshot,
    epoch: Epoch,
    degraded: bool,
    stale_responses: StaleResponsePolicy,
}

impl CartStateMachine {
    #[must_use]
    pub const fn new(stale_responses: StaleResponsePolicy) -> Self {
        Self {
            phase: Phase::Uninitialized,
            mode: Mode::Local,
            snapshot: CartSnapshot::empty(),
            epoch: Epoch(0),
            degraded: false,
            stale_responses,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn mode(&self) -> CartMode {
        match self.mode {
            Mode::Local => CartMode::Local,
            Mode::Remote(_) => CartMode::Remote,
        }
    }

    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    #[must_use]
    pub const fn snapshot(&self) -> &CartSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub const fn status(&self) -> CartStatus {
        CartStatus {
            phase: self.phase,
            mode: self.mode(),
            degraded: self.degraded,
        }
    }

    #[must_use]
    pub fn view(&self) -> CartView {
        CartView {
            snapshot: self.snapshot.clone(),
            status: self.status(),
            user_id: match &self.mode {
                Mode::Local => None,
                Mode::Remote(credential) => Some(credential.user_id.clone()),
            },
        }
    }

    /// First activation with whatever identity the session reports.
    pub fn activate(&mut self, identity: &AuthIdentity) -> Effect {
        if self.phase != Phase::Uninitialized {
            warn!("Cart already activated, ignoring activation");
            return Effect::None;
        }

        self.phase = Phase::Loading;
        match identity.credential() {
            None => {
                debug!("Activating cart in local mode");
                self.mode = Mode::Local;
                Effect::LoadLocal
            }
            Some(credential) => {
                debug!(user_id = %credential.user_id, "Activating cart in remote mode");
                self.mode = Mode::Remote(credential.clone());
                self.remote(RemoteCall::Fetch)
            }
        }
    }

    /// Complete a [`Effect::LoadLocal`]. An absent record keeps the current
    /// snapshot (empty at cold start).
    pub fn finish_local_load(&mut self, loaded: Option<CartSnapshot>) {
        if let Some(snapshot) = loaded {
            self.snapshot = snapshot;
        }
        if matches!(self.mode, Mode::Local) {
            self.phase = Phase::Ready;
        }
    }

    /// React to the session reporting `identity`.
    pub fn identity_changed(&mut self, identity: &AuthIdentity) -> Effect {
        if self.phase == Phase::Uninitialized {
            return self.activate(identity);
        }

        match (&mut self.mode, identity.credential()) {
            (Mode::Local, None) => Effect::None,
            (Mode::Remote(current), Some(next)) if current.user_id == next.user_id => {
                *current = next.clone();
                Effect::None
            }
            (_, Some(next)) => {
                info!(user_id = %next.user_id, "Identity present, reloading cart from server");
                self.epoch = self.epoch.next();
                self.mode = Mode::Remote(next.clone());
                self.phase = Phase::Loading;
                self.degraded = false;
                self.remote(RemoteCall::Fetch)
            }
            (Mode::Remote(_), None) => {
                // The discarded remote lines are deliberately not persisted.
                info!("Identity gone, discarding cart");
                self.epoch = self.epoch.next();
                self.mode = Mode::Local;
                self.phase = Phase::Ready;
                self.degraded = false;
                self.snapshot = CartSnapshot::empty();
                Effect::None
            }
        }
    }

    /// Force a reload from whichever source the current mode treats as
    /// authoritative.
    pub fn sync(&mut self) -> Effect {
        if self.phase == Phase::Uninitialized {
            warn!("Sync requested before activation, ignoring");
            return Effect::None;
        }

        self.phase = Phase::Loading;
        match self.mode {
            Mode::Local => Effect::LoadLocal,
            Mode::Remote(_) => self.remote(RemoteCall::Fetch),
        }
    }

    /// Apply a mutation to the in-memory snapshot.
    pub fn apply(&mut self, mutation: Mutation) -> Effect {
        if self.phase == Phase::Uninitialized {
            warn!(?mutation, "Mutation before activation, ignoring");
            return Effect::None;
        }

        let Some(call) = self.mutate_snapshot(mutation) else {
            return Effect::None;
        };

        match self.mode {
            Mode::Local => Effect::Persist(self.snapshot.clone()),
            Mode::Remote(_) => self.remote(call),
        }
    }

    /// Feed a gateway reply back into the machine.
    pub fn reconcile(&mut self, epoch: Epoch, call: &RemoteCall, reply: Reply) -> Reconciliation {
        let current = epoch == self.epoch;
        if !current && self.stale_responses == StaleResponsePolicy::Discard {
            debug!(
                call = call.name(),
                issued = epoch.get(),
                current = self.epoch.get(),
                "Discarding reply from previous identity"
            );
            return Reconciliation::DiscardedStale;
        }

        let finishes_load = current && *call == RemoteCall::Fetch && self.phase == Phase::Loading;
        let outcome = match reply {
            Reply::Snapshot(snapshot) => {
                self.snapshot = snapshot;
                if current {
                    self.degraded = false;
                }
                Reconciliation::Replaced
            }
            Reply::Acknowledged => Reconciliation::Acknowledged,
            Reply::Failed => {
                if current {
                    self.degraded = true;
                }
                Reconciliation::Degraded
            }
        };

        if finishes_load {
            self.phase = Phase::Ready;
        }
        outcome
    }

    /// Apply the mutation locally and return the equivalent gateway call, or
    /// `None` if nothing changed.
    fn mutate_snapshot(&mut self, mutation: Mutation) -> Option<RemoteCall> {
        match mutation {
            Mutation::Add(line) => {
                let call = RemoteCall::AddItem {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity(),
                };
                self.snapshot.add(line);
                Some(call)
            }
            Mutation::Remove(key) => self.snapshot.remove(&key).then(|| RemoteCall::RemoveItem {
                product_id: key.product_id,
            }),
            Mutation::SetQuantity { key, quantity } => {
                match self.snapshot.set_quantity(&key, quantity) {
                    QuantityChange::Updated => Some(RemoteCall::UpdateItem {
                        product_id: key.product_id,
                        quantity: u32::try_from(quantity).unwrap_or(u32::MAX),
                    }),
                    QuantityChange::Removed => Some(RemoteCall::RemoveItem {
                        product_id: key.product_id,
                    }),
                    QuantityChange::Missing => None,
                }
            }
            Mutation::Clear => {
                self.snapshot.clear();
                Some(RemoteCall::Clear)
            }
        }
    }

    fn remote(&self, call: RemoteCall) -> Effect {
        match &self.mode {
            Mode::Remote(credential) => Effect::Remote(RemoteRequest {
                epoch: self.epoch,
                credential: credential.clone(),
                call,
            }),
            Mode::Local => Effect::None,
        }
    }
}
