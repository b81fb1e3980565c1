//! Authentication identity and the session observer.
//!
//! The observer owns the current [`AuthIdentity`]. The cart never mutates it;
//! it subscribes and reacts to transitions.

use ebasi_core::UserId;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;

/// Backend credential attached to every gateway call.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct Credential {
    pub user_id: UserId,
    token: SecretString,
}

impl Credential {
    #[must_use]
    pub fn new(user_id: UserId, token: SecretString) -> Self {
        Self { user_id, token }
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Token {}", self.token.expose_secret())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Who the cart is acting for.
#[derive(Debug, Clone, Default)]
pub enum AuthIdentity {
    #[default]
    Anonymous,
    Authenticated(Credential),
}

impl AuthIdentity {
    #[must_use]
    pub const fn credential(&self) -> Option<&Credential> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(credential) => Some(credential),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.credential().map(|c| &c.user_id)
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Reports the current identity and broadcasts transitions.
#[derive(Debug, Clone)]
pub struct SessionObserver {
    tx: watch::Sender<AuthIdentity>,
}

impl SessionObserver {
    #[must_use]
    pub fn new(initial: AuthIdentity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// The identity right now.
    #[must_use]
    pub fn current(&self) -> AuthIdentity {
        self.tx.borrow().clone()
    }

    /// Subscribe to identity transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthIdentity> {
        self.tx.subscribe()
    }

    pub fn sign_in(&self, credential: Credential) {
        tracing::info!(user_id = %credential.user_id, "Session signed in");
        self.tx.send_replace(AuthIdentity::Authenticated(credential));
    }

    pub fn sign_out(&self) {
        tracing::info!("Session signed out");
        self.tx.send_replace(AuthIdentity::Anonymous);
    }
}

impl Default for SessionObserver {
    fn default() -> Self {
        Self::new(AuthIdentity::Anonymous)
    }
}
