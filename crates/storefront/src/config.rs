//! Cart engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `EBASI_API_BASE_URL` - Backend API base (default: `http://127.0.0.1:8000/api/v1`)
//! - `EBASI_CART_DIR` - Directory holding the anonymous cart record (default: `.ebasi`)
//! - `EBASI_STALE_RESPONSES` - `discard` or `apply` replies from a previous identity (default: discard)
//! - `EBASI_FREE_SHIPPING_THRESHOLD` - Subtotal above which shipping is free (default: 1999)
//! - `EBASI_SHIPPING_FEE` - Flat shipping fee below the threshold (default: 99)
//! - `EBASI_TAX_RATE` - Tax rate applied to the subtotal (default: 0.18)
//! - `EBASI_USER_ID` - Signed-in user id, required when `EBASI_AUTH_TOKEN` is set
//! - `EBASI_AUTH_TOKEN` - Backend auth token (high entropy, never a placeholder)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::path::PathBuf;

use ebasi_core::UserId;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::cart::PricingRules;
use crate::machine::StaleResponsePolicy;
use crate::session::{AuthIdentity, Credential};

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api/v1";
const DEFAULT_CART_DIR: &str = ".ebasi";
const MIN_TOKEN_LENGTH: usize = 20;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Cart engine configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Backend API base URL
    pub api_base_url: Url,
    /// Directory for the anonymous cart record
    pub cart_dir: PathBuf,
    /// Handling of replies issued under a previous identity
    pub stale_responses: StaleResponsePolicy,
    /// Checkout summary pricing
    pub pricing: PricingRules,
    /// Signed-in user, if configured
    pub auth: Option<AuthConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Signed-in user credentials.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct AuthConfig {
    pub user_id: UserId,
    pub token: SecretString,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is invalid or the auth token fails
    /// validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`CartConfig::from_env`].
    pub fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let raw_url = get_env_or_default(env, "EBASI_API_BASE_URL", DEFAULT_API_BASE_URL);
        let api_base_url = Url::parse(&raw_url).map_err(|e| {
            ConfigError::InvalidEnvVar("EBASI_API_BASE_URL".to_string(), e.to_string())
        })?;
        let cart_dir = PathBuf::from(get_env_or_default(env, "EBASI_CART_DIR", DEFAULT_CART_DIR));
        let stale_responses = get_env_or_default(env, "EBASI_STALE_RESPONSES", "discard")
            .parse::<StaleResponsePolicy>()
            .map_err(|e| ConfigError::InvalidEnvVar("EBASI_STALE_RESPONSES".to_string(), e))?;

        let defaults = PricingRules::default();
        let pricing = PricingRules {
            free_shipping_threshold: get_decimal(
                env,
                "EBASI_FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold,
            )?,
            shipping_fee: get_decimal(env, "EBASI_SHIPPING_FEE", defaults.shipping_fee)?,
            tax_rate: get_decimal(env, "EBASI_TAX_RATE", defaults.tax_rate)?,
        };

        let auth = AuthConfig::from_lookup(env)?;
        let sentry_dsn = get_optional_env(env, "SENTRY_DSN");

        Ok(Self {
            api_base_url,
            cart_dir,
            stale_responses,
            pricing,
            auth,
            sentry_dsn,
        })
    }

    /// Identity the session starts with.
    #[must_use]
    pub fn identity(&self) -> AuthIdentity {
        self.auth.as_ref().map_or(AuthIdentity::Anonymous, |auth| {
            AuthIdentity::Authenticated(Credential::new(auth.user_id.clone(), auth.token.clone()))
        })
    }
}

impl AuthConfig {
    fn from_lookup(env: Lookup<'_>) -> Result<Option<Self>, ConfigError> {
        let Some(token) = get_optional_env(env, "EBASI_AUTH_TOKEN") else {
            return Ok(None);
        };
        let user_id = get_required_env(env, "EBASI_USER_ID")?;
        let token = SecretString::from(token);
        validate_token_length(&token, "EBASI_AUTH_TOKEN")?;
        validate_secret_strength(token.expose_secret(), "EBASI_AUTH_TOKEN")?;

        Ok(Some(Self {
            user_id: UserId::new(user_id),
            token,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup used while loading configuration.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Get a required environment variable.
fn get_required_env(env: Lookup<'_>, key: &str) -> Result<String, ConfigError> {
    env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(env: Lookup<'_>, key: &str) -> Option<String> {
    env(key).filter(|value| !value.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(env: Lookup<'_>, key: &str, default: &str) -> String {
    get_optional_env(env, key).unwrap_or_else(|| default.to_string())
}

/// Get a non-negative decimal, falling back to a default.
fn get_decimal(env: Lookup<'_>, key: &str, default: Decimal) -> Result<Decimal, ConfigError> {
    let Some(raw) = get_optional_env(env, key) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<Decimal>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if value.is_sign_negative() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(value)
}

/// Validate that a token meets minimum length requirements.
fn validate_token_length(token: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = token.expose_secret();
    if value.len() < MIN_TOKEN_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the token issued by the backend."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TOKEN: &str = "4f9a0c2e7b1d58e3a6c9f0b2d4e7a1c3b5d8f026";

    fn load(vars: &[(&str, &str)]) -> Result<CartConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CartConfig::from_lookup(&|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.api_base_url.as_str(), "http://127.0.0.1:8000/api/v1");
        assert_eq!(config.cart_dir, PathBuf::from(".ebasi"));
        assert_eq!(config.stale_responses, StaleResponsePolicy::Discard);
        assert_eq!(config.pricing, PricingRules::default());
        assert!(config.auth.is_none());
        assert!(!config.identity().is_authenticated());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("EBASI_API_BASE_URL", "https://shop.test/api/v1/"),
            ("EBASI_STALE_RESPONSES", "apply"),
            ("EBASI_SHIPPING_FEE", "49.50"),
            ("EBASI_TAX_RATE", "0.05"),
            ("EBASI_USER_ID", "17"),
            ("EBASI_AUTH_TOKEN", TOKEN),
        ])
        .unwrap();

        assert_eq!(config.api_base_url.host_str(), Some("shop.test"));
        assert_eq!(config.stale_responses, StaleResponsePolicy::Apply);
        assert_eq!(config.pricing.shipping_fee, Decimal::new(4950, 2));
        assert_eq!(config.pricing.tax_rate, Decimal::new(5, 2));
        assert_eq!(config.identity().user_id().unwrap().as_str(), "17");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            load(&[("EBASI_API_BASE_URL", "not a url")]),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert!(matches!(
            load(&[("EBASI_STALE_RESPONSES", "sometimes")]),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert!(matches!(
            load(&[("EBASI_SHIPPING_FEE", "-1")]),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
    }

    #[test]
    fn test_token_requires_user_id() {
        let err = load(&[("EBASI_AUTH_TOKEN", TOKEN)]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "EBASI_USER_ID"));
    }

    #[test]
    fn test_placeholder_token_rejected() {
        let err = load(&[
            ("EBASI_USER_ID", "17"),
            ("EBASI_AUTH_TOKEN", "your-backend-token-goes-here"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_short_token_rejected() {
        let err = load(&[("EBASI_USER_ID", "17"), ("EBASI_AUTH_TOKEN", "4f9a0c")]).unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_shannon_entropy() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy(TOKEN) > MIN_ENTROPY_BITS_PER_CHAR);
    }

    #[test]
    fn test_auth_config_debug_redacts_token() {
        let config = load(&[("EBASI_USER_ID", "17"), ("EBASI_AUTH_TOKEN", TOKEN)]).unwrap();
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains(TOKEN));
    }
}
