//! Error reporting with Sentry integration.
//!
//! Cart operations never surface errors to their callers: gateway and store
//! failures degrade the cart instead. This module is where those failures
//! are captured so they still reach Sentry and the logs.

use crate::gateway::GatewayError;
use crate::store::StoreError;

/// Any failure the cart engine absorbs.
#[derive(Debug, thiserror::Error)]
pub enum CartError {
    /// Gateway call failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Local store read or write failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Capture an absorbed failure to Sentry and log it.
///
/// Returns the error's display form for user-facing notices.
pub fn report_failure(operation: &str, error: &CartError) -> String {
    let event_id = sentry::capture_error(error);
    tracing::warn!(
        operation,
        error = %error,
        sentry_event_id = %event_id,
        "Cart operation failed, continuing with local state"
    );
    error.to_string()
}

/// Set the Sentry user context from a user ID.
///
/// Call this when the cart switches to a signed-in user.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on sign-out to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for cart actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "SKU-1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
