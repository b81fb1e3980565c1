//! Cart session plumbing shared by every subcommand.
//!
//! # Environment Variables
//!
//! See [`ebasi_storefront::config`]. `RUST_LOG` overrides the default log
//! filter; logs go to stderr so the cart table stays pipeable.

use ebasi_core::{CurrencyCode, Price, ProductId, StockStatus};
use ebasi_storefront::config::ConfigError;
use ebasi_storefront::gateway::HttpCartGateway;
use ebasi_storefront::store::FileStore;
use ebasi_storefront::{Cart, CartConfig, CartNotice, CartSnapshot, CartSummary, CartStatus, Product};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "ebasi_cart=info,ebasi_storefront=info";

/// Errors that end a CLI invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The cart could not be reconciled with the backend.
    #[error("Cart is out of sync with the server: {0}")]
    OutOfSync(String),
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
pub fn init_sentry(config: &CartConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Initialize tracing with `EnvFilter` and Sentry integration.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

/// An activated cart plus the notices it has emitted.
pub struct CliSession {
    pub cart: Cart<HttpCartGateway, FileStore>,
    notices: broadcast::Receiver<CartNotice>,
}

/// Activate the cart for the configured identity and wait for it to load.
pub async fn open(config: &CartConfig) -> CliSession {
    let gateway = HttpCartGateway::new(&config.api_base_url);
    let store = FileStore::new(&config.cart_dir);
    let cart = Cart::new(gateway, store, config.stale_responses);
    let notices = cart.notices();

    cart.activate(&config.identity());
    cart.settle().await;
    tracing::info!(status = ?cart.status(), "Cart loaded");

    CliSession { cart, notices }
}

impl CliSession {
    /// Wait for pending calls, print the cart and report whether it is in
    /// sync.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::OutOfSync`] if any gateway call failed.
    pub async fn finish(mut self, config: &CartConfig) -> Result<(), CommandError> {
        self.cart.settle().await;

        let view = self.cart.view();
        let summary = CartSummary::from_snapshot(&view.snapshot, &config.pricing);
        print_cart(&view.snapshot, &summary, view.status);

        let mut failures = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            if let CartNotice::SyncFailed { operation, message } = notice {
                failures.push(format!("{operation}: {message}"));
            }
        }

        if view.status.degraded {
            return Err(CommandError::OutOfSync(failures.join("; ")));
        }
        Ok(())
    }
}

/// Build a catalog product from command-line arguments.
pub fn product(
    id: ProductId,
    name: Option<String>,
    price: Decimal,
    compare_price: Option<Decimal>,
) -> Product {
    Product {
        name: name.unwrap_or_else(|| id.to_string()),
        id,
        price,
        compare_price,
        image: None,
        stock_status: StockStatus::InStock,
    }
}

fn money(amount: Decimal) -> String {
    Price::new(amount, CurrencyCode::default()).to_string()
}

#[allow(clippy::print_stdout)]
fn print_cart(snapshot: &CartSnapshot, summary: &CartSummary, status: CartStatus) {
    println!("Cart ({:?}, {:?})", status.mode, status.phase);

    if snapshot.is_empty() {
        println!("  (empty)");
        return;
    }

    println!("  {:<28} {:<24} {:>5} {:>12} {:>12}", "LINE", "NAME", "QTY", "PRICE", "TOTAL");
    for line in snapshot.lines() {
        let stock = if line.in_stock { "" } else { " (out of stock)" };
        println!(
            "  {:<28} {:<24} {:>5} {:>12} {:>12}{stock}",
            line.key().to_string(),
            line.name,
            line.quantity(),
            money(line.unit_price),
            money(line.line_total()),
        );
    }

    println!();
    println!("  Items:     {}", summary.item_count);
    println!("  Subtotal:  {}", money(summary.subtotal));
    if summary.savings > Decimal::ZERO {
        println!("  Savings:   {}", money(summary.savings));
    }
    println!("  Shipping:  {}", money(summary.shipping));
    println!("  Tax:       {}", money(summary.tax));
    println!("  Total:     {}", money(summary.total));
    if snapshot.quoted_total().is_some() {
        println!("  Server:    {}", money(snapshot.total()));
    }
    if summary.amount_to_free_shipping > Decimal::ZERO {
        println!(
            "  Add {} more for free shipping",
            money(summary.amount_to_free_shipping)
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_filter_covers_binary_and_engine() {
        let filter = tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).unwrap();
        let rendered = filter.to_string();

        assert!(rendered.contains("ebasi_cart=info"));
        assert!(rendered.contains("ebasi_storefront=info"));
    }
}
