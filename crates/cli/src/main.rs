//! Ebasi cart CLI - inspect and edit the cart from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart
//! ebasi-cart show
//!
//! # Add two units of a product
//! ebasi-cart add 42 --price 1299 --name "Chanderi Dupatta" -q 2
//!
//! # Set a quantity (zero removes the line)
//! ebasi-cart set 42 5
//!
//! # Remove a line, empty the cart, or reload it
//! ebasi-cart remove 42
//! ebasi-cart clear
//! ebasi-cart sync
//! ```
//!
//! Without `EBASI_AUTH_TOKEN` the cart lives in `EBASI_CART_DIR`; with it the
//! backend cart at `EBASI_API_BASE_URL` is used.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use ebasi_core::ProductId;
use ebasi_storefront::{CartConfig, LineKey};
use rust_decimal::Decimal;

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "ebasi-cart")]
#[command(author, version, about = "Ebasi cart client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the cart and its checkout summary
    Show,
    /// Add a product to the cart
    Add {
        /// Product id
        product_id: ProductId,

        /// Unit price
        #[arg(short, long)]
        price: Decimal,

        /// Display name (defaults to the product id)
        #[arg(short, long)]
        name: Option<String>,

        /// Number of units
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Comparison price for savings
        #[arg(long)]
        compare_price: Option<Decimal>,

        #[command(flatten)]
        variant: Variant,
    },
    /// Remove a line from the cart
    Remove {
        /// Product id
        product_id: ProductId,

        #[command(flatten)]
        variant: Variant,
    },
    /// Set the quantity of a line (zero or below removes it)
    Set {
        /// Product id
        product_id: ProductId,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,

        #[command(flatten)]
        variant: Variant,
    },
    /// Empty the cart
    Clear,
    /// Reload the cart from its authoritative source
    Sync,
}

/// Variant selection identifying a line.
#[derive(clap::Args)]
struct Variant {
    /// Color variant
    #[arg(long)]
    color: Option<String>,

    /// Size variant
    #[arg(long)]
    size: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match CartConfig::from_env() {
        Ok(config) => {
            // Sentry must be initialized before the tracing subscriber
            let _sentry_guard = commands::init_sentry(&config);
            commands::init_tracing();
            run(cli, &config).await
        }
        Err(e) => {
            commands::init_tracing();
            Err(e.into())
        }
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &CartConfig) -> Result<(), CommandError> {
    let session = commands::open(config).await;

    match cli.command {
        Commands::Show => {}
        Commands::Add {
            product_id,
            price,
            name,
            quantity,
            compare_price,
            variant,
        } => {
            let product = commands::product(product_id, name, price, compare_price);
            session.cart.add(&product, quantity, variant.color, variant.size);
        }
        Commands::Remove {
            product_id,
            variant,
        } => {
            session.cart.remove(&variant.key(product_id));
        }
        Commands::Set {
            product_id,
            quantity,
            variant,
        } => {
            session.cart.set_quantity(&variant.key(product_id), quantity);
        }
        Commands::Clear => {
            session.cart.clear();
        }
        Commands::Sync => {
            session.cart.sync();
        }
    }

    session.finish(config).await
}

impl Variant {
    fn key(self, product_id: ProductId) -> LineKey {
        LineKey::with_variant(product_id, self.color, self.size)
    }
}
