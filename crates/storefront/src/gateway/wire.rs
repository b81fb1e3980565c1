//! Backend wire types and their conversion into cart snapshots.

use std::num::NonZeroU32;

use ebasi_core::{ProductId, StockStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cart::{CartLine, CartSnapshot};

/// Product id as sent by the backend: numeric primary keys or string SKUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl From<&ProductId> for WireId {
    fn from(id: &ProductId) -> Self {
        match id.as_str().parse::<i64>() {
            // Leading zeros are significant in SKUs.
            Ok(n) if n.to_string() == id.as_str() => Self::Number(n),
            _ => Self::Text(id.to_string()),
        }
    }
}

impl WireId {
    fn into_product_id(self) -> Option<ProductId> {
        let raw = match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        };
        match ProductId::parse(raw.as_str()) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(product_id = %raw, error = %e, "Skipping cart item with invalid product id");
                None
            }
        }
    }
}

/// Cart payload returned by `GET/POST /orders/cart/` and `PATCH` on items.
#[derive(Debug, Clone, Deserialize)]
pub struct WireCart {
    #[serde(default)]
    pub items: Vec<WireCartItem>,
    #[serde(default)]
    pub total_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCartItem {
    pub product: WireProduct,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireProduct {
    pub id: WireId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub compare_price: Option<Decimal>,
    #[serde(default)]
    pub primary_image: Option<String>,
    #[serde(default)]
    pub stock_status: Option<String>,
}

/// Body of `POST /orders/cart/`.
#[derive(Debug, Serialize)]
pub struct AddItemBody {
    pub product_id: WireId,
    pub quantity: u32,
}

/// Body of `PATCH /orders/cart/item/{id}/`.
#[derive(Debug, Serialize)]
pub struct UpdateItemBody {
    pub quantity: u32,
}

impl WireCart {
    /// Convert into a canonical snapshot carrying the server's total.
    ///
    /// The quoted total is dropped if any item had to be skipped, since it
    /// would count lines the snapshot does not hold.
    pub fn into_snapshot(self) -> CartSnapshot {
        let received = self.items.len();
        let lines: Vec<CartLine> = self
            .items
            .into_iter()
            .filter_map(WireCartItem::into_line)
            .collect();

        let total = if lines.len() == received {
            self.total_price
        } else {
            warn!(
                skipped = received - lines.len(),
                "Ignoring server total for partially converted cart"
            );
            None
        };
        CartSnapshot::from_server(lines, total)
    }
}

impl WireCartItem {
    fn into_line(self) -> Option<CartLine> {
        let Some(quantity) = u32::try_from(self.quantity).ok().and_then(NonZeroU32::new) else {
            warn!(quantity = self.quantity, "Skipping cart item with non-positive quantity");
            return None;
        };
        let product = self.product;
        let product_id = product.id.into_product_id()?;

        let in_stock = product.stock_status.as_deref().map_or(true, |status| {
            status.parse::<StockStatus>().map_or_else(
                |e| {
                    warn!(error = %e, "Unknown stock status, assuming available");
                    true
                },
                StockStatus::is_available,
            )
        });

        let mut line = CartLine::new(product_id, product.name, product.price, quantity)
            .with_compare_price(product.compare_price.unwrap_or(product.price))
            .with_in_stock(in_stock);
        if let Some(image) = product.primary_image {
            line = line.with_image(image);
        }
        Some(line)
    }
}
