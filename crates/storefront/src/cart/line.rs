//! Cart lines and their identity key.

use std::num::NonZeroU32;

use ebasi_core::{ProductId, StockStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Image shown for lines whose product has no primary image.
pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";

/// Identity key of a cart line.
///
/// Two lines with equal keys are the same line and are merged, never
/// duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineKey {
    pub product_id: ProductId,
    pub color: Option<String>,
    pub size: Option<String>,
}

impl LineKey {
    /// Key for a product without variant selection.
    #[must_use]
    pub const fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            color: None,
            size: None,
        }
    }

    /// Key for a product with an optional color and size selection.
    #[must_use]
    pub const fn with_variant(
        product_id: ProductId,
        color: Option<String>,
        size: Option<String>,
    ) -> Self {
        Self {
            product_id,
            color,
            size,
        }
    }
}

impl std::fmt::Display for LineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.product_id)?;
        if let Some(color) = &self.color {
            write!(f, "/{color}")?;
        }
        if let Some(size) = &self.size {
            write!(f, "/{size}")?;
        }
        Ok(())
    }
}

/// A product as presented by the catalog at the moment it is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    /// Original price shown struck through when discounted.
    pub compare_price: Option<Decimal>,
    pub image: Option<String>,
    pub stock_status: StockStatus,
}

/// One distinct purchasable selection in the cart.
///
/// The quantity is always at least one; lines that would drop to zero are
/// removed from the snapshot instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    /// Unit price captured when the line was added.
    pub unit_price: Decimal,
    pub compare_price: Decimal,
    pub image: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub in_stock: bool,
    quantity: NonZeroU32,
}

impl CartLine {
    /// Create a line with no variant, no discount and the placeholder image.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        unit_price: Decimal,
        quantity: NonZeroU32,
    ) -> Self {
        Self {
            product_id,
            name: name.into(),
            unit_price,
            compare_price: unit_price,
            image: PLACEHOLDER_IMAGE.to_string(),
            color: None,
            size: None,
            in_stock: true,
            quantity,
        }
    }

    /// Snapshot a catalog product into a line.
    #[must_use]
    pub fn from_product(
        product: &Product,
        quantity: NonZeroU32,
        color: Option<String>,
        size: Option<String>,
    ) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price: product.price,
            compare_price: product.compare_price.unwrap_or(product.price),
            image: product
                .image
                .clone()
                .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            color,
            size,
            in_stock: product.stock_status.is_available(),
            quantity,
        }
    }

    #[must_use]
    pub fn with_compare_price(mut self, compare_price: Decimal) -> Self {
        self.compare_price = compare_price;
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    #[must_use]
    pub fn with_variant(mut self, color: Option<String>, size: Option<String>) -> Self {
        self.color = color;
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_in_stock(mut self, in_stock: bool) -> Self {
        self.in_stock = in_stock;
        self
    }

    /// The identity key of this line.
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey::with_variant(self.product_id.clone(), self.color.clone(), self.size.clone())
    }

    /// Whether this line has the given identity key.
    #[must_use]
    pub fn matches(&self, key: &LineKey) -> bool {
        self.product_id == key.product_id && self.color == key.color && self.size == key.size
    }

    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity.get()
    }

    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity.get())
    }

    /// Per-unit discount against the comparison price, never negative.
    #[must_use]
    pub fn unit_savings(&self) -> Decimal {
        (self.compare_price - self.unit_price).max(Decimal::ZERO)
    }

    pub(crate) fn set_quantity(&mut self, quantity: NonZeroU32) {
        self.quantity = quantity;
    }

    pub(crate) fn increment(&mut self, by: u32) {
        self.quantity = self.quantity.saturating_add(by);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn qty(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn saree() -> Product {
        Product {
            id: ProductId::parse("SKU-1").unwrap(),
            name: "Banarasi Saree".to_string(),
            price: Decimal::new(1500, 0),
            compare_price: None,
            image: None,
            stock_status: StockStatus::LimitedStock,
        }
    }

    #[test]
    fn test_from_product_applies_fallbacks() {
        let line = CartLine::from_product(&saree(), qty(2), Some("red".to_string()), None);

        assert_eq!(line.compare_price, Decimal::new(1500, 0));
        assert_eq!(line.image, PLACEHOLDER_IMAGE);
        assert!(line.in_stock);
        assert_eq!(line.quantity(), 2);
        assert_eq!(line.line_total(), Decimal::new(3000, 0));
    }

    #[test]
    fn test_key_includes_variant() {
        let line = CartLine::from_product(&saree(), qty(1), Some("red".to_string()), Some("M".to_string()));
        let key = line.key();

        assert!(line.matches(&key));
        assert!(!line.matches(&LineKey::new(saree().id)));
        assert_eq!(key.to_string(), "SKU-1/red/M");
    }

    #[test]
    fn test_unit_savings_never_negative() {
        let discounted = CartLine::new(saree().id, "Saree", Decimal::new(800, 0), qty(1))
            .with_compare_price(Decimal::new(1000, 0));
        assert_eq!(discounted.unit_savings(), Decimal::new(200, 0));

        let marked_up = CartLine::new(saree().id, "Saree", Decimal::new(800, 0), qty(1))
            .with_compare_price(Decimal::new(500, 0));
        assert_eq!(marked_up.unit_savings(), Decimal::ZERO);
    }

    #[test]
    fn test_zero_quantity_record_is_rejected() {
        let json = r#"{"product_id":"SKU-1","name":"x","unit_price":"1","compare_price":"1",
            "image":"/a.png","color":null,"size":null,"in_stock":true,"quantity":0}"#;
        let parsed: Result<CartLine, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }
}
