//! Status enums for catalog entities.

use serde::{Deserialize, Serialize};

/// Product stock status as reported by the backend catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[default]
    InStock,
    LimitedStock,
    OutOfStock,
}

impl StockStatus {
    /// Whether the product can currently be purchased.
    ///
    /// Limited stock still counts as available.
    #[must_use]
    pub const fn is_available(self) -> bool {
        !matches!(self, Self::OutOfStock)
    }
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InStock => write!(f, "in_stock"),
            Self::LimitedStock => write!(f, "limited_stock"),
            Self::OutOfStock => write!(f, "out_of_stock"),
        }
    }
}

impl std::str::FromStr for StockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_stock" => Ok(Self::InStock),
            "limited_stock" => Ok(Self::LimitedStock),
            "out_of_stock" => Ok(Self::OutOfStock),
            _ => Err(format!("invalid stock status: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_status_availability() {
        assert!(StockStatus::InStock.is_available());
        assert!(StockStatus::LimitedStock.is_available());
        assert!(!StockStatus::OutOfStock.is_available());
    }

    #[test]
    fn test_stock_status_wire_names() {
        let status: StockStatus = serde_json::from_str("\"out_of_stock\"").unwrap();
        assert_eq!(status, StockStatus::OutOfStock);
        assert_eq!("limited_stock".parse::<StockStatus>(), Ok(StockStatus::LimitedStock));
        assert!("sold".parse::<StockStatus>().is_err());
    }
}
