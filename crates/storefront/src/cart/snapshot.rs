//! The full cart at a point in time.

use std::num::NonZeroU32;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::line::{CartLine, LineKey};

/// Result of [`CartSnapshot::set_quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// The line now has the requested quantity.
    Updated,
    /// The requested quantity was zero or negative, so the line was removed.
    Removed,
    /// No line with that key exists.
    Missing,
}

/// An ordered set of cart lines.
///
/// Lines keep insertion order for display only. Totals are never stored
/// alongside the lines; they are derived on every read. The one exception
/// is the total quoted by the server on a canonical snapshot, which is
/// dropped as soon as the snapshot is mutated locally.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CartSnapshot {
    lines: Vec<CartLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quoted_total: Option<Decimal>,
}

impl CartSnapshot {
    /// An empty cart.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            lines: Vec::new(),
            quoted_total: None,
        }
    }

    /// Build a snapshot from lines, merging any that share an identity key.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut snapshot = Self::empty();
        for line in lines {
            snapshot.add(line);
        }
        snapshot
    }

    /// Build a canonical snapshot as returned by the server, keeping the
    /// server's own total.
    #[must_use]
    pub fn from_server(
        lines: impl IntoIterator<Item = CartLine>,
        quoted_total: Option<Decimal>,
    ) -> Self {
        let mut snapshot = Self::from_lines(lines);
        snapshot.quoted_total = quoted_total;
        snapshot
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Look up a line by identity key.
    #[must_use]
    pub fn line(&self, key: &LineKey) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.matches(key))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `Σ unit_price × quantity` over all lines.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// The cart total: the server's quote on an untouched canonical snapshot,
    /// otherwise the derived subtotal.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.quoted_total.unwrap_or_else(|| self.subtotal())
    }

    /// Total quoted by the server, if this snapshot came from it unmodified.
    #[must_use]
    pub const fn quoted_total(&self) -> Option<Decimal> {
        self.quoted_total
    }

    /// `Σ quantity` over all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0_u32, |count, line| count.saturating_add(line.quantity()))
    }

    /// Add a line, merging into an existing line with the same identity key.
    pub fn add(&mut self, line: CartLine) {
        self.quoted_total = None;

        let key = line.key();
        if let Some(existing) = self.lines.iter_mut().find(|l| l.matches(&key)) {
            existing.increment(line.quantity());
        } else {
            self.lines.push(line);
        }
    }

    /// Remove a line. Returns `false` if no line had that key.
    pub fn remove(&mut self, key: &LineKey) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| !line.matches(key));

        let removed = self.lines.len() != before;
        if removed {
            self.quoted_total = None;
        }
        removed
    }

    /// Replace a line's quantity. Zero or negative quantities remove the line.
    pub fn set_quantity(&mut self, key: &LineKey, quantity: i64) -> QuantityChange {
        let clamped = u32::try_from(quantity.max(0)).unwrap_or(u32::MAX);
        let Some(quantity) = NonZeroU32::new(clamped) else {
            return if self.remove(key) {
                QuantityChange::Removed
            } else {
                QuantityChange::Missing
            };
        };

        match self.lines.iter_mut().find(|line| line.matches(key)) {
            Some(line) => {
                line.set_quantity(quantity);
                self.quoted_total = None;
                QuantityChange::Updated
            }
            None => QuantityChange::Missing,
        }
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.quoted_total = None;
    }
}
