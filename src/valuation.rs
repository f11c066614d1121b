// 📊 Inventory Valuation - Total value of what is on hand

use serde::{Deserialize, Serialize};

use crate::db::CatalogEntry;
use crate::format::{format_item, format_total};

/// One catalog entry as shown on the inventory page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLine {
    pub name: String,
    pub quantity: u64,
    pub unit_price: f64,
    /// Per-item price, abbreviated ("2K")
    pub unit_price_formatted: String,
    pub line_value: f64,
}

impl From<CatalogEntry> for InventoryLine {
    fn from(entry: CatalogEntry) -> Self {
        Self {
            unit_price_formatted: format_item(entry.unit_price),
            line_value: entry.line_value(),
            name: entry.name,
            quantity: entry.quantity,
            unit_price: entry.unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryReport {
    pub lines: Vec<InventoryLine>,
    pub total_value: f64,
    /// Aggregate style ("1.50KK")
    pub total_formatted: String,
}

/// Sum of quantity × unit_price over entries actually held
pub fn total_value(entries: &[CatalogEntry]) -> f64 {
    entries
        .iter()
        .filter(|e| e.quantity > 0)
        .map(CatalogEntry::line_value)
        .fold(0.0, |total, value| total + value)
}

impl InventoryReport {
    pub fn build(entries: Vec<CatalogEntry>) -> Self {
        let total_value = total_value(&entries);

        Self {
            lines: entries.into_iter().map(InventoryLine::from).collect(),
            total_value,
            total_formatted: format_total(total_value),
        }
    }
}
