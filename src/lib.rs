// Inventory Valuation - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod extractor;
pub mod format;
pub mod memory;
pub mod normalizer;
pub mod parser;
pub mod pricing;
pub mod valuation;

#[cfg(feature = "server")]
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use db::{
    in_batch, setup_database, CatalogEntry, CatalogStore, Event, SqliteCatalog, MAX_QUANTITY,
};
pub use extractor::{
    clean_price, extract_price_rows, select_price_table, ExtractionReport, FetchFailed, HttpFetcher,
    PageFetcher, PriceTableExtractor, PriceTableLayout, RawPriceRow,
};
pub use format::{format_item, format_total};
pub use memory::MemoryCatalog;
pub use normalizer::{normalize_item, Normalizer};
pub use parser::{apply_request, parse_request, EntryError, ParsedRequestLine};
pub use pricing::{apply_manual_prices, PricingError};
pub use valuation::{total_value, InventoryLine, InventoryReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
