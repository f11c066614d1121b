// 🕸️ Price Table Extractor - Market prices from the wiki
//
// The price page carries several `table.wikitable` blocks; the price list is
// the 8th. Each data row holds three (item, price) pairs side by side.
// Extraction is best effort: missing tables, short rows and unreadable prices
// are skipped. Only the page fetch itself can fail.

use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{in_batch, CatalogStore};
use crate::normalizer::Normalizer;

/// Actor recorded for changes made by the extractor
pub const ACTOR: &str = "price_extractor";

// ============================================================================
// FETCHING
// ============================================================================

/// Source of HTML documents
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetch failed before anything was extracted
#[derive(Debug, Error)]
#[error("failed to fetch price page {url}")]
pub struct FetchFailed {
    pub url: String,
}

/// One-shot blocking HTTP GET
///
/// The client is built per fetch, so a fetcher can be created anywhere but
/// must only fetch outside an async runtime; the server runs it on a
/// blocking thread.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("inventory-valuation/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .get(url)
            .send()
            .with_context(|| format!("HTTP request failed for {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        response.text().context("Failed to read response body")
    }
}

// ============================================================================
// TABLE LAYOUT
// ============================================================================

/// Where the prices live on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTableLayout {
    /// Class attribute shared by all candidate tables
    pub table_class: String,

    /// 0-based position among the candidate tables
    pub table_index: usize,

    /// Rows with fewer cells are skipped
    pub min_columns: usize,

    /// Cell index of each item name; its price is the next cell
    pub name_columns: Vec<usize>,
}

impl Default for PriceTableLayout {
    fn default() -> Self {
        Self {
            table_class: "wikitable".to_string(),
            table_index: 7,
            min_columns: 9,
            name_columns: vec![1, 4, 7],
        }
    }
}

/// (item phrase, price text) as found in the table, before any cleaning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPriceRow {
    pub item: String,
    pub price: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub tables_found: usize,
    pub rows_seen: usize,
    pub prices_applied: usize,
    pub pairs_skipped: usize,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("Invalid selector {:?}: {}", css, e))
}

/// Text content of an element, each text node trimmed, joined without separator
fn cell_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}

/// The single place that knows the price table is picked by position
///
/// Returns the number of candidate tables and the selected one, if present.
pub fn select_price_table<'a>(
    document: &'a Html,
    layout: &PriceTableLayout,
) -> Result<(usize, Option<ElementRef<'a>>)> {
    let tables = selector(&format!("table.{}", layout.table_class))?;
    let candidates: Vec<ElementRef<'a>> = document.select(&tables).collect();

    Ok((candidates.len(), candidates.get(layout.table_index).copied()))
}

/// Pull raw (item, price) pairs out of an HTML document
pub fn extract_price_rows(
    html: &str,
    layout: &PriceTableLayout,
) -> Result<(ExtractionReport, Vec<RawPriceRow>)> {
    let document = Html::parse_document(html);
    let mut report = ExtractionReport::default();

    let (tables_found, table) = select_price_table(&document, layout)?;
    report.tables_found = tables_found;

    let Some(table) = table else {
        debug!(
            tables_found,
            wanted = layout.table_index + 1,
            "price table not present"
        );
        return Ok((report, Vec::new()));
    };

    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;
    let mut pairs = Vec::new();

    // First row is the header
    for row in table.select(&row_selector).skip(1) {
        report.rows_seen += 1;

        let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
        if cells.len() < layout.min_columns {
            debug!(columns = cells.len(), "skipping short row");
            continue;
        }

        for &column in &layout.name_columns {
            match (cells.get(column), cells.get(column + 1)) {
                (Some(&item), Some(&price)) => pairs.push(RawPriceRow {
                    item: cell_text(item),
                    price: cell_text(price),
                }),
                _ => report.pairs_skipped += 1,
            }
        }
    }

    Ok((report, pairs))
}

/// "$1,234.50" → 1234.5
///
/// Strips currency symbol, thousands separators and spaces. Anything that is
/// not a finite, non-negative number is rejected.
pub fn clean_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

// ============================================================================
// EXTRACTOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct PriceTableExtractor {
    pub url: String,
    pub layout: PriceTableLayout,
    pub normalizer: Normalizer,
}

impl PriceTableExtractor {
    pub fn new(url: &str, layout: PriceTableLayout, normalizer: Normalizer) -> Self {
        Self {
            url: url.to_string(),
            layout,
            normalizer,
        }
    }

    /// Fetch the price page and upsert every readable price
    ///
    /// A fetch failure aborts before the store is touched. Existing entries
    /// get their price overwritten; new names are created with quantity 0.
    pub fn refresh<S, F>(&self, store: &mut S, fetcher: &F) -> Result<ExtractionReport>
    where
        S: CatalogStore + ?Sized,
        F: PageFetcher + ?Sized,
    {
        let html = fetcher
            .fetch(&self.url)
            .with_context(|| FetchFailed {
                url: self.url.clone(),
            })?;
        let (mut report, rows) = extract_price_rows(&html, &self.layout)?;

        in_batch(store, ACTOR, |store| {
            for row in rows {
                let Some(price) = clean_price(&row.price) else {
                    debug!(item = %row.item, price = %row.price, "skipping unreadable price");
                    report.pairs_skipped += 1;
                    continue;
                };

                let name = self.normalizer.normalize(&row.item);

                match store.find_by_name(&name)? {
                    Some(_) => {
                        store.set_price(&name, price)?;
                    }
                    None => {
                        store.create(&name, 0, price)?;
                    }
                }
                report.prices_applied += 1;
            }
            Ok(())
        })?;

        info!(
            url = %self.url,
            tables_found = report.tables_found,
            rows_seen = report.rows_seen,
            prices_applied = report.prices_applied,
            pairs_skipped = report.pairs_skipped,
            "price table extracted"
        );

        Ok(report)
    }

    /// Refresh only when the catalog is still empty
    pub fn ensure_prices<S, F>(&self, store: &mut S, fetcher: &F) -> Result<Option<ExtractionReport>>
    where
        S: CatalogStore + ?Sized,
        F: PageFetcher + ?Sized,
    {
        if store.count()? > 0 {
            return Ok(None);
        }

        self.refresh(store, fetcher).map(Some)
    }
}
