// Manual price entry for items the price table did not cover

use anyhow::Result;
use thiserror::Error;

use crate::db::{in_batch, CatalogStore};
use crate::extractor::clean_price;

/// Actor recorded for prices typed in by the user
pub const ACTOR: &str = "manual_pricing";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("invalid price {text:?} for {name}")]
    InvalidPrice { name: String, text: String },
}

/// Set prices from (name, price text) pairs
///
/// All prices are validated before anything is written. Names not in the
/// catalog are ignored. Returns how many entries were updated.
pub fn apply_manual_prices<S: CatalogStore + ?Sized>(
    store: &mut S,
    prices: &[(String, String)],
) -> Result<usize> {
    let parsed = prices
        .iter()
        .map(|(name, text)| {
            clean_price(text)
                .map(|price| (name.as_str(), price))
                .ok_or_else(|| PricingError::InvalidPrice {
                    name: name.clone(),
                    text: text.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    in_batch(store, ACTOR, |store| {
        let mut updated = 0;
        for (name, price) in parsed {
            if store.set_price(name, price)? {
                updated += 1;
            }
        }
        Ok(updated)
    })
}
