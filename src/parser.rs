// 📝 Entry Parser - Free-text inventory lines
// "3 maçã, 2 pão e 0 banana" → [(3, "maçã"), (2, "pão"), (0, "banana")]
//
// Each match is "<digits><whitespace><words>", ended by ",", " e" (Portuguese
// "and") or the end of the text. The terminator is not part of the phrase.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

use crate::db::{in_batch, CatalogStore, MAX_QUANTITY};
use crate::normalizer::Normalizer;

const ENTRY_PATTERN: &str = r"(\d+)\s([\w\s]+?)(?:,| e|$)";

/// Actor recorded for changes made by the parser
pub const ACTOR: &str = "entry_parser";

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryError {
    /// Digits beyond the storable range, or non-ASCII digits
    #[error("invalid quantity {text:?}")]
    InvalidQuantity { text: String },

    /// Accumulating would push an entry past the storable range
    #[error("quantity of {name} would exceed the maximum")]
    QuantityOverflow { name: String },
}

/// One (quantity, phrase) pair as written by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRequestLine {
    pub quantity: u64,
    pub phrase: String,
}

fn entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ENTRY_PATTERN).expect("entry pattern is valid"))
}

/// Extract every (quantity, phrase) pair in order of appearance
///
/// The whole text is parsed before anything is returned, so a malformed
/// quantity anywhere rejects the request as a unit.
pub fn parse_request(text: &str) -> Result<Vec<ParsedRequestLine>, EntryError> {
    entry_regex()
        .captures_iter(text)
        .map(|caps| {
            let digits = &caps[1];
            let quantity = digits
                .parse::<u64>()
                .ok()
                .filter(|quantity| *quantity <= MAX_QUANTITY)
                .ok_or_else(|| EntryError::InvalidQuantity {
                    text: digits.to_string(),
                })?;

            Ok(ParsedRequestLine {
                quantity,
                phrase: caps[2].to_string(),
            })
        })
        .collect()
}

// ============================================================================
// UPSERT
// ============================================================================

/// Parse `text` and accumulate its quantities into `store`
///
/// Returns true when at least one newly created entry is unpriced, i.e. the
/// caller should start the price-entry workflow. The request is applied as
/// one batch: if any line fails, none of them stick.
pub fn apply_request<S: CatalogStore + ?Sized>(
    store: &mut S,
    normalizer: &Normalizer,
    text: &str,
) -> Result<bool> {
    let lines = parse_request(text)?;

    in_batch(store, ACTOR, |store| {
        let mut needs_pricing = Vec::new();

        for line in lines {
            // Zero quantities are dropped before normalization
            if line.quantity == 0 {
                debug!(phrase = %line.phrase, "skipping zero quantity");
                continue;
            }

            let name = normalizer.normalize(&line.phrase);

            match store.find_by_name(&name)? {
                Some(_) => store.add_quantity(&name, line.quantity)?,
                None => {
                    let entry = store.create(&name, line.quantity, 0.0)?;
                    needs_pricing.push(entry);
                }
            }
        }

        Ok(needs_pricing.iter().any(|entry| !entry.is_priced()))
    })
}
