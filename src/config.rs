use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

use crate::extractor::{PriceTableExtractor, PriceTableLayout};
use crate::normalizer::Normalizer;

pub const DEFAULT_PRICE_SOURCE_URL: &str =
    "https://wiki.pokexgames.com/index.php/Nightmare_Merchant_(Resistance)";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub price_source_url: String,
    pub price_table_class: String,
    pub price_table_index: usize,
    pub strip_trailing_s: bool,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("cache.db"),
            price_source_url: DEFAULT_PRICE_SOURCE_URL.to_string(),
            price_table_class: "wikitable".to_string(),
            price_table_index: 7,
            strip_trailing_s: true,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key → value source; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            price_source_url: lookup("PRICE_SOURCE_URL").unwrap_or(defaults.price_source_url),
            price_table_class: lookup("PRICE_TABLE_CLASS").unwrap_or(defaults.price_table_class),
            price_table_index: match lookup("PRICE_TABLE_INDEX") {
                Some(v) => v
                    .parse()
                    .context("PRICE_TABLE_INDEX must be a non-negative integer")?,
                None => defaults.price_table_index,
            },
            strip_trailing_s: match lookup("STRIP_TRAILING_S") {
                Some(v) => parse_bool(&v).context("STRIP_TRAILING_S must be true or false")?,
                None => defaults.strip_trailing_s,
            },
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.strip_trailing_s)
    }

    pub fn extractor(&self) -> PriceTableExtractor {
        let layout = PriceTableLayout {
            table_class: self.price_table_class.clone(),
            table_index: self.price_table_index,
            ..PriceTableLayout::default()
        };

        PriceTableExtractor::new(&self.price_source_url, layout, self.normalizer())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unrecognized boolean {:?}", other),
    }
}
