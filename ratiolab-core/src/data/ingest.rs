//! Quote ingest: sort, de-duplicate, drop unusable rows.
//!
//! Missing (NaN) and negative adjusted closes are dropped. Zero prices are
//! kept: they are a data-quality anomaly the ranking engine flags per row.

use super::provider::{DataError, RawQuote};
use std::collections::BTreeMap;
use tracing::warn;

/// Ingested quotes plus what was removed on the way.
#[derive(Debug, Clone)]
pub struct IngestResult {
    /// Quotes sorted ascending by date, one per date.
    pub quotes: Vec<RawQuote>,
    pub duplicates_removed: usize,
    pub invalid_removed: usize,
}

/// Normalize raw provider quotes. Later duplicates of a date win.
pub fn ingest(quotes: Vec<RawQuote>) -> Result<IngestResult, DataError> {
    let total = quotes.len();
    let mut invalid_removed = 0;
    let mut by_date: BTreeMap<chrono::NaiveDate, RawQuote> = BTreeMap::new();

    for quote in quotes {
        if !quote.adj_close.is_finite() || quote.adj_close < 0.0 {
            invalid_removed += 1;
            continue;
        }
        by_date.insert(quote.date, quote);
    }

    let quotes: Vec<RawQuote> = by_date.into_values().collect();
    let duplicates_removed = total - invalid_removed - quotes.len();

    if quotes.is_empty() {
        return Err(DataError::ValidationError(format!(
            "no usable quotes ({total} received, {invalid_removed} invalid)"
        )));
    }
    if invalid_removed > 0 {
        warn!(invalid_removed, total, "dropped quotes with missing or negative adjusted close");
    }

    Ok(IngestResult {
        quotes,
        duplicates_removed,
        invalid_removed,
    })
}
