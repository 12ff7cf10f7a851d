//! Download orchestrator: fetch, ingest and cache a batch of symbols with progress reporting.

use super::cache::{FetchWindow, ParquetCache};
use super::ingest;
use super::provider::{DataError, DownloadProgress, PriceHistoryProvider};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// Download multiple symbols, running them through the ingest pipeline and caching.
///
/// Returns a summary of successes and failures.
pub fn download_symbols(
    provider: &dyn PriceHistoryProvider,
    cache: &ParquetCache,
    symbols: &[&str],
    start: NaiveDate,
    end: NaiveDate,
    force: bool,
    progress: &dyn DownloadProgress,
) -> DownloadSummary {
    let total = symbols.len();
    let mut succeeded = 0;
    let mut failed = 0;
    let mut errors: Vec<(String, DataError)> = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        progress.on_start(symbol, i, total);

        let window = if force {
            Some(cache.refresh_window(symbol, start, end))
        } else {
            cache.missing_window(symbol, start, end)
        };
        let Some(window) = window else {
            debug!(symbol, "cache already spans the requested range");
            progress.on_complete(symbol, i, total, &Ok(()));
            succeeded += 1;
            continue;
        };

        let result = download_single(provider, cache, symbol, window);
        progress.on_complete(symbol, i, total, &result);

        match result {
            Ok(()) => succeeded += 1,
            Err(e) => {
                errors.push((symbol.to_string(), e));
                failed += 1;
            }
        }

        // Bail out early if circuit breaker tripped
        if !provider.is_available() {
            warn!(remaining = total - i - 1, "provider unavailable, skipping remaining symbols");
            for sym in &symbols[(i + 1)..total] {
                errors.push((sym.to_string(), DataError::CircuitBreakerTripped));
                failed += 1;
            }
            break;
        }
    }

    progress.on_batch_complete(succeeded, failed, total);

    DownloadSummary {
        total,
        succeeded,
        failed,
        errors,
    }
}

/// Fetch one window for a symbol, ingest it and merge it into the cache.
fn download_single(
    provider: &dyn PriceHistoryProvider,
    cache: &ParquetCache,
    symbol: &str,
    window: FetchWindow,
) -> Result<(), DataError> {
    let fetch_result = provider.fetch(symbol, window.from, window.through)?;
    let ingest_result = ingest::ingest(fetch_result.quotes)?;
    let fetched = ingest_result.quotes.len();
    cache.merge(symbol, ingest_result.quotes, fetch_result.utc_offset_secs, window)?;
    debug!(
        symbol,
        quotes = fetched,
        duplicates = ingest_result.duplicates_removed,
        invalid = ingest_result.invalid_removed,
        "downloaded"
    );
    Ok(())
}

/// Summary of a batch download operation.
#[derive(Debug)]
pub struct DownloadSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(String, DataError)>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{DataSource, FetchResult, RawQuote};
    use std::env;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_cache() -> ParquetCache {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("ratiolab_download_{}_{id}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        ParquetCache::new(dir)
    }

    struct SilentProgress;

    impl DownloadProgress for SilentProgress {
        fn on_start(&self, _: &str, _: usize, _: usize) {}
        fn on_complete(&self, _: &str, _: usize, _: usize, _: &Result<(), DataError>) {}
        fn on_batch_complete(&self, _: usize, _: usize, _: usize) {}
    }

    /// Serves two quotes for every symbol except `MISSING.BA`.
    struct FixtureProvider {
        calls: AtomicUsize,
    }

    impl PriceHistoryProvider for FixtureProvider {
        fn name(&self) -> &str {
            "fixture"
        }

        fn fetch(
            &self,
            symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<FetchResult, DataError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if symbol == "MISSING.BA" {
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                });
            }
            let quote = |d: u32, p: f64| RawQuote {
                date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
                close: p,
                adj_close: p,
            };
            Ok(FetchResult {
                symbol: symbol.to_string(),
                quotes: vec![quote(3, 11.0), quote(2, 10.0)],
                source: DataSource::Fixture,
                utc_offset_secs: Some(-10800),
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn downloads_and_caches_with_partial_failure() {
        let cache = temp_cache();
        let provider = FixtureProvider {
            calls: AtomicUsize::new(0),
        };

        let summary = download_symbols(
            &provider,
            &cache,
            &["GGAL.BA", "MISSING.BA"],
            d(2),
            d(3),
            false,
            &SilentProgress,
        );

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.errors[0].0, "MISSING.BA");

        let cached = cache.load("GGAL.BA").unwrap();
        assert_eq!(cached.quotes[0].date, d(2));
        assert_eq!(cached.utc_offset_secs, Some(-10800));
    }

    #[test]
    fn fresh_cache_is_skipped_unless_forced() {
        let cache = temp_cache();
        let provider = FixtureProvider {
            calls: AtomicUsize::new(0),
        };

        download_symbols(&provider, &cache, &["GGAL.BA"], d(2), d(3), false, &SilentProgress);
        download_symbols(&provider, &cache, &["GGAL.BA"], d(2), d(3), false, &SilentProgress);
        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);

        download_symbols(&provider, &cache, &["GGAL.BA"], d(2), d(3), true, &SilentProgress);
        assert_eq!(provider.calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn extending_the_range_fetches_only_the_new_side() {
        let cache = temp_cache();
        let provider = FixtureProvider {
            calls: AtomicUsize::new(0),
        };

        download_symbols(&provider, &cache, &["GGAL.BA"], d(2), d(3), false, &SilentProgress);
        let summary =
            download_symbols(&provider, &cache, &["GGAL.BA"], d(2), d(10), false, &SilentProgress);

        assert!(summary.all_succeeded());
        assert_eq!(provider.calls.load(Ordering::Relaxed), 2);
        let meta = cache.get_meta("GGAL.BA").unwrap();
        assert_eq!(meta.window(), FetchWindow::new(d(2), d(10)));
        assert_eq!(meta.quote_count, 2);
    }
}
