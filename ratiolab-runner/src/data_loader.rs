//! Panel loading and data resolution for the runner.
//!
//! Given a list of symbols, returns an aligned price panel. Per symbol:
//! 1. If online, fetch whatever part of the look-back window the cache does
//!    not yet span, and merge it into the cache
//! 2. Otherwise, or if that fetch fails, use the cache as it is (flagged
//!    stale when it does not span the request)
//! 3. If no data and `synthetic` is set, generate synthetic quotes (tagged)
//! 4. Otherwise record the symbol as missing
//!
//! The window starts [`LOOKBACK_DAYS`] before the requested start, so a
//! start date on a weekend or holiday still has a trading date at or before
//! it in the panel.
//!
//! A missing symbol simply has no column in the panel, so one delisted
//! ticker does not sink a ranking over the rest of the universe. Loading
//! fails only when no symbol could be loaded at all.

use chrono::{Datelike, NaiveDate};
use ratiolab_core::data::{
    align_quotes, common_zone, ingest, CachedQuotes, CoverageResult, DataError, DataSource,
    DownloadProgress, FetchWindow, ParquetCache, PriceHistoryProvider, RawQuote,
};
use ratiolab_core::{PanelError, PricePanel};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Calendar days fetched ahead of the requested start date.
pub const LOOKBACK_DAYS: i64 = 14;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no data could be loaded for any of {requested} symbols (first failure: {first_failure})")]
    NoData {
        requested: usize,
        first_failure: String,
    },

    #[error("no symbols requested")]
    NoSymbols,

    #[error("panel construction failed: {0}")]
    Panel(#[from] PanelError),

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Options controlling how quotes are loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Requested start date of the ranking. Loading reaches back
    /// [`LOOKBACK_DAYS`] before it.
    pub start: NaiveDate,
    /// Last date the panel must reach.
    pub end: NaiveDate,
    /// If true, never make network requests.
    pub offline: bool,
    /// If true, generate synthetic quotes when real data is unavailable.
    pub synthetic: bool,
    /// Re-fetch the whole window even if the cache spans it.
    pub force: bool,
}

impl LoadOptions {
    /// The date range the panel should span.
    pub fn window(&self) -> FetchWindow {
        let from = self.start - chrono::Duration::days(LOOKBACK_DAYS);
        FetchWindow::new(from, self.end.max(self.start))
    }
}

/// Result of loading a panel, including data source provenance.
#[derive(Debug)]
pub struct LoadedPanel {
    /// Aligned, unadjusted adjusted-close panel.
    pub panel: PricePanel,
    /// Data source per loaded symbol.
    pub sources: BTreeMap<String, DataSource>,
    /// Symbols that could not be loaded, with the reason.
    pub missing: BTreeMap<String, String>,
    /// Symbols served from a cache that does not span the request.
    pub stale: BTreeSet<String>,
    /// BLAKE3 fingerprint of the panel.
    pub fingerprint: String,
    /// Whether any symbol used synthetic data.
    pub has_synthetic: bool,
}

impl LoadedPanel {
    pub fn is_loaded(&self, symbol: &str) -> bool {
        self.sources.contains_key(symbol)
    }
}

/// Fetch the part of `window` the cache lacks and merge it in.
///
/// `Ok(None)` means the cache already spans the window.
fn refresh(
    provider: &dyn PriceHistoryProvider,
    cache: &ParquetCache,
    symbol: &str,
    window: FetchWindow,
    force: bool,
) -> Result<Option<CachedQuotes>, DataError> {
    let wanted = if force {
        Some(cache.refresh_window(symbol, window.from, window.through))
    } else {
        cache.missing_window(symbol, window.from, window.through)
    };
    let Some(wanted) = wanted else {
        return Ok(None);
    };

    debug!(symbol, from = %wanted.from, through = %wanted.through, "fetching");
    let fetched = provider.fetch(symbol, wanted.from, wanted.through)?;
    let quotes = if fetched.quotes.is_empty() && cache.get_meta(symbol).is_some() {
        // nothing traded in the gap; the window still counts as fetched
        Vec::new()
    } else {
        ingest(fetched.quotes)?.quotes
    };
    cache
        .merge(symbol, quotes, fetched.utc_offset_secs, wanted)
        .map(Some)
}

/// Load a panel for a set of symbols, refreshing the cache from the
/// provider where it falls short and falling back to synthetic data.
pub fn load_panel(
    symbols: &[&str],
    cache: &ParquetCache,
    provider: Option<&dyn PriceHistoryProvider>,
    progress: Option<&dyn DownloadProgress>,
    opts: &LoadOptions,
) -> Result<LoadedPanel, LoadError> {
    if symbols.is_empty() {
        return Err(LoadError::NoSymbols);
    }

    let window = opts.window();
    let total = symbols.len();
    let mut all_quotes: HashMap<String, Vec<RawQuote>> = HashMap::new();
    let mut offsets: Vec<Option<i32>> = Vec::new();
    let mut sources: BTreeMap<String, DataSource> = BTreeMap::new();
    let mut missing: BTreeMap<String, String> = BTreeMap::new();
    let mut stale: BTreeSet<String> = BTreeSet::new();
    let mut has_synthetic = false;

    for (i, symbol) in symbols.iter().enumerate() {
        if let Some(p) = progress {
            p.on_start(symbol, i, total);
        }

        // Step 1: bring the cache up to the window
        let mut failure = if opts.offline {
            "not cached (offline)".to_string()
        } else {
            "not cached and no provider available".to_string()
        };
        let online = provider.filter(|p| !opts.offline && p.is_available());
        let mut loaded: Option<(CachedQuotes, DataSource)> = None;
        if let Some(prov) = online {
            match refresh(prov, cache, symbol, window, opts.force) {
                Ok(Some(merged)) => loaded = Some((merged, DataSource::YahooFinance)),
                Ok(None) => debug!(symbol, "cache spans the requested window"),
                Err(e) => {
                    warn!(symbol, error = %e, "fetch failed; falling back to cache");
                    failure = e.to_string();
                }
            }
        }

        // Step 2: cache as-is
        if loaded.is_none() {
            if let Ok(cached) = cache.load(symbol) {
                if cache.covers_range(symbol, window.from, window.through)
                    != CoverageResult::FullyCovered
                {
                    warn!(
                        symbol,
                        from = %window.from,
                        through = %window.through,
                        "cached history does not span the requested window"
                    );
                    stale.insert(symbol.to_string());
                }
                loaded = Some((cached, DataSource::Cache));
            }
        }

        if let Some((cached, source)) = loaded {
            if let Some(p) = progress {
                p.on_complete(symbol, i, total, &Ok(()));
            }
            all_quotes.insert(symbol.to_string(), cached.quotes);
            offsets.push(cached.utc_offset_secs);
            sources.insert(symbol.to_string(), source);
            continue;
        }

        // Step 3: Synthetic fallback (if enabled)
        if opts.synthetic {
            warn!(symbol, "generating synthetic data; results will be tagged as synthetic");
            let quotes = generate_synthetic_quotes(symbol, window.from, window.through);
            if !quotes.is_empty() {
                if let Some(p) = progress {
                    p.on_complete(symbol, i, total, &Ok(()));
                }
                all_quotes.insert(symbol.to_string(), quotes);
                offsets.push(None);
                sources.insert(symbol.to_string(), DataSource::Synthetic);
                has_synthetic = true;
                continue;
            }
        }

        // Step 4: Record as missing
        warn!(symbol, reason = %failure, "symbol unavailable");
        if let Some(p) = progress {
            p.on_complete(symbol, i, total, &Err(DataError::Other(failure.clone())));
        }
        missing.insert(symbol.to_string(), failure);
    }

    if let Some(p) = progress {
        p.on_batch_complete(sources.len(), missing.len(), total);
    }

    if all_quotes.is_empty() {
        let first_failure = missing
            .values()
            .next()
            .cloned()
            .unwrap_or_else(|| "unknown".into());
        return Err(LoadError::NoData {
            requested: total,
            first_failure,
        });
    }

    let zone = common_zone(&offsets);
    let panel = align_quotes(all_quotes, zone)?;
    let fingerprint = panel.fingerprint();

    info!(
        loaded = sources.len(),
        missing = missing.len(),
        stale = stale.len(),
        dates = panel.dates().len(),
        zone = ?panel.zone(),
        "panel loaded"
    );

    Ok(LoadedPanel {
        panel,
        sources,
        missing,
        stale,
        fingerprint,
        has_synthetic,
    })
}

/// Generate synthetic quotes for testing/development.
///
/// A random walk from 100.0 on weekdays, seeded from the symbol name so the
/// same symbol always yields the same series.
fn generate_synthetic_quotes(symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<RawQuote> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut quotes = Vec::new();
    let mut price = rng.gen_range(20.0..500.0_f64);
    let mut current = start;

    while current <= end {
        let weekday = current.weekday();
        if weekday != chrono::Weekday::Sat && weekday != chrono::Weekday::Sun {
            let daily_return: f64 = rng.gen_range(-0.03..0.03);
            price *= 1.0 + daily_return;
            quotes.push(RawQuote {
                date: current,
                close: price,
                adj_close: price,
            });
        }
        current += chrono::Duration::days(1);
    }

    quotes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratiolab_core::data::FetchResult;
    use ratiolab_core::{resolve, AxisZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn quote(day: u32, p: f64) -> RawQuote {
        RawQuote {
            date: d(2024, 1, day),
            close: p,
            adj_close: p,
        }
    }

    fn opts(offline: bool, synthetic: bool) -> LoadOptions {
        LoadOptions {
            start: d(2024, 1, 1),
            end: d(2024, 3, 31),
            offline,
            synthetic,
            force: false,
        }
    }

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
            if symbol == "DELISTED.BA" {
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.into(),
                });
            }
            Ok(FetchResult {
                symbol: symbol.into(),
                quotes: vec![quote(2, 10.0), quote(3, 11.0)],
                source: DataSource::Fixture,
                utc_offset_secs: Some(-10800),
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn load_from_cache_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        cache
            .write("GGAL.BA", &[quote(2, 100.0), quote(3, 101.0)], Some(-10800))
            .unwrap();

        let loaded = load_panel(&["GGAL.BA"], &cache, None, None, &opts(false, false)).unwrap();

        assert_eq!(loaded.panel.dates().len(), 2);
        assert_eq!(loaded.sources["GGAL.BA"], DataSource::Cache);
        assert_eq!(loaded.panel.zone(), AxisZone::Fixed { offset_secs: -10800 });
        assert!(!loaded.has_synthetic);
        assert!(!loaded.fingerprint.is_empty());
    }

    #[test]
    fn offline_without_cache_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());

        let err = load_panel(&["GGAL.BA"], &cache, None, None, &opts(true, false)).unwrap_err();
        assert!(matches!(err, LoadError::NoData { requested: 1, .. }));
        assert!(err.to_string().contains("offline"));
    }

    #[test]
    fn download_fills_cache_and_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = FixtureProvider {
            calls: AtomicUsize::new(0),
        };

        let loaded = load_panel(
            &["GGAL.BA", "DELISTED.BA"],
            &cache,
            Some(&provider),
            None,
            &opts(false, false),
        )
        .unwrap();

        assert!(loaded.is_loaded("GGAL.BA"));
        assert!(!loaded.is_loaded("DELISTED.BA"));
        assert!(loaded.missing["DELISTED.BA"].contains("symbol not found"));
        assert!(!loaded.panel.contains("DELISTED.BA"));

        // second load comes from cache
        let again = load_panel(&["GGAL.BA"], &cache, Some(&provider), None, &opts(false, false))
            .unwrap();
        assert_eq!(again.sources["GGAL.BA"], DataSource::Cache);
        assert_eq!(provider.calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn synthetic_fallback_produces_tagged_data() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());

        let loaded = load_panel(&["FAKE.BA"], &cache, None, None, &opts(true, true)).unwrap();

        assert!(loaded.has_synthetic);
        assert_eq!(loaded.sources["FAKE.BA"], DataSource::Synthetic);
        assert_eq!(loaded.panel.zone(), AxisZone::Naive);
        assert!(!loaded.panel.is_empty());
    }

    #[test]
    fn synthetic_data_is_deterministic_per_symbol() {
        let a = generate_synthetic_quotes("GGAL.BA", d(2024, 1, 1), d(2024, 1, 31));
        let b = generate_synthetic_quotes("GGAL.BA", d(2024, 1, 1), d(2024, 1, 31));
        let c = generate_synthetic_quotes("YPFD.BA", d(2024, 1, 1), d(2024, 1, 31));

        assert_eq!(a, b);
        assert_eq!(a.len(), c.len());
        assert_ne!(a[0].adj_close, c[0].adj_close);
        assert!(a
            .iter()
            .all(|q| q.date.weekday() != chrono::Weekday::Sat && q.date.weekday() != chrono::Weekday::Sun));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        cache.write("GGAL.BA", &[quote(2, 100.0)], None).unwrap();

        let one = load_panel(&["GGAL.BA"], &cache, None, None, &opts(true, false)).unwrap();
        let two = load_panel(&["GGAL.BA"], &cache, None, None, &opts(true, false)).unwrap();
        assert_eq!(one.fingerprint, two.fingerprint);
    }

    #[test]
    fn no_symbols_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        assert!(matches!(
            load_panel(&[], &cache, None, None, &opts(true, false)),
            Err(LoadError::NoSymbols)
        ));
    }

    /// Weekday history from 2023-01-02 through `last`, served strictly
    /// within the requested range. Records every request.
    struct RangeProvider {
        last: NaiveDate,
        requests: Mutex<Vec<FetchWindow>>,
    }

    impl RangeProvider {
        fn new(last: NaiveDate) -> Self {
            Self {
                last,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<FetchWindow> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl PriceHistoryProvider for RangeProvider {
        fn name(&self) -> &str {
            "range"
        }

        fn fetch(
            &self,
            symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<FetchResult, DataError> {
            self.requests
                .lock()
                .unwrap()
                .push(FetchWindow::new(start, end));
            let first = d(2023, 1, 2).max(start);
            let scale = f64::from(symbol.as_bytes()[0]);
            let quotes = first
                .iter_days()
                .take_while(|day| *day <= end.min(self.last))
                .filter(|day| day.weekday().number_from_monday() <= 5)
                .map(|day| {
                    let p = scale + (day - d(2023, 1, 1)).num_days() as f64;
                    RawQuote {
                        date: day,
                        close: p,
                        adj_close: p,
                    }
                })
                .collect();
            Ok(FetchResult {
                symbol: symbol.into(),
                quotes,
                source: DataSource::Fixture,
                utc_offset_secs: Some(-10800),
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn range_opts(start: NaiveDate, end: NaiveDate) -> LoadOptions {
        LoadOptions {
            start,
            end,
            offline: false,
            synthetic: false,
            force: false,
        }
    }

    #[test]
    fn weekend_start_reaches_back_to_previous_trading_day() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = RangeProvider::new(d(2024, 12, 31));

        // Saturday
        let opts = range_opts(d(2024, 3, 2), d(2024, 3, 8));
        let loaded = load_panel(&["GGAL.BA"], &cache, Some(&provider), None, &opts).unwrap();

        assert_eq!(
            provider.requests(),
            vec![FetchWindow::new(d(2024, 2, 17), d(2024, 3, 8))]
        );
        assert_eq!(loaded.sources["GGAL.BA"], DataSource::YahooFinance);
        let start = resolve(&loaded.panel, d(2024, 3, 2)).unwrap();
        assert_eq!(start.date(), d(2024, 3, 1));
    }

    #[test]
    fn earlier_start_fetches_only_the_missing_front() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = RangeProvider::new(d(2024, 12, 31));

        let later_start = range_opts(d(2024, 6, 3), d(2024, 7, 1));
        load_panel(&["GGAL.BA"], &cache, Some(&provider), None, &later_start).unwrap();
        let loaded = load_panel(
            &["GGAL.BA"],
            &cache,
            Some(&provider),
            None,
            &range_opts(d(2023, 6, 1), d(2024, 7, 1)),
        )
        .unwrap();

        assert_eq!(
            provider.requests()[1],
            FetchWindow::new(d(2023, 5, 18), d(2024, 5, 20))
        );
        assert_eq!(loaded.panel.first_date(), Some(d(2023, 5, 18)));
        assert_eq!(loaded.panel.last_date(), Some(d(2024, 7, 1)));
        assert!(loaded.stale.is_empty());
    }

    #[test]
    fn advancing_end_fetches_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = RangeProvider::new(d(2024, 12, 31));

        let first = load_panel(
            &["GGAL.BA"],
            &cache,
            Some(&provider),
            None,
            &range_opts(d(2024, 6, 3), d(2024, 7, 1)),
        )
        .unwrap();
        assert_eq!(first.panel.last_date(), Some(d(2024, 7, 1)));

        let later = load_panel(
            &["GGAL.BA"],
            &cache,
            Some(&provider),
            None,
            &range_opts(d(2024, 6, 3), d(2024, 10, 1)),
        )
        .unwrap();

        assert_eq!(
            provider.requests()[1],
            FetchWindow::new(d(2024, 7, 1), d(2024, 10, 1))
        );
        assert_eq!(later.panel.last_date(), Some(d(2024, 10, 1)));
        assert_eq!(later.panel.first_date(), first.panel.first_date());
    }

    #[test]
    fn spanned_window_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = RangeProvider::new(d(2024, 12, 31));
        let opts = range_opts(d(2024, 3, 4), d(2024, 3, 29));

        load_panel(&["GGAL.BA"], &cache, Some(&provider), None, &opts).unwrap();
        let again = load_panel(&["GGAL.BA"], &cache, Some(&provider), None, &opts).unwrap();

        assert_eq!(provider.requests().len(), 1);
        assert_eq!(again.sources["GGAL.BA"], DataSource::Cache);
        assert!(again.stale.is_empty());
    }

    #[test]
    fn empty_gap_still_counts_as_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        // history stops on Friday 2024-03-08
        let provider = RangeProvider::new(d(2024, 3, 8));

        let weekdays = range_opts(d(2024, 3, 4), d(2024, 3, 8));
        load_panel(&["GGAL.BA"], &cache, Some(&provider), None, &weekdays).unwrap();
        let weekend = range_opts(d(2024, 3, 4), d(2024, 3, 10));
        load_panel(&["GGAL.BA"], &cache, Some(&provider), None, &weekend).unwrap();
        load_panel(&["GGAL.BA"], &cache, Some(&provider), None, &weekend).unwrap();

        // the Sunday tail is asked for once, then trusted
        assert_eq!(provider.requests().len(), 2);
        assert_eq!(
            cache.get_meta("GGAL.BA").unwrap().window().through,
            d(2024, 3, 10)
        );
    }

    #[test]
    fn offline_cache_short_of_the_window_is_flagged_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        cache
            .write("GGAL.BA", &[quote(2, 100.0), quote(3, 101.0)], None)
            .unwrap();

        let loaded = load_panel(&["GGAL.BA"], &cache, None, None, &opts(true, false)).unwrap();

        assert_eq!(loaded.sources["GGAL.BA"], DataSource::Cache);
        assert!(loaded.stale.contains("GGAL.BA"));
    }

    #[test]
    fn failed_refresh_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        cache
            .write("DELISTED.BA", &[quote(2, 100.0), quote(3, 101.0)], None)
            .unwrap();
        let provider = FixtureProvider {
            calls: AtomicUsize::new(0),
        };

        let loaded = load_panel(
            &["DELISTED.BA"],
            &cache,
            Some(&provider),
            None,
            &opts(false, false),
        )
        .unwrap();

        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
        assert_eq!(loaded.sources["DELISTED.BA"], DataSource::Cache);
        assert!(loaded.stale.contains("DELISTED.BA"));
        assert!(loaded.missing.is_empty());
    }
}
