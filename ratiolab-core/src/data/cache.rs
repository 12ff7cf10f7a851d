//! Parquet price cache.
//!
//! Layout: `{cache_dir}/symbol={SYMBOL}/{year}.parquet`, one file per
//! calendar year, plus a `meta.json` sidecar.
//!
//! The sidecar records the *fetch window*: the date range the provider was
//! asked for, which is wider than the range of quotes it returned whenever
//! the window starts or ends on a non-trading day. Coverage is judged
//! against that window, so a weekend start date or a today with no bar yet
//! is not mistaken for a gap.
//!
//! Files are written to `.tmp` and renamed into place. A file that fails to
//! decode is renamed to `.quarantined` and skipped.

use super::provider::{DataError, RawQuote};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const META_FILE: &str = "meta.json";

/// Inclusive date range requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub from: NaiveDate,
    pub through: NaiveDate,
}

impl FetchWindow {
    pub fn new(from: NaiveDate, through: NaiveDate) -> Self {
        Self { from, through }
    }

    pub fn contains(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.from <= start && end <= self.through
    }

    /// Smallest window holding both.
    pub fn hull(self, other: FetchWindow) -> FetchWindow {
        FetchWindow {
            from: self.from.min(other.from),
            through: self.through.max(other.through),
        }
    }
}

/// Sidecar describing a cached ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    /// First cached quote.
    pub start_date: NaiveDate,
    /// Last cached quote.
    pub end_date: NaiveDate,
    pub quote_count: usize,
    pub data_hash: String,
    #[serde(default)]
    pub utc_offset_secs: Option<i32>,
    /// Range requested from the provider; absent for hand-written entries.
    #[serde(default)]
    pub fetched: Option<FetchWindow>,
    pub cached_at: chrono::NaiveDateTime,
}

impl CacheMeta {
    /// The window the cache can vouch for.
    pub fn window(&self) -> FetchWindow {
        self.fetched
            .unwrap_or_else(|| FetchWindow::new(self.start_date, self.end_date))
    }
}

/// Quotes loaded back from the cache.
#[derive(Debug, Clone)]
pub struct CachedQuotes {
    pub quotes: Vec<RawQuote>,
    pub utc_offset_secs: Option<i32>,
}

/// Cache status for a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub cached: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub quote_count: Option<usize>,
}

/// How well the cache covers a requested date range.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageResult {
    NotCached,
    FullyCovered,
    /// Cached, but the recorded window misses part of the request.
    PartiallyCovered {
        cached_start: NaiveDate,
        cached_end: NaiveDate,
    },
}

#[derive(Debug)]
pub struct ParquetCache {
    cache_dir: PathBuf,
}

impl ParquetCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir.join(format!("symbol={symbol}"))
    }

    /// Replace everything cached for `symbol` with `quotes`.
    ///
    /// The recorded window is the quotes' own date range.
    pub fn write(
        &self,
        symbol: &str,
        quotes: &[RawQuote],
        utc_offset_secs: Option<i32>,
    ) -> Result<(), DataError> {
        self.store(symbol, quotes, utc_offset_secs, None)
    }

    /// Fold freshly fetched quotes into the cached history.
    ///
    /// Fetched quotes win on dates present in both. The recorded window
    /// grows to the hull of the old window and `window`, so callers must
    /// fetch a range that touches or overlaps what is cached. Returns the
    /// merged history.
    pub fn merge(
        &self,
        symbol: &str,
        fetched: Vec<RawQuote>,
        utc_offset_secs: Option<i32>,
        window: FetchWindow,
    ) -> Result<CachedQuotes, DataError> {
        let previous = self.get_meta(symbol).map(|m| m.window());
        let mut by_date: BTreeMap<NaiveDate, RawQuote> = BTreeMap::new();
        let mut offset = utc_offset_secs;

        if previous.is_some() {
            if let Ok(cached) = self.load(symbol) {
                offset = offset.or(cached.utc_offset_secs);
                by_date.extend(cached.quotes.into_iter().map(|q| (q.date, q)));
            }
        }
        let fresh = fetched.len();
        by_date.extend(fetched.into_iter().map(|q| (q.date, q)));

        let quotes: Vec<RawQuote> = by_date.into_values().collect();
        let window = previous.map_or(window, |p| p.hull(window));
        self.store(symbol, &quotes, offset, Some(window))?;

        debug!(
            symbol,
            fresh,
            total = quotes.len(),
            from = %window.from,
            through = %window.through,
            "merged fetched quotes into cache"
        );
        Ok(CachedQuotes {
            quotes,
            utc_offset_secs: offset,
        })
    }

    fn store(
        &self,
        symbol: &str,
        quotes: &[RawQuote],
        utc_offset_secs: Option<i32>,
        fetched: Option<FetchWindow>,
    ) -> Result<(), DataError> {
        let dates = quotes.iter().map(|q| q.date);
        let (Some(first), Some(last)) = (dates.clone().min(), dates.max()) else {
            return Err(DataError::CacheError(format!("no quotes to cache for {symbol}")));
        };

        let dir = self.symbol_dir(symbol);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::CacheError(format!("create {}: {e}", dir.display())))?;

        let mut by_year: BTreeMap<i32, Vec<RawQuote>> = BTreeMap::new();
        for quote in quotes {
            by_year.entry(quote.date.year()).or_default().push(quote.clone());
        }
        for (year, year_quotes) in &by_year {
            replace_file(&dir.join(format!("{year}.parquet")), |tmp| {
                year_file::write(tmp, year_quotes)
            })?;
        }
        let years: BTreeSet<i32> = by_year.keys().copied().collect();
        remove_stale_years(&dir, &years);

        let meta = CacheMeta {
            symbol: symbol.to_string(),
            start_date: first,
            end_date: last,
            quote_count: quotes.len(),
            data_hash: content_hash(quotes),
            utc_offset_secs,
            fetched,
            cached_at: chrono::Local::now().naive_local(),
        };
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        replace_file(&dir.join(META_FILE), |tmp| {
            fs::write(tmp, &json).map_err(|e| DataError::CacheError(format!("meta write: {e}")))
        })?;

        debug!(symbol, quotes = quotes.len(), years = years.len(), "cached quotes");
        Ok(())
    }

    /// All cached quotes for a symbol, sorted by date.
    pub fn load(&self, symbol: &str) -> Result<CachedQuotes, DataError> {
        let no_data = || DataError::NoCachedData {
            symbol: symbol.to_string(),
        };
        let entries = fs::read_dir(self.symbol_dir(symbol)).map_err(|_| no_data())?;

        let mut quotes = Vec::new();
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            match year_file::read(&path) {
                Ok(year) => quotes.extend(year),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "quarantining unreadable cache file");
                    let _ = fs::rename(&path, path.with_extension("parquet.quarantined"));
                }
            }
        }
        if quotes.is_empty() {
            return Err(no_data());
        }

        quotes.sort_by_key(|q| q.date);
        Ok(CachedQuotes {
            quotes,
            utc_offset_secs: self.get_meta(symbol).and_then(|m| m.utc_offset_secs),
        })
    }

    pub fn get_meta(&self, symbol: &str) -> Option<CacheMeta> {
        let bytes = fs::read(self.symbol_dir(symbol).join(META_FILE)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn status(&self, symbols: &[&str]) -> Vec<CacheStatus> {
        symbols
            .iter()
            .map(|sym| match self.get_meta(sym) {
                Some(meta) => CacheStatus {
                    symbol: sym.to_string(),
                    cached: true,
                    start_date: Some(meta.start_date),
                    end_date: Some(meta.end_date),
                    quote_count: Some(meta.quote_count),
                },
                None => CacheStatus {
                    symbol: sym.to_string(),
                    cached: false,
                    start_date: None,
                    end_date: None,
                    quote_count: None,
                },
            })
            .collect()
    }

    /// Whether the recorded fetch window spans `[start, end]`.
    pub fn covers_range(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> CoverageResult {
        let Some(window) = self.get_meta(symbol).map(|m| m.window()) else {
            return CoverageResult::NotCached;
        };
        if window.contains(start, end) {
            CoverageResult::FullyCovered
        } else {
            CoverageResult::PartiallyCovered {
                cached_start: window.from,
                cached_end: window.through,
            }
        }
    }

    /// The range to fetch so that, once merged, the cache spans
    /// `[start, end]`. `None` when it already does.
    ///
    /// The result always touches the recorded window, which keeps the
    /// merged window free of holes. When only one side is missing, only
    /// that side is fetched.
    pub fn missing_window(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<FetchWindow> {
        let Some(cached) = self.get_meta(symbol).map(|m| m.window()) else {
            return Some(FetchWindow::new(start, end));
        };
        match (start < cached.from, end > cached.through) {
            (false, false) => None,
            (true, false) => Some(FetchWindow::new(start, cached.from)),
            (false, true) => Some(FetchWindow::new(cached.through, end)),
            (true, true) => Some(FetchWindow::new(start, end)),
        }
    }

    /// `[start, end]` widened to include the recorded window, for a full
    /// refresh that keeps the merged window contiguous.
    pub fn refresh_window(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> FetchWindow {
        let requested = FetchWindow::new(start, end);
        match self.get_meta(symbol) {
            Some(meta) => meta.window().hull(requested),
            None => requested,
        }
    }
}

/// Write through `{path}.tmp` and rename over `path`.
fn replace_file(
    path: &Path,
    write: impl FnOnce(&Path) -> Result<(), DataError>,
) -> Result<(), DataError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    write(&tmp)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        DataError::CacheError(format!("rename into {}: {e}", path.display()))
    })
}

fn remove_stale_years(dir: &Path, keep: &BTreeSet<i32>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
        let year = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".parquet"))
            .and_then(|y| y.parse::<i32>().ok());
        if let Some(year) = year.filter(|y| !keep.contains(y)) {
            debug!(path = %path.display(), year, "removing stale cache year");
            let _ = fs::remove_file(&path);
        }
    }
}

fn content_hash(quotes: &[RawQuote]) -> String {
    let mut hasher = blake3::Hasher::new();
    for q in quotes {
        hasher.update(&q.date.num_days_from_ce().to_le_bytes());
        hasher.update(&q.close.to_le_bytes());
        hasher.update(&q.adj_close.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Polars encoding of one year of quotes: `date` (Date), `close`, `adj_close`.
mod year_file {
    use super::*;

    const COLUMNS: [&str; 3] = ["date", "close", "adj_close"];

    fn epoch() -> NaiveDate {
        chrono::DateTime::UNIX_EPOCH.date_naive()
    }

    fn err(context: &str) -> impl Fn(PolarsError) -> DataError + '_ {
        move |e| DataError::ParquetError(format!("{context}: {e}"))
    }

    pub(super) fn write(path: &Path, quotes: &[RawQuote]) -> Result<(), DataError> {
        let days: Vec<i32> = quotes
            .iter()
            .map(|q| (q.date - epoch()).num_days() as i32)
            .collect();
        let close: Vec<f64> = quotes.iter().map(|q| q.close).collect();
        let adj_close: Vec<f64> = quotes.iter().map(|q| q.adj_close).collect();

        let mut df = DataFrame::new(vec![
            Column::new(COLUMNS[0].into(), days)
                .cast(&DataType::Date)
                .map_err(err("date cast"))?,
            Column::new(COLUMNS[1].into(), close),
            Column::new(COLUMNS[2].into(), adj_close),
        ])
        .map_err(err("dataframe"))?;

        let file = fs::File::create(path)
            .map_err(|e| DataError::ParquetError(format!("create {}: {e}", path.display())))?;
        ParquetWriter::new(file).finish(&mut df).map_err(err("write"))?;
        Ok(())
    }

    pub(super) fn read(path: &Path) -> Result<Vec<RawQuote>, DataError> {
        let file = fs::File::open(path)
            .map_err(|e| DataError::ParquetError(format!("open {}: {e}", path.display())))?;
        let df = ParquetReader::new(file).finish().map_err(err("read"))?;

        if df.height() == 0 {
            return Err(DataError::ValidationError("empty parquet file".into()));
        }
        if let Some(absent) = COLUMNS.iter().find(|c| df.column(c).is_err()) {
            return Err(DataError::ValidationError(format!("missing column '{absent}'")));
        }

        let days = df.column(COLUMNS[0]).and_then(|c| c.date()).map_err(err("date column"))?;
        let close = df.column(COLUMNS[1]).and_then(|c| c.f64()).map_err(err("close column"))?;
        let adj = df.column(COLUMNS[2]).and_then(|c| c.f64()).map_err(err("adj_close column"))?;

        (0..df.height())
            .map(|i| {
                let day = days
                    .get(i)
                    .ok_or_else(|| DataError::ValidationError(format!("null date at row {i}")))?;
                Ok(RawQuote {
                    date: epoch() + chrono::Duration::days(i64::from(day)),
                    close: close.get(i).unwrap_or(f64::NAN),
                    adj_close: adj.get(i).unwrap_or(f64::NAN),
                })
            })
            .collect()
    }
}
