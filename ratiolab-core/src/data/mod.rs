//! Data layer: providers, ingest, alignment into panels, and the Parquet cache.

pub mod align;
pub mod cache;
pub mod circuit_breaker;
pub mod download;
pub mod ingest;
pub mod provider;
pub mod universe;
pub mod yahoo;

pub use align::{align_quotes, common_zone};
pub use cache::{
    CacheMeta, CacheStatus, CachedQuotes, CoverageResult, FetchWindow, ParquetCache,
};
pub use circuit_breaker::CircuitBreaker;
pub use download::{download_symbols, DownloadSummary};
pub use ingest::{ingest, IngestResult};
pub use provider::{
    DataError, DataSource, DownloadProgress, FetchResult, PriceHistoryProvider, RawQuote,
    StdoutProgress,
};
pub use universe::{Universe, UniverseError};
pub use yahoo::YahooProvider;
