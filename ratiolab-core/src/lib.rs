//! RatioLab Core: price panels and relative-performance ranking.
//!
//! This crate contains the computational core and its data plumbing:
//! - Domain types (price panel, corporate-action records, ratio rows, ranked results)
//! - Corporate-action adjustment of a raw panel
//! - Nearest trading date resolution across naive and zone-bearing axes
//! - Ratio ranking against a reference instrument
//! - Price history providers, ingest, alignment and the Parquet cache

pub mod adjust;
pub mod data;
pub mod domain;
pub mod rank;
pub mod resolve;

pub use adjust::adjust;
pub use domain::{
    AdjustmentError, AxisZone, CorporateActionAdjustment, PanelError, PctChange, PricePanel,
    RankedResult, RatioRow, ResolvedDate, SortOrder, UndefinedReason,
};
pub use rank::{rank, ratio_series, RankError};
pub use resolve::{resolve, resolve_pair, RequestedDate, ResolveError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything a request pipeline hands across
    /// threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<PricePanel>();
        require_sync::<PricePanel>();
        require_send::<CorporateActionAdjustment>();
        require_sync::<CorporateActionAdjustment>();
        require_send::<ResolvedDate>();
        require_sync::<ResolvedDate>();
        require_send::<RequestedDate>();
        require_sync::<RequestedDate>();
        require_send::<RatioRow>();
        require_sync::<RatioRow>();
        require_send::<RankedResult>();
        require_sync::<RankedResult>();

        require_send::<RankError>();
        require_sync::<RankError>();
        require_send::<ResolveError>();
        require_sync::<ResolveError>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();

        require_send::<data::ParquetCache>();
        require_sync::<data::ParquetCache>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
    }

    /// Architecture contract: the ranking engine only sees an in-memory panel.
    ///
    /// `rank()` takes the panel by shared reference and returns a fresh
    /// result, so it cannot reach a provider, a cache or mutate its input.
    #[test]
    fn rank_takes_panel_by_shared_reference() {
        fn _check(
            panel: &PricePanel,
            start: ResolvedDate,
            end: ResolvedDate,
        ) -> Result<RankedResult, RankError> {
            rank(panel, "GGAL.BA", start, end, SortOrder::Ascending)
        }
    }
}
