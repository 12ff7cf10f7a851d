//! The ranking request pipeline: adjust → resolve both ends → rank.
//!
//! Every failure is classified into a [`FailureKind`] for presentation:
//! missing data, an unknown reference, or a request that makes no sense.
//! An undefined percentage change is a per-row status, never a failure.

use crate::config::{ConfigError, RankingConfig};
use crate::data_loader::{load_panel, LoadError, LoadOptions, LoadedPanel};
use chrono::NaiveDate;
use ratiolab_core::data::{DownloadProgress, ParquetCache, PriceHistoryProvider};
use ratiolab_core::{
    adjust, rank, resolve_pair, AdjustmentError, CorporateActionAdjustment, PricePanel,
    RankError, RankedResult, RequestedDate, ResolveError, SortOrder,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Version of the serialized [`RankingReport`] layout.
pub const SCHEMA_VERSION: u32 = 1;

/// User-facing failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// No price data covers the request.
    DataUnavailable,
    /// The reference instrument is not in the panel.
    ReferenceNotFound,
    /// The request itself is malformed.
    InvalidRequest,
}

impl FailureKind {
    pub fn message(self) -> &'static str {
        match self {
            FailureKind::DataUnavailable => "no data available for the requested dates",
            FailureKind::ReferenceNotFound => "reference ticker not found",
            FailureKind::InvalidRequest => "invalid request",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Adjustment(#[from] AdjustmentError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Rank(#[from] RankError),

    #[error("no data for reference '{symbol}': {reason}")]
    ReferenceUnavailable { symbol: String, reason: String },
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Config(ConfigError::UnknownReference { .. }) => {
                FailureKind::ReferenceNotFound
            }
            PipelineError::Config(_) => FailureKind::InvalidRequest,
            PipelineError::Load(_) => FailureKind::DataUnavailable,
            PipelineError::Adjustment(_) => FailureKind::InvalidRequest,
            PipelineError::Resolve(ResolveError::InvertedRange { .. }) => {
                FailureKind::InvalidRequest
            }
            PipelineError::Resolve(_) => FailureKind::DataUnavailable,
            PipelineError::Rank(RankError::ReferenceNotFound { .. }) => {
                FailureKind::ReferenceNotFound
            }
            PipelineError::Rank(RankError::ReferencePriceMissing { .. }) => {
                FailureKind::DataUnavailable
            }
            PipelineError::Rank(_) => FailureKind::InvalidRequest,
            PipelineError::ReferenceUnavailable { .. } => FailureKind::DataUnavailable,
        }
    }
}

/// One ranking request against an in-memory panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRequest {
    pub reference: String,
    pub start: RequestedDate,
    pub end: RequestedDate,
    pub order: SortOrder,
    pub adjustments: Vec<CorporateActionAdjustment>,
}

impl RankingRequest {
    pub fn new(
        reference: impl Into<String>,
        start: impl Into<RequestedDate>,
        end: impl Into<RequestedDate>,
        order: SortOrder,
    ) -> Self {
        Self {
            reference: reference.into(),
            start: start.into(),
            end: end.into(),
            order,
            adjustments: Vec::new(),
        }
    }

    pub fn with_adjustments(mut self, adjustments: Vec<CorporateActionAdjustment>) -> Self {
        self.adjustments = adjustments;
        self
    }

    /// Request described by a validated config, with the end date
    /// defaulting to `today`.
    pub fn from_config(config: &RankingConfig, today: NaiveDate) -> Self {
        Self::new(
            config.ranking.reference.clone(),
            config.ranking.start_date,
            config.end_date_or(today),
            config.ranking.order,
        )
        .with_adjustments(config.adjustments.clone())
    }
}

/// A ranking plus the provenance needed to reproduce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingReport {
    pub schema_version: u32,
    pub request: RankingRequest,
    pub result: RankedResult,
    /// Fingerprint of the raw, unadjusted panel.
    pub panel_fingerprint: String,
    pub instrument_count: usize,
    #[serde(default)]
    pub has_synthetic: bool,
}

/// Run one request against an unadjusted panel.
///
/// The panel is never mutated: adjustments are applied to a copy.
pub fn run_ranking(
    panel: &PricePanel,
    request: &RankingRequest,
) -> Result<RankingReport, PipelineError> {
    let adjusted = adjust(panel, &request.adjustments)?;
    let (start, end) = resolve_pair(&adjusted, request.start, request.end)?;
    let result = rank(&adjusted, &request.reference, start, end, request.order)?;

    info!(
        reference = %request.reference,
        start = %start,
        end = %end,
        ranked = result.ranked().len(),
        undefined = result.undefined().len(),
        "ranking complete"
    );

    Ok(RankingReport {
        schema_version: SCHEMA_VERSION,
        request: request.clone(),
        result,
        panel_fingerprint: panel.fingerprint(),
        instrument_count: panel.instrument_count(),
        has_synthetic: false,
    })
}

/// Validate `config`, load its universe and rank it.
///
/// Returns the loaded panel too, so callers can report provenance.
pub fn run_config(
    config: &RankingConfig,
    today: NaiveDate,
    cache: &ParquetCache,
    provider: Option<&dyn PriceHistoryProvider>,
    progress: Option<&dyn DownloadProgress>,
    offline: bool,
    synthetic: bool,
) -> Result<(RankingReport, LoadedPanel), PipelineError> {
    config.validate(today)?;

    let opts = LoadOptions {
        start: config.ranking.start_date,
        end: config.end_date_or(today),
        offline,
        synthetic,
        force: false,
    };
    let symbols = config.universe.all_tickers();
    let loaded = load_panel(&symbols, cache, provider, progress, &opts)?;

    let reference = &config.ranking.reference;
    if let Some(reason) = loaded.missing.get(reference) {
        return Err(PipelineError::ReferenceUnavailable {
            symbol: reference.clone(),
            reason: reason.clone(),
        });
    }

    let request = RankingRequest::from_config(config, today);
    let mut report = run_ranking(&loaded.panel, &request)?;
    report.has_synthetic = loaded.has_synthetic;
    Ok((report, loaded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratiolab_core::{PctChange, UndefinedReason};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn panel() -> PricePanel {
        PricePanel::from_series(vec![
            ("A", vec![(d("2024-03-01"), 10.0), (d("2024-03-08"), 12.0)]),
            ("B", vec![(d("2024-03-01"), 20.0), (d("2024-03-08"), 30.0)]),
            ("C", vec![(d("2024-03-01"), 5.0), (d("2024-03-08"), 4.0)]),
            ("Z", vec![(d("2024-03-01"), 0.0), (d("2024-03-08"), 1.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn runs_request_end_to_end() {
        let request = RankingRequest::new("A", d("2024-03-02"), d("2024-03-10"), SortOrder::Descending);
        let report = run_ranking(&panel(), &request).unwrap();

        assert_eq!(report.schema_version, SCHEMA_VERSION);
        assert_eq!(report.result.start.date(), d("2024-03-01"));
        assert_eq!(report.result.end.date(), d("2024-03-08"));
        let symbols: Vec<&str> = report.result.ranked().iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["B", "C"]);
        assert_eq!(
            report.result.row("Z").unwrap().pct_change,
            PctChange::Undefined(UndefinedReason::ZeroStartRatio)
        );
    }

    #[test]
    fn adjustments_apply_to_a_copy() {
        let raw = panel();
        let request = RankingRequest::new("A", d("2024-03-01"), d("2024-03-08"), SortOrder::Ascending)
            .with_adjustments(vec![CorporateActionAdjustment::new("B", d("2024-03-08"), 1.0, 2.0)]);

        let report = run_ranking(&raw, &request).unwrap();

        // B: 10/10 -> 30/12
        let b = report.result.row("B").unwrap();
        assert!((b.ratio_start.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(raw.price("B", d("2024-03-01")), Some(20.0));
        assert_eq!(report.panel_fingerprint, raw.fingerprint());
    }

    #[test]
    fn failures_are_classified() {
        let p = panel();

        let unknown = RankingRequest::new("NOPE", d("2024-03-01"), d("2024-03-08"), SortOrder::Ascending);
        assert_eq!(
            run_ranking(&p, &unknown).unwrap_err().kind(),
            FailureKind::ReferenceNotFound
        );

        let too_early = RankingRequest::new("A", d("2024-01-01"), d("2024-03-08"), SortOrder::Ascending);
        assert_eq!(
            run_ranking(&p, &too_early).unwrap_err().kind(),
            FailureKind::DataUnavailable
        );

        let inverted = RankingRequest::new("A", d("2024-03-08"), d("2024-03-01"), SortOrder::Ascending);
        assert_eq!(
            run_ranking(&p, &inverted).unwrap_err().kind(),
            FailureKind::InvalidRequest
        );

        let bad_adjustment = RankingRequest::new("A", d("2024-03-01"), d("2024-03-08"), SortOrder::Ascending)
            .with_adjustments(vec![CorporateActionAdjustment::new("B", d("2024-03-08"), f64::NAN, 1.0)]);
        assert_eq!(
            run_ranking(&p, &bad_adjustment).unwrap_err().kind(),
            FailureKind::InvalidRequest
        );

        assert_eq!(
            run_ranking(&PricePanel::empty(), &unknown).unwrap_err().kind(),
            FailureKind::DataUnavailable
        );
    }

    #[test]
    fn request_from_config_defaults_end_to_today() {
        let config = RankingConfig::new("GGAL.BA", d("2024-01-02"));
        let request = RankingRequest::from_config(&config, d("2024-10-01"));
        assert_eq!(request.end, RequestedDate::Date(d("2024-10-01")));
        assert_eq!(request.order, SortOrder::Ascending);
    }
}
