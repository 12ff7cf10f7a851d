//! Multi-reference sweeps: rank the same panel against many references.
//!
//! The panel is adjusted once and shared read-only across Rayon workers.
//! Each reference resolves and ranks independently, so one failing reference
//! never aborts the others.

use crate::pipeline::{PipelineError, RankingRequest};
use rayon::prelude::*;
use ratiolab_core::{
    adjust, rank, resolve_pair, PricePanel, RankedResult, RatioRow, ResolvedDate,
};
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of ranking against one reference.
#[derive(Debug)]
pub struct SweepEntry {
    pub reference: String,
    pub outcome: Result<RankedResult, PipelineError>,
}

impl SweepEntry {
    pub fn best(&self) -> Option<&RatioRow> {
        self.outcome.as_ref().ok().and_then(RankedResult::best)
    }

    pub fn worst(&self) -> Option<&RatioRow> {
        self.outcome.as_ref().ok().and_then(RankedResult::worst)
    }
}

/// Compact per-reference line for printing or export.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummaryRow {
    pub reference: String,
    pub ranked: usize,
    pub undefined: usize,
    pub best: Option<(String, f64)>,
    pub worst: Option<(String, f64)>,
    pub error: Option<String>,
}

/// Results from a sweep, in reference order.
#[derive(Debug)]
pub struct SweepResults {
    pub start: ResolvedDate,
    pub end: ResolvedDate,
    entries: Vec<SweepEntry>,
}

impl SweepResults {
    pub fn entries(&self) -> &[SweepEntry] {
        &self.entries
    }

    pub fn get(&self, reference: &str) -> Option<&SweepEntry> {
        self.entries.iter().find(|e| e.reference == reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_err()).count()
    }

    pub fn summary(&self) -> Vec<SweepSummaryRow> {
        self.entries
            .iter()
            .map(|entry| {
                let pick = |row: Option<&RatioRow>| {
                    row.and_then(|r| r.pct_change.value().map(|v| (r.symbol.clone(), v)))
                };
                match &entry.outcome {
                    Ok(result) => SweepSummaryRow {
                        reference: entry.reference.clone(),
                        ranked: result.ranked().len(),
                        undefined: result.undefined().len(),
                        best: pick(result.best()),
                        worst: pick(result.worst()),
                        error: None,
                    },
                    Err(e) => SweepSummaryRow {
                        reference: entry.reference.clone(),
                        ranked: 0,
                        undefined: 0,
                        best: None,
                        worst: None,
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect()
    }
}

/// Rank `panel` against every symbol in `references` in parallel.
///
/// `template` supplies the dates, order and adjustments; its `reference`
/// field is ignored. A range that cannot be resolved fails the whole sweep,
/// since it would fail every reference alike.
pub fn sweep_references(
    panel: &PricePanel,
    references: &[&str],
    template: &RankingRequest,
) -> Result<SweepResults, PipelineError> {
    let adjusted = adjust(panel, &template.adjustments)?;
    let (start, end) = resolve_pair(&adjusted, template.start, template.end)?;

    let entries: Vec<SweepEntry> = references
        .par_iter()
        .map(|reference| {
            let outcome = rank(&adjusted, reference, start, end, template.order)
                .map_err(PipelineError::from);
            if let Err(e) = &outcome {
                warn!(reference, error = %e, "sweep reference failed");
            }
            SweepEntry {
                reference: reference.to_string(),
                outcome,
            }
        })
        .collect();

    let results = SweepResults {
        start,
        end,
        entries,
    };
    info!(
        references = results.len(),
        failures = results.failures(),
        "sweep complete"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FailureKind;
    use chrono::NaiveDate;
    use ratiolab_core::SortOrder;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn panel() -> PricePanel {
        PricePanel::from_series(vec![
            ("A", vec![(d("2024-03-01"), 10.0), (d("2024-03-08"), 12.0)]),
            ("B", vec![(d("2024-03-01"), 20.0), (d("2024-03-08"), 30.0)]),
            ("C", vec![(d("2024-03-01"), 5.0), (d("2024-03-08"), 4.0)]),
        ])
        .unwrap()
    }

    fn template() -> RankingRequest {
        RankingRequest::new("", d("2024-03-01"), d("2024-03-08"), SortOrder::Descending)
    }

    #[test]
    fn each_reference_ranks_the_others() {
        let results = sweep_references(&panel(), &["A", "B", "C"], &template()).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results.failures(), 0);
        for entry in results.entries() {
            let ranked = entry.outcome.as_ref().unwrap();
            assert_eq!(ranked.ranked().len(), 2);
            assert!(ranked.row(&entry.reference).is_none());
        }

        // against A, B gains most and C loses most
        let a = results.get("A").unwrap();
        assert_eq!(a.best().unwrap().symbol, "B");
        assert_eq!(a.worst().unwrap().symbol, "C");
    }

    #[test]
    fn sweep_matches_sequential_ranking() {
        let p = panel();
        let results = sweep_references(&p, &["B", "C"], &template()).unwrap();
        let (start, end) = resolve_pair(&p, d("2024-03-01"), d("2024-03-08")).unwrap();

        for reference in ["B", "C"] {
            let sequential = rank(&p, reference, start, end, SortOrder::Descending).unwrap();
            let swept = results.get(reference).unwrap().outcome.as_ref().unwrap();
            assert_eq!(&sequential, swept);
        }
    }

    #[test]
    fn unknown_reference_fails_alone() {
        let results = sweep_references(&panel(), &["A", "NOPE"], &template()).unwrap();

        assert_eq!(results.failures(), 1);
        let err = results.get("NOPE").unwrap().outcome.as_ref().unwrap_err();
        assert_eq!(err.kind(), FailureKind::ReferenceNotFound);

        let summary = results.summary();
        assert!(summary[1].error.is_some());
        assert_eq!(summary[0].best.as_ref().unwrap().0, "B");
    }

    #[test]
    fn unresolvable_range_fails_sweep() {
        let mut early = template();
        early.start = d("2023-01-01").into();
        early.end = d("2023-02-01").into();
        let err = sweep_references(&panel(), &["A"], &early).unwrap_err();
        assert_eq!(err.kind(), FailureKind::DataUnavailable);
    }
}
