//! Ratio ranking engine.
//!
//! For every non-reference instrument priced at both dates:
//!
//! ```text
//! ratio_start = p(i, start) / p(ref, start)
//! ratio_end   = p(i, end)   / p(ref, end)
//! pct_change  = (ratio_end - ratio_start) / ratio_start * 100
//! ```
//!
//! Rows whose percentage change is undefined (zero denominators) are kept
//! apart from the ranked rows and never reach the sorted output.

use crate::domain::{
    PctChange, PricePanel, RankedResult, RatioRow, ResolvedDate, SortOrder, UndefinedReason,
};
use chrono::NaiveDate;
use std::cmp::Ordering;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankError {
    #[error("reference instrument '{symbol}' is not in the price panel")]
    ReferenceNotFound { symbol: String },

    #[error("instrument '{symbol}' is not in the price panel")]
    InstrumentNotFound { symbol: String },

    #[error("{date} is not a trading date of the price panel")]
    DateNotInPanel { date: NaiveDate },

    #[error("no data: reference instrument '{symbol}' has no price on {date}")]
    ReferencePriceMissing { symbol: String, date: NaiveDate },
}

/// Rank every non-reference instrument by the percentage change of its
/// ratio to `reference` between `start` and `end`.
///
/// Ties on percentage change are broken by symbol, ascending, in both
/// directions.
pub fn rank(
    panel: &PricePanel,
    reference: &str,
    start: ResolvedDate,
    end: ResolvedDate,
    order: SortOrder,
) -> Result<RankedResult, RankError> {
    if !panel.contains(reference) {
        return Err(RankError::ReferenceNotFound {
            symbol: reference.to_string(),
        });
    }
    let start_idx = axis_index(panel, start)?;
    let end_idx = axis_index(panel, end)?;
    let ref_start = reference_price(panel, reference, start_idx, start)?;
    let ref_end = reference_price(panel, reference, end_idx, end)?;

    let mut ranked = Vec::new();
    let mut undefined = Vec::new();
    let mut skipped = 0usize;

    for (symbol, column) in panel.columns() {
        if symbol == reference {
            continue;
        }
        let (Some(p_start), Some(p_end)) = (column[start_idx], column[end_idx]) else {
            skipped += 1;
            continue;
        };

        let row = ratio_row(symbol, p_start, p_end, ref_start, ref_end);
        if row.pct_change.is_defined() {
            ranked.push(row);
        } else {
            undefined.push(row);
        }
    }

    ranked.sort_by(|a, b| compare_rows(a, b, order));

    debug!(
        reference,
        start = %start,
        end = %end,
        ranked = ranked.len(),
        undefined = undefined.len(),
        skipped,
        "ranked ratio changes"
    );

    Ok(RankedResult {
        reference: reference.to_string(),
        start,
        end,
        order,
        ranked,
        undefined,
    })
}

/// Ratio of `symbol` to `reference` on every date both are priced and the
/// reference price is non-zero.
pub fn ratio_series(
    panel: &PricePanel,
    reference: &str,
    symbol: &str,
) -> Result<Vec<(NaiveDate, f64)>, RankError> {
    if !panel.contains(reference) {
        return Err(RankError::ReferenceNotFound {
            symbol: reference.to_string(),
        });
    }
    if !panel.contains(symbol) {
        return Err(RankError::InstrumentNotFound {
            symbol: symbol.to_string(),
        });
    }

    let series = panel
        .dates()
        .iter()
        .enumerate()
        .filter_map(|(idx, date)| {
            let p = panel.price_at(symbol, idx)?;
            let r = panel.price_at(reference, idx)?;
            ratio(p, r).map(|v| (*date, v))
        })
        .collect();
    Ok(series)
}

fn axis_index(panel: &PricePanel, date: ResolvedDate) -> Result<usize, RankError> {
    panel
        .date_index(date.date())
        .ok_or(RankError::DateNotInPanel { date: date.date() })
}

fn reference_price(
    panel: &PricePanel,
    reference: &str,
    idx: usize,
    date: ResolvedDate,
) -> Result<f64, RankError> {
    panel
        .price_at(reference, idx)
        .ok_or_else(|| RankError::ReferencePriceMissing {
            symbol: reference.to_string(),
            date: date.date(),
        })
}

fn ratio(price: f64, reference_price: f64) -> Option<f64> {
    if reference_price == 0.0 {
        return None;
    }
    let r = price / reference_price;
    r.is_finite().then_some(r)
}

fn ratio_row(symbol: &str, p_start: f64, p_end: f64, ref_start: f64, ref_end: f64) -> RatioRow {
    let ratio_start = ratio(p_start, ref_start);
    let ratio_end = ratio(p_end, ref_end);

    let pct_change = if ref_start == 0.0 || ref_end == 0.0 {
        PctChange::Undefined(UndefinedReason::ZeroReferencePrice)
    } else {
        match (ratio_start, ratio_end) {
            (Some(s), _) if s == 0.0 => PctChange::Undefined(UndefinedReason::ZeroStartRatio),
            (Some(s), Some(e)) => {
                let pct = (e - s) / s * 100.0;
                if pct.is_finite() {
                    PctChange::Defined(pct)
                } else {
                    PctChange::Undefined(UndefinedReason::NonFinite)
                }
            }
            _ => PctChange::Undefined(UndefinedReason::NonFinite),
        }
    };

    RatioRow {
        symbol: symbol.to_string(),
        ratio_start,
        ratio_end,
        pct_change,
    }
}

fn compare_rows(a: &RatioRow, b: &RatioRow, order: SortOrder) -> Ordering {
    let pa = a.pct_change.value().unwrap_or_default();
    let pb = b.pct_change.value().unwrap_or_default();
    let primary = match order {
        SortOrder::Ascending => pa.partial_cmp(&pb),
        SortOrder::Descending => pb.partial_cmp(&pa),
    }
    .unwrap_or(Ordering::Equal);
    primary.then_with(|| a.symbol.cmp(&b.symbol))
}
