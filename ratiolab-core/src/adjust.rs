//! Corporate-action adjustment of a raw price panel.
//!
//! Runs before any ratio math. Each record rescales one instrument around a
//! cutoff: the observation exactly on the effective date is multiplied, every
//! observation on or before the day before it is divided. Trading calendars
//! have gaps, so the cutoff is a calendar day rather than "the previous
//! trading date".
//!
//! Not idempotent: adjusting an already-adjusted panel corrects twice.

use crate::domain::{AdjustmentError, CorporateActionAdjustment, PricePanel};
use tracing::debug;

/// Apply `adjustments` to a copy of `panel`.
///
/// Every record is validated before any price is touched. Records for
/// instruments absent from the panel are skipped. The input panel is left
/// untouched, and the result holds finite prices only.
pub fn adjust(
    panel: &PricePanel,
    adjustments: &[CorporateActionAdjustment],
) -> Result<PricePanel, AdjustmentError> {
    for adj in adjustments {
        adj.validate()?;
    }
    let mut adjusted = panel.clone();

    for adj in adjustments {
        let Some((dates, column)) = adjusted.column_mut(&adj.symbol) else {
            debug!(symbol = %adj.symbol, "adjustment skipped: instrument not in panel");
            continue;
        };
        let Some(cutoff) = adj.cutoff() else {
            debug!(symbol = %adj.symbol, date = %adj.effective_date, "adjustment skipped: no cutoff date");
            continue;
        };

        let mut divided = 0usize;
        let mut multiplied = false;
        for (date, price) in dates.iter().zip(column.iter_mut()) {
            let Some(p) = price.as_mut() else { continue };
            if *date == adj.effective_date {
                *p *= adj.post_event_multiplier;
                multiplied = true;
            } else if *date <= cutoff {
                *p /= adj.pre_event_divisor;
                divided += 1;
            } else {
                continue;
            }
            if !p.is_finite() {
                return Err(AdjustmentError::NonFiniteResult {
                    symbol: adj.symbol.clone(),
                    date: *date,
                });
            }
        }

        debug!(
            symbol = %adj.symbol,
            effective_date = %adj.effective_date,
            divided,
            multiplied,
            "applied corporate-action adjustment"
        );
    }

    Ok(adjusted)
}
