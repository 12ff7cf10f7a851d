//! Corporate-action correction records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A known discontinuity in a provider's raw history for one instrument.
///
/// Applied by [`crate::adjust::adjust`]: the observation on `effective_date`
/// is multiplied by `post_event_multiplier`, and every observation on or
/// before `effective_date - 1 day` is divided by `pre_event_divisor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorporateActionAdjustment {
    pub symbol: String,
    pub effective_date: NaiveDate,
    pub post_event_multiplier: f64,
    pub pre_event_divisor: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdjustmentError {
    #[error("adjustment for '{symbol}': post-event multiplier must be finite and non-zero (got {value})")]
    InvalidMultiplier { symbol: String, value: f64 },

    #[error("adjustment for '{symbol}': pre-event divisor must be finite and non-zero (got {value})")]
    InvalidDivisor { symbol: String, value: f64 },

    #[error("adjustment for '{symbol}': effective date {date} has no preceding day")]
    NoCutoff { symbol: String, date: NaiveDate },

    #[error("adjustment for '{symbol}' overflows the price on {date}")]
    NonFiniteResult { symbol: String, date: NaiveDate },
}

impl CorporateActionAdjustment {
    pub fn new(
        symbol: impl Into<String>,
        effective_date: NaiveDate,
        post_event_multiplier: f64,
        pre_event_divisor: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            effective_date,
            post_event_multiplier,
            pre_event_divisor,
        }
    }

    /// Last date rescaled by the divisor: the day before the effective date.
    pub fn cutoff(&self) -> Option<NaiveDate> {
        self.effective_date.pred_opt()
    }

    /// Reject records that would zero out or poison a series.
    pub fn validate(&self) -> Result<(), AdjustmentError> {
        if !self.post_event_multiplier.is_finite() || self.post_event_multiplier == 0.0 {
            return Err(AdjustmentError::InvalidMultiplier {
                symbol: self.symbol.clone(),
                value: self.post_event_multiplier,
            });
        }
        if !self.pre_event_divisor.is_finite() || self.pre_event_divisor == 0.0 {
            return Err(AdjustmentError::InvalidDivisor {
                symbol: self.symbol.clone(),
                value: self.pre_event_divisor,
            });
        }
        if self.cutoff().is_none() {
            return Err(AdjustmentError::NoCutoff {
                symbol: self.symbol.clone(),
                date: self.effective_date,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mult: f64, div: f64) -> CorporateActionAdjustment {
        CorporateActionAdjustment::new(
            "TXAR.BA",
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
            mult,
            div,
        )
    }

    #[test]
    fn cutoff_is_previous_calendar_day() {
        assert_eq!(
            record(10.0, 10.0).cutoff(),
            NaiveDate::from_ymd_opt(2024, 3, 10)
        );
    }

    #[test]
    fn validate_accepts_sane_record() {
        assert!(record(10.0, 10.0).validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_and_nan() {
        assert!(matches!(
            record(0.0, 10.0).validate(),
            Err(AdjustmentError::InvalidMultiplier { .. })
        ));
        assert!(matches!(
            record(10.0, f64::NAN).validate(),
            Err(AdjustmentError::InvalidDivisor { .. })
        ));
        assert!(matches!(
            record(10.0, 0.0).validate(),
            Err(AdjustmentError::InvalidDivisor { .. })
        ));
    }

    #[test]
    fn deserializes_from_toml() {
        let rec: CorporateActionAdjustment = toml::from_str(
            r#"
symbol = "TXAR.BA"
effective_date = "2024-03-11"
post_event_multiplier = 10.0
pre_event_divisor = 10.0
"#,
        )
        .unwrap();
        assert_eq!(rec, record(10.0, 10.0));
    }
}
