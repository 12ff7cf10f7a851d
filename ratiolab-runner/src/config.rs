//! Serializable ranking configuration.
//!
//! ```toml
//! [ranking]
//! reference = "GGAL.BA"
//! start_date = "2024-01-02"
//! end_date = "2024-12-31"   # optional, defaults to today
//! order = "descending"      # optional, defaults to ascending
//!
//! [universe]                # optional, defaults to the Merval universe
//! name = "banks"
//! tickers = ["GGAL.BA", "BMA.BA", "SUPV.BA", "BBAR.BA"]
//!
//! [[adjustments]]
//! symbol = "BMA.BA"
//! effective_date = "2024-05-20"
//! post_event_multiplier = 10.0
//! pre_event_divisor = 10.0
//! ```

use chrono::NaiveDate;
use ratiolab_core::data::{Universe, UniverseError};
use ratiolab_core::{AdjustmentError, CorporateActionAdjustment, SortOrder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Earliest start date a ranking may request.
pub fn min_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("reference '{symbol}' is not a member of universe '{universe}'")]
    UnknownReference { symbol: String, universe: String },

    #[error("start date {date} is outside [{min}, {max}]")]
    StartDateOutOfRange {
        date: NaiveDate,
        min: NaiveDate,
        max: NaiveDate,
    },

    #[error("end date {date} is after today ({today})")]
    EndDateInFuture { date: NaiveDate, today: NaiveDate },

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid adjustment: {0}")]
    InvalidAdjustment(#[from] AdjustmentError),

    #[error("invalid universe: {0}")]
    InvalidUniverse(#[from] UniverseError),
}

/// The `[ranking]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSection {
    pub reference: String,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub order: SortOrder,
}

/// A complete ranking run: what to rank, over which universe, with which
/// corporate-action corrections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    pub ranking: RankingSection,
    #[serde(default)]
    pub universe: Universe,
    #[serde(default)]
    pub adjustments: Vec<CorporateActionAdjustment>,
}

impl RankingConfig {
    /// A config over the Merval universe with no adjustments.
    pub fn new(reference: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            ranking: RankingSection {
                reference: reference.into(),
                start_date,
                end_date: None,
                order: SortOrder::default(),
            },
            universe: Universe::default_merval(),
            adjustments: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse only; call [`validate`](Self::validate) before running.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// End date, falling back to `today`.
    pub fn end_date_or(&self, today: NaiveDate) -> NaiveDate {
        self.ranking.end_date.unwrap_or(today)
    }

    /// Check the config against the calendar as of `today`.
    pub fn validate(&self, today: NaiveDate) -> Result<(), ConfigError> {
        self.universe.validate()?;

        let reference = &self.ranking.reference;
        if !self.universe.contains(reference) {
            return Err(ConfigError::UnknownReference {
                symbol: reference.clone(),
                universe: self.universe.name.clone(),
            });
        }

        let start = self.ranking.start_date;
        let min = min_start_date();
        if start < min || start > today {
            return Err(ConfigError::StartDateOutOfRange {
                date: start,
                min,
                max: today,
            });
        }

        let end = self.end_date_or(today);
        if end > today {
            return Err(ConfigError::EndDateInFuture { date: end, today });
        }
        if start > end {
            return Err(ConfigError::InvertedRange { start, end });
        }

        for adjustment in &self.adjustments {
            adjustment.validate()?;
        }
        Ok(())
    }
}
