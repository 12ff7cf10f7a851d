//! Nearest trading date resolution.
//!
//! Maps a requested date onto the latest panel date at or before it. Requests
//! and the panel axis are first brought to one convention:
//!
//! | axis            | naive request                  | aware request                      |
//! |-----------------|--------------------------------|------------------------------------|
//! | `Fixed(zone)`   | read as wall-clock in `zone`   | converted into `zone`              |
//! | `Naive`         | used as-is                     | offset dropped, wall-clock kept    |
//!
//! A naive request is never read in the caller's local zone.

use crate::domain::{AxisZone, PricePanel, ResolvedDate};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A date as a caller asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RequestedDate {
    Date(NaiveDate),
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

impl RequestedDate {
    /// Calendar date of this request under the axis convention `zone`.
    pub fn normalize(&self, zone: AxisZone) -> NaiveDate {
        match (*self, zone.offset()) {
            (RequestedDate::Date(d), _) => d,
            (RequestedDate::Naive(ndt), _) => ndt.date(),
            (RequestedDate::Aware(dt), Some(offset)) => dt.with_timezone(&offset).date_naive(),
            (RequestedDate::Aware(dt), None) => dt.naive_local().date(),
        }
    }
}

impl From<NaiveDate> for RequestedDate {
    fn from(d: NaiveDate) -> Self {
        RequestedDate::Date(d)
    }
}

impl From<NaiveDateTime> for RequestedDate {
    fn from(dt: NaiveDateTime) -> Self {
        RequestedDate::Naive(dt)
    }
}

impl From<DateTime<FixedOffset>> for RequestedDate {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        RequestedDate::Aware(dt)
    }
}

impl From<DateTime<Utc>> for RequestedDate {
    fn from(dt: DateTime<Utc>) -> Self {
        RequestedDate::Aware(dt.fixed_offset())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no data: the price panel has no trading dates")]
    EmptyPanel,

    #[error("no data on or before {requested} (history starts {earliest})")]
    NoTradingDateOnOrBefore {
        requested: NaiveDate,
        earliest: NaiveDate,
    },

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

/// Latest trading date in `panel` at or before `requested`.
pub fn resolve(
    panel: &PricePanel,
    requested: impl Into<RequestedDate>,
) -> Result<ResolvedDate, ResolveError> {
    let dates = panel.dates();
    let Some(&earliest) = dates.first() else {
        return Err(ResolveError::EmptyPanel);
    };

    let target = requested.into().normalize(panel.zone());
    let idx = dates.partition_point(|d| *d <= target);
    if idx == 0 {
        return Err(ResolveError::NoTradingDateOnOrBefore {
            requested: target,
            earliest,
        });
    }
    Ok(ResolvedDate::new(dates[idx - 1]))
}

/// Resolve both ends of an interval.
pub fn resolve_pair(
    panel: &PricePanel,
    start: impl Into<RequestedDate>,
    end: impl Into<RequestedDate>,
) -> Result<(ResolvedDate, ResolvedDate), ResolveError> {
    let (start, end) = (start.into(), end.into());
    let (s, e) = (start.normalize(panel.zone()), end.normalize(panel.zone()));
    if s > e {
        return Err(ResolveError::InvertedRange { start: s, end: e });
    }
    Ok((resolve(panel, start)?, resolve(panel, end)?))
}
