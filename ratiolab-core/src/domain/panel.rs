//! PricePanel: adjusted closing prices for a basket of instruments on a shared date axis.

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Timezone convention of a panel's date axis.
///
/// Axis dates are always calendar dates. The zone only says which calendar
/// they belong to, so that requested timestamps can be mapped onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AxisZone {
    /// Dates carry no timezone information.
    Naive,
    /// Dates are local to a fixed UTC offset (seconds east of UTC).
    Fixed { offset_secs: i32 },
}

impl AxisZone {
    /// The fixed offset for a zone-bearing axis, `None` for a naive axis
    /// or an out-of-range offset.
    pub fn offset(&self) -> Option<FixedOffset> {
        match *self {
            AxisZone::Naive => None,
            AxisZone::Fixed { offset_secs } => FixedOffset::east_opt(offset_secs),
        }
    }

    pub fn is_naive(&self) -> bool {
        matches!(self, AxisZone::Naive)
    }
}

/// Errors raised while building a panel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PanelError {
    #[error("series for '{symbol}' is not strictly increasing at {date}")]
    UnorderedDates { symbol: String, date: NaiveDate },

    #[error("non-finite price for '{symbol}' on {date}")]
    NonFinitePrice { symbol: String, date: NaiveDate },

    #[error("invalid UTC offset: {0}s")]
    InvalidOffset(i32),
}

/// Per-instrument price columns aligned to a common, strictly increasing date axis.
///
/// Columns are outer-joined: an instrument without an observation on an axis
/// date holds `None` there. The panel is never mutated once built; the
/// adjuster works on a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePanel {
    dates: Vec<NaiveDate>,
    zone: AxisZone,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl PricePanel {
    /// Build a panel from per-instrument `(date, price)` series.
    ///
    /// Each series must be strictly increasing in date and every price finite.
    /// The axis is the union of all dates.
    pub fn from_series<I, S>(series: I) -> Result<Self, PanelError>
    where
        I: IntoIterator<Item = (S, Vec<(NaiveDate, f64)>)>,
        S: Into<String>,
    {
        let mut validated: BTreeMap<String, Vec<(NaiveDate, f64)>> = BTreeMap::new();
        for (symbol, points) in series {
            let symbol = symbol.into();
            validate_series(&symbol, &points)?;
            validated.insert(symbol, points);
        }

        let axis: BTreeSet<NaiveDate> = validated
            .values()
            .flat_map(|points| points.iter().map(|(d, _)| *d))
            .collect();
        let dates: Vec<NaiveDate> = axis.into_iter().collect();

        let columns = validated
            .into_iter()
            .map(|(symbol, points)| {
                let column = align_to_axis(&dates, &points);
                (symbol, column)
            })
            .collect();

        Ok(Self {
            dates,
            zone: AxisZone::Naive,
            columns,
        })
    }

    /// An empty panel: no instruments, no dates.
    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            zone: AxisZone::Naive,
            columns: BTreeMap::new(),
        }
    }

    /// Tag the date axis with a timezone convention.
    pub fn with_zone(mut self, zone: AxisZone) -> Result<Self, PanelError> {
        if let AxisZone::Fixed { offset_secs } = zone {
            if FixedOffset::east_opt(offset_secs).is_none() {
                return Err(PanelError::InvalidOffset(offset_secs));
            }
        }
        self.zone = zone;
        Ok(self)
    }

    /// The common date axis, ascending.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn zone(&self) -> AxisZone {
        self.zone
    }

    /// Instrument identifiers in lexicographic order.
    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    pub fn instrument_count(&self) -> usize {
        self.columns.len()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.columns.contains_key(symbol)
    }

    /// True when the panel has no trading dates at all.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Position of `date` on the axis, if it is a trading date.
    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Price of `symbol` on `date`; `None` if either is absent or the observation is missing.
    pub fn price(&self, symbol: &str, date: NaiveDate) -> Option<f64> {
        let idx = self.date_index(date)?;
        self.price_at(symbol, idx)
    }

    /// Price of `symbol` at axis position `idx`.
    pub fn price_at(&self, symbol: &str, idx: usize) -> Option<f64> {
        self.columns.get(symbol)?.get(idx).copied().flatten()
    }

    /// Present observations of one instrument, ascending by date.
    pub fn series(&self, symbol: &str) -> Option<impl Iterator<Item = (NaiveDate, f64)> + '_> {
        let column = self.columns.get(symbol)?;
        Some(
            self.dates
                .iter()
                .zip(column.iter())
                .filter_map(|(d, p)| p.map(|p| (*d, p))),
        )
    }

    /// Total number of present observations across all instruments.
    pub fn observation_count(&self) -> usize {
        self.columns
            .values()
            .map(|c| c.iter().filter(|p| p.is_some()).count())
            .sum()
    }

    /// Iterate `(symbol, column)` pairs in symbol order.
    pub(crate) fn columns(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.columns.iter().map(|(s, c)| (s.as_str(), c.as_slice()))
    }

    /// Mutable access to one column together with the (shared) axis.
    pub(crate) fn column_mut(&mut self, symbol: &str) -> Option<(&[NaiveDate], &mut [Option<f64>])> {
        let column = self.columns.get_mut(symbol)?;
        Some((&self.dates, column.as_mut_slice()))
    }

    /// Deterministic BLAKE3 hash over the axis, zone and every column.
    ///
    /// Columns are hashed in symbol order, so the hash does not depend on
    /// how the panel was assembled.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();

        match self.zone {
            AxisZone::Naive => hasher.update(b"naive"),
            AxisZone::Fixed { offset_secs } => hasher.update(&offset_secs.to_le_bytes()),
        };
        for date in &self.dates {
            hasher.update(date.to_string().as_bytes());
        }
        for (symbol, column) in &self.columns {
            hasher.update(symbol.as_bytes());
            for price in column {
                match price {
                    Some(p) => {
                        hasher.update(&[1]);
                        hasher.update(&p.to_le_bytes());
                    }
                    None => {
                        hasher.update(&[0]);
                    }
                }
            }
        }

        hasher.finalize().to_hex().to_string()
    }
}

fn validate_series(symbol: &str, points: &[(NaiveDate, f64)]) -> Result<(), PanelError> {
    for (date, price) in points {
        if !price.is_finite() {
            return Err(PanelError::NonFinitePrice {
                symbol: symbol.to_string(),
                date: *date,
            });
        }
    }
    for pair in points.windows(2) {
        if pair[1].0 <= pair[0].0 {
            return Err(PanelError::UnorderedDates {
                symbol: symbol.to_string(),
                date: pair[1].0,
            });
        }
    }
    Ok(())
}

/// Merge a sorted series onto a sorted axis that contains all of its dates.
fn align_to_axis(axis: &[NaiveDate], points: &[(NaiveDate, f64)]) -> Vec<Option<f64>> {
    let mut column = vec![None; axis.len()];
    let mut cursor = 0;
    for (date, price) in points {
        while cursor < axis.len() && axis[cursor] < *date {
            cursor += 1;
        }
        if cursor < axis.len() && axis[cursor] == *date {
            column[cursor] = Some(*price);
        }
    }
    column
}
