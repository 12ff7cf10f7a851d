//! Ratio rows and the ranked result handed to presentation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A trading date known to be on a panel's date axis.
///
/// Only the resolver hands these out. The ranking engine still checks axis
/// membership, since a date resolved against one panel may be passed with
/// another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedDate(NaiveDate);

impl ResolvedDate {
    pub(crate) fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for ResolvedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ranking direction over percentage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Worst decline first.
    #[default]
    Ascending,
    /// Best gain first.
    Descending,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => Err(format!("unknown sort order '{other}' (expected asc or desc)")),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => f.write_str("ascending"),
            SortOrder::Descending => f.write_str("descending"),
        }
    }
}

/// Why a row's percentage change could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// The reference instrument's price was zero at the start or end date.
    ZeroReferencePrice,
    /// The instrument's price was zero at the start date.
    ZeroStartRatio,
    /// An intermediate value overflowed.
    NonFinite,
}

impl fmt::Display for UndefinedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndefinedReason::ZeroReferencePrice => f.write_str("zero reference price"),
            UndefinedReason::ZeroStartRatio => f.write_str("zero start ratio"),
            UndefinedReason::NonFinite => f.write_str("non-finite value"),
        }
    }
}

/// Percentage change of a ratio over the interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum PctChange {
    Defined(f64),
    Undefined(UndefinedReason),
}

impl PctChange {
    pub fn value(&self) -> Option<f64> {
        match self {
            PctChange::Defined(v) => Some(*v),
            PctChange::Undefined(_) => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, PctChange::Defined(_))
    }
}

/// One non-reference instrument's ratios against the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioRow {
    pub symbol: String,
    /// `None` when the reference price at the start date was zero.
    pub ratio_start: Option<f64>,
    /// `None` when the reference price at the end date was zero.
    pub ratio_end: Option<f64>,
    pub pct_change: PctChange,
}

/// Terminal artifact of the ranking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub reference: String,
    pub start: ResolvedDate,
    pub end: ResolvedDate,
    pub order: SortOrder,
    pub(crate) ranked: Vec<RatioRow>,
    pub(crate) undefined: Vec<RatioRow>,
}

impl RankedResult {
    /// Rows with a defined percentage change, in rank order.
    pub fn ranked(&self) -> &[RatioRow] {
        &self.ranked
    }

    /// Rows excluded from ranking because their percentage change is undefined.
    pub fn undefined(&self) -> &[RatioRow] {
        &self.undefined
    }

    /// Every computed row, ranked or not, in symbol order.
    pub fn raw_ratios(&self) -> Vec<&RatioRow> {
        let mut rows: Vec<&RatioRow> = self.ranked.iter().chain(self.undefined.iter()).collect();
        rows.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        rows
    }

    /// Look up a computed row by symbol.
    pub fn row(&self, symbol: &str) -> Option<&RatioRow> {
        self.ranked
            .iter()
            .chain(self.undefined.iter())
            .find(|r| r.symbol == symbol)
    }

    pub fn best(&self) -> Option<&RatioRow> {
        match self.order {
            SortOrder::Descending => self.ranked.first(),
            SortOrder::Ascending => self.ranked.last(),
        }
    }

    pub fn worst(&self) -> Option<&RatioRow> {
        match self.order {
            SortOrder::Descending => self.ranked.last(),
            SortOrder::Ascending => self.ranked.first(),
        }
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(symbol: &str, pct: PctChange) -> RatioRow {
        RatioRow {
            symbol: symbol.into(),
            ratio_start: Some(1.0),
            ratio_end: Some(1.0),
            pct_change: pct,
        }
    }

    fn result(order: SortOrder) -> RankedResult {
        let date = ResolvedDate::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        let mut ranked = vec![
            row("B", PctChange::Defined(25.0)),
            row("C", PctChange::Defined(-10.0)),
        ];
        if order == SortOrder::Ascending {
            ranked.reverse();
        }
        RankedResult {
            reference: "A".into(),
            start: date,
            end: date,
            order,
            ranked,
            undefined: vec![row("AA", PctChange::Undefined(UndefinedReason::ZeroStartRatio))],
        }
    }

    #[test]
    fn sort_order_parses() {
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Ascending);
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Descending);
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn best_and_worst_follow_order() {
        for order in [SortOrder::Ascending, SortOrder::Descending] {
            let r = result(order);
            assert_eq!(r.best().unwrap().symbol, "B");
            assert_eq!(r.worst().unwrap().symbol, "C");
        }
    }

    #[test]
    fn raw_ratios_include_undefined_in_symbol_order() {
        let r = result(SortOrder::Descending);
        let symbols: Vec<&str> = r.raw_ratios().iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AA", "B", "C"]);
        assert!(r.row("AA").is_some());
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn pct_change_serializes_with_status_tag() {
        let json = serde_json::to_string(&PctChange::Undefined(UndefinedReason::ZeroStartRatio)).unwrap();
        assert_eq!(json, r#"{"status":"undefined","value":"zero_start_ratio"}"#);
        let json = serde_json::to_string(&PctChange::Defined(2.5)).unwrap();
        assert_eq!(json, r#"{"status":"defined","value":2.5}"#);
    }
}
