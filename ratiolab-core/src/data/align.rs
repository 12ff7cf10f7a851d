//! Multi-symbol time alignment into a price panel.
//!
//! Given ingested quotes per symbol, outer-join them onto the union of their
//! dates. Missing observations stay missing; nothing is forward-filled.

use super::provider::RawQuote;
use crate::domain::{AxisZone, PanelError, PricePanel};
use std::collections::HashMap;

/// Build a panel from per-symbol adjusted closes.
///
/// Each symbol's quotes must already be sorted and unique by date (see
/// [`super::ingest::ingest`]).
pub fn align_quotes(
    symbol_quotes: HashMap<String, Vec<RawQuote>>,
    zone: AxisZone,
) -> Result<PricePanel, PanelError> {
    let series = symbol_quotes.into_iter().map(|(symbol, quotes)| {
        let points = quotes.into_iter().map(|q| (q.date, q.adj_close)).collect();
        (symbol, points)
    });
    PricePanel::from_series(series)?.with_zone(zone)
}

/// Pick the axis convention for quotes fetched from several listings.
///
/// A shared exchange offset yields a zone-bearing axis; unknown or mixed
/// offsets fall back to a naive axis.
pub fn common_zone<'a>(offsets: impl IntoIterator<Item = &'a Option<i32>>) -> AxisZone {
    let mut shared: Option<i32> = None;
    for offset in offsets {
        match (offset, shared) {
            (None, _) => return AxisZone::Naive,
            (Some(o), None) => shared = Some(*o),
            (Some(o), Some(s)) if *o != s => return AxisZone::Naive,
            _ => {}
        }
    }
    match shared {
        Some(offset_secs) => AxisZone::Fixed { offset_secs },
        None => AxisZone::Naive,
    }
}
