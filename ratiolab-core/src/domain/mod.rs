//! Domain types for RatioLab

pub mod adjustment;
pub mod panel;
pub mod ratio;

pub use adjustment::{AdjustmentError, CorporateActionAdjustment};
pub use panel::{AxisZone, PanelError, PricePanel};
pub use ratio::{PctChange, RankedResult, RatioRow, ResolvedDate, SortOrder, UndefinedReason};
