//! Quality rule deciding whether a listing is worth keeping.

use crate::models::{HistoryNote, InspectionAttributes};

/// Most replaced panels a qualifying car may have.
pub const MAX_EXCHANGE_COUNT: u32 = 1;
/// Most sheet-metal repairs a qualifying car may have.
pub const MAX_PANEL_COUNT: u32 = 0;
/// Most corrosion findings a qualifying car may have.
pub const MAX_CORROSION_COUNT: u32 = 0;

/// Returns true when the inspection record and history note pass the rule.
///
/// Missing attributes or an unknown history never qualify. An unknown
/// counter holds [`crate::models::UNKNOWN_COUNT`], which exceeds every
/// threshold.
pub fn classify(inspection: Option<&InspectionAttributes>, history: Option<&HistoryNote>) -> bool {
    let (Some(inspection), Some(history)) = (inspection, history) else {
        return false;
    };

    inspection.exchange_count <= MAX_EXCHANGE_COUNT
        && inspection.panel_count <= MAX_PANEL_COUNT
        && inspection.corrosion_count <= MAX_CORROSION_COUNT
        && history.is_clean()
}
