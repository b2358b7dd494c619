//! Data models for listings, inspection results, persisted state and Discord
//! webhook payloads

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counter value meaning "not extracted".
pub const UNKNOWN_COUNT: u32 = 999;

/// Text the listing site uses for "no recorded history".
pub const NO_HISTORY: &str = "없음";

/// One row of a search result page. Only `id` outlives the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub id: String,
    pub title: String,
    pub price: String,
    pub region: String,
    pub link: String,
}

/// Incident counters from the inspection record of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionAttributes {
    pub exchange_count: u32,
    pub panel_count: u32,
    pub corrosion_count: u32,
}

impl InspectionAttributes {
    pub const fn new(exchange_count: u32, panel_count: u32, corrosion_count: u32) -> Self {
        Self {
            exchange_count,
            panel_count,
            corrosion_count,
        }
    }

    /// All counters set to [`UNKNOWN_COUNT`].
    pub const fn unknown() -> Self {
        Self::new(UNKNOWN_COUNT, UNKNOWN_COUNT, UNKNOWN_COUNT)
    }

    pub const fn is_unknown(&self) -> bool {
        self.exchange_count == UNKNOWN_COUNT
            && self.panel_count == UNKNOWN_COUNT
            && self.corrosion_count == UNKNOWN_COUNT
    }

    /// Stores `count` in the counter whose label appears in `label`.
    /// Returns false when the label names none of them.
    pub fn record(&mut self, label: &str, count: u32) -> bool {
        if label.contains("교환") {
            self.exchange_count = count;
        } else if label.contains("판금") {
            self.panel_count = count;
        } else if label.contains("부식") {
            self.corrosion_count = count;
        } else {
            return false;
        }
        true
    }
}

/// Usage history of a vehicle (rental, commercial use, ...).
///
/// An unknown history is modelled as `Option::None` at the call sites, which
/// keeps it distinct from [`HistoryNote::Clean`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HistoryNote {
    Clean,
    Recorded(String),
}

impl HistoryNote {
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || text == NO_HISTORY {
            Self::Clean
        } else {
            Self::Recorded(text.to_string())
        }
    }

    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

impl From<String> for HistoryNote {
    fn from(text: String) -> Self {
        Self::from_text(&text)
    }
}

impl From<HistoryNote> for String {
    fn from(note: HistoryNote) -> Self {
        match note {
            HistoryNote::Clean => NO_HISTORY.to_string(),
            HistoryNote::Recorded(text) => text,
        }
    }
}

/// What a detail page yielded. Either part may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetailReport {
    pub inspection: Option<InspectionAttributes>,
    pub history: Option<HistoryNote>,
}

/// A listing that passed the quality filter, as stored in `good_cars.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifiedCar {
    #[serde(rename = "carId")]
    pub id: String,
    pub url: String,
    pub title: String,
    pub exchange: u32,
    pub panel: u32,
    pub corrosion: u32,
    pub special_note: HistoryNote,
    pub price: String,
    pub region: String,
    #[serde(rename = "check_time")]
    pub checked_at: DateTime<Utc>,
}

impl QualifiedCar {
    pub fn new(
        listing: &ListingSummary,
        inspection: InspectionAttributes,
        history: HistoryNote,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: listing.id.clone(),
            url: listing.link.clone(),
            title: listing.title.clone(),
            exchange: inspection.exchange_count,
            panel: inspection.panel_count,
            corrosion: inspection.corrosion_count,
            special_note: history,
            price: listing.price.clone(),
            region: listing.region.clone(),
            checked_at,
        }
    }
}

/// Everything the monitor remembers between cycles.
///
/// Every id in `qualified_cars` is also in `known_ids`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorState {
    pub known_ids: HashSet<String>,
    pub qualified_cars: Vec<QualifiedCar>,
}

impl MonitorState {
    /// Builds a state from loaded snapshots, adding the id of every
    /// qualified car to the known set.
    pub fn from_snapshots(
        mut known_ids: HashSet<String>,
        qualified_cars: Vec<QualifiedCar>,
    ) -> Self {
        known_ids.extend(qualified_cars.iter().map(|car| car.id.clone()));
        Self {
            known_ids,
            qualified_cars,
        }
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.known_ids.contains(id)
    }

    pub fn mark_known(&mut self, id: &str) {
        if !self.known_ids.contains(id) {
            self.known_ids.insert(id.to_string());
        }
    }

    /// Appends `car` unless a record with the same id exists.
    /// Returns true when the list changed.
    pub fn record_qualified(&mut self, car: QualifiedCar) -> bool {
        self.mark_known(&car.id);
        if self.qualified_cars.iter().any(|existing| existing.id == car.id) {
            return false;
        }
        self.qualified_cars.push(car);
        true
    }
}

/// A listing processed during a cycle, handed to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub listing: ListingSummary,
    pub qualified: bool,
}

/// Discord embed structure for rich notifications
#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub timestamp: String,
    pub fields: Vec<DiscordField>,
}

/// Key-value field for Discord embeds
#[derive(Debug, Serialize)]
pub struct DiscordField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Discord webhook message payload
#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    pub embeds: Vec<DiscordEmbed>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str) -> ListingSummary {
        ListingSummary {
            id: id.to_string(),
            title: "기아 스팅어 2.0 터보".to_string(),
            price: "2,450만원".to_string(),
            region: "서울".to_string(),
            link: format!("https://fem.encar.com/cars/detail/{id}"),
        }
    }

    #[test]
    fn history_note_maps_site_sentinel_to_clean() {
        assert_eq!(HistoryNote::from_text(" 없음 "), HistoryNote::Clean);
        assert_eq!(
            HistoryNote::from_text("렌트"),
            HistoryNote::Recorded("렌트".to_string())
        );
        assert_eq!(String::from(HistoryNote::Clean), "없음");
    }

    #[test]
    fn record_routes_labels_to_counters() {
        let mut attrs = InspectionAttributes::unknown();
        assert!(attrs.record("교환", 1));
        assert!(attrs.record("판금 ", 0));
        assert!(!attrs.record("사고", 3));
        assert_eq!(attrs, InspectionAttributes::new(1, 0, UNKNOWN_COUNT));
        assert!(!attrs.is_unknown());
    }

    #[test]
    fn qualified_car_serializes_with_viewer_keys() {
        let car = QualifiedCar::new(
            &listing("38201923"),
            InspectionAttributes::new(0, 0, 0),
            HistoryNote::Clean,
            Utc::now(),
        );
        let json = serde_json::to_value(&car).expect("serialize");
        assert_eq!(json["carId"], "38201923");
        assert_eq!(json["special_note"], "없음");
        assert_eq!(json["exchange"], 0);
        assert!(json.get("check_time").is_some());
    }

    #[test]
    fn record_qualified_keeps_ids_known_and_unique() {
        let mut state = MonitorState::default();
        let car = QualifiedCar::new(
            &listing("1"),
            InspectionAttributes::new(0, 0, 0),
            HistoryNote::Clean,
            Utc::now(),
        );
        assert!(state.record_qualified(car.clone()));
        assert!(!state.record_qualified(car));
        assert!(state.is_known("1"));
        assert_eq!(state.qualified_cars.len(), 1);
    }

    #[test]
    fn from_snapshots_merges_qualified_ids() {
        let car = QualifiedCar::new(
            &listing("7"),
            InspectionAttributes::new(1, 0, 0),
            HistoryNote::Clean,
            Utc::now(),
        );
        let state = MonitorState::from_snapshots(HashSet::new(), vec![car]);
        assert!(state.is_known("7"));
    }
}
