//! Hazard event representation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;

/// A hazard or disaster event reported by the feed or pushed live.
///
/// The same shape is used by both ingestion paths, so the live push source
/// sends JSON objects with these (camelCase) fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Stable identifier from the feed, unique key in the event store.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category_title: String,
    /// Most recent observed position.
    ///
    /// `None` when the feed gave no usable point geometry. Such events are
    /// stored but never matched.
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// Closed events are removed from the active set.
    #[serde(default)]
    pub closed: bool,
    /// Timestamp of the most recent observation.
    pub observed_at: DateTime<Utc>,
}

impl Event {
    /// Returns `true` if the event can be matched against subscribers.
    pub fn is_matchable(&self) -> bool {
        !self.closed && self.coordinates.is_some()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let coordinates = self
            .coordinates
            .map_or_else(|| "none".to_string(), |c| c.to_string());
        write!(
            f,
            "id={}, title={}, category={}, coordinates={}, closed={}",
            self.id, self.title, self.category_title, coordinates, self.closed
        )
    }
}
