//! Response structures for the hazard feed API.
//!
//! These mirror the EONET v3 `events` endpoint. Only the fields the engine
//! needs are decoded.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Envelope returned by `GET {feed_url}`.
#[derive(Deserialize, Debug)]
pub struct EventsResponse {
    #[serde(default)]
    pub events: Vec<EventResponse>,
}

/// A single event from the feed.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    /// Unique identifier for the event.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub categories: Vec<CategoryResponse>,
    /// Observations, oldest first as served by the feed.
    #[serde(default)]
    pub geometry: Vec<GeometryResponse>,
    /// Closing date, `null` while the event is open.
    ///
    /// Some feeds send a plain boolean instead.
    #[serde(default)]
    pub closed: Option<Value>,
}

impl EventResponse {
    /// Returns `true` if the feed marks the event as closed.
    pub fn is_closed(&self) -> bool {
        match &self.closed {
            Some(Value::Bool(closed)) => *closed,
            Some(Value::String(date)) => !date.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for EventResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "id={}, title={}, geometries={}, closed={}",
            self.id,
            self.title,
            self.geometry.len(),
            self.is_closed()
        )
    }
}

/// Category attached to an event.
#[derive(Deserialize, Debug)]
pub struct CategoryResponse {
    pub title: String,
}

/// One observation of an event.
///
/// For `Point` geometries the coordinates are `[longitude, latitude]`.
/// Other geometry types nest arrays and are not used for matching.
#[derive(Deserialize, Debug)]
pub struct GeometryResponse {
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Value,
}
