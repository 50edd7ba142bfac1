//! Alert content sent over the channels.

use serde::{Deserialize, Serialize};

use crate::events::Event;

/// What a subscriber is told about a nearby event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub event_id: String,
    pub title: String,
    pub category: String,
    pub distance_km: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl AlertPayload {
    /// Builds the payload for `event` at `distance_km` from the subscriber.
    ///
    /// An event without coordinates is reported at (0, 0); matching never
    /// yields one.
    pub fn new(event: &Event, distance_km: f64) -> Self {
        let (latitude, longitude) = event
            .coordinates
            .map(|coordinates| (coordinates.latitude, coordinates.longitude))
            .unwrap_or_default();

        AlertPayload {
            event_id: event.id.clone(),
            title: event.title.clone(),
            category: event.category_title.clone(),
            distance_km,
            latitude,
            longitude,
        }
    }

    /// Text message body.
    pub fn sms_body(&self) -> String {
        let category = if self.category.is_empty() {
            "Hazard"
        } else {
            &self.category
        };
        format!(
            "ALERT: {} - {} ({:.1} km away). Location: {:.4}, {:.4}",
            category, self.title, self.distance_km, self.latitude, self.longitude
        )
    }
}
