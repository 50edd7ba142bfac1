//! Dispatch outcomes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outbound notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Immediate push to connected clients.
    Broadcast,
    /// Personal text message; requires a phone number.
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Channel::Broadcast => write!(f, "broadcast"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// What happened to one (subscriber, event, channel) attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Sent,
    /// Delivery failed or timed out; retried on the next cycle.
    Failed,
    /// Already alerted within the cooldown window.
    Suppressed,
}

/// Immutable record of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRecord {
    pub subscriber_id: String,
    pub event_id: String,
    pub channel: Channel,
    pub distance_km: f64,
    pub dispatched_at: DateTime<Utc>,
    pub outcome: Outcome,
}

impl fmt::Display for DispatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "subscriber={}, event={}, channel={}, distance={:.1}km, outcome={:?}",
            self.subscriber_id, self.event_id, self.channel, self.distance_km, self.outcome
        )
    }
}
