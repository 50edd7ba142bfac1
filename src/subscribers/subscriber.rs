//! Subscriber representation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;

/// A registered user eligible for proximity alerts.
///
/// Subscribers are owned by the external account system; the engine only
/// ever reads snapshots of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    /// Opaque identifier from the account system.
    ///
    /// Also used as the recipient handle on the broadcast channel.
    pub id: String,
    /// E.164 phone number. Without one the SMS channel is disabled.
    #[serde(default)]
    pub phone: Option<String>,
    /// Last-known location. Without one the subscriber is never matched.
    #[serde(default)]
    pub location: Option<Coordinates>,
    #[serde(default)]
    pub alerts_enabled: bool,
}

impl Subscriber {
    /// Returns `true` if the subscriber may be matched against events.
    pub fn is_active(&self) -> bool {
        self.alerts_enabled && self.location.is_some()
    }
}

impl fmt::Display for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "id={}, sms={}, alerts_enabled={}",
            self.id,
            self.phone.is_some(),
            self.alerts_enabled
        )
    }
}
