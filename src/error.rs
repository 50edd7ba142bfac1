//! Error types shared by the alert engine.
//!
//! Every failure mode degrades to "try again next cycle": none of these
//! variants is fatal to the process. Callers decide how far an error
//! propagates (one recipient, one event, or one poll cycle).

use thiserror::Error;

use crate::alerts::Channel;

/// Errors raised while ingesting events or dispatching alerts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The external event feed could not be fetched or decoded.
    ///
    /// The current poll cycle is skipped and retried on the next interval.
    #[error("event feed unavailable: {0}")]
    FeedUnavailable(String),

    /// The event has no usable coordinates.
    ///
    /// The event is still stored but never matched against subscribers.
    #[error("event {event_id} has no usable coordinates")]
    InvalidEventGeometry { event_id: String },

    /// A single delivery to a single recipient failed or timed out.
    #[error("{channel} delivery failed: {reason}")]
    ChannelDeliveryFailure { channel: Channel, reason: String },

    /// The subscriber set could not be loaded or is too stale to trust.
    #[error("subscriber registry unavailable: {0}")]
    RegistryUnavailable(String),
}

impl EngineError {
    /// Shorthand for a [`EngineError::ChannelDeliveryFailure`].
    pub fn delivery(channel: Channel, reason: impl Into<String>) -> Self {
        EngineError::ChannelDeliveryFailure {
            channel,
            reason: reason.into(),
        }
    }
}
