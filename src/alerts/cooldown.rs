//! Per-(subscriber, event, channel) alert suppression.
//!
//! This module provides the [`CooldownTracker`], which guarantees that a
//! subscriber is alerted at most once per event and channel within the
//! cooldown window, even when the poll and push drivers race on the same key.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::alerts::Channel;

/// Identity of an alert for suppression purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub subscriber_id: String,
    pub event_id: String,
    pub channel: Channel,
}

impl CooldownKey {
    /// Create a new [CooldownKey].
    pub fn new(subscriber_id: &str, event_id: &str, channel: Channel) -> Self {
        CooldownKey {
            subscriber_id: subscriber_id.to_string(),
            event_id: event_id.to_string(),
            channel,
        }
    }
}

impl fmt::Display for CooldownKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subscriber_id, self.event_id, self.channel)
    }
}

/// A confirmed delivery, as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentEntry {
    pub subscriber_id: String,
    pub event_id: String,
    pub channel: Channel,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CooldownState {
    /// A delivery is underway and not yet confirmed.
    InFlight,
    Sent(DateTime<Utc>),
}

/// Tracks which alerts were already delivered.
///
/// A `window` of `None` suppresses repeats for the whole lifetime of the
/// event. With `Some(window)`, a subscriber may be alerted again once the
/// window has elapsed since the last successful delivery.
///
/// Delivery follows a reserve/confirm protocol: [`try_reserve`](Self::try_reserve)
/// atomically claims a key, then either [`record_sent`](Self::record_sent)
/// or [`release`](Self::release) settles it. Only successful deliveries
/// start a cooldown.
pub struct CooldownTracker {
    entries: DashMap<CooldownKey, CooldownState>,
    window: Option<Duration>,
}

impl CooldownTracker {
    /// Create a new, empty [CooldownTracker].
    ///
    /// # Arguments
    ///
    /// * `window` - How long a delivery suppresses repeats, or `None` for the
    ///   whole lifetime of the event.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let tracker = CooldownTracker::new(Some(Duration::hours(24)));
    /// let key = CooldownKey::new("u1", "EONET_1", Channel::Sms);
    /// if tracker.try_reserve(key.clone(), Utc::now()) {
    ///     tracker.record_sent(key, Utc::now());
    /// }
    /// ```
    pub fn new(window: Option<Duration>) -> Self {
        CooldownTracker {
            entries: DashMap::new(),
            window,
        }
    }

    fn is_blocking(&self, state: &CooldownState, now: DateTime<Utc>) -> bool {
        match state {
            CooldownState::InFlight => true,
            CooldownState::Sent(sent_at) => self.window.is_none_or(|window| now - *sent_at < window),
        }
    }

    /// Whether an alert for `key` must not be sent at `now`.
    pub fn should_suppress(&self, key: &CooldownKey, now: DateTime<Utc>) -> bool {
        self.entries
            .get(key)
            .is_some_and(|state| self.is_blocking(&state, now))
    }

    /// Atomically claims `key` for delivery.
    ///
    /// Returns `false` when the alert is suppressed, either because it was
    /// sent within the window or because another delivery holds the claim.
    pub fn try_reserve(&self, key: CooldownKey, now: DateTime<Utc>) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                if self.is_blocking(entry.get(), now) {
                    return false;
                }
                *entry.get_mut() = CooldownState::InFlight;
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(CooldownState::InFlight);
                true
            }
        }
    }

    /// Confirms a successful delivery and starts the cooldown.
    pub fn record_sent(&self, key: CooldownKey, sent_at: DateTime<Utc>) {
        debug!("record sent alert {}", key);
        self.entries.insert(key, CooldownState::Sent(sent_at));
    }

    /// Drops an unconfirmed claim so the alert is retried later.
    ///
    /// A confirmed delivery is left untouched.
    pub fn release(&self, key: &CooldownKey) {
        self.entries
            .remove_if(key, |_, state| *state == CooldownState::InFlight);
    }

    /// Forgets every confirmed delivery of an expired event.
    ///
    /// In-flight claims are kept until their delivery settles.
    pub fn forget_event(&self, event_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, state| {
            key.event_id != event_id || *state == CooldownState::InFlight
        });
        before.saturating_sub(self.entries.len())
    }

    /// Forgets confirmed deliveries of events that are no longer tracked.
    ///
    /// Deliveries restored from disk may refer to events that expired while
    /// the engine was down, so [`forget_event`](Self::forget_event) never
    /// runs for them. Entries sent at or after `cutoff` are kept, so an event
    /// that is reported again soon after a restart stays suppressed.
    ///
    /// # Arguments
    ///
    /// * `cutoff` - Deliveries older than this are candidates for removal.
    /// * `is_tracked` - Whether an event id is still in the event store.
    ///
    /// # Returns
    ///
    /// The number of forgotten deliveries.
    pub fn forget_untracked(
        &self,
        cutoff: DateTime<Utc>,
        is_tracked: impl Fn(&str) -> bool,
    ) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, state| match state {
            CooldownState::InFlight => true,
            CooldownState::Sent(sent_at) => *sent_at >= cutoff || is_tracked(&key.event_id),
        });
        before.saturating_sub(self.entries.len())
    }

    /// Drops deliveries whose rolling window has fully elapsed.
    ///
    /// Does nothing when cooldowns last for the event lifetime.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let Some(window) = self.window else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|_, state| match state {
            CooldownState::InFlight => true,
            CooldownState::Sent(sent_at) => now - *sent_at < window,
        });
        before.saturating_sub(self.entries.len())
    }

    /// Returns every confirmed delivery.
    pub fn sent_entries(&self) -> Vec<SentEntry> {
        self.entries
            .iter()
            .filter_map(|entry| match *entry.value() {
                CooldownState::Sent(sent_at) => Some(SentEntry {
                    subscriber_id: entry.key().subscriber_id.clone(),
                    event_id: entry.key().event_id.clone(),
                    channel: entry.key().channel,
                    sent_at,
                }),
                CooldownState::InFlight => None,
            })
            .collect()
    }

    /// Loads previously persisted deliveries, keeping the most recent one per key.
    pub fn restore(&self, sent_entries: Vec<SentEntry>) {
        for sent in sent_entries {
            let key = CooldownKey::new(&sent.subscriber_id, &sent.event_id, sent.channel);
            match self.entries.entry(key) {
                Entry::Occupied(mut entry) => {
                    if matches!(*entry.get(), CooldownState::Sent(existing) if existing < sent.sent_at) {
                        *entry.get_mut() = CooldownState::Sent(sent.sent_at);
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(CooldownState::Sent(sent.sent_at));
                }
            }
        }
    }
}
