//! In-memory working set of hazard events.
//!
//! This module provides the [`EventStore`], shared by the poll and push
//! drivers. Writes are serialised per event id through the sharded map, so
//! two unrelated events never contend on the same lock.

use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use log::{debug, info};

use crate::events::Event;

/// Result of an [`EventStore::upsert`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The event id was not known.
    Inserted,
    /// The stored event was replaced by a newer or equal observation.
    Updated,
    /// The incoming event is older than the stored one and was ignored.
    Stale,
    /// The event is closed and left the active set.
    Closed,
}

#[derive(Debug, Clone)]
struct StoredEvent {
    event: Event,
    /// Last time any driver reported this event.
    last_seen: DateTime<Utc>,
}

/// Working set of events keyed by event id.
///
/// - Upserts are last-writer-wins on [`Event::observed_at`]
/// - Closed events are kept as tombstones so late duplicates of the open
///   version cannot resurrect them
/// - Events not reported for longer than the retention window are swept
pub struct EventStore {
    events: DashMap<String, StoredEvent>,
    retention: Duration,
}

impl EventStore {
    /// Creates an empty store.
    ///
    /// # Arguments
    ///
    /// * `retention` - How long an event may go unreported before it expires.
    ///   The scheduler uses two poll intervals.
    pub fn new(retention: Duration) -> Self {
        EventStore {
            events: DashMap::new(),
            retention,
        }
    }

    /// Inserts or replaces an event by id.
    ///
    /// The stored copy is only replaced when the incoming observation is at
    /// least as recent as the stored one. Closure is terminal: once an event
    /// is closed, open reports for it are treated as stale.
    pub fn upsert(&self, event: Event, now: DateTime<Utc>) -> UpsertOutcome {
        match self.events.entry(event.id.clone()) {
            Entry::Vacant(entry) => {
                let outcome = if event.closed {
                    UpsertOutcome::Closed
                } else {
                    info!("add new event {}", event);
                    UpsertOutcome::Inserted
                };
                entry.insert(StoredEvent {
                    event,
                    last_seen: now,
                });
                outcome
            }
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                stored.last_seen = stored.last_seen.max(now);

                if stored.event.closed {
                    debug!("ignore report for closed event {}", event.id);
                    return UpsertOutcome::Closed;
                }
                if event.closed {
                    info!("event {} closed", event.id);
                    stored.event = event;
                    return UpsertOutcome::Closed;
                }
                if event.observed_at < stored.event.observed_at {
                    debug!(
                        "ignore stale report for event {} observed at {}",
                        event.id, event.observed_at
                    );
                    return UpsertOutcome::Stale;
                }

                stored.event = event;
                UpsertOutcome::Updated
            }
        }
    }

    /// Removes an event that has not been reported within the retention window.
    ///
    /// Closed events leave the active set as soon as closure is reported and
    /// are removed here once the drivers stop reporting them. The check and the
    /// removal are atomic, so a concurrent upsert refreshing the event wins.
    ///
    /// # Returns
    ///
    /// `true` if the event was removed.
    pub fn expire(&self, event_id: &str, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.retention;
        let removed = self
            .events
            .remove_if(event_id, |_, stored| stored.last_seen < cutoff)
            .is_some();
        if removed {
            info!("expired event {}", event_id);
        }
        removed
    }

    /// Expires every event not reported within the retention window.
    ///
    /// # Returns
    ///
    /// The ids of the removed events, so dependent state can be released.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<String> {
        let cutoff = now - self.retention;
        let candidates: Vec<String> = self
            .events
            .iter()
            .filter(|stored| stored.last_seen < cutoff)
            .map(|stored| stored.key().clone())
            .collect();

        candidates
            .into_iter()
            .filter(|id| self.expire(id, now))
            .collect()
    }

    /// Whether `event_id` is stored, closed or not.
    pub fn contains(&self, event_id: &str) -> bool {
        self.events.contains_key(event_id)
    }

    /// How long an event may go unreported before it expires.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Returns a copy of a stored event, closed or not.
    pub fn get(&self, event_id: &str) -> Option<Event> {
        self.events.get(event_id).map(|stored| stored.event.clone())
    }

    /// Returns the events that are neither closed nor expired, ordered by id.
    pub fn active_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .events
            .iter()
            .filter(|stored| !stored.event.closed)
            .map(|stored| stored.event.clone())
            .collect();
        events.sort_by(|a, b| a.id.cmp(&b.id));
        events
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.events.len()
    }
}
