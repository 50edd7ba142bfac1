//! Read-mostly view over alert-eligible subscribers.
//!
//! This module provides the [`SubscriberRegistry`], which holds an immutable
//! snapshot of the subscriber set. Readers clone an [`Arc`] to the snapshot and
//! never wait on a refresh in progress: the fetch happens outside the lock and
//! only the pointer swap is done under it.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use crate::{
    error::EngineError,
    subscribers::{Subscriber, SubscriberRequester},
};

struct Snapshot {
    /// Active subscribers only
    subscribers: Arc<Vec<Subscriber>>,
    loaded_at: DateTime<Utc>,
}

/// Snapshot of the subscribers that may receive alerts.
///
/// The snapshot is allowed to lag behind the account system, but only up to
/// `max_staleness`. Past that, or before the first successful load,
/// [`SubscriberRegistry::active_subscribers`] reports
/// [`EngineError::RegistryUnavailable`] so that dispatch cycles are skipped
/// and retried instead of silently alerting nobody.
pub struct SubscriberRegistry {
    snapshot: RwLock<Option<Snapshot>>,
    max_staleness: Duration,
}

impl SubscriberRegistry {
    /// Create a new [SubscriberRegistry] with no snapshot loaded yet.
    ///
    /// # Arguments
    ///
    /// * `max_staleness` - Age past which the last snapshot is no longer used.
    pub fn new(max_staleness: Duration) -> Self {
        SubscriberRegistry {
            snapshot: RwLock::new(None),
            max_staleness,
        }
    }

    /// Reloads the snapshot from `requester`.
    ///
    /// On failure the previous snapshot is kept; it stays usable until it
    /// becomes too stale.
    ///
    /// # Returns
    ///
    /// The number of active subscribers in the new snapshot.
    pub async fn refresh<R: SubscriberRequester>(
        &self,
        requester: &R,
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        match requester.get_subscribers().await {
            Ok(subscribers) => Ok(self.replace(subscribers, now)),
            Err(e) => {
                warn!("failed to refresh subscribers, keeping previous snapshot: {}", e);
                Err(e)
            }
        }
    }

    /// Swaps in a new snapshot built from `subscribers`.
    ///
    /// Disabled subscribers and subscribers without a location are dropped.
    pub fn replace(&self, subscribers: Vec<Subscriber>, now: DateTime<Utc>) -> usize {
        let total = subscribers.len();
        let active: Vec<Subscriber> = subscribers
            .into_iter()
            .filter(Subscriber::is_active)
            .collect();
        let count = active.len();

        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Snapshot {
            subscribers: Arc::new(active),
            loaded_at: now,
        });

        info!("loaded {} active subscribers out of {}", count, total);
        count
    }

    /// Returns the subscribers with alerts enabled and a known location.
    ///
    /// # Errors
    ///
    /// [`EngineError::RegistryUnavailable`] if no snapshot was ever loaded or
    /// the snapshot is older than the staleness bound.
    pub fn active_subscribers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Arc<Vec<Subscriber>>, EngineError> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);

        let Some(snapshot) = guard.as_ref() else {
            return Err(EngineError::RegistryUnavailable(
                "subscribers were never loaded".to_string(),
            ));
        };

        let age = now - snapshot.loaded_at;
        if age > self.max_staleness {
            return Err(EngineError::RegistryUnavailable(format!(
                "snapshot is {} seconds old",
                age.num_seconds()
            )));
        }

        debug!(
            "using subscriber snapshot from {} ({} active)",
            snapshot.loaded_at,
            snapshot.subscribers.len()
        );
        Ok(Arc::clone(&snapshot.subscribers))
    }
}
