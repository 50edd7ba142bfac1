//! Ingestion drivers.
//!
//! This module provides the [`IngestionScheduler`], which runs the two
//! drivers feeding the engine:
//!
//! 1. **Poll driver**: every `polling_interval`, refreshes the subscriber
//!    registry, fetches the full feed snapshot, updates the event store,
//!    expires stale events and dispatches every active event with the poll
//!    policy.
//! 2. **Push driver**: handles events as the live source delivers them,
//!    dispatching each with the push policy right away.
//!
//! Both drivers write through the shared [`EventStore`] and dispatch through
//! the shared [`CooldownTracker`], so an alert raised by one is suppressed in
//! the other.
//!
//! ```text
//! feed ──poll──┐                       ┌──> broadcast
//!              ├──> EventStore ──> AlertDispatcher
//! live ──push──┘                       └──> sms
//! ```

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::{
    sync::mpsc::Receiver,
    time::{self, MissedTickBehavior},
};

use crate::{
    alerts::{AlertDispatcher, CooldownTracker, DispatchRecord, DispatchSummary},
    channels::{BroadcastChannel, SmsChannel},
    config::DispatchPolicy,
    error::EngineError,
    events::{Event, EventStore, UpsertOutcome},
    feed::{FeedRequester, FeedSync},
    subscribers::{SubscriberRegistry, SubscriberRequester},
};

/// Timing and policies of the two drivers.
pub struct SchedulerSettings {
    pub polling_interval: Duration,
    /// Upper bound for one feed fetch.
    pub feed_timeout: Duration,
    pub poll_policy: DispatchPolicy,
    pub push_policy: DispatchPolicy,
}

/// Runs the poll and push drivers over shared engine state.
///
/// # Examples
///
/// ```no_run
/// let scheduler = Arc::new(IngestionScheduler::new(feed_sync, requester, registry, event_store, cooldown, dispatcher, settings));
/// tokio::spawn({ let scheduler = Arc::clone(&scheduler); async move { scheduler.run_poll_loop().await } });
/// tokio::spawn(async move { scheduler.run_push_loop(push_receiver).await });
/// ```
pub struct IngestionScheduler<F, R, B, S>
where
    F: FeedRequester,
    R: SubscriberRequester,
    B: BroadcastChannel,
    S: SmsChannel,
{
    feed_sync: FeedSync<F>,
    subscriber_requester: R,
    registry: Arc<SubscriberRegistry>,
    event_store: Arc<EventStore>,
    cooldown: Arc<CooldownTracker>,
    dispatcher: AlertDispatcher<B, S>,
    settings: SchedulerSettings,
}

impl<F, R, B, S> IngestionScheduler<F, R, B, S>
where
    F: FeedRequester,
    R: SubscriberRequester,
    B: BroadcastChannel,
    S: SmsChannel,
{
    pub fn new(
        feed_sync: FeedSync<F>,
        subscriber_requester: R,
        registry: Arc<SubscriberRegistry>,
        event_store: Arc<EventStore>,
        cooldown: Arc<CooldownTracker>,
        dispatcher: AlertDispatcher<B, S>,
        settings: SchedulerSettings,
    ) -> Self {
        IngestionScheduler {
            feed_sync,
            subscriber_requester,
            registry,
            event_store,
            cooldown,
            dispatcher,
            settings,
        }
    }

    /// Runs one poll cycle.
    ///
    /// A registry failure does not stop the cycle: the previous snapshot is
    /// used while it is fresh enough, otherwise each event's dispatch is
    /// skipped.
    ///
    /// # Errors
    ///
    /// [`EngineError::FeedUnavailable`] if the feed fails or does not answer
    /// within `feed_timeout`. Nothing is stored or dispatched in that case.
    pub async fn poll_once(&self) -> Result<Vec<DispatchRecord>, EngineError> {
        let started_at = Utc::now();

        // Failure is logged by the registry; a fresh enough snapshot stays usable.
        let _ = self
            .registry
            .refresh(&self.subscriber_requester, started_at)
            .await;

        let events = time::timeout(
            self.settings.feed_timeout,
            self.feed_sync.fetch_events(started_at),
        )
        .await
        .unwrap_or_else(|_| {
            Err(EngineError::FeedUnavailable(format!(
                "no answer within {:?}",
                self.settings.feed_timeout
            )))
        })?;

        let now = Utc::now();
        for event in events {
            self.event_store.upsert(event, now);
        }

        for event_id in self.event_store.sweep(now) {
            let forgotten = self.cooldown.forget_event(&event_id);
            debug!("forgot {} cooldowns of expired event {}", forgotten, event_id);
        }
        let cutoff = now - self.event_store.retention();
        let forgotten = self
            .cooldown
            .forget_untracked(cutoff, |event_id| self.event_store.contains(event_id));
        if forgotten > 0 {
            info!("forgot {} cooldowns of untracked events", forgotten);
        }
        self.cooldown.prune(now);

        let policy = &self.settings.poll_policy;
        let mut records = Vec::new();
        for event in self.event_store.active_events() {
            records.extend(self.dispatch(&event, policy).await);
        }

        info!(
            "poll cycle done: {}",
            DispatchSummary::from_records(&records)
        );
        Ok(records)
    }

    /// Stores a pushed event and dispatches it with the push policy.
    ///
    /// Duplicates and out-of-order deliveries are absorbed by the store: only
    /// the stored version of the event is dispatched, and closed or stale
    /// reports dispatch nothing.
    pub async fn handle_push(&self, event: Event) -> Vec<DispatchRecord> {
        let event_id = event.id.clone();
        let outcome = self.event_store.upsert(event, Utc::now());
        debug!("pushed event {}: {:?}", event_id, outcome);

        if matches!(outcome, UpsertOutcome::Closed | UpsertOutcome::Stale) {
            return Vec::new();
        }
        let Some(stored) = self.event_store.get(&event_id) else {
            return Vec::new();
        };

        self.dispatch(&stored, &self.settings.push_policy).await
    }

    /// Dispatches `event`, logging instead of propagating errors.
    async fn dispatch(&self, event: &Event, policy: &DispatchPolicy) -> Vec<DispatchRecord> {
        if !event.is_matchable() {
            debug!("event {} cannot be matched", event.id);
            return Vec::new();
        }

        match self
            .dispatcher
            .dispatch(event, policy.radius_km, &policy.channels)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!("skip dispatch of event {}: {}", event.id, e);
                Vec::new()
            }
        }
    }

    /// Polls forever, one cycle every `polling_interval`.
    ///
    /// The first cycle starts immediately. A failed cycle is logged and
    /// retried at the next tick.
    pub async fn run_poll_loop(&self) {
        info!(
            "polling the feed every {} seconds",
            self.settings.polling_interval.as_secs()
        );
        let mut interval = time::interval(self.settings.polling_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.poll_once().await {
                error!("poll cycle skipped: {}", e);
            }
        }
    }

    /// Handles pushed events until the live source is closed.
    pub async fn run_push_loop(&self, mut receiver: Receiver<Event>) {
        info!("listening for pushed events");
        while let Some(event) = receiver.recv().await {
            self.handle_push(event).await;
        }
        info!("live source closed");
    }
}
