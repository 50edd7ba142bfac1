//! Alert dispatching.
//!
//! This module provides the [`AlertDispatcher`], which matches an event
//! against the subscriber registry and delivers one alert per (subscriber,
//! channel) unless the cooldown suppresses it.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::time;

use crate::{
    alerts::{
        AlertPayload, Channel, CooldownKey, CooldownTracker, DispatchLog, DispatchRecord,
        DispatchSummary, GeofenceMatcher, Match, Outcome,
    },
    channels::{BroadcastChannel, SmsChannel},
    error::EngineError,
    events::Event,
};

/// Delivers alerts for events to nearby subscribers.
///
/// Each delivery is bounded by `channel_timeout`. A failed or timed-out
/// delivery is recorded as [`Outcome::Failed`] and does not start a cooldown,
/// so the next cycle retries it. Deliveries for different recipients run
/// concurrently and fail independently.
///
/// # Examples
///
/// ```no_run
/// let dispatcher = AlertDispatcher::new(matcher, cooldown, hub, sms, Duration::from_secs(10), dispatch_log);
/// let records = dispatcher.dispatch(&event, 50.0, &[Channel::Broadcast]).await?;
/// ```
pub struct AlertDispatcher<B: BroadcastChannel, S: SmsChannel> {
    matcher: GeofenceMatcher,
    cooldown: Arc<CooldownTracker>,
    broadcast: B,
    sms: S,
    channel_timeout: Duration,
    dispatch_log: Arc<DispatchLog>,
}

impl<B: BroadcastChannel, S: SmsChannel> AlertDispatcher<B, S> {
    /// Create a new [AlertDispatcher].
    ///
    /// # Arguments
    ///
    /// * `matcher` - Finds the subscribers near an event.
    /// * `cooldown` - Shared with every other dispatcher of the engine.
    /// * `broadcast` - Channel for [`Channel::Broadcast`] alerts.
    /// * `sms` - Channel for [`Channel::Sms`] alerts.
    /// * `channel_timeout` - Upper bound for one channel call.
    /// * `dispatch_log` - Receives every record produced.
    pub fn new(
        matcher: GeofenceMatcher,
        cooldown: Arc<CooldownTracker>,
        broadcast: B,
        sms: S,
        channel_timeout: Duration,
        dispatch_log: Arc<DispatchLog>,
    ) -> Self {
        AlertDispatcher {
            matcher,
            cooldown,
            broadcast,
            sms,
            channel_timeout,
            dispatch_log,
        }
    }

    /// Alerts every subscriber within `radius_km` of `event` on `channels`.
    ///
    /// Returns one record per attempted (subscriber, channel). Subscribers
    /// without a phone number are skipped for SMS. Closed events are never
    /// dispatched.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidEventGeometry`] if the event has no coordinates
    /// - [`EngineError::RegistryUnavailable`] if subscribers cannot be read;
    ///   nothing is attempted for this event
    pub async fn dispatch(
        &self,
        event: &Event,
        radius_km: f64,
        channels: &[Channel],
    ) -> Result<Vec<DispatchRecord>, EngineError> {
        if event.closed {
            debug!("skip dispatch of closed event {}", event.id);
            return Ok(Vec::new());
        }

        let matches = self.matcher.matches(event, radius_km, Utc::now())?;
        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for channel in channels {
            let deliveries = matches.iter().filter_map(|m| {
                let recipient = match channel {
                    Channel::Broadcast => Some(m.subscriber.id.as_str()),
                    Channel::Sms => m.subscriber.phone.as_deref(),
                };
                if recipient.is_none() {
                    debug!("subscriber {} has no {} recipient", m.subscriber.id, channel);
                }
                recipient.map(|recipient| self.deliver(event, m, *channel, recipient))
            });
            records.extend(join_all(deliveries).await);
        }

        self.dispatch_log.append(&records);
        info!(
            "dispatched event {} within {} km: {}",
            event.id,
            radius_km,
            DispatchSummary::from_records(&records)
        );

        Ok(records)
    }

    /// Reserves, sends and settles a single alert.
    async fn deliver(
        &self,
        event: &Event,
        m: &Match,
        channel: Channel,
        recipient: &str,
    ) -> DispatchRecord {
        let key = CooldownKey::new(&m.subscriber.id, &event.id, channel);
        let record = |outcome| DispatchRecord {
            subscriber_id: m.subscriber.id.clone(),
            event_id: event.id.clone(),
            channel,
            distance_km: m.distance_km,
            dispatched_at: Utc::now(),
            outcome,
        };

        let now = Utc::now();
        if self.cooldown.should_suppress(&key, now)
            || !self.cooldown.try_reserve(key.clone(), now)
        {
            debug!("suppress alert {}", key);
            return record(Outcome::Suppressed);
        }

        let payload = AlertPayload::new(event, m.distance_km);
        let result = time::timeout(self.channel_timeout, self.send(channel, recipient, &payload))
            .await
            .unwrap_or_else(|_| {
                Err(EngineError::delivery(
                    channel,
                    format!("no answer within {:?}", self.channel_timeout),
                ))
            });

        match result {
            Ok(()) => {
                let sent = record(Outcome::Sent);
                self.cooldown.record_sent(key, sent.dispatched_at);
                sent
            }
            Err(e) => {
                warn!("alert {} failed: {}", key, e);
                self.cooldown.release(&key);
                record(Outcome::Failed)
            }
        }
    }

    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        payload: &AlertPayload,
    ) -> Result<(), EngineError> {
        match channel {
            Channel::Broadcast => self.broadcast.emit(recipient, payload).await,
            Channel::Sms => self.sms.send(recipient, &payload.sms_body()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channels::{MockBroadcastChannel, MockSmsChannel},
        geo::Coordinates,
        subscribers::{Subscriber, SubscriberRegistry},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn create_test_subscriber(id: &str, latitude: f64, longitude: f64) -> Subscriber {
        Subscriber {
            id: id.to_string(),
            phone: Some(format!("+1555000{}", id.len())),
            location: Some(Coordinates::new(latitude, longitude)),
            alerts_enabled: true,
        }
    }

    fn create_test_event(id: &str, latitude: f64, longitude: f64) -> Event {
        Event {
            id: id.to_string(),
            title: "Fire".to_string(),
            category_title: "Wildfires".to_string(),
            coordinates: Some(Coordinates::new(latitude, longitude)),
            closed: false,
            observed_at: Utc::now(),
        }
    }

    fn create_test_dispatcher<B: BroadcastChannel, S: SmsChannel>(
        subscribers: Vec<Subscriber>,
        broadcast: B,
        sms: S,
    ) -> AlertDispatcher<B, S> {
        let registry = Arc::new(SubscriberRegistry::new(chrono::Duration::minutes(30)));
        registry.replace(subscribers, Utc::now());

        AlertDispatcher::new(
            GeofenceMatcher::new(registry),
            Arc::new(CooldownTracker::new(None)),
            broadcast,
            sms,
            Duration::from_millis(100),
            Arc::new(DispatchLog::new(100)),
        )
    }

    fn outcomes(records: &[DispatchRecord]) -> Vec<(String, Outcome)> {
        let mut outcomes: Vec<(String, Outcome)> = records
            .iter()
            .map(|r| (r.subscriber_id.clone(), r.outcome))
            .collect();
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        outcomes
    }

    /// SMS gateway whose first call never answers in time.
    struct SlowFirstSms {
        calls: AtomicUsize,
    }

    impl SmsChannel for SlowFirstSms {
        async fn send(&self, _phone_number: &str, _message: &str) -> Result<(), EngineError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                time::sleep(Duration::from_secs(5)).await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_nearby_subscriber_is_alerted() {
        let mut broadcast = MockBroadcastChannel::new();
        broadcast
            .expect_emit()
            .withf(|recipient, payload| recipient == "u1" && payload.event_id == "e1")
            .times(1)
            .returning(|_, _| Ok(()));

        let dispatcher = create_test_dispatcher(
            vec![create_test_subscriber("u1", 28.70, 77.10)],
            broadcast,
            MockSmsChannel::new(),
        );

        let records = dispatcher
            .dispatch(&create_test_event("e1", 28.71, 77.11), 50.0, &[Channel::Broadcast])
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, Outcome::Sent);
        assert!(records[0].distance_km < 2.0);
        assert_eq!(dispatcher.dispatch_log.summary().sent, 1);
    }

    #[tokio::test]
    async fn test_distant_subscriber_is_never_contacted() {
        let mut broadcast = MockBroadcastChannel::new();
        broadcast.expect_emit().times(0);
        let mut sms = MockSmsChannel::new();
        sms.expect_send().times(0);

        let dispatcher = create_test_dispatcher(
            vec![create_test_subscriber("u1", 0.0, 0.0)],
            broadcast,
            sms,
        );

        let records = dispatcher
            .dispatch(
                &create_test_event("e1", 45.0, 90.0),
                500.0,
                &[Channel::Broadcast, Channel::Sms],
            )
            .await
            .unwrap();

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_second_dispatch_is_suppressed() {
        let mut sms = MockSmsChannel::new();
        sms.expect_send().times(1).returning(|_, _| Ok(()));

        let dispatcher = create_test_dispatcher(
            vec![create_test_subscriber("u1", 28.70, 77.10)],
            MockBroadcastChannel::new(),
            sms,
        );
        let event = create_test_event("e1", 28.71, 77.11);

        let first = dispatcher.dispatch(&event, 50.0, &[Channel::Sms]).await.unwrap();
        let second = dispatcher.dispatch(&event, 50.0, &[Channel::Sms]).await.unwrap();

        assert_eq!(first[0].outcome, Outcome::Sent);
        assert_eq!(second[0].outcome, Outcome::Suppressed);
    }

    #[tokio::test]
    async fn test_closed_event_is_not_dispatched() {
        let mut broadcast = MockBroadcastChannel::new();
        broadcast.expect_emit().times(0);

        let dispatcher = create_test_dispatcher(
            vec![create_test_subscriber("u1", 28.70, 77.10)],
            broadcast,
            MockSmsChannel::new(),
        );
        let mut event = create_test_event("e1", 28.71, 77.11);
        event.closed = true;

        let records = dispatcher
            .dispatch(&event, 50.0, &[Channel::Broadcast])
            .await
            .unwrap();

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_sms_is_retried_next_cycle() {
        let dispatcher = create_test_dispatcher(
            vec![create_test_subscriber("u1", 28.70, 77.10)],
            MockBroadcastChannel::new(),
            SlowFirstSms {
                calls: AtomicUsize::new(0),
            },
        );
        let event = create_test_event("e1", 28.71, 77.11);

        let first = dispatcher.dispatch(&event, 50.0, &[Channel::Sms]).await.unwrap();
        let second = dispatcher.dispatch(&event, 50.0, &[Channel::Sms]).await.unwrap();
        let third = dispatcher.dispatch(&event, 50.0, &[Channel::Sms]).await.unwrap();

        assert_eq!(first[0].outcome, Outcome::Failed);
        assert_eq!(second[0].outcome, Outcome::Sent);
        assert_eq!(third[0].outcome, Outcome::Suppressed);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_subscribers() {
        let mut sms = MockSmsChannel::new();
        sms.expect_send()
            .withf(|phone_number, _| phone_number == "+15550002")
            .returning(|_, _| Err(EngineError::delivery(Channel::Sms, "HTTP 500")));
        sms.expect_send()
            .withf(|phone_number, _| phone_number == "+15550003")
            .returning(|_, _| Ok(()));

        let dispatcher = create_test_dispatcher(
            vec![
                create_test_subscriber("u1", 28.70, 77.10),
                create_test_subscriber("u22", 28.72, 77.12),
            ],
            MockBroadcastChannel::new(),
            sms,
        );

        let records = dispatcher
            .dispatch(&create_test_event("e1", 28.71, 77.11), 50.0, &[Channel::Sms])
            .await
            .unwrap();

        assert_eq!(
            outcomes(&records),
            vec![
                ("u1".to_string(), Outcome::Failed),
                ("u22".to_string(), Outcome::Sent)
            ]
        );
        assert!(!dispatcher.cooldown.should_suppress(
            &CooldownKey::new("u1", "e1", Channel::Sms),
            Utc::now()
        ));
    }

    #[tokio::test]
    async fn test_subscriber_without_phone_is_skipped_for_sms() {
        let mut sms = MockSmsChannel::new();
        sms.expect_send().times(0);
        let mut broadcast = MockBroadcastChannel::new();
        broadcast.expect_emit().times(1).returning(|_, _| Ok(()));

        let mut subscriber = create_test_subscriber("u1", 28.70, 77.10);
        subscriber.phone = None;
        let dispatcher = create_test_dispatcher(vec![subscriber], broadcast, sms);

        let records = dispatcher
            .dispatch(
                &create_test_event("e1", 28.71, 77.11),
                50.0,
                &[Channel::Sms, Channel::Broadcast],
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].channel, Channel::Broadcast);
    }

    #[tokio::test]
    async fn test_channels_have_separate_cooldowns() {
        let mut broadcast = MockBroadcastChannel::new();
        broadcast.expect_emit().times(1).returning(|_, _| Ok(()));
        let mut sms = MockSmsChannel::new();
        sms.expect_send().times(1).returning(|_, _| Ok(()));

        let dispatcher = create_test_dispatcher(
            vec![create_test_subscriber("u1", 28.70, 77.10)],
            broadcast,
            sms,
        );
        let event = create_test_event("e1", 28.71, 77.11);

        dispatcher.dispatch(&event, 50.0, &[Channel::Broadcast]).await.unwrap();
        let records = dispatcher.dispatch(&event, 50.0, &[Channel::Sms]).await.unwrap();

        assert_eq!(records[0].outcome, Outcome::Sent);
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_send_once() {
        let mut broadcast = MockBroadcastChannel::new();
        broadcast.expect_emit().times(1).returning(|_, _| Ok(()));

        let dispatcher = create_test_dispatcher(
            vec![create_test_subscriber("u1", 28.70, 77.10)],
            broadcast,
            MockSmsChannel::new(),
        );
        let event = create_test_event("e1", 28.71, 77.11);

        let (first, second) = tokio::join!(
            dispatcher.dispatch(&event, 50.0, &[Channel::Broadcast]),
            dispatcher.dispatch(&event, 50.0, &[Channel::Broadcast]),
        );

        let mut all = first.unwrap();
        all.extend(second.unwrap());
        let sent = all.iter().filter(|r| r.outcome == Outcome::Sent).count();
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn test_unavailable_registry_skips_event() {
        let mut broadcast = MockBroadcastChannel::new();
        broadcast.expect_emit().times(0);

        let dispatcher = AlertDispatcher::new(
            GeofenceMatcher::new(Arc::new(SubscriberRegistry::new(chrono::Duration::minutes(30)))),
            Arc::new(CooldownTracker::new(None)),
            broadcast,
            MockSmsChannel::new(),
            Duration::from_millis(100),
            Arc::new(DispatchLog::new(100)),
        );

        assert!(matches!(
            dispatcher
                .dispatch(&create_test_event("e1", 28.71, 77.11), 50.0, &[Channel::Broadcast])
                .await,
            Err(EngineError::RegistryUnavailable(_))
        ));
    }
}
