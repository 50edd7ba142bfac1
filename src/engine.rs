//! Engine wiring.
//!
//! This module provides the [`Engine`], which builds the shared state and
//! collaborators from the configuration and runs the background tasks:
//!
//! 1. **Poll driver**: polls the hazard feed every `polling_interval` seconds
//! 2. **Push driver**: dispatches events read from standard input
//! 3. **Broadcast relay**: writes broadcast alerts to standard output as
//!    newline-delimited JSON
//! 4. **Cooldown persistence**: saves cooldowns to disk every minute
//!
//! Tasks run until Ctrl-C, then cooldowns are persisted one last time.

use std::{path::Path, sync::Arc};

use anyhow::{Context, bail};
use log::info;
use tokio::io::{self, BufReader};

use crate::{
    alerts::{AlertDispatcher, CooldownLoader, CooldownTracker, DispatchLog, GeofenceMatcher},
    channels::{BroadcastHub, TwilioSms, relay_lines},
    config::Config,
    events::EventStore,
    feed::{EonetRequester, FeedSync},
    live,
    scheduler::{IngestionScheduler, SchedulerSettings},
    subscribers::{RegistryRequester, SubscriberRegistry},
};

/// Number of dispatch records kept in memory.
const DISPATCH_LOG_CAPACITY: usize = 10_000;
/// Pushed events waiting for the push driver.
const PUSH_QUEUE_CAPACITY: usize = 1024;
/// File holding persisted cooldowns, inside the data directory.
const COOLDOWNS_FILE: &str = "cooldowns";

type Scheduler = IngestionScheduler<EonetRequester, RegistryRequester, BroadcastHub, TwilioSms>;

pub struct Engine {
    scheduler: Arc<Scheduler>,
    broadcast_hub: BroadcastHub,
    cooldown: Arc<CooldownTracker>,
    cooldown_loader: CooldownLoader,
    dispatch_log: Arc<DispatchLog>,
}

impl Engine {
    /// Builds the engine and restores persisted cooldowns from `data_path`.
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded configuration.
    /// * `data_path` - Directory holding persisted state, created if missing.
    ///
    /// # Errors
    ///
    /// Fails if the polling interval is zero or too large, or if the data
    /// directory cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let config = Config::load("config.yaml")?;
    /// let engine = Engine::new(config, "data").await?;
    /// engine.start().await?;
    /// ```
    pub async fn new(config: Config, data_path: &str) -> Result<Self, anyhow::Error> {
        let retention = event_retention(&config)?;
        let max_staleness = registry_staleness(&config)?;

        tokio::fs::create_dir_all(data_path)
            .await
            .with_context(|| format!("failed to create data directory {}", data_path))?;

        let cooldown_loader = CooldownLoader::new(Path::new(data_path).join(COOLDOWNS_FILE));
        let cooldown = Arc::new(CooldownTracker::new(config.cooldown.window()));
        cooldown.restore(cooldown_loader.load().await);

        let registry = Arc::new(SubscriberRegistry::new(max_staleness));
        let event_store = Arc::new(EventStore::new(retention));

        let broadcast_hub = BroadcastHub::new(config.broadcast.capacity);
        let sms = TwilioSms::new(
            &config.sms.url,
            &config.sms.account_sid,
            &config.sms.auth_token,
            &config.sms.from,
            config.channel_timeout(),
        );
        let dispatch_log = Arc::new(DispatchLog::new(DISPATCH_LOG_CAPACITY));

        let dispatcher = AlertDispatcher::new(
            GeofenceMatcher::new(Arc::clone(&registry)),
            Arc::clone(&cooldown),
            broadcast_hub.clone(),
            sms,
            config.channel_timeout(),
            Arc::clone(&dispatch_log),
        );

        let feed_sync = FeedSync::new(EonetRequester::new(
            &config.feed.url,
            config.feed.days,
            config.feed.timeout(),
        ));
        let subscriber_requester =
            RegistryRequester::new(&config.registry.url, config.registry.timeout());

        let scheduler = Arc::new(IngestionScheduler::new(
            feed_sync,
            subscriber_requester,
            registry,
            event_store,
            Arc::clone(&cooldown),
            dispatcher,
            SchedulerSettings {
                polling_interval: config.feed.polling_interval(),
                feed_timeout: config.feed.timeout(),
                poll_policy: config.policies.poll,
                push_policy: config.policies.push,
            },
        ));

        Ok(Engine {
            scheduler,
            broadcast_hub,
            cooldown,
            cooldown_loader,
            dispatch_log,
        })
    }

    /// Runs every task until Ctrl-C.
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let persistence_task = self
            .cooldown_loader
            .start_persistence_task(Arc::clone(&self.cooldown));

        let relay_task = tokio::spawn(relay_lines(self.broadcast_hub.subscribe(), io::stdout()));

        let (push_handle, push_receiver) = live::push_channel(PUSH_QUEUE_CAPACITY);
        let input_task = tokio::spawn(live::read_events(BufReader::new(io::stdin()), push_handle));

        let poll_task = tokio::spawn({
            let scheduler = Arc::clone(&self.scheduler);
            async move { scheduler.run_poll_loop().await }
        });
        let push_task = tokio::spawn({
            let scheduler = Arc::clone(&self.scheduler);
            async move { scheduler.run_push_loop(push_receiver).await }
        });

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("shutting down");

        for task in [&poll_task, &push_task, &persistence_task, &relay_task] {
            task.abort();
        }
        input_task.abort();

        self.cooldown_loader
            .persist(&self.cooldown.sent_entries())
            .await;
        info!("dispatch history: {}", self.dispatch_log.summary());

        Ok(())
    }
}

/// How long an event may go unreported before it expires: two missed polls.
fn event_retention(config: &Config) -> Result<chrono::Duration, anyhow::Error> {
    if config.feed.polling_interval == 0 {
        bail!("feed.polling_interval must be at least 1 second");
    }
    chrono::Duration::from_std(config.feed.polling_interval() * 2)
        .context("feed.polling_interval is too large")
}

/// How old the subscriber snapshot may be when an event is dispatched.
///
/// One poll interval, plus the time a cycle may wait on the registry and the
/// feed before it dispatches.
fn registry_staleness(config: &Config) -> Result<chrono::Duration, anyhow::Error> {
    let bound = config.feed.polling_interval() + config.registry.timeout() + config.feed.timeout();
    chrono::Duration::from_std(bound).context("feed.polling_interval is too large")
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::{
        Figment,
        providers::{Format, Yaml},
    };
    use tempfile::tempdir;

    fn create_test_config(polling_interval: u64) -> Config {
        let yaml = format!(
            r#"
feed:
  url: "https://eonet.example.com/api/v3/events"
  polling_interval: {}
  timeout: 30
registry:
  url: "https://accounts.example.com/subscribers"
  timeout: 10
sms:
  url: "https://sms.example.com"
  account_sid: "AC123"
  auth_token: "secret"
  from: "+15550000000"
"#,
            polling_interval
        );
        Figment::from(Yaml::string(&yaml)).extract().unwrap()
    }

    #[tokio::test]
    async fn test_new_rejects_zero_polling_interval() {
        let data = tempdir().unwrap();

        let result = Engine::new(create_test_config(0), data.path().to_str().unwrap()).await;

        match result {
            Ok(_) => panic!("a zero polling interval must be rejected"),
            Err(e) => assert!(e.to_string().contains("polling_interval")),
        }
    }

    #[tokio::test]
    async fn test_new_restores_cooldowns_from_data_dir() {
        let data = tempdir().unwrap();
        tokio::fs::write(
            data.path().join(COOLDOWNS_FILE),
            r#"[{"subscriberId":"u1","eventId":"e1","channel":"sms","sentAt":"2026-10-17T00:00:00Z"}]"#,
        )
        .await
        .unwrap();

        let engine = Engine::new(create_test_config(900), data.path().to_str().unwrap())
            .await
            .unwrap_or_else(|e| panic!("engine failed to build: {}", e));

        assert_eq!(engine.cooldown.sent_entries().len(), 1);
    }

    #[test]
    fn test_event_retention_spans_two_polls() {
        let retention = event_retention(&create_test_config(900)).unwrap();

        assert_eq!(retention, chrono::Duration::seconds(1800));
    }

    #[test]
    fn test_registry_staleness_is_one_poll_plus_request_timeouts() {
        let staleness = registry_staleness(&create_test_config(900)).unwrap();

        assert_eq!(staleness, chrono::Duration::seconds(900 + 10 + 30));
    }
}
