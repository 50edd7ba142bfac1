//! Configuration file structures for the alert engine.
//!
//! The configuration is read from a YAML file, then overridden by environment
//! variables prefixed with `VIGIL_`, where `__` separates nested keys.
//!
//! # Configuration File Format
//!
//! ```yaml
//! feed:
//!   url: "https://eonet.gsfc.nasa.gov/api/v3/events"
//!   polling_interval: 900
//!
//! registry:
//!   url: "https://accounts.example.com/api/subscribers"
//!
//! sms:
//!   url: "https://api.twilio.com"
//!   account_sid: "AC0123"
//!   auth_token: "secret"
//!   from: "+15550000000"
//!
//! policies:
//!   poll: { radius_km: 500, channels: [sms] }
//!   push: { radius_km: 50, channels: [broadcast] }
//!
//! cooldown:
//!   window: 86400
//! ```
//!
//! ```bash
//! export VIGIL_SMS__AUTH_TOKEN="secret-from-env"
//! ```

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;

use crate::alerts::Channel;

/// Root configuration structure.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub feed: Feed,
    pub registry: Registry,
    pub sms: Sms,
    #[serde(default)]
    pub broadcast: Broadcast,
    #[serde(default)]
    pub policies: Policies,
    #[serde(default)]
    pub cooldown: Cooldown,
    /// Upper bound in seconds for a single channel call.
    #[serde(default = "default_channel_timeout")]
    pub channel_timeout: u64,
}

impl Config {
    /// Loads `path` and applies `VIGIL_` environment overrides.
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("VIGIL_").split("__"))
            .extract()
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout)
    }
}

/// Hazard feed settings.
#[derive(Debug, Deserialize)]
pub struct Feed {
    /// Events endpoint of an EONET-compatible feed.
    pub url: String,
    /// Seconds between two polls.
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
    /// Seconds before a poll is abandoned.
    #[serde(default = "default_feed_timeout")]
    pub timeout: u64,
    /// Look-back window requested from the feed, in days.
    #[serde(default = "default_days")]
    pub days: u32,
}

impl Feed {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Subscriber registry settings.
#[derive(Debug, Deserialize)]
pub struct Registry {
    /// Endpoint returning the subscriber list as JSON.
    pub url: String,
    #[serde(default = "default_registry_timeout")]
    pub timeout: u64,
}

impl Registry {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Twilio-compatible gateway credentials.
#[derive(Debug, Deserialize)]
pub struct Sms {
    pub url: String,
    pub account_sid: String,
    pub auth_token: String,
    /// Sender phone number in E.164 format.
    pub from: String,
}

#[derive(Debug, Deserialize)]
pub struct Broadcast {
    /// Messages buffered for a slow session before it lags.
    #[serde(default = "default_broadcast_capacity")]
    pub capacity: usize,
}

impl Default for Broadcast {
    fn default() -> Self {
        Broadcast {
            capacity: default_broadcast_capacity(),
        }
    }
}

/// Radius and channels used for one driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DispatchPolicy {
    pub radius_km: f64,
    pub channels: Vec<Channel>,
}

/// Dispatch policies of the poll and push drivers.
#[derive(Debug, Deserialize)]
pub struct Policies {
    #[serde(default = "default_poll_policy")]
    pub poll: DispatchPolicy,
    #[serde(default = "default_push_policy")]
    pub push: DispatchPolicy,
}

impl Default for Policies {
    fn default() -> Self {
        Policies {
            poll: default_poll_policy(),
            push: default_push_policy(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Cooldown {
    /// Seconds before a subscriber may be alerted again about the same
    /// event. Without it, an event is alerted once for its whole lifetime.
    pub window: Option<u64>,
}

impl Cooldown {
    pub fn window(&self) -> Option<chrono::Duration> {
        self.window
            .and_then(|seconds| i64::try_from(seconds).ok())
            .map(chrono::Duration::seconds)
    }
}

fn default_polling_interval() -> u64 {
    900
}

fn default_feed_timeout() -> u64 {
    30
}

fn default_days() -> u32 {
    20
}

fn default_registry_timeout() -> u64 {
    10
}

fn default_broadcast_capacity() -> usize {
    256
}

fn default_channel_timeout() -> u64 {
    10
}

fn default_poll_policy() -> DispatchPolicy {
    DispatchPolicy {
        radius_km: 500.0,
        channels: vec![Channel::Sms],
    }
}

fn default_push_policy() -> DispatchPolicy {
    DispatchPolicy {
        radius_km: 50.0,
        channels: vec![Channel::Broadcast],
    }
}
