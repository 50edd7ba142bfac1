//! Cooldown persistence layer.
//!
//! This module provides the [`CooldownLoader`] for keeping confirmed
//! deliveries between restarts, so a restart does not re-alert subscribers
//! about events they already heard of.

use std::{path::PathBuf, sync::Arc, time::Duration};

use log::{error, info, warn};
use tokio::{fs, task::JoinHandle, time};

use crate::alerts::{CooldownTracker, cooldown::SentEntry};

/// Interval in seconds between automatic cooldown persistence operations.
const SAVE_INTERVAL_SECS: u64 = 60;

/// Loads and persists confirmed deliveries as JSON.
///
/// Loading never fails: a missing or corrupted file yields no entries.
///
/// # Examples
///
/// ```no_run
/// let loader = CooldownLoader::new(PathBuf::from("data/cooldowns"));
/// tracker.restore(loader.load().await);
/// loader.persist(&tracker.sent_entries()).await;
/// ```
#[derive(Clone)]
pub struct CooldownLoader {
    path: PathBuf,
}

impl CooldownLoader {
    /// Create a new [CooldownLoader].
    ///
    /// # Arguments
    ///
    /// * `path` - File holding the deliveries. Its directory must exist.
    pub fn new(path: PathBuf) -> Self {
        CooldownLoader { path }
    }

    /// Loads persisted deliveries, or nothing if the file is missing or invalid.
    pub async fn load(&self) -> Vec<SentEntry> {
        let Ok(serialized) = fs::read_to_string(&self.path).await else {
            warn!("no persisted cooldowns found, starting with empty cooldowns");
            return Vec::new();
        };

        let Ok(sent_entries) = serde_json::from_str::<Vec<SentEntry>>(&serialized) else {
            error!("failed to deserialize persisted cooldowns, starting with empty cooldowns");
            return Vec::new();
        };

        info!("loaded {} persisted cooldowns", sent_entries.len());

        sent_entries
    }

    /// Writes `sent_entries` to disk, replacing the previous file.
    ///
    /// Errors are logged, not propagated.
    pub async fn persist(&self, sent_entries: &[SentEntry]) {
        let serialized = match serde_json::to_string(sent_entries) {
            Ok(serialized) => serialized,
            Err(e) => {
                error!("failed to serialize cooldowns: {}", e);
                return;
            }
        };

        let tmp_path = self.path.with_extension("tmp");
        if let Err(e) = fs::write(&tmp_path, &serialized).await {
            error!("failed to persist cooldowns: {}", e);
            return;
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            error!("failed to persist cooldowns: {}", e);
            return;
        }

        info!("persisted {} cooldowns", sent_entries.len());
    }

    /// Spawns a task persisting `tracker` every [`SAVE_INTERVAL_SECS`] seconds.
    pub fn start_persistence_task(&self, tracker: Arc<CooldownTracker>) -> JoinHandle<()> {
        let loader = self.clone();

        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(SAVE_INTERVAL_SECS));
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                loader.persist(&tracker.sent_entries()).await;
            }
        })
    }
}
