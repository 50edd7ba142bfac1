//! Live push source.
//!
//! Pushed events reach the push driver through a bounded queue. Any producer
//! holding a [`PushHandle`] may feed it; the binary reads newline-delimited
//! JSON events from standard input.

use log::{debug, info, warn};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc::{self, Receiver, Sender},
};

use crate::events::Event;

/// Producer side of the push queue.
#[derive(Clone)]
pub struct PushHandle {
    sender: Sender<Event>,
}

impl PushHandle {
    /// Queues `event` for the push driver.
    ///
    /// Waits while the queue is full. Returns `false` once the driver stopped.
    pub async fn push(&self, event: Event) -> bool {
        self.sender.send(event).await.is_ok()
    }
}

/// Creates the push queue holding up to `capacity` pending events.
pub fn push_channel(capacity: usize) -> (PushHandle, Receiver<Event>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (PushHandle { sender }, receiver)
}

/// Pushes every JSON event line read from `reader`.
///
/// Blank lines are skipped and malformed lines are logged and dropped.
///
/// # Returns
///
/// The number of events pushed before the input ended or the driver stopped.
pub async fn read_events<Rd: AsyncBufRead + Unpin>(reader: Rd, handle: PushHandle) -> usize {
    let mut lines = reader.lines();
    let mut pushed = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("failed to read pushed events: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let event: Event = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("ignore malformed pushed event: {}", e);
                continue;
            }
        };

        debug!("received pushed event {}", event);
        if !handle.push(event).await {
            break;
        }
        pushed += 1;
    }

    info!("live input ended after {} events", pushed);
    pushed
}
