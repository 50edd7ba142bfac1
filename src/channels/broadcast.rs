//! Broadcast channel.
//!
//! This module provides the [`BroadcastChannel`] trait and [`BroadcastHub`],
//! an in-process fan-out to connected client sessions. A transport (socket
//! server, stdout relay) subscribes to the hub and forwards what it receives.

use log::{debug, warn};
use mockall::automock;
use serde::Serialize;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::broadcast::{self, Receiver, Sender, error::RecvError},
};

use crate::{
    alerts::{AlertPayload, Channel},
    error::EngineError,
};

/// Emits an alert to one recipient's connected sessions.
#[automock]
pub trait BroadcastChannel {
    async fn emit(&self, recipient: &str, payload: &AlertPayload) -> Result<(), EngineError>;
}

/// Message carried by the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    pub recipient: String,
    pub payload: AlertPayload,
}

/// Fan-out hub backed by a tokio broadcast channel.
///
/// Emitting while no session is connected is a delivery failure, so the
/// alert is retried on a later cycle.
#[derive(Clone)]
pub struct BroadcastHub {
    sender: Sender<BroadcastMessage>,
}

impl BroadcastHub {
    /// Create a new [BroadcastHub] with no connected session.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Messages buffered per session before a slow session
    ///   starts losing the oldest ones. Raised to 1 if zero.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let hub = BroadcastHub::new(256);
    /// tokio::spawn(relay_lines(hub.subscribe(), tokio::io::stdout()));
    /// hub.emit("u1", &payload).await?;
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        BroadcastHub { sender }
    }

    /// Connects a new session.
    ///
    /// The session receives every message emitted after this call, until the
    /// receiver is dropped.
    pub fn subscribe(&self) -> Receiver<BroadcastMessage> {
        self.sender.subscribe()
    }
}

impl BroadcastChannel for BroadcastHub {
    async fn emit(&self, recipient: &str, payload: &AlertPayload) -> Result<(), EngineError> {
        let message = BroadcastMessage {
            recipient: recipient.to_string(),
            payload: payload.clone(),
        };

        let sessions = self
            .sender
            .send(message)
            .map_err(|_| EngineError::delivery(Channel::Broadcast, "no connected sessions"))?;

        debug!("broadcast {} to {} sessions", payload.event_id, sessions);
        Ok(())
    }
}

/// Forwards hub messages to `writer` as newline-delimited JSON.
///
/// Returns once the hub is dropped or the writer fails.
pub async fn relay_lines<W: AsyncWrite + Unpin>(
    mut receiver: Receiver<BroadcastMessage>,
    mut writer: W,
) {
    loop {
        let message = match receiver.recv().await {
            Ok(message) => message,
            Err(RecvError::Lagged(skipped)) => {
                warn!("broadcast relay lagged, {} messages skipped", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let mut line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize broadcast message: {}", e);
                continue;
            }
        };
        line.push('\n');

        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!("broadcast relay stopped: {}", e);
            break;
        }
        if let Err(e) = writer.flush().await {
            warn!("broadcast relay stopped: {}", e);
            break;
        }
    }
}
