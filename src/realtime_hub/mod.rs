//! RealtimeHub - WebSocket Event Distribution
//!
//! ## Responsibilities
//!
//! - WebSocket connection management
//! - Event broadcasting (detections, loop lifecycle, operational log)
//!
//! Delivery is best-effort: publishing never blocks, a subscriber only
//! receives events published after its subscription point, and senders
//! that fail are pruned on the next broadcast.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Wire format for `detected_at` / log timestamps
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "kebab-case")]
pub enum HubMessage {
    NewDetection(NewDetectionMessage),
    StoreCleared(StoreClearedMessage),
    LogMessage(LogMessage),
    CycleStart(CycleStartMessage),
    LoopStopped(LoopStoppedMessage),
}

/// Detection event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDetectionMessage {
    pub id: i64,
    pub detected_at: String,
    pub label: String,
    pub confidence: f64,
    pub image_url: String,
}

/// Store-cleared marker (no payload)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreClearedMessage {}

/// Operational log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    pub time: String,
    pub message: String,
    pub level: LogLevel,
}

/// Log severity levels on the event feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Debug,
    Success,
    Warning,
    Error,
    Cmd,
}

/// Cycle start marker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleStartMessage {
    pub cycle: u64,
}

/// Terminal loop-stopped marker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStoppedMessage {}

/// Client connection
struct ClientConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new client
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, ClientConnection { id, tx });
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Client connected");

        (id, rx)
    }

    /// Unregister a client
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Broadcast message to all clients
    ///
    /// Clients whose channel is gone are pruned after the send pass.
    pub async fn broadcast(&self, message: HubMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize hub message");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let connections = self.connections.read().await;
            for conn in connections.values() {
                if conn.tx.send(json.clone()).is_err() {
                    dead.push(conn.id);
                }
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().await;
            for id in dead {
                if connections.remove(&id).is_some() {
                    self.connection_count.fetch_sub(1, Ordering::Relaxed);
                    tracing::debug!(connection_id = %id, "Pruned dead client");
                }
            }
        }
    }

    /// Emit a log-message event and mirror it to the process log
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();

        match level {
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
            _ => tracing::info!("{}", message),
        }

        self.broadcast(HubMessage::LogMessage(LogMessage {
            time: Utc::now().format(DISPLAY_TIME_FORMAT).to_string(),
            message,
            level,
        }))
        .await;
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers_with_tagged_envelope() {
        let hub = RealtimeHub::new();
        let (_id1, mut rx1) = hub.register().await;
        let (_id2, mut rx2) = hub.register().await;

        hub.broadcast(HubMessage::CycleStart(CycleStartMessage { cycle: 3 }))
            .await;

        for rx in [&mut rx1, &mut rx2] {
            let raw = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(value["type"], "cycle-start");
            assert_eq!(value["data"]["cycle"], 3);
        }
    }

    #[tokio::test]
    async fn subscriber_sees_nothing_published_before_it_joined() {
        let hub = RealtimeHub::new();
        hub.broadcast(HubMessage::LoopStopped(LoopStoppedMessage {}))
            .await;

        let (_id, mut rx) = hub.register().await;
        hub.broadcast(HubMessage::StoreCleared(StoreClearedMessage {}))
            .await;

        let raw = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "store-cleared");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_subscriber_is_pruned_on_broadcast() {
        let hub = RealtimeHub::new();
        let (_id, rx) = hub.register().await;
        assert_eq!(hub.connection_count(), 1);

        drop(rx);
        hub.broadcast(HubMessage::LoopStopped(LoopStoppedMessage {}))
            .await;

        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn log_event_carries_level_and_time() {
        let hub = RealtimeHub::new();
        let (_id, mut rx) = hub.register().await;

        hub.log(LogLevel::Cmd, "stop command sent").await;

        let raw = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "log-message");
        assert_eq!(value["data"]["level"], "CMD");
        assert_eq!(value["data"]["message"], "stop command sent");
        assert!(value["data"]["time"].as_str().unwrap().len() >= 19);
    }

    #[test]
    fn log_levels_serialize_uppercase() {
        for (level, expected) in [
            (LogLevel::Info, "\"INFO\""),
            (LogLevel::Success, "\"SUCCESS\""),
            (LogLevel::Warning, "\"WARNING\""),
            (LogLevel::Error, "\"ERROR\""),
            (LogLevel::Debug, "\"DEBUG\""),
            (LogLevel::Cmd, "\"CMD\""),
        ] {
            assert_eq!(serde_json::to_string(&level).unwrap(), expected);
        }
    }
}
