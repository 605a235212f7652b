//! Client connection fan-out
//!
//! Tracks live client channels and delivers JSON events to all of them.
//! Delivery is best effort: a channel that fails once is evicted and never
//! retried, and the failure is not reported to whoever triggered the broadcast.

use agentloop_common::error::{AgentLoopError, Result};
use agentloop_common::METRICS;
use agentloop_proto::Event;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifier of a registered channel
pub type ConnectionId = Uuid;

/// An outbound text channel to one client
#[async_trait]
pub trait ClientChannel: Send + Sync {
    /// Deliver one text message
    async fn send_text(&self, text: String) -> Result<()>;
}

/// Channel backed by an in-process queue
///
/// Sends fail once the receiving half has been dropped.
pub struct QueueChannel {
    tx: mpsc::UnboundedSender<String>,
}

impl QueueChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ClientChannel for QueueChannel {
    async fn send_text(&self, text: String) -> Result<()> {
        self.tx
            .send(text)
            .map_err(|_| AgentLoopError::channel("receiver closed"))
    }
}

/// Registry of active client channels
#[derive(Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, Arc<dyn ClientChannel>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel and return its id
    pub fn connect(&self, channel: Arc<dyn ClientChannel>) -> ConnectionId {
        let id = Uuid::new_v4();
        let count = {
            let mut connections = self.connections.write();
            connections.insert(id, channel);
            connections.len()
        };

        METRICS.fanout.active_connections.inc();
        info!("Client connected. Total connections: {}", count);
        id
    }

    /// Remove a channel; removing an unknown id is a no-op
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let (removed, count) = {
            let mut connections = self.connections.write();
            (connections.remove(&id).is_some(), connections.len())
        };

        if removed {
            METRICS.fanout.active_connections.dec();
            info!("Client disconnected. Total connections: {}", count);
        }
        removed
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Deliver a message to one channel
    pub async fn send_personal(&self, message: &str, id: ConnectionId) -> Result<()> {
        let channel = self
            .connections
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| AgentLoopError::not_found(format!("connection {}", id)))?;

        channel.send_text(message.to_string()).await
    }

    /// Encode an event envelope and deliver it to one channel
    pub async fn send_event(&self, event: &Event, id: ConnectionId) -> Result<()> {
        let message = serde_json::to_string(event)?;
        self.send_personal(&message, id).await
    }

    /// Deliver a message to every active channel
    ///
    /// Sends go to a snapshot of the registry; channels that fail are evicted
    /// after the pass completes. Returns the number of successful deliveries.
    pub async fn broadcast(&self, message: &str) -> usize {
        let snapshot: Vec<(ConnectionId, Arc<dyn ClientChannel>)> = self
            .connections
            .read()
            .iter()
            .map(|(id, channel)| (*id, channel.clone()))
            .collect();

        METRICS.fanout.broadcasts_total.inc();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, channel) in snapshot {
            match channel.send_text(message.to_string()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Dropping connection {} after failed delivery: {}", id, e);
                    failed.push(id);
                }
            }
        }

        for id in failed {
            if self.disconnect(id) {
                METRICS.fanout.evictions_total.inc();
            }
        }

        debug!("Broadcast delivered to {} connections", delivered);
        delivered
    }

    /// Encode an event envelope and broadcast it
    pub async fn broadcast_event(&self, event: &Event) -> usize {
        match serde_json::to_string(event) {
            Ok(message) => self.broadcast(&message).await,
            Err(e) => {
                warn!("Failed to encode {} event: {}", event.event_type(), e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test]
    async fn test_failed_channel_is_evicted() {
        let manager = ConnectionManager::new();
        let (first, mut rx1) = QueueChannel::new();
        let (second, rx2) = QueueChannel::new();
        let (third, mut rx3) = QueueChannel::new();

        manager.connect(Arc::new(first));
        let second_id = manager.connect(Arc::new(second));
        manager.connect(Arc::new(third));
        drop(rx2);

        assert_eq!(manager.broadcast("one").await, 2);
        assert_eq!(rx1.try_recv().unwrap(), "one");
        assert_eq!(rx3.try_recv().unwrap(), "one");
        assert!(!manager.is_connected(second_id));
        assert_eq!(manager.connection_count(), 2);

        assert_eq!(manager.broadcast("two").await, 2);
        assert_eq!(rx1.try_recv().unwrap(), "two");
        assert_eq!(rx3.try_recv().unwrap(), "two");
        assert_eq!(rx1.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let manager = ConnectionManager::new();
        let (channel, _rx) = QueueChannel::new();
        let id = manager.connect(Arc::new(channel));

        assert!(manager.disconnect(id));
        assert!(!manager.disconnect(id));
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_send_personal_is_unicast() {
        let manager = ConnectionManager::new();
        let (first, mut rx1) = QueueChannel::new();
        let (second, mut rx2) = QueueChannel::new();
        let first_id = manager.connect(Arc::new(first));
        manager.connect(Arc::new(second));

        manager.send_personal("hello", first_id).await.unwrap();

        assert_eq!(rx1.try_recv().unwrap(), "hello");
        assert_eq!(rx2.try_recv(), Err(TryRecvError::Empty));
        assert!(manager.send_personal("hello", Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_send_event_to_unknown_connection() {
        let manager = ConnectionManager::new();
        let err = manager.send_event(&Event::Pong, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AgentLoopError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_broadcast_event_envelope() {
        let manager = ConnectionManager::new();
        let (channel, mut rx) = QueueChannel::new();
        manager.connect(Arc::new(channel));

        assert_eq!(manager.broadcast_event(&Event::Pong).await, 1);
        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"pong"}"#);
    }

    #[tokio::test]
    async fn test_broadcast_without_connections() {
        let manager = ConnectionManager::new();
        assert_eq!(manager.broadcast("nobody").await, 0);
    }
}
