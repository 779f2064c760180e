//! Realtime Notifier - pushes status changes to subscribed parties
//!
//! A transient fan-out layer keyed by order id. Delivery is at-least-once
//! while subscribed; changes that happen while disconnected are not
//! replayed, so (re)subscription always pairs a fresh store fetch with the
//! live feed (see the facade's `subscribe_order`).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

use crate::models::StatusChange;

/// Configuration for the realtime notifier
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Buffered events per order channel before slow subscribers lag
    pub channel_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

/// Fan-out of committed status changes, one broadcast channel per order
pub struct RealtimeNotifier {
    config: NotifierConfig,
    channels: Arc<RwLock<HashMap<Uuid, broadcast::Sender<StatusChange>>>>,
}

/// Live feed handle for one subscriber of one order
///
/// Dropping the subscription unsubscribes; the order's channel is reaped
/// once no subscribers remain. Independent subscribers each hold their
/// own receiver and are isolated from one another.
#[derive(Debug)]
pub struct OrderSubscription {
    order_id: Uuid,
    receiver: broadcast::Receiver<StatusChange>,
}

impl OrderSubscription {
    /// Order this subscription is attached to
    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    /// Await the next committed status change
    ///
    /// `Ok(None)` means the feed closed; a lagged subscriber skips ahead
    /// to the oldest retained event rather than erroring, preserving
    /// at-least-once delivery of the newest changes.
    pub async fn next_change(&mut self) -> Option<StatusChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(order_id = %self.order_id, skipped, "subscriber lagged, resuming");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll used by tests and reconcile loops
    pub fn try_next_change(&mut self) -> Option<StatusChange> {
        loop {
            match self.receiver.try_recv() {
                Ok(change) => return Some(change),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl Default for RealtimeNotifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

impl RealtimeNotifier {
    /// Create a new notifier
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            config,
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attach a live feed for an order
    pub async fn subscribe(&self, order_id: Uuid) -> OrderSubscription {
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(order_id)
            .or_insert_with(|| broadcast::channel(self.config.channel_capacity).0);

        OrderSubscription {
            order_id,
            receiver: sender.subscribe(),
        }
    }

    /// Publish a committed status change to current subscribers
    ///
    /// Called by the lifecycle engine strictly after the store commit, so
    /// per-order delivery order matches commit order. Channels with no
    /// remaining subscribers are reaped here.
    pub async fn publish(&self, change: StatusChange) {
        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(&change.order_id) {
            if sender.receiver_count() == 0 || sender.send(change.clone()).is_err() {
                channels.remove(&change.order_id);
            }
        }
    }

    /// Number of live subscribers for an order
    pub async fn subscriber_count(&self, order_id: Uuid) -> usize {
        self.channels
            .read()
            .await
            .get(&order_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}
