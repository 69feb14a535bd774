//! Device-to-device value subscriptions
//!
//! Subscriptions are a directed relation of `(subscriber, publisher)` ref id
//! pairs held here, outside the adapters. A device may subscribe to itself;
//! unsubscribing removes exactly the pair given.

use crate::client::RefId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

const CHANNEL_CAPACITY: usize = 256;

/// Value change observed by an adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChangeEvent {
    pub ref_id: RefId,
    pub previous: f64,
    pub value: f64,
    /// `"write"` or `"read"`
    pub cause: String,
}

/// Event addressed to one subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subscriber: RefId,
    pub event: ValueChangeEvent,
}

/// Directed subscription relation plus the fan-out channel
pub struct SubscriptionRegistry {
    /// Publisher to its subscribers
    subscribers: RwLock<HashMap<RefId, BTreeSet<RefId>>>,

    /// Subscriber to the publishers it follows
    publishers: RwLock<HashMap<RefId, BTreeSet<RefId>>>,

    sender: broadcast::Sender<Notification>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            subscribers: RwLock::new(HashMap::new()),
            publishers: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// Receive notifications published from now on
    pub fn receiver(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Add the pair. Returns false when it already existed.
    pub async fn subscribe(&self, subscriber: RefId, publisher: RefId) -> bool {
        let added = self
            .subscribers
            .write()
            .await
            .entry(publisher)
            .or_default()
            .insert(subscriber);

        if added {
            self.publishers
                .write()
                .await
                .entry(subscriber)
                .or_default()
                .insert(publisher);
            debug!(subscriber, publisher, "Subscription added");
        }
        added
    }

    /// Remove exactly this pair. Returns false when it was not present.
    pub async fn unsubscribe(&self, subscriber: RefId, publisher: RefId) -> bool {
        let removed = remove_pair(&mut *self.subscribers.write().await, publisher, subscriber);
        if removed {
            remove_pair(&mut *self.publishers.write().await, subscriber, publisher);
            debug!(subscriber, publisher, "Subscription removed");
        }
        removed
    }

    pub async fn subscribers_of(&self, publisher: RefId) -> Vec<RefId> {
        self.subscribers
            .read()
            .await
            .get(&publisher)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn publishers_of(&self, subscriber: RefId) -> Vec<RefId> {
        self.publishers
            .read()
            .await
            .get(&subscriber)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every pair the device takes part in, on either side
    pub async fn remove_device(&self, ref_id: RefId) {
        let followed = self.publishers.write().await.remove(&ref_id);
        let followers = self.subscribers.write().await.remove(&ref_id);

        {
            let mut subscribers = self.subscribers.write().await;
            for publisher in followed.iter().flatten() {
                remove_pair(&mut subscribers, *publisher, ref_id);
            }
        }
        {
            let mut publishers = self.publishers.write().await;
            for subscriber in followers.iter().flatten() {
                remove_pair(&mut publishers, *subscriber, ref_id);
            }
        }

        info!(ref_id, "Removed device from subscriptions");
    }

    /// Fan an event out to the publisher's subscribers.
    /// Returns the number of notifications sent.
    pub async fn publish(&self, event: ValueChangeEvent) -> usize {
        let subscribers = self.subscribers_of(event.ref_id).await;
        for subscriber in &subscribers {
            // No receivers is not an error
            let _ = self.sender.send(Notification {
                subscriber: *subscriber,
                event: event.clone(),
            });
        }
        if !subscribers.is_empty() {
            debug!(
                ref_id = event.ref_id,
                value = event.value,
                count = subscribers.len(),
                "Published value change"
            );
        }
        subscribers.len()
    }
}

fn remove_pair(map: &mut HashMap<RefId, BTreeSet<RefId>>, key: RefId, member: RefId) -> bool {
    let Some(set) = map.get_mut(&key) else {
        return false;
    };
    let removed = set.remove(&member);
    if set.is_empty() {
        map.remove(&key);
    }
    removed
}
