//! Bookkeeping for live push subscriptions.
//!
//! Each subscription is a forwarding task that drains a store
//! [`Subscription`](courier_store::Subscription) into the core. Aborting the
//! task drops the store-side receiver, which ends the stream.

use std::collections::HashMap;
use std::fmt;

use tokio::task::JoinHandle;
use tracing::debug;

use courier_shared::{ChatId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    ChatMessages(ChatId),
    UserChats(UserId),
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKey::ChatMessages(id) => write!(f, "messages:{id}"),
            SubscriptionKey::UserChats(id) => write!(f, "user-chats:{id}"),
        }
    }
}

/// At most one live forwarder per key.
#[derive(Default)]
pub struct SubscriptionManager {
    active: HashMap<SubscriptionKey, JoinHandle<()>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a forwarder, disposing whatever was held under the same key.
    pub fn insert(&mut self, key: SubscriptionKey, handle: JoinHandle<()>) {
        if let Some(old) = self.active.insert(key.clone(), handle) {
            old.abort();
            debug!(key = %key, "Replaced existing subscription");
        }
    }

    /// Dispose one subscription. Returns `false` if nothing was held.
    pub fn remove(&mut self, key: &SubscriptionKey) -> bool {
        match self.active.remove(key) {
            Some(handle) => {
                handle.abort();
                debug!(key = %key, "Subscription disposed");
                true
            }
            None => false,
        }
    }

    /// Dispose everything; returns how many were live.
    pub fn clear(&mut self) -> usize {
        let count = self.active.len();
        for (_, handle) in self.active.drain() {
            handle.abort();
        }
        count
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.active.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SubscriptionKey> {
        self.active.keys()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.clear();
    }
}
