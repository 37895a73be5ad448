//! Keyed fan-out from one producer to per-key bounded channels.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;

/// Capacity of every channel between actors.
pub const CHANNEL_CAPACITY: usize = 1024;

pub struct DispatchMap<K, T> {
    senders: RwLock<HashMap<K, mpsc::Sender<T>>>,
}

impl<K, T> Default for DispatchMap<K, T> {
    fn default() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Display + Copy, T> DispatchMap<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the channel for `key`, replacing any earlier registration.
    pub fn register(&self, key: K) -> mpsc::Receiver<T> {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let previous = self
            .senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, sender);

        if previous.is_some() {
            tracing::debug!(%key, "replaced existing receiver");
        }
        receiver
    }

    /// Delivers `item` to the receiver for `key`.
    ///
    /// Returns `false` when nobody registered `key`, or when its receiver has
    /// since been dropped. A dropped receiver is unregistered.
    pub async fn dispatch(&self, key: K, item: T) -> bool {
        // Clone out so the lock is not held across the await.
        let sender = self
            .senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();

        let Some(sender) = sender else {
            tracing::debug!(%key, "no receiver registered");
            return false;
        };

        if sender.send(item).await.is_ok() {
            return true;
        }

        let mut senders = self.senders.write().unwrap_or_else(PoisonError::into_inner);
        // Keep a registration made while the send was pending.
        if senders.get(&key).is_some_and(|s| s.same_channel(&sender)) {
            senders.remove(&key);
        }
        tracing::debug!(%key, "receiver dropped, unregistering");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_reaches_registered_receiver() {
        let map: DispatchMap<u16, &str> = DispatchMap::new();
        let mut rx = map.register(7);

        assert!(map.dispatch(7, "hello").await);
        assert_eq!(rx.recv().await, Some("hello"));
    }

    #[tokio::test]
    async fn unregistered_key_is_not_an_error() {
        let map: DispatchMap<u16, &str> = DispatchMap::new();
        assert!(!map.dispatch(7, "hello").await);
    }

    #[tokio::test]
    async fn dropped_receiver_is_unregistered() {
        let map: DispatchMap<u16, &str> = DispatchMap::new();
        drop(map.register(7));

        assert!(!map.dispatch(7, "hello").await);
        assert!(map.senders.read().unwrap().is_empty());

        let mut rx = map.register(7);
        assert!(map.dispatch(7, "again").await);
        assert_eq!(rx.recv().await, Some("again"));
    }

    #[tokio::test]
    async fn re_registering_replaces_the_receiver() {
        let map: DispatchMap<u16, u32> = DispatchMap::new();
        let mut first = map.register(1);
        let mut second = map.register(1);

        map.dispatch(1, 42).await;
        assert_eq!(second.recv().await, Some(42));
        assert_eq!(first.recv().await, None);
    }
}
