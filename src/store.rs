//! Observable keyed stores
//!
//! Keyed maps with per-key change notification: a write to key K wakes
//! only the subscribers that hold a receiver for K. The pool maintains
//! two of these for its presentation-layer dependents: gid → signature
//! and signature → latest head. Neither store evicts; stale entries are
//! tolerated because a future `get()` fully re-resolves and recreates
//! whatever state it needs.

use dashmap::DashMap;
use std::hash::Hash;
use tokio::sync::watch;

/// Keyed map with per-key change notification
pub struct WatchStore<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, watch::Sender<Option<V>>>,
}

impl<K, V> WatchStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Write a value, notifying subscribers of this key only.
    ///
    /// Creates the key on first write; subscribers that arrived before
    /// the key existed observe the change too.
    pub fn publish(&self, key: K, value: V) {
        let tx = self
            .entries
            .entry(key)
            .or_insert_with(|| watch::channel(None).0);
        tx.send_replace(Some(value));
    }

    /// Read the current value for a key
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key).and_then(|tx| tx.borrow().clone())
    }

    /// Subscribe to changes of one key.
    ///
    /// The receiver observes `None` until the first write. Subscribing
    /// creates the key slot if it does not exist yet.
    pub fn subscribe(&self, key: K) -> watch::Receiver<Option<V>> {
        self.entries
            .entry(key)
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Number of keys ever written or subscribed to
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for WatchStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_then_get() {
        let store: WatchStore<String, String> = WatchStore::new();
        assert!(store.get("a").is_none());

        store.publish("a".to_string(), "1".to_string());
        assert_eq!(store.get("a"), Some("1".to_string()));

        store.publish("a".to_string(), "2".to_string());
        assert_eq!(store.get("a"), Some("2".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_sees_writes_to_its_key() {
        let store: WatchStore<String, u64> = WatchStore::new();
        let mut rx = store.subscribe("a".to_string());
        assert_eq!(*rx.borrow_and_update(), None);

        store.publish("a".to_string(), 7);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(7));
    }

    #[tokio::test]
    async fn test_writes_to_other_keys_do_not_notify() {
        let store: WatchStore<String, u64> = WatchStore::new();
        let mut rx_a = store.subscribe("a".to_string());
        rx_a.borrow_and_update();

        store.publish("b".to_string(), 1);
        store.publish("c".to_string(), 2);

        // No change recorded for "a"
        assert!(!rx_a.has_changed().unwrap());

        store.publish("a".to_string(), 3);
        assert!(rx_a.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_subscribe_before_first_write() {
        let store: WatchStore<String, String> = WatchStore::new();
        let mut rx = store.subscribe("late".to_string());
        rx.borrow_and_update();

        store.publish("late".to_string(), "arrived".to_string());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some("arrived".to_string()));
    }
}
