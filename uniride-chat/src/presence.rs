//! Typing presence with cooperative expiry.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uniride_core::TripId;

/// Last typing signal per (trip, sender).
pub struct TypingTracker {
    entries: RwLock<HashMap<(TripId, String), DateTime<Utc>>>,
    ttl: Duration,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record activity now; the returned stamp identifies this signal.
    pub async fn touch(&self, trip_id: TripId, sender: &str) -> DateTime<Utc> {
        let now = Utc::now();
        self.touch_at(trip_id, sender, now).await;
        now
    }

    pub async fn touch_at(&self, trip_id: TripId, sender: &str, at: DateTime<Utc>) {
        self.entries
            .write()
            .await
            .insert((trip_id, sender.to_string()), at);
    }

    pub async fn stop(&self, trip_id: TripId, sender: &str) {
        self.entries
            .write()
            .await
            .remove(&(trip_id, sender.to_string()));
    }

    /// Remove the entry only if no newer signal replaced `stamp`.
    pub async fn expire_if_unchanged(&self, trip_id: TripId, sender: &str, stamp: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write().await;
        let key = (trip_id, sender.to_string());
        if entries.get(&key) == Some(&stamp) {
            entries.remove(&key);
            true
        } else {
            false
        }
    }

    /// Senders of a trip whose last signal is younger than the ttl.
    pub async fn active(&self, trip_id: TripId) -> Vec<String> {
        let now = Utc::now();
        let mut senders: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|((trip, _), at)| *trip == trip_id && now - **at < self.ttl)
            .map(|((_, sender), _)| sender.clone())
            .collect();
        senders.sort();
        senders
    }

    pub async fn clear_trip(&self, trip_id: TripId) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(trip, _), _| *trip != trip_id);
        before - entries.len()
    }

    /// Every held key rendered as `trip_sender`, stale ones included.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .map(|(trip, sender)| format!("{}_{}", trip, sender))
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stale_signal_is_not_typing() {
        let tracker = TypingTracker::new(Duration::seconds(3));
        tracker.touch(7, "Ana").await;
        tracker.touch_at(7, "Luis", Utc::now() - Duration::seconds(3)).await;
        tracker.touch(8, "Marta").await;

        assert_eq!(tracker.active(7).await, vec!["Ana".to_string()]);
        // The stale entry is still held until cleared.
        assert_eq!(tracker.keys().await.len(), 3);
    }

    #[tokio::test]
    async fn test_expire_only_when_not_superseded() {
        let tracker = TypingTracker::new(Duration::seconds(3));
        let first = tracker.touch(1, "Ana").await;
        let second = first + Duration::milliseconds(500);
        tracker.touch_at(1, "Ana", second).await;

        assert!(!tracker.expire_if_unchanged(1, "Ana", first).await);
        assert!(tracker.expire_if_unchanged(1, "Ana", second).await);
        assert!(tracker.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_trip() {
        let tracker = TypingTracker::new(Duration::seconds(3));
        tracker.touch(1, "Ana").await;
        tracker.touch(1, "Luis").await;
        tracker.touch(2, "Ana").await;

        assert_eq!(tracker.clear_trip(1).await, 2);
        assert_eq!(tracker.keys().await, vec!["2_Ana".to_string()]);
    }
}
