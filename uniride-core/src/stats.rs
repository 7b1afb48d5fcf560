use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::identity::Role;
use crate::persistence::best_effort;
use crate::repository::{StatsRepository, TripRepository};

/// Derived counters; never authoritative on their own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_users: i64,
    pub active_trips: i64,
    pub completed_trips: i64,
    pub active_users: i64,
    pub total_earnings: f64,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Per-driver summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSummary {
    pub completed_trips: i64,
    pub total_earnings: String,
    pub avg_rating: String,
    pub active_trips: usize,
}

/// Periodically recomputes [`Statistics`] from persistent counts plus the
/// live number of active trips. Every failed read keeps the cached value.
pub struct StatsAggregator {
    cache: RwLock<Statistics>,
    stats: Arc<dyn StatsRepository>,
    trips: Arc<dyn TripRepository>,
    active_user_window_minutes: i64,
}

impl StatsAggregator {
    pub fn new(
        stats: Arc<dyn StatsRepository>,
        trips: Arc<dyn TripRepository>,
        active_user_window_minutes: i64,
    ) -> Self {
        Self {
            cache: RwLock::new(Statistics::default()),
            stats,
            trips,
            active_user_window_minutes,
        }
    }

    pub async fn snapshot(&self) -> Statistics {
        self.cache.read().await.clone()
    }

    /// Recompute the aggregate, write it back to the summary row and cache it.
    pub async fn refresh(&self, active_trips: usize) -> Statistics {
        let previous = self.snapshot().await;

        let next = Statistics {
            total_users: best_effort("stats.count_users", self.stats.count_users())
                .await
                .unwrap_or(previous.total_users),
            active_trips: active_trips as i64,
            completed_trips: best_effort("stats.count_completed", self.stats.count_completed_trips())
                .await
                .unwrap_or(previous.completed_trips),
            active_users: best_effort(
                "stats.count_active_users",
                self.stats.count_active_users(self.active_user_window_minutes),
            )
            .await
            .unwrap_or(previous.active_users),
            total_earnings: best_effort("stats.total_earnings", self.stats.total_earnings())
                .await
                .unwrap_or(previous.total_earnings),
            refreshed_at: Some(Utc::now()),
        };

        let _ = best_effort("stats.write_summary", self.stats.write_summary(&next)).await;
        *self.cache.write().await = next.clone();

        info!(
            "Statistics refreshed: users={} active_trips={} completed={} active_users={}",
            next.total_users, next.active_trips, next.completed_trips, next.active_users
        );
        next
    }

    /// Summary for one driver; each persisted figure falls back to zero.
    pub async fn driver_summary(&self, email: &str, active_trips: usize) -> DriverSummary {
        let completed_trips = best_effort(
            "stats.driver_completed",
            self.stats.driver_completed_trips(email),
        )
        .await
        .unwrap_or(0);

        let earnings = best_effort("stats.driver_earnings", self.stats.driver_earnings(email))
            .await
            .unwrap_or(0.0);

        let rating = best_effort(
            "stats.driver_rating",
            self.trips.average_rating(email, Role::Driver),
        )
        .await
        .ok()
        .flatten()
        .unwrap_or(0.0);

        DriverSummary {
            completed_trips,
            total_earnings: format!("{:.2}", earnings),
            avg_rating: format!("{:.2}", rating),
            active_trips,
        }
    }
}
