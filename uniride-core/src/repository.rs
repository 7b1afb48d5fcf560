use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Role;
use crate::stats::Statistics;
use crate::TripId;

/// Result type of every Persistence Gateway call. The core never assumes
/// success; see [`crate::persistence::best_effort`].
pub type GatewayResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Persisted trip status labels.
pub mod status {
    pub const PENDING: &str = "PENDING";
    pub const ACCEPTED: &str = "ACCEPTED";
    pub const FINISHED: &str = "FINISHED";
}

/// A trip row as persisted, joined with participant names where known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRecord {
    pub id: TripId,
    pub passenger_email: String,
    pub passenger_name: Option<String>,
    pub driver_email: Option<String>,
    pub driver_name: Option<String>,
    pub origin: String,
    pub destination: String,
    pub payment_method: String,
    pub status: String,
    pub cost: Option<f64>,
    pub requested_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub passenger_rating: Option<i32>,
    pub driver_rating: Option<i32>,
}

/// A chat message as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub sender: String,
    pub body: String,
    pub kind: String,
    pub sent_at: DateTime<Utc>,
}

/// Repository trait for trip rows
#[async_trait]
pub trait TripRepository: Send + Sync {
    /// Insert a pending trip and return its durable id.
    async fn insert_trip(
        &self,
        passenger_email: &str,
        origin: &str,
        destination: &str,
        payment_method: &str,
    ) -> GatewayResult<TripId>;

    async fn mark_accepted(&self, trip_id: TripId, driver_email: &str) -> GatewayResult<u64>;

    /// Filtered by trip id AND driver email; returns affected rows.
    async fn mark_completed(
        &self,
        trip_id: TripId,
        driver_email: &str,
        cost: f64,
    ) -> GatewayResult<u64>;

    async fn find_trip(&self, trip_id: TripId) -> GatewayResult<Option<TripRecord>>;

    /// Most recent trips of a participant, newest first.
    async fn recent_trips(
        &self,
        email: &str,
        role: Role,
        limit: i64,
    ) -> GatewayResult<Vec<TripRecord>>;

    /// Store the rating `rated_by` gives to the counterpart of the trip.
    async fn rate_trip(
        &self,
        trip_id: TripId,
        rated_by: Role,
        rating: i32,
        comment: Option<&str>,
    ) -> GatewayResult<u64>;

    /// Average rating received by `email` while acting as `as_role`.
    async fn average_rating(&self, email: &str, as_role: Role) -> GatewayResult<Option<f64>>;
}

/// Repository trait for chat history
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn save_message(
        &self,
        trip_id: TripId,
        sender: &str,
        body: &str,
        kind: &str,
    ) -> GatewayResult<()>;

    /// Messages of a trip ordered by send time.
    async fn load_messages(&self, trip_id: TripId) -> GatewayResult<Vec<StoredMessage>>;
}

/// Repository trait for aggregate counts and the summary row
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn count_users(&self) -> GatewayResult<i64>;

    async fn count_completed_trips(&self) -> GatewayResult<i64>;

    async fn total_earnings(&self) -> GatewayResult<f64>;

    /// Distinct participants that requested or accepted a trip recently.
    async fn count_active_users(&self, window_minutes: i64) -> GatewayResult<i64>;

    async fn driver_completed_trips(&self, email: &str) -> GatewayResult<i64>;

    async fn driver_earnings(&self, email: &str) -> GatewayResult<f64>;

    async fn write_summary(&self, stats: &Statistics) -> GatewayResult<()>;
}
