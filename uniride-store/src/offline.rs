use async_trait::async_trait;
use uniride_core::identity::Role;
use uniride_core::repository::{
    ChatRepository, GatewayResult, StatsRepository, StoredMessage, TripRecord, TripRepository,
};
use uniride_core::stats::Statistics;
use uniride_core::TripId;

/// Gateway used when the database could not be reached at startup.
/// Every call fails, so the core runs purely on its in-memory state.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGateway;

fn unavailable<T>() -> GatewayResult<T> {
    Err("database unavailable".into())
}

#[async_trait]
impl TripRepository for OfflineGateway {
    async fn insert_trip(&self, _: &str, _: &str, _: &str, _: &str) -> GatewayResult<TripId> {
        unavailable()
    }

    async fn mark_accepted(&self, _: TripId, _: &str) -> GatewayResult<u64> {
        unavailable()
    }

    async fn mark_completed(&self, _: TripId, _: &str, _: f64) -> GatewayResult<u64> {
        unavailable()
    }

    async fn find_trip(&self, _: TripId) -> GatewayResult<Option<TripRecord>> {
        unavailable()
    }

    async fn recent_trips(&self, _: &str, _: Role, _: i64) -> GatewayResult<Vec<TripRecord>> {
        unavailable()
    }

    async fn rate_trip(&self, _: TripId, _: Role, _: i32, _: Option<&str>) -> GatewayResult<u64> {
        unavailable()
    }

    async fn average_rating(&self, _: &str, _: Role) -> GatewayResult<Option<f64>> {
        unavailable()
    }
}

#[async_trait]
impl ChatRepository for OfflineGateway {
    async fn save_message(&self, _: TripId, _: &str, _: &str, _: &str) -> GatewayResult<()> {
        unavailable()
    }

    async fn load_messages(&self, _: TripId) -> GatewayResult<Vec<StoredMessage>> {
        unavailable()
    }
}

#[async_trait]
impl StatsRepository for OfflineGateway {
    async fn count_users(&self) -> GatewayResult<i64> {
        unavailable()
    }

    async fn count_completed_trips(&self) -> GatewayResult<i64> {
        unavailable()
    }

    async fn total_earnings(&self) -> GatewayResult<f64> {
        unavailable()
    }

    async fn count_active_users(&self, _: i64) -> GatewayResult<i64> {
        unavailable()
    }

    async fn driver_completed_trips(&self, _: &str) -> GatewayResult<i64> {
        unavailable()
    }

    async fn driver_earnings(&self, _: &str) -> GatewayResult<f64> {
        unavailable()
    }

    async fn write_summary(&self, _: &Statistics) -> GatewayResult<()> {
        unavailable()
    }
}
