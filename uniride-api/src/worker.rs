use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;
use uniride_core::stats::StatsAggregator;
use uniride_trip::TripRegistry;

/// Recompute the statistics row on a fixed period. The first tick fires
/// immediately so the overview is populated at startup.
pub async fn start_stats_worker(
    trips: Arc<TripRegistry>,
    stats: Arc<StatsAggregator>,
    period: Duration,
) {
    info!("Statistics worker started, refreshing every {:?}", period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let active = trips.active_count().await;
        stats.refresh(active).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uniride_chat::{ChatChannel, ChatPolicy};
    use uniride_core::identity::{Party, Role};
    use uniride_store::MemoryStore;
    use uniride_trip::FixedFare;

    #[tokio::test]
    async fn test_worker_refreshes_on_first_tick() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("Ana", "ana@espoch.edu.ec", Role::Passenger).await;

        let chat = Arc::new(ChatChannel::new(store.clone(), ChatPolicy::default()));
        let trips = Arc::new(TripRegistry::new(store.clone(), chat, Box::new(FixedFare(3.0))));
        let offer = trips
            .create(Party::new("Ana", "ana@espoch.edu.ec"), "A", "B", None)
            .await
            .unwrap();
        trips
            .accept(offer.id, Party::new("Luis", "luis@espoch.edu.ec"))
            .await
            .unwrap();

        let stats = Arc::new(StatsAggregator::new(store.clone(), store.clone(), 15));
        let handle = tokio::spawn(start_stats_worker(
            trips.clone(),
            stats.clone(),
            Duration::from_secs(3600),
        ));

        for _ in 0..50 {
            if stats.snapshot().await.refreshed_at.is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        handle.abort();

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.active_trips, 1);
        assert_eq!(snapshot.total_users, 1);
    }
}
