use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uniride_core::identity::{Party, Role};
use uniride_core::repository::{
    status, ChatRepository, GatewayResult, StatsRepository, StoredMessage, TripRecord,
    TripRepository,
};
use uniride_core::stats::Statistics;
use uniride_core::TripId;

#[derive(Default)]
struct Tables {
    users: Vec<(Party, Role)>,
    trips: Vec<TripRecord>,
    messages: Vec<(TripId, StoredMessage)>,
    summary: Option<Statistics>,
    next_id: TripId,
}

impl Tables {
    fn name_of(&self, email: &str) -> Option<String> {
        self.users
            .iter()
            .find(|(p, _)| p.email.eq_ignore_ascii_case(email))
            .map(|(p, _)| p.name.clone())
    }
}

/// In-process gateway backing tests and local runs.
/// `set_failing(true)` makes every call fail like a lost connection.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub async fn add_user(&self, name: &str, email: &str, role: Role) {
        self.tables
            .lock()
            .await
            .users
            .push((Party::new(name, email), role));
    }

    /// Last summary row written by the aggregator.
    pub async fn summary(&self) -> Option<Statistics> {
        self.tables.lock().await.summary.clone()
    }

    fn check(&self) -> GatewayResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }
        Ok(())
    }
}

#[async_trait]
impl TripRepository for MemoryStore {
    async fn insert_trip(
        &self,
        passenger_email: &str,
        origin: &str,
        destination: &str,
        payment_method: &str,
    ) -> GatewayResult<TripId> {
        self.check()?;
        let mut t = self.tables.lock().await;
        t.next_id += 1;
        let id = t.next_id;
        let passenger_name = t.name_of(passenger_email);
        t.trips.push(TripRecord {
            id,
            passenger_email: passenger_email.to_string(),
            passenger_name,
            driver_email: None,
            driver_name: None,
            origin: origin.to_string(),
            destination: destination.to_string(),
            payment_method: payment_method.to_string(),
            status: status::PENDING.to_string(),
            cost: None,
            requested_at: Some(Utc::now()),
            accepted_at: None,
            finished_at: None,
            passenger_rating: None,
            driver_rating: None,
        });
        Ok(id)
    }

    async fn mark_accepted(&self, trip_id: TripId, driver_email: &str) -> GatewayResult<u64> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let driver_name = t.name_of(driver_email);
        match t.trips.iter_mut().find(|r| r.id == trip_id) {
            Some(row) => {
                row.driver_email = Some(driver_email.to_string());
                row.driver_name = driver_name;
                row.status = status::ACCEPTED.to_string();
                row.accepted_at = Some(Utc::now());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn mark_completed(
        &self,
        trip_id: TripId,
        driver_email: &str,
        cost: f64,
    ) -> GatewayResult<u64> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let row = t.trips.iter_mut().find(|r| {
            r.id == trip_id
                && r.driver_email
                    .as_deref()
                    .is_some_and(|d| d.eq_ignore_ascii_case(driver_email))
        });
        match row {
            Some(row) => {
                row.status = status::FINISHED.to_string();
                row.finished_at = Some(Utc::now());
                row.cost = Some(cost);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_trip(&self, trip_id: TripId) -> GatewayResult<Option<TripRecord>> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.trips.iter().find(|r| r.id == trip_id).cloned())
    }

    async fn recent_trips(
        &self,
        email: &str,
        role: Role,
        limit: i64,
    ) -> GatewayResult<Vec<TripRecord>> {
        self.check()?;
        let t = self.tables.lock().await;
        let mut rows: Vec<TripRecord> = t
            .trips
            .iter()
            .filter(|r| match role {
                Role::Driver => r
                    .driver_email
                    .as_deref()
                    .is_some_and(|d| d.eq_ignore_ascii_case(email)),
                _ => r.passenger_email.eq_ignore_ascii_case(email),
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.requested_at.cmp(&a.requested_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn rate_trip(
        &self,
        trip_id: TripId,
        rated_by: Role,
        rating: i32,
        _comment: Option<&str>,
    ) -> GatewayResult<u64> {
        self.check()?;
        let mut t = self.tables.lock().await;
        match t.trips.iter_mut().find(|r| r.id == trip_id) {
            Some(row) => {
                match rated_by {
                    Role::Driver => row.passenger_rating = Some(rating),
                    _ => row.driver_rating = Some(rating),
                }
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn average_rating(&self, email: &str, as_role: Role) -> GatewayResult<Option<f64>> {
        self.check()?;
        let t = self.tables.lock().await;
        let ratings: Vec<i32> = t
            .trips
            .iter()
            .filter_map(|r| match as_role {
                Role::Driver => r
                    .driver_email
                    .as_deref()
                    .filter(|d| d.eq_ignore_ascii_case(email))
                    .and(r.driver_rating),
                _ => Some(&r.passenger_email)
                    .filter(|p| p.eq_ignore_ascii_case(email))
                    .and(r.passenger_rating),
            })
            .collect();

        if ratings.is_empty() {
            return Ok(None);
        }
        let sum: i32 = ratings.iter().sum();
        Ok(Some(sum as f64 / ratings.len() as f64))
    }
}

#[async_trait]
impl ChatRepository for MemoryStore {
    async fn save_message(
        &self,
        trip_id: TripId,
        sender: &str,
        body: &str,
        kind: &str,
    ) -> GatewayResult<()> {
        self.check()?;
        self.tables.lock().await.messages.push((
            trip_id,
            StoredMessage {
                sender: sender.to_string(),
                body: body.to_string(),
                kind: kind.to_string(),
                sent_at: Utc::now(),
            },
        ));
        Ok(())
    }

    async fn load_messages(&self, trip_id: TripId) -> GatewayResult<Vec<StoredMessage>> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.messages
            .iter()
            .filter(|(id, _)| *id == trip_id)
            .map(|(_, m)| m.clone())
            .collect())
    }
}

#[async_trait]
impl StatsRepository for MemoryStore {
    async fn count_users(&self) -> GatewayResult<i64> {
        self.check()?;
        Ok(self.tables.lock().await.users.len() as i64)
    }

    async fn count_completed_trips(&self) -> GatewayResult<i64> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.trips.iter().filter(|r| r.status == status::FINISHED).count() as i64)
    }

    async fn total_earnings(&self) -> GatewayResult<f64> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.trips
            .iter()
            .filter(|r| r.status == status::FINISHED)
            .filter_map(|r| r.cost)
            .sum())
    }

    async fn count_active_users(&self, window_minutes: i64) -> GatewayResult<i64> {
        self.check()?;
        let since = Utc::now() - Duration::minutes(window_minutes);
        let t = self.tables.lock().await;
        let mut seen = HashSet::new();
        for r in &t.trips {
            if r.requested_at.is_some_and(|at| at >= since) {
                seen.insert(r.passenger_email.to_lowercase());
            }
            if let (Some(driver), Some(at)) = (&r.driver_email, r.accepted_at) {
                if at >= since {
                    seen.insert(driver.to_lowercase());
                }
            }
        }
        Ok(seen.len() as i64)
    }

    async fn driver_completed_trips(&self, email: &str) -> GatewayResult<i64> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.trips
            .iter()
            .filter(|r| r.status == status::FINISHED)
            .filter(|r| r.driver_email.as_deref().is_some_and(|d| d.eq_ignore_ascii_case(email)))
            .count() as i64)
    }

    async fn driver_earnings(&self, email: &str) -> GatewayResult<f64> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.trips
            .iter()
            .filter(|r| r.status == status::FINISHED)
            .filter(|r| r.driver_email.as_deref().is_some_and(|d| d.eq_ignore_ascii_case(email)))
            .filter_map(|r| r.cost)
            .sum())
    }

    async fn write_summary(&self, stats: &Statistics) -> GatewayResult<()> {
        self.check()?;
        self.tables.lock().await.summary = Some(stats.clone());
        Ok(())
    }
}
