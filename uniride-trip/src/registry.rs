use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uniride_chat::{ChatChannel, MessageKind};
use uniride_core::identity::{Caller, Party, Role};
use uniride_core::location::{Coordinate, LocationFix, LocationStore};
use uniride_core::persistence::{best_effort, spawn_best_effort_after};
use uniride_core::repository::{status, GatewayResult, TripRecord, TripRepository};
use uniride_core::{CoreError, TripId, SYSTEM_SENDER};

use crate::fare::FarePolicy;
use crate::models::{ActiveTrip, DriverPosition, RatingOutcome, StatusView, TripOffer, TripStatus};

pub const DEFAULT_PAYMENT_METHOD: &str = "cash";
pub const HISTORY_LIMIT: i64 = 10;
pub const RESUMED_MESSAGE: &str = "Trip resumed. Continuing the service...";

/// Pending offers and active trips. A trip id lives in at most one of them.
#[derive(Default)]
struct TripBook {
    offers: Vec<TripOffer>,
    active: HashMap<TripId, ActiveTrip>,
}

impl TripBook {
    fn contains(&self, trip_id: TripId) -> bool {
        self.active.contains_key(&trip_id) || self.offers.iter().any(|o| o.id == trip_id)
    }

    /// Time based id for trips the database could not number.
    fn local_id(&self) -> TripId {
        let mut id = Utc::now().timestamp_millis();
        while self.contains(id) {
            id += 1;
        }
        id
    }
}

/// Manages the trip lifecycle: request, acceptance, completion and resume.
///
/// Every mutation completes on the in-memory book before any storage call;
/// storage failures are logged and never fail the operation.
pub struct TripRegistry {
    book: RwLock<TripBook>,
    locations: LocationStore,
    trips: Arc<dyn TripRepository>,
    chat: Arc<ChatChannel>,
    fare: Box<dyn FarePolicy>,
    /// Last background write issued per trip; the next one waits on it.
    writes: Mutex<HashMap<TripId, JoinHandle<()>>>,
}

impl TripRegistry {
    pub fn new(trips: Arc<dyn TripRepository>, chat: Arc<ChatChannel>, fare: Box<dyn FarePolicy>) -> Self {
        Self {
            book: RwLock::new(TripBook::default()),
            locations: LocationStore::new(),
            trips,
            chat,
            fare,
            writes: Mutex::new(HashMap::new()),
        }
    }

    /// Mirror a transition to storage without waiting on it, after every
    /// earlier write of the same trip.
    async fn write_in_order<F>(&self, trip_id: TripId, operation: &'static str, call: F)
    where
        F: Future<Output = GatewayResult<()>> + Send + 'static,
    {
        let mut writes = self.writes.lock().await;
        writes.retain(|_, handle| !handle.is_finished());
        let previous = writes.remove(&trip_id);
        if let Some(handle) = spawn_best_effort_after(previous, operation, call) {
            writes.insert(trip_id, handle);
        }
    }

    /// Transition: none → PENDING
    pub async fn create(
        &self,
        passenger: Party,
        origin: &str,
        destination: &str,
        payment_method: Option<&str>,
    ) -> Result<TripOffer, TripError> {
        let (origin, destination) = (origin.trim(), destination.trim());
        if passenger.name.trim().is_empty() {
            return Err(TripError::Incomplete("passenger name"));
        }
        if origin.is_empty() || destination.is_empty() {
            return Err(TripError::Incomplete("origin and destination"));
        }
        let payment = payment_method
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PAYMENT_METHOD);

        let durable_id = best_effort(
            "trips.insert",
            self.trips.insert_trip(&passenger.email, origin, destination, payment),
        )
        .await
        .ok();

        let offer = {
            let mut book = self.book.write().await;
            let id = match durable_id {
                Some(id) if !book.contains(id) => id,
                _ => book.local_id(),
            };
            let offer = TripOffer::new(id, passenger, origin, destination, payment);
            book.offers.push(offer.clone());
            offer
        };

        if durable_id != Some(offer.id) {
            warn!("Trip {} numbered locally; storage has no row for it", offer.id);
        }
        self.chat.open(offer.id).await;

        info!("Trip {} requested by {}", offer.id, offer.passenger.email);
        Ok(offer)
    }

    /// Transition: PENDING → ACCEPTED
    pub async fn accept(&self, trip_id: TripId, driver: Party) -> Result<ActiveTrip, TripError> {
        if driver.email.is_empty() {
            return Err(TripError::Incomplete("driver email"));
        }

        let trip = {
            let mut book = self.book.write().await;
            let index = book
                .offers
                .iter()
                .position(|o| o.id == trip_id)
                .ok_or(TripError::NotFound(trip_id))?;
            let offer = book.offers.remove(index);
            let trip = ActiveTrip::from_offer(offer, driver);
            book.active.insert(trip_id, trip.clone());
            trip
        };

        self.chat
            .system(
                trip_id,
                &format!("{} accepted your trip and is on the way.", trip.driver.name),
            )
            .await;

        let repo = self.trips.clone();
        let driver_email = trip.driver.email.clone();
        self.write_in_order(trip_id, "trips.mark_accepted", async move {
            repo.mark_accepted(trip_id, &driver_email).await.map(|rows| {
                if rows == 0 {
                    warn!("Acceptance of trip {} matched no stored row", trip_id);
                }
            })
        })
        .await;

        info!("Trip {} accepted by {}", trip_id, trip.driver.email);
        Ok(trip)
    }

    /// Transition: ACCEPTED → FINISHED
    ///
    /// The stored row is updated only when `driver_email` matches the row's
    /// driver; the in-memory trip finishes regardless.
    pub async fn complete(&self, trip_id: TripId, driver_email: &str) -> Result<ActiveTrip, TripError> {
        let trip = {
            let mut book = self.book.write().await;
            let trip = book
                .active
                .get_mut(&trip_id)
                .ok_or(TripError::NotFound(trip_id))?;

            if trip.status != TripStatus::Accepted {
                return Err(TripError::InvalidTransition {
                    from: trip.status.as_str().to_string(),
                    to: status::FINISHED.to_string(),
                });
            }

            let cost = self.fare.quote(trip);
            trip.status = TripStatus::Finished;
            trip.finished_at = Some(Utc::now());
            trip.cost = Some(cost);
            trip.clone()
        };

        let cost = trip.cost.unwrap_or_default();
        let closing = format!("Trip finished. Cost: ${:.2}. Thanks for riding with UniRide!", cost);
        if let Err(e) = self.chat.append(trip_id, SYSTEM_SENDER, &closing, MessageKind::System).await {
            warn!("Closing message for trip {} rejected: {}", trip_id, e);
        }

        let repo = self.trips.clone();
        let driver_email = driver_email.trim().to_string();
        self.write_in_order(trip_id, "trips.mark_completed", async move {
            repo.mark_completed(trip_id, &driver_email, cost).await.map(|rows| {
                if rows == 0 {
                    warn!(
                        "Completion of trip {} matched no stored row for driver {}",
                        trip_id, driver_email
                    );
                }
            })
        })
        .await;

        info!("Trip {} finished, cost {:.2}", trip_id, cost);
        Ok(trip)
    }

    /// Bring a stored ACCEPTED trip back into memory for one of its participants.
    pub async fn resume(&self, trip_id: TripId, caller: &Caller) -> Result<ActiveTrip, TripError> {
        let record = match best_effort("trips.find", self.trips.find_trip(trip_id)).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(TripError::NotFound(trip_id)),
            Err(e) => {
                // Without storage only a trip already held here can be resumed.
                let book = self.book.read().await;
                return match book.active.get(&trip_id) {
                    Some(trip) if trip.involves(&caller.email) => Ok(trip.clone()),
                    _ => Err(TripError::Degraded(e.to_string())),
                };
            }
        };

        if !owns_record(caller, &record) {
            return Err(TripError::Forbidden(format!(
                "trip {} does not belong to {}",
                trip_id, caller.email
            )));
        }
        if record.status != status::ACCEPTED {
            return Err(TripError::InvalidTransition {
                from: record.status.clone(),
                to: status::ACCEPTED.to_string(),
            });
        }

        let driver_fix = match record.driver_email.as_deref() {
            Some(email) => self.locations.driver(email).await,
            None => None,
        };

        let trip = {
            let mut book = self.book.write().await;
            if let Some(existing) = book.active.get(&trip_id) {
                existing.clone()
            } else {
                let mut trip = ActiveTrip::from_record(&record).ok_or_else(|| {
                    TripError::InvalidTransition {
                        from: "ACCEPTED without driver".to_string(),
                        to: status::ACCEPTED.to_string(),
                    }
                })?;
                trip.driver_location = driver_fix.map(|f| f.coordinate);
                book.offers.retain(|o| o.id != trip_id);
                book.active.insert(trip_id, trip.clone());
                info!("Trip {} resumed from storage by {}", trip_id, caller.email);
                trip
            }
        };

        self.chat.seed(trip_id, RESUMED_MESSAGE).await;
        Ok(trip)
    }

    pub async fn status(&self, trip_id: TripId) -> Result<StatusView, TripError> {
        let book = self.book.read().await;
        if let Some(trip) = book.active.get(&trip_id) {
            return Ok(StatusView {
                status: trip.status,
                driver: Some(trip.driver.name.clone()),
            });
        }
        if book.offers.iter().any(|o| o.id == trip_id) {
            return Ok(StatusView { status: TripStatus::Pending, driver: None });
        }
        Err(TripError::NotFound(trip_id))
    }

    pub async fn driver_location(&self, trip_id: TripId) -> Result<Coordinate, TripError> {
        self.book
            .read()
            .await
            .active
            .get(&trip_id)
            .and_then(|t| t.driver_location)
            .ok_or(TripError::Unavailable(trip_id))
    }

    pub async fn passenger_location(&self, trip_id: TripId) -> Result<Coordinate, TripError> {
        self.book
            .read()
            .await
            .active
            .get(&trip_id)
            .and_then(|t| t.passenger_location)
            .ok_or(TripError::Unavailable(trip_id))
    }

    /// Record a driver position and copy it onto every trip the driver services.
    pub async fn report_driver(&self, email: &str, coordinate: Coordinate) -> LocationFix {
        let fix = self.locations.record_driver(email, coordinate).await;
        let mut book = self.book.write().await;
        for trip in book.active.values_mut() {
            if trip.driver.email.eq_ignore_ascii_case(email.trim()) {
                trip.driver_location = Some(coordinate);
            }
        }
        fix
    }

    pub async fn report_passenger(
        &self,
        trip_id: TripId,
        email: Option<&str>,
        coordinate: Coordinate,
    ) -> Result<(), TripError> {
        {
            let mut book = self.book.write().await;
            let trip = book
                .active
                .get_mut(&trip_id)
                .ok_or(TripError::NotFound(trip_id))?;
            trip.passenger_location = Some(coordinate);
        }

        if let Some(email) = email.filter(|e| !e.trim().is_empty()) {
            self.locations.record_passenger(email, coordinate).await;
        }
        Ok(())
    }

    /// Known driver positions; a driver with an unfinished trip is unavailable.
    pub async fn drivers(&self) -> Vec<DriverPosition> {
        let fixes = self.locations.drivers().await;
        let book = self.book.read().await;

        fixes
            .into_iter()
            .map(|(email, fix)| {
                let mut name = email.clone();
                let mut available = true;
                for trip in book.active.values() {
                    if trip.driver.email == email {
                        name = trip.driver.name.clone();
                        available &= !trip.is_open();
                    }
                }
                DriverPosition {
                    email,
                    name,
                    lat: fix.coordinate.lat,
                    lon: fix.coordinate.lon,
                    available,
                    last_update: fix.reported_at,
                }
            })
            .collect()
    }

    /// Logout: drop every position reported by this identity.
    pub async fn forget(&self, email: &str) {
        self.locations.forget(email).await;
    }

    pub async fn offers(&self) -> Vec<TripOffer> {
        self.book.read().await.offers.clone()
    }

    pub async fn get(&self, trip_id: TripId) -> Option<ActiveTrip> {
        self.book.read().await.active.get(&trip_id).cloned()
    }

    /// Trips currently in ACCEPTED state.
    pub async fn active_count(&self) -> usize {
        self.book
            .read()
            .await
            .active
            .values()
            .filter(|t| t.status == TripStatus::Accepted)
            .count()
    }

    /// Active-map entries serviced by this driver, finished ones included.
    pub async fn driver_trip_count(&self, email: &str) -> usize {
        self.book
            .read()
            .await
            .active
            .values()
            .filter(|t| t.driver.email.eq_ignore_ascii_case(email.trim()))
            .count()
    }

    /// Most recent stored trips of the caller; empty when storage fails.
    pub async fn history(&self, caller: &Caller) -> Vec<TripRecord> {
        best_effort(
            "trips.recent",
            self.trips.recent_trips(&caller.email, caller.role, HISTORY_LIMIT),
        )
        .await
        .unwrap_or_default()
    }

    /// Rate the counterpart: drivers rate the passenger, everyone else the driver.
    pub async fn rate(
        &self,
        trip_id: TripId,
        rating: i32,
        rated_by: Role,
        comment: Option<&str>,
    ) -> Result<RatingOutcome, TripError> {
        if !(1..=5).contains(&rating) {
            return Err(TripError::InvalidRating(rating));
        }

        let record = best_effort("trips.find", self.trips.find_trip(trip_id))
            .await
            .map_err(|e| TripError::Degraded(e.to_string()))?
            .ok_or(TripError::NotFound(trip_id))?;

        let (rated_user, rated_as) = match rated_by {
            Role::Driver => (Some(record.passenger_email.clone()), Role::Passenger),
            _ => (record.driver_email.clone(), Role::Driver),
        };
        let rated_user = rated_user.ok_or_else(|| TripError::InvalidTransition {
            from: record.status.clone(),
            to: "RATED".to_string(),
        })?;

        best_effort(
            "trips.rate",
            self.trips.rate_trip(trip_id, rated_by, rating, comment),
        )
        .await
        .map_err(|e| TripError::Degraded(e.to_string()))?;

        let average = best_effort(
            "trips.average_rating",
            self.trips.average_rating(&rated_user, rated_as),
        )
        .await
        .ok()
        .flatten()
        .unwrap_or(0.0);

        Ok(RatingOutcome {
            rated_user,
            avg_rating: format!("{:.2}", average),
        })
    }
}

fn owns_record(caller: &Caller, record: &TripRecord) -> bool {
    let passenger = Some(record.passenger_email.as_str());
    let driver = record.driver_email.as_deref();
    match caller.role {
        Role::Driver => caller.owns(driver),
        Role::Passenger => caller.owns(passenger),
        Role::Admin => caller.owns(driver) || caller.owns(passenger),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TripError {
    #[error("Trip not found: {0}")]
    NotFound(TripId),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Location not available for trip {0}")]
    Unavailable(TripId),

    #[error("Missing {0}")]
    Incomplete(&'static str),

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i32),

    #[error("Storage unavailable: {0}")]
    Degraded(String),
}

impl From<TripError> for CoreError {
    fn from(e: TripError) -> Self {
        let message = e.to_string();
        match e {
            TripError::NotFound(_) => CoreError::NotFound(message),
            TripError::Forbidden(_) => CoreError::Forbidden(message),
            TripError::InvalidTransition { .. } => CoreError::InvalidState(message),
            TripError::Unavailable(_) => CoreError::Unavailable(message),
            TripError::Incomplete(_) | TripError::InvalidRating(_) => CoreError::Validation(message),
            TripError::Degraded(_) => CoreError::PersistenceDegraded(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fare::{FixedFare, RandomFare};
    use uniride_chat::ChatPolicy;
    use uniride_store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        chat: Arc<ChatChannel>,
        registry: TripRegistry,
    }

    fn fixture_with(store: Arc<MemoryStore>, fare: Box<dyn FarePolicy>) -> Fixture {
        let chat = Arc::new(ChatChannel::new(store.clone(), ChatPolicy::default()));
        let registry = TripRegistry::new(store.clone(), chat.clone(), fare);
        Fixture { store, chat, registry }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryStore::new()), Box::new(RandomFare::default()))
    }

    fn ana() -> Party {
        Party::new("Ana", "ana@espoch.edu.ec")
    }

    fn luis() -> Party {
        Party::new("Luis", "luis@espoch.edu.ec")
    }

    async fn wait_for_status(store: &MemoryStore, trip_id: TripId, expected: &str) -> bool {
        for _ in 0..50 {
            if let Ok(Some(row)) = store.find_trip(trip_id).await {
                if row.status == expected {
                    return true;
                }
            }
            tokio::task::yield_now().await;
        }
        false
    }

    #[tokio::test]
    async fn test_request_accept_complete_scenario() {
        let f = fixture();

        let offer = f.registry.create(ana(), "Block A", "Block B", None).await.unwrap();
        assert_eq!(offer.status, TripStatus::Pending);
        assert_eq!(offer.payment_method, DEFAULT_PAYMENT_METHOD);
        let offers = f.registry.offers().await;
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].id, offer.id);

        let trip = f.registry.accept(offer.id, luis()).await.unwrap();
        assert_eq!(trip.status, TripStatus::Accepted);
        assert!(f.registry.offers().await.is_empty());
        assert_eq!(f.registry.get(offer.id).await.map(|t| t.status), Some(TripStatus::Accepted));
        assert_eq!(trip.driver_location, Some(Coordinate::CAMPUS_PICKUP));
        assert_eq!(trip.passenger_location, Some(Coordinate::CAMPUS_PICKUP));

        let log = f.chat.messages(offer.id).await;
        assert!(log
            .iter()
            .any(|m| m.kind == MessageKind::System && m.body.contains("Luis")));

        let done = f.registry.complete(offer.id, "luis@espoch.edu.ec").await.unwrap();
        assert_eq!(done.status, TripStatus::Finished);
        let cost = done.cost.unwrap();
        assert!((2.0..=7.0).contains(&cost));
        assert!(done.finished_at.is_some());

        let last = f.chat.messages(offer.id).await.pop().unwrap();
        assert_eq!(last.kind, MessageKind::System);
        assert!(last.body.starts_with("Trip finished"));

        assert!(wait_for_status(&f.store, offer.id, status::FINISHED).await);
    }

    #[tokio::test]
    async fn test_accept_unknown_trip_leaves_state_untouched() {
        let f = fixture();
        let offer = f.registry.create(ana(), "Block A", "Block B", None).await.unwrap();

        let err = f.registry.accept(offer.id + 1000, luis()).await.unwrap_err();
        assert!(matches!(err, TripError::NotFound(_)));
        assert_eq!(f.registry.offers().await.len(), 1);
        assert_eq!(f.registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_trip_is_never_pending_and_active() {
        let f = fixture();
        let a = f.registry.create(ana(), "A", "B", None).await.unwrap();
        let b = f.registry.create(ana(), "C", "D", Some("card")).await.unwrap();
        f.registry.accept(a.id, luis()).await.unwrap();

        let pending: Vec<TripId> = f.registry.offers().await.iter().map(|o| o.id).collect();
        assert_eq!(pending, vec![b.id]);
        assert!(f.registry.get(a.id).await.is_some());
        assert!(f.registry.get(b.id).await.is_none());

        // A second acceptance of the same trip finds nothing to move.
        assert!(matches!(
            f.registry.accept(a.id, luis()).await,
            Err(TripError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let f = fixture();
        assert!(matches!(
            f.registry.create(Party::new("", "x@espoch.edu.ec"), "A", "B", None).await,
            Err(TripError::Incomplete(_))
        ));
        assert!(matches!(
            f.registry.create(ana(), "A", "  ", None).await,
            Err(TripError::Incomplete(_))
        ));
    }

    #[tokio::test]
    async fn test_create_without_storage_numbers_locally() {
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);
        let f = fixture_with(store, Box::new(RandomFare::default()));

        let first = f.registry.create(ana(), "A", "B", None).await.unwrap();
        let second = f.registry.create(ana(), "A", "B", None).await.unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.id > 1_000_000_000_000);

        // Acceptance and completion still succeed on memory alone.
        f.registry.accept(first.id, luis()).await.unwrap();
        let done = f.registry.complete(first.id, "luis@espoch.edu.ec").await.unwrap();
        assert_eq!(done.status, TripStatus::Finished);
    }

    #[tokio::test]
    async fn test_complete_requires_accepted_trip() {
        let f = fixture_with(Arc::new(MemoryStore::new()), Box::new(FixedFare(3.5)));
        let offer = f.registry.create(ana(), "A", "B", None).await.unwrap();

        assert!(matches!(
            f.registry.complete(offer.id, "luis@espoch.edu.ec").await,
            Err(TripError::NotFound(_))
        ));

        f.registry.accept(offer.id, luis()).await.unwrap();
        let done = f.registry.complete(offer.id, "luis@espoch.edu.ec").await.unwrap();
        assert_eq!(done.cost, Some(3.5));

        assert!(matches!(
            f.registry.complete(offer.id, "luis@espoch.edu.ec").await,
            Err(TripError::InvalidTransition { .. })
        ));
        assert_eq!(f.registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_complete_by_other_driver_still_finishes_in_memory() {
        let f = fixture();
        let offer = f.registry.create(ana(), "A", "B", None).await.unwrap();
        f.registry.accept(offer.id, luis()).await.unwrap();
        assert!(wait_for_status(&f.store, offer.id, status::ACCEPTED).await);

        let done = f.registry.complete(offer.id, "otro@espoch.edu.ec").await.unwrap();
        assert_eq!(done.status, TripStatus::Finished);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let row = f.store.find_trip(offer.id).await.unwrap().unwrap();
        assert_eq!(row.status, status::ACCEPTED);
    }

    /// Storage whose acceptance write is slow, as when waiting on a pool.
    struct SlowAcceptance(Arc<MemoryStore>);

    #[async_trait::async_trait]
    impl TripRepository for SlowAcceptance {
        async fn insert_trip(
            &self,
            passenger_email: &str,
            origin: &str,
            destination: &str,
            payment_method: &str,
        ) -> GatewayResult<TripId> {
            self.0
                .insert_trip(passenger_email, origin, destination, payment_method)
                .await
        }

        async fn mark_accepted(&self, trip_id: TripId, driver_email: &str) -> GatewayResult<u64> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.0.mark_accepted(trip_id, driver_email).await
        }

        async fn mark_completed(
            &self,
            trip_id: TripId,
            driver_email: &str,
            cost: f64,
        ) -> GatewayResult<u64> {
            self.0.mark_completed(trip_id, driver_email, cost).await
        }

        async fn find_trip(&self, trip_id: TripId) -> GatewayResult<Option<TripRecord>> {
            self.0.find_trip(trip_id).await
        }

        async fn recent_trips(
            &self,
            email: &str,
            role: Role,
            limit: i64,
        ) -> GatewayResult<Vec<TripRecord>> {
            self.0.recent_trips(email, role, limit).await
        }

        async fn rate_trip(
            &self,
            trip_id: TripId,
            rated_by: Role,
            rating: i32,
            comment: Option<&str>,
        ) -> GatewayResult<u64> {
            self.0.rate_trip(trip_id, rated_by, rating, comment).await
        }

        async fn average_rating(&self, email: &str, as_role: Role) -> GatewayResult<Option<f64>> {
            self.0.average_rating(email, as_role).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_completion_write_waits_for_slow_acceptance_write() {
        let store = Arc::new(MemoryStore::new());
        let chat = Arc::new(ChatChannel::new(store.clone(), ChatPolicy::default()));
        let registry = TripRegistry::new(
            Arc::new(SlowAcceptance(store.clone())),
            chat,
            Box::new(FixedFare(4.0)),
        );

        let offer = registry.create(ana(), "A", "B", None).await.unwrap();
        registry.accept(offer.id, luis()).await.unwrap();
        let done = registry.complete(offer.id, "luis@espoch.edu.ec").await.unwrap();
        assert_eq!(done.status, TripStatus::Finished);

        let mut row = None;
        for _ in 0..100 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            row = store.find_trip(offer.id).await.unwrap();
            if row.as_ref().is_some_and(|r| r.status == status::FINISHED) {
                break;
            }
        }
        let row = row.unwrap();
        assert_eq!(row.status, status::FINISHED);
        assert_eq!(row.cost, Some(4.0));

        // A restart that resumes from storage sees the trip as finished.
        let fresh = TripRegistry::new(
            store.clone(),
            Arc::new(ChatChannel::new(store.clone(), ChatPolicy::default())),
            Box::new(FixedFare(4.0)),
        );
        let caller = Caller::new("ana@espoch.edu.ec", Role::Passenger);
        assert!(matches!(
            fresh.resume(offer.id, &caller).await,
            Err(TripError::InvalidTransition { .. })
        ));
    }

    async fn stored_accepted_trip(store: &MemoryStore) -> TripId {
        store.add_user("Ana", "ana@espoch.edu.ec", Role::Passenger).await;
        store.add_user("Luis", "luis@espoch.edu.ec", Role::Driver).await;
        let id = store
            .insert_trip("ana@espoch.edu.ec", "Block A", "Block B", "cash")
            .await
            .unwrap();
        store.mark_accepted(id, "luis@espoch.edu.ec").await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_resume_rebuilds_trip_from_storage() {
        let f = fixture();
        let id = stored_accepted_trip(&f.store).await;
        f.registry
            .report_driver("luis@espoch.edu.ec", Coordinate::new(-1.67, -78.7))
            .await;

        let caller = Caller::new("Luis@espoch.edu.ec", Role::Driver);
        let trip = f.registry.resume(id, &caller).await.unwrap();
        assert_eq!(trip.status, TripStatus::Accepted);
        assert_eq!(trip.passenger, ana());
        assert_eq!(trip.driver, luis());
        assert_eq!(trip.driver_location, Some(Coordinate::new(-1.67, -78.7)));
        assert_eq!(trip.passenger_location, None);
        assert_eq!(f.registry.active_count().await, 1);

        let log = f.chat.messages(id).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].body, RESUMED_MESSAGE);

        // Resuming again keeps the in-memory trip and does not reseed.
        let passenger = Caller::new("ana@espoch.edu.ec", Role::Passenger);
        f.registry.resume(id, &passenger).await.unwrap();
        assert_eq!(f.chat.messages(id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_rejections() {
        let f = fixture();
        let id = stored_accepted_trip(&f.store).await;

        let stranger = Caller::new("marta@espoch.edu.ec", Role::Passenger);
        assert!(matches!(
            f.registry.resume(id, &stranger).await,
            Err(TripError::Forbidden(_))
        ));

        // The passenger's email does not make them the driver.
        let wrong_role = Caller::new("ana@espoch.edu.ec", Role::Driver);
        assert!(matches!(
            f.registry.resume(id, &wrong_role).await,
            Err(TripError::Forbidden(_))
        ));

        let pending = f
            .store
            .insert_trip("ana@espoch.edu.ec", "A", "B", "cash")
            .await
            .unwrap();
        let ana = Caller::new("ana@espoch.edu.ec", Role::Passenger);
        assert!(matches!(
            f.registry.resume(pending, &ana).await,
            Err(TripError::InvalidTransition { .. })
        ));

        assert!(matches!(
            f.registry.resume(9999, &ana).await,
            Err(TripError::NotFound(9999))
        ));

        f.store.set_failing(true);
        assert!(matches!(
            f.registry.resume(id, &ana).await,
            Err(TripError::Degraded(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_without_storage_returns_held_trip() {
        let f = fixture();
        let offer = f.registry.create(ana(), "A", "B", None).await.unwrap();
        f.registry.accept(offer.id, luis()).await.unwrap();
        f.store.set_failing(true);

        let ana = Caller::new("ana@espoch.edu.ec", Role::Passenger);
        let trip = f.registry.resume(offer.id, &ana).await.unwrap();
        assert_eq!(trip.id, offer.id);
    }

    #[tokio::test]
    async fn test_status_and_locations() {
        let f = fixture();
        let offer = f.registry.create(ana(), "A", "B", None).await.unwrap();

        let view = f.registry.status(offer.id).await.unwrap();
        assert_eq!(view, StatusView { status: TripStatus::Pending, driver: None });
        assert!(matches!(
            f.registry.driver_location(offer.id).await,
            Err(TripError::Unavailable(_))
        ));
        assert!(matches!(
            f.registry.report_passenger(offer.id, None, Coordinate::CAMPUS_DROPOFF).await,
            Err(TripError::NotFound(_))
        ));

        f.registry.accept(offer.id, luis()).await.unwrap();
        assert_eq!(
            f.registry.status(offer.id).await.unwrap().driver.as_deref(),
            Some("Luis")
        );

        let here = Coordinate::new(-1.64, -78.66);
        f.registry.report_driver("LUIS@espoch.edu.ec", here).await;
        assert_eq!(f.registry.driver_location(offer.id).await.unwrap(), here);

        f.registry
            .report_passenger(offer.id, Some("ana@espoch.edu.ec"), Coordinate::CAMPUS_DROPOFF)
            .await
            .unwrap();
        assert_eq!(
            f.registry.passenger_location(offer.id).await.unwrap(),
            Coordinate::CAMPUS_DROPOFF
        );

        assert!(matches!(f.registry.status(424242).await, Err(TripError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_driver_availability() {
        let f = fixture();
        f.registry.report_driver("luis@espoch.edu.ec", Coordinate::CAMPUS_PICKUP).await;
        f.registry.report_driver("pedro@espoch.edu.ec", Coordinate::CAMPUS_DROPOFF).await;

        let offer = f.registry.create(ana(), "A", "B", None).await.unwrap();
        f.registry.accept(offer.id, luis()).await.unwrap();

        let drivers = f.registry.drivers().await;
        assert_eq!(drivers.len(), 2);
        assert_eq!(drivers[0].email, "luis@espoch.edu.ec");
        assert_eq!(drivers[0].name, "Luis");
        assert!(!drivers[0].available);
        assert!(drivers[1].available);

        f.registry.complete(offer.id, "luis@espoch.edu.ec").await.unwrap();
        assert!(f.registry.drivers().await[0].available);
        assert_eq!(f.registry.driver_trip_count("luis@espoch.edu.ec").await, 1);

        f.registry.forget("luis@espoch.edu.ec").await;
        assert_eq!(f.registry.drivers().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_and_history() {
        let f = fixture();
        let id = stored_accepted_trip(&f.store).await;
        f.store.mark_completed(id, "luis@espoch.edu.ec", 4.0).await.unwrap();

        assert!(matches!(
            f.registry.rate(id, 6, Role::Passenger, None).await,
            Err(TripError::InvalidRating(6))
        ));

        let outcome = f.registry.rate(id, 4, Role::Passenger, Some("ok")).await.unwrap();
        assert_eq!(outcome.rated_user, "luis@espoch.edu.ec");
        assert_eq!(outcome.avg_rating, "4.00");

        let outcome = f.registry.rate(id, 5, Role::Driver, None).await.unwrap();
        assert_eq!(outcome.rated_user, "ana@espoch.edu.ec");
        assert_eq!(outcome.avg_rating, "5.00");

        assert!(matches!(
            f.registry.rate(777, 3, Role::Passenger, None).await,
            Err(TripError::NotFound(777))
        ));

        let ana = Caller::new("ana@espoch.edu.ec", Role::Passenger);
        let history = f.registry.history(&ana).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].driver_rating, Some(4));

        f.store.set_failing(true);
        assert!(f.registry.history(&ana).await.is_empty());
    }
}
