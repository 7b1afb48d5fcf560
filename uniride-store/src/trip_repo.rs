use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uniride_core::identity::Role;
use uniride_core::repository::{status, GatewayResult, TripRecord, TripRepository};
use uniride_core::TripId;

pub struct StoreTripRepository {
    pool: PgPool,
}

impl StoreTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: i64,
    passenger_email: String,
    passenger_name: Option<String>,
    driver_email: Option<String>,
    driver_name: Option<String>,
    origin: String,
    destination: String,
    payment_method: String,
    status: String,
    cost: Option<f64>,
    requested_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    passenger_rating: Option<i32>,
    driver_rating: Option<i32>,
}

impl From<TripRow> for TripRecord {
    fn from(row: TripRow) -> Self {
        TripRecord {
            id: row.id,
            passenger_email: row.passenger_email,
            passenger_name: row.passenger_name,
            driver_email: row.driver_email,
            driver_name: row.driver_name,
            origin: row.origin,
            destination: row.destination,
            payment_method: row.payment_method,
            status: row.status,
            cost: row.cost,
            requested_at: Some(row.requested_at),
            accepted_at: row.accepted_at,
            finished_at: row.finished_at,
            passenger_rating: row.passenger_rating,
            driver_rating: row.driver_rating,
        }
    }
}

const TRIP_SELECT: &str = r#"
    SELECT t.id, t.passenger_email, p.name AS passenger_name,
           t.driver_email, d.name AS driver_name,
           t.origin, t.destination, t.payment_method, t.status, t.cost,
           t.requested_at, t.accepted_at, t.finished_at,
           t.passenger_rating, t.driver_rating
    FROM trips t
    LEFT JOIN users p ON LOWER(p.email) = LOWER(t.passenger_email)
    LEFT JOIN users d ON LOWER(d.email) = LOWER(t.driver_email)
"#;

#[async_trait]
impl TripRepository for StoreTripRepository {
    async fn insert_trip(
        &self,
        passenger_email: &str,
        origin: &str,
        destination: &str,
        payment_method: &str,
    ) -> GatewayResult<TripId> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO trips (passenger_email, origin, destination, payment_method, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(passenger_email)
        .bind(origin)
        .bind(destination)
        .bind(payment_method)
        .bind(status::PENDING)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn mark_accepted(&self, trip_id: TripId, driver_email: &str) -> GatewayResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE trips
            SET driver_email = $2, status = $3, accepted_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(trip_id)
        .bind(driver_email)
        .bind(status::ACCEPTED)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_completed(
        &self,
        trip_id: TripId,
        driver_email: &str,
        cost: f64,
    ) -> GatewayResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE trips
            SET status = $3, finished_at = NOW(), cost = $4
            WHERE id = $1 AND LOWER(driver_email) = LOWER($2)
            "#,
        )
        .bind(trip_id)
        .bind(driver_email)
        .bind(status::FINISHED)
        .bind(cost)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_trip(&self, trip_id: TripId) -> GatewayResult<Option<TripRecord>> {
        let query = format!("{} WHERE t.id = $1", TRIP_SELECT);
        let row = sqlx::query_as::<_, TripRow>(&query)
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(TripRecord::from))
    }

    async fn recent_trips(
        &self,
        email: &str,
        role: Role,
        limit: i64,
    ) -> GatewayResult<Vec<TripRecord>> {
        let column = match role {
            Role::Driver => "t.driver_email",
            _ => "t.passenger_email",
        };
        let query = format!(
            "{} WHERE LOWER({}) = LOWER($1) ORDER BY t.requested_at DESC LIMIT $2",
            TRIP_SELECT, column
        );

        let rows = sqlx::query_as::<_, TripRow>(&query)
            .bind(email)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(TripRecord::from).collect())
    }

    async fn rate_trip(
        &self,
        trip_id: TripId,
        rated_by: Role,
        rating: i32,
        comment: Option<&str>,
    ) -> GatewayResult<u64> {
        // Drivers rate the passenger, everyone else rates the driver.
        let query = match rated_by {
            Role::Driver => "UPDATE trips SET passenger_rating = $2, driver_comment = $3 WHERE id = $1",
            _ => "UPDATE trips SET driver_rating = $2, passenger_comment = $3 WHERE id = $1",
        };

        let result = sqlx::query(query)
            .bind(trip_id)
            .bind(rating)
            .bind(comment)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn average_rating(&self, email: &str, as_role: Role) -> GatewayResult<Option<f64>> {
        let query = match as_role {
            Role::Driver => {
                "SELECT AVG(driver_rating::float8) FROM trips \
                 WHERE LOWER(driver_email) = LOWER($1) AND driver_rating IS NOT NULL"
            }
            _ => {
                "SELECT AVG(passenger_rating::float8) FROM trips \
                 WHERE LOWER(passenger_email) = LOWER($1) AND passenger_rating IS NOT NULL"
            }
        };

        let average = sqlx::query_scalar::<_, Option<f64>>(query)
            .bind(email)
            .fetch_one(&self.pool)
            .await?;

        Ok(average)
    }
}
