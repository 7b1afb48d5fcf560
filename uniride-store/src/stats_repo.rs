use async_trait::async_trait;
use sqlx::PgPool;
use uniride_core::repository::{status, GatewayResult, StatsRepository};
use uniride_core::stats::Statistics;

pub struct StoreStatsRepository {
    pool: PgPool,
}

impl StoreStatsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatsRepository for StoreStatsRepository {
    async fn count_users(&self) -> GatewayResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_completed_trips(&self) -> GatewayResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM trips WHERE status = $1")
            .bind(status::FINISHED)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn total_earnings(&self) -> GatewayResult<f64> {
        let total = sqlx::query_scalar::<_, f64>(
            "SELECT COALESCE(SUM(cost), 0)::float8 FROM trips WHERE status = $1",
        )
        .bind(status::FINISHED)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn count_active_users(&self, window_minutes: i64) -> GatewayResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT email) FROM (
                SELECT LOWER(passenger_email) AS email FROM trips
                WHERE requested_at >= NOW() - make_interval(mins => $1::int)
                UNION
                SELECT LOWER(driver_email) AS email FROM trips
                WHERE driver_email IS NOT NULL
                  AND accepted_at >= NOW() - make_interval(mins => $1::int)
            ) recent
            "#,
        )
        .bind(window_minutes)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn driver_completed_trips(&self, email: &str) -> GatewayResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM trips WHERE LOWER(driver_email) = LOWER($1) AND status = $2",
        )
        .bind(email)
        .bind(status::FINISHED)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn driver_earnings(&self, email: &str) -> GatewayResult<f64> {
        let total = sqlx::query_scalar::<_, f64>(
            r#"
            SELECT COALESCE(SUM(cost), 0)::float8 FROM trips
            WHERE LOWER(driver_email) = LOWER($1) AND status = $2
            "#,
        )
        .bind(email)
        .bind(status::FINISHED)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn write_summary(&self, stats: &Statistics) -> GatewayResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_statistics
                (id, total_users, active_trips, completed_trips, active_users, total_earnings, updated_at)
            VALUES (1, $1, $2, $3, $4, $5, NOW())
            ON CONFLICT (id) DO UPDATE SET
                total_users = EXCLUDED.total_users,
                active_trips = EXCLUDED.active_trips,
                completed_trips = EXCLUDED.completed_trips,
                active_users = EXCLUDED.active_users,
                total_earnings = EXCLUDED.total_earnings,
                updated_at = NOW()
            "#,
        )
        .bind(stats.total_users)
        .bind(stats.active_trips)
        .bind(stats.completed_trips)
        .bind(stats.active_users)
        .bind(stats.total_earnings)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
