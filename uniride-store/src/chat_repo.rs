use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uniride_core::repository::{ChatRepository, GatewayResult, StoredMessage};
use uniride_core::TripId;

pub struct StoreChatRepository {
    pool: PgPool,
}

impl StoreChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    sender: String,
    body: String,
    kind: String,
    sent_at: DateTime<Utc>,
}

#[async_trait]
impl ChatRepository for StoreChatRepository {
    async fn save_message(
        &self,
        trip_id: TripId,
        sender: &str,
        body: &str,
        kind: &str,
    ) -> GatewayResult<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (trip_id, sender, body, kind)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(trip_id)
        .bind(sender)
        .bind(body)
        .bind(kind)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_messages(&self, trip_id: TripId) -> GatewayResult<Vec<StoredMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT sender, body, kind, sent_at
            FROM chat_messages
            WHERE trip_id = $1
            ORDER BY sent_at ASC, id ASC
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StoredMessage {
                sender: r.sender,
                body: r.body,
                kind: r.kind,
                sent_at: r.sent_at,
            })
            .collect())
    }
}
