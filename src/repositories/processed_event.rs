use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use super::ProcessedEventStore;
use crate::models::ProcessedEvent;

#[derive(Clone)]
pub struct ProcessedEventRepository {
    pool: PgPool,
}

impl ProcessedEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedEventStore for ProcessedEventRepository {
    async fn is_processed(&self, event_id: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT event_id
            FROM processed_webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
    ) -> Result<Option<ProcessedEvent>, sqlx::Error> {
        sqlx::query_as::<_, ProcessedEvent>(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING event_id, event_type, processed_at
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .fetch_optional(&self.pool)
        .await
    }

    /// 保持期間を過ぎたイベントIDを削除
    ///
    /// # Returns
    /// 削除された行数
    async fn purge_before(&self, cutoff: OffsetDateTime) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM processed_webhook_events
            WHERE processed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// PostgreSQL に対する SQL の検証（`DATABASE_URL` が必要）
#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_mark_processed_is_recorded_once(pool: PgPool) {
        let repo = ProcessedEventRepository::new(pool);

        assert!(!repo.is_processed("evt_1").await.unwrap());
        let first = repo
            .mark_processed("evt_1", "payment_intent.succeeded")
            .await
            .unwrap();
        assert_eq!(first.unwrap().event_id, "evt_1");

        let second = repo
            .mark_processed("evt_1", "payment_intent.succeeded")
            .await
            .unwrap();
        assert!(second.is_none());
        assert!(repo.is_processed("evt_1").await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_purge_before_keeps_recent_ids(pool: PgPool) {
        let repo = ProcessedEventRepository::new(pool);
        repo.mark_processed("evt_recent", "charge.succeeded")
            .await
            .unwrap();

        let deleted = repo
            .purge_before(OffsetDateTime::now_utc() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(deleted, 0);

        let deleted = repo
            .purge_before(OffsetDateTime::now_utc() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(!repo.is_processed("evt_recent").await.unwrap());
    }
}
