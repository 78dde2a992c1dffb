use sqlx::FromRow;
use time::OffsetDateTime;

/// 処理済み Webhook イベント（再送時の重複処理防止用）
#[derive(Debug, Clone, FromRow)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub event_type: String,
    pub processed_at: OffsetDateTime,
}
