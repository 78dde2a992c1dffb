//! 永続化層
//!
//! サービス層はトレイト越しにストアへアクセスする。本番は PostgreSQL 実装、
//! テストはインメモリ実装を注入する。

pub mod booking;
pub mod confirmation_token;
#[cfg(test)]
pub mod memory;
pub mod processed_event;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::models::{ConfirmationToken, NewConfirmationToken, ProcessedEvent, TokenInsert};

pub use booking::BookingRepository;
pub use confirmation_token::ConfirmationTokenRepository;
pub use processed_event::ProcessedEventRepository;

/// 確認トークンの保存先
#[async_trait]
pub trait ConfirmationTokenStore: Send + Sync {
    /// トークンを1件書き込む（単一行 INSERT）
    ///
    /// 同じ payment_reference のトークンが既にあれば書き込まず `TokenInsert::Existing` を返す。
    /// 一意制約で判定するため、同一イベントの並行処理でも作成されるのは1件のみ。
    async fn insert(&self, token: NewConfirmationToken) -> Result<TokenInsert, sqlx::Error>;

    async fn find(&self, token: &str) -> Result<Option<ConfirmationToken>, sqlx::Error>;

    /// 未使用かつ `now` 時点で有効な場合のみ used = true にして返す
    ///
    /// 条件付き UPDATE 1回で行うため、同時に消費しても成功するのは1件のみ。
    async fn consume_if_valid(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<ConfirmationToken>, sqlx::Error>;
}

/// 予約の決済状態を更新する外部コラボレーター
///
/// 同じ状態を何度設定しても結果が変わらないこと（冪等）。
#[async_trait]
pub trait BookingPayments: Send + Sync {
    /// # Returns
    /// 対象予約が存在した場合 true
    async fn mark_paid(&self, booking_id: &str, payment_intent_id: &str)
    -> Result<bool, sqlx::Error>;

    async fn mark_failed(
        &self,
        booking_id: &str,
        payment_intent_id: &str,
        reason: Option<&str>,
    ) -> Result<bool, sqlx::Error>;
}

/// 処理済み Webhook イベントIDの記録
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> Result<bool, sqlx::Error>;

    /// # Returns
    /// 新規に記録した場合 Some、既に記録済みなら None
    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
    ) -> Result<Option<ProcessedEvent>, sqlx::Error>;

    /// `cutoff` より前に処理したイベントIDを削除し、削除件数を返す
    async fn purge_before(&self, cutoff: OffsetDateTime) -> Result<u64, sqlx::Error>;
}
