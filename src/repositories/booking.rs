use async_trait::async_trait;
use sqlx::PgPool;

use super::BookingPayments;

const PAYMENT_STATUS_PAID: &str = "paid";
const PAYMENT_STATUS_FAILED: &str = "failed";

/// 予約テーブル（管理画面・公開サイトと共有）の決済状態のみを更新する
#[derive(Clone)]
pub struct BookingRepository {
    pool: PgPool,
}

impl BookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingPayments for BookingRepository {
    async fn mark_paid(
        &self,
        booking_id: &str,
        payment_intent_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET payment_status = $2,
                payment_intent_id = $3,
                payment_failure_reason = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(booking_id)
        .bind(PAYMENT_STATUS_PAID)
        .bind(payment_intent_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 決済失敗を記録
    ///
    /// 支払い済みの予約は失敗で上書きしない（イベントの到着順は保証されないため）
    async fn mark_failed(
        &self,
        booking_id: &str,
        payment_intent_id: &str,
        reason: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET payment_status = $2,
                payment_intent_id = $3,
                payment_failure_reason = $4,
                updated_at = NOW()
            WHERE id = $1 AND payment_status IS DISTINCT FROM $5
            "#,
        )
        .bind(booking_id)
        .bind(PAYMENT_STATUS_FAILED)
        .bind(payment_intent_id)
        .bind(reason)
        .bind(PAYMENT_STATUS_PAID)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
