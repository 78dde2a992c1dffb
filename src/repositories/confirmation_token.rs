use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use super::ConfirmationTokenStore;
use crate::models::{ConfirmationToken, NewConfirmationToken, TokenInsert};

#[derive(Clone)]
pub struct ConfirmationTokenRepository {
    pool: PgPool,
}

impl ConfirmationTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 決済IDでトークンを検索（決済ごとに最大1件）
    pub async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<ConfirmationToken>, sqlx::Error> {
        sqlx::query_as::<_, ConfirmationToken>(
            r#"
            SELECT token, email, payment_reference, booking_id, coach_id, created_at, expires_at, used
            FROM confirmation_tokens
            WHERE payment_reference = $1
            "#,
        )
        .bind(payment_reference)
        .fetch_optional(&self.pool)
        .await
    }
}

#[async_trait]
impl ConfirmationTokenStore for ConfirmationTokenRepository {
    /// 新しい確認トークンを作成
    ///
    /// created_at / expires_at は呼び出し側で決定済みの値をそのまま書き込む。
    /// payment_reference の一意制約に衝突した場合は既存のトークンを返す。
    async fn insert(&self, token: NewConfirmationToken) -> Result<TokenInsert, sqlx::Error> {
        let inserted = sqlx::query_as::<_, ConfirmationToken>(
            r#"
            INSERT INTO confirmation_tokens
                (token, email, payment_reference, booking_id, coach_id, created_at, expires_at, used)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
            ON CONFLICT (payment_reference) DO NOTHING
            RETURNING token, email, payment_reference, booking_id, coach_id, created_at, expires_at, used
            "#,
        )
        .bind(&token.token)
        .bind(&token.email)
        .bind(&token.payment_reference)
        .bind(&token.booking_id)
        .bind(&token.coach_id)
        .bind(token.created_at)
        .bind(token.expires_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = inserted {
            return Ok(TokenInsert::Created(record));
        }

        // 衝突した行は削除されないため必ず存在する
        let existing = self
            .find_by_payment_reference(&token.payment_reference)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        Ok(TokenInsert::Existing(existing))
    }

    /// トークン文字列で検索
    ///
    /// # Note
    /// 有効期限や使用済みフラグの検証は呼び出し側で行う
    async fn find(&self, token: &str) -> Result<Option<ConfirmationToken>, sqlx::Error> {
        sqlx::query_as::<_, ConfirmationToken>(
            r#"
            SELECT token, email, payment_reference, booking_id, coach_id, created_at, expires_at, used
            FROM confirmation_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
    }

    async fn consume_if_valid(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<ConfirmationToken>, sqlx::Error> {
        sqlx::query_as::<_, ConfirmationToken>(
            r#"
            UPDATE confirmation_tokens
            SET used = TRUE
            WHERE token = $1 AND used = FALSE AND expires_at > $2
            RETURNING token, email, payment_reference, booking_id, coach_id, created_at, expires_at, used
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }
}
