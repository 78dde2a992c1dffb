use std::sync::Arc;

use rand::{Rng, distributions::Alphanumeric, rngs::OsRng};
use time::{Duration, OffsetDateTime};

use crate::error::AppError;
use crate::models::{ConfirmationToken, NewConfirmationToken, TokenInsert};
use crate::repositories::ConfirmationTokenStore;

/// 確認トークンの文字数
pub const TOKEN_LENGTH: usize = 32;

/// 32文字の英数字トークンを生成
///
/// 各文字は [a-zA-Z0-9] の62文字から独立・一様に選ぶ。乱数源は OS の CSPRNG。
pub fn generate_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// 確認トークンの発行・消費
#[derive(Clone)]
pub struct ConfirmationTokenService {
    store: Arc<dyn ConfirmationTokenStore>,
    ttl: Duration,
}

impl ConfirmationTokenService {
    pub fn new(store: Arc<dyn ConfirmationTokenStore>, ttl_secs: i64) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// トークンを発行して保存し、トークン文字列を返す
    ///
    /// # Security
    /// - トークン（平文）はログに出力しない
    ///
    /// # Errors
    /// 書き込み失敗時は `AppError::Database`。リトライは呼び出し側の判断。
    pub async fn create(
        &self,
        email: &str,
        payment_reference: &str,
        booking_id: Option<&str>,
        coach_id: Option<&str>,
    ) -> Result<String, AppError> {
        let issued = self
            .issue(email, payment_reference, booking_id, coach_id)
            .await?;
        Ok(issued.into_record().token)
    }

    /// 決済ごとに1件だけトークンを発行する
    ///
    /// 同じ決済IDのトークンが既にあれば新規発行せず `TokenInsert::Existing` を返す。
    pub async fn issue(
        &self,
        email: &str,
        payment_reference: &str,
        booking_id: Option<&str>,
        coach_id: Option<&str>,
    ) -> Result<TokenInsert, AppError> {
        let now = OffsetDateTime::now_utc();
        let issued = self
            .store
            .insert(NewConfirmationToken {
                token: generate_token(),
                email: email.to_string(),
                payment_reference: payment_reference.to_string(),
                booking_id: booking_id.map(str::to_string),
                coach_id: coach_id.map(str::to_string),
                created_at: now,
                expires_at: now + self.ttl,
            })
            .await?;

        match &issued {
            TokenInsert::Created(record) => tracing::info!(
                email = %record.email,
                payment_reference = %record.payment_reference,
                booking_id = ?record.booking_id,
                expires_at = %record.expires_at,
                "確認トークン発行"
            ),
            TokenInsert::Existing(record) => tracing::info!(
                payment_reference = %record.payment_reference,
                "確認トークンは発行済み"
            ),
        }

        Ok(issued)
    }

    pub async fn find(&self, token: &str) -> Result<Option<ConfirmationToken>, AppError> {
        Ok(self.store.find(token).await?)
    }

    /// トークンを消費（一度だけ成功する）
    pub async fn consume(&self, token: &str) -> Result<ConfirmationToken, AppError> {
        self.consume_at(token, OffsetDateTime::now_utc()).await
    }

    pub(crate) async fn consume_at(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<ConfirmationToken, AppError> {
        if let Some(record) = self.store.consume_if_valid(token, now).await? {
            tracing::info!(
                payment_reference = %record.payment_reference,
                booking_id = ?record.booking_id,
                "確認トークン消費"
            );
            return Ok(record);
        }

        // 条件付き更新に失敗した理由を判定
        let record = self
            .store
            .find(token)
            .await?
            .ok_or(AppError::TokenNotFound)?;

        if record.used {
            tracing::warn!(payment_reference = %record.payment_reference, "使用済みトークン");
            return Err(AppError::TokenAlreadyUsed);
        }

        if record.is_expired_at(now) {
            tracing::warn!(payment_reference = %record.payment_reference, "期限切れトークン");
            return Err(AppError::TokenExpired);
        }

        // 判定の間に別リクエストが消費した
        Err(AppError::TokenAlreadyUsed)
    }
}
