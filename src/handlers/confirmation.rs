use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub email: String,
    pub payment_reference: String,
    pub booking_id: Option<String>,
    pub coach_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub confirmed_at: OffsetDateTime,
}

/// GET /api/confirm?token=...
///
/// メールのリンクから呼ばれ、確認トークンを消費する。
///
/// # Security
/// - token はログに出力しない
pub async fn confirm(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let token = validate_token(query.token.as_deref())?;

    let record = state.token_service.consume(token).await?;

    Ok(Json(ConfirmResponse {
        email: record.email,
        payment_reference: record.payment_reference,
        booking_id: record.booking_id,
        coach_id: record.coach_id,
        confirmed_at: OffsetDateTime::now_utc(),
    }))
}

/// トークンのバリデーション
fn validate_token(token: Option<&str>) -> Result<&str, AppError> {
    match token.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(AppError::Validation("token is required".to_string())),
    }
}
