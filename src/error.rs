use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("トークンが見つかりません")]
    TokenNotFound,

    #[error("トークンは使用済みです")]
    TokenAlreadyUsed,

    #[error("トークンの有効期限が切れています")]
    TokenExpired,

    #[error("メール送信エラー: {0}")]
    Email(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            Self::Email(e) => {
                tracing::error!(error = %e, "メール送信エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            Self::TokenNotFound => (
                StatusCode::NOT_FOUND,
                "Confirmation link is invalid".to_string(),
            ),
            Self::TokenAlreadyUsed => (
                StatusCode::CONFLICT,
                "Confirmation link has already been used".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::GONE,
                "Confirmation link has expired".to_string(),
            ),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Webhook エンドポイント専用のエラー
///
/// Stripe へ返すレスポンスは署名検証メッセージ以外の内部情報を含めない。
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("署名検証エラー: {0}")]
    SignatureInvalid(String),

    #[error("不正なペイロード")]
    InvalidPayload,

    #[error("許可されていないメソッド")]
    MethodNotAllowed,

    #[error("Webhook 処理エラー")]
    Internal(#[from] AppError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::SignatureInvalid(msg) => {
                tracing::warn!(reason = %msg, "Webhook 署名検証失敗");
                (StatusCode::BAD_REQUEST, format!("Webhook Error: {msg}"))
            }
            Self::InvalidPayload => {
                tracing::warn!("Webhook ペイロードのパース失敗");
                (
                    StatusCode::BAD_REQUEST,
                    "Webhook Error: Invalid payload".to_string(),
                )
            }
            Self::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed".to_string(),
            ),
            Self::Internal(e) => {
                tracing::error!(error = ?e, "Webhook 処理エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Webhook processing failed".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
