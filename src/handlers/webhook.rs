use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method},
};
use serde::Serialize;

use crate::error::WebhookError;
use crate::state::AppState;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
}

/// Stripe Webhook ハンドラー
///
/// POST /webhook
///
/// 処理フロー:
/// 1. 生のボディと stripe-signature ヘッダーで署名検証
/// 2. イベント種別ごとに処理
/// 3. `{"received": true}` を返却
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookError> {
    // 1. 署名検証（ボディはパース前のバイト列のまま渡す）
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            WebhookError::SignatureInvalid(
                "No stripe-signature header value was provided.".to_string(),
            )
        })?;
    let event = state.verifier.verify(&body, signature)?;
    let event_id = event.id.clone();

    // 2. イベント処理
    let outcome = state.dispatcher.dispatch(event).await?;

    tracing::info!(event_id = %event_id, outcome = ?outcome, "Webhook 処理完了");

    // 3. 受領応答
    Ok(Json(WebhookResponse { received: true }))
}

/// /webhook の POST 以外
///
/// ボディを読まずに 405 を返す
pub async fn webhook_method_not_allowed(method: Method) -> WebhookError {
    tracing::warn!(method = %method, "Webhook: 許可されていないメソッド");
    WebhookError::MethodNotAllowed
}
