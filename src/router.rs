use axum::{
    Router,
    routing::{get, post},
};
use http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers;
use crate::state::AppState;

/// Router の構築
///
/// /webhook は Stripe からのサーバー間通信のため CORS を付けない。
/// POST 以外はボディを読む前に JSON の 405 を返す。
pub fn create_router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    let public_api = Router::new()
        .route("/api/confirm", get(handlers::confirm))
        .layer(build_cors_layer(cors_allowed_origins));

    Router::new()
        .route(
            "/webhook",
            post(handlers::stripe_webhook).fallback(handlers::webhook_method_not_allowed),
        )
        .route("/api/health", get(handlers::health_check))
        .merge(public_api)
        .with_state(state)
}

/// 公開サイト向け CORS
///
/// オリジン未設定の場合は何も許可しない
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET]);

    if origins.iter().any(|o| o.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.trim().parse() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "不正な CORS オリジンを無視");
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}
