use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{
    BookingRepository, ConfirmationTokenRepository, ProcessedEventRepository,
};
use crate::services::{
    ConfirmationTokenService, EmailService, EventDispatcher, ProcessedEventPurger, WebhookVerifier,
};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// Webhook 署名検証器
    pub verifier: Arc<WebhookVerifier>,
    /// イベントディスパッチャー
    pub dispatcher: EventDispatcher,
    /// 確認トークンサービス
    pub token_service: ConfirmationTokenService,
}

impl AppState {
    /// PostgreSQL 実装で AppState を作成
    ///
    /// 処理済みイベントIDの削除タスク用に ProcessedEventPurger も返す。
    pub fn new(db_pool: PgPool, config: Config) -> Result<(Self, ProcessedEventPurger), AppError> {
        let config = Arc::new(config);

        let token_repo = Arc::new(ConfirmationTokenRepository::new(db_pool.clone()));
        let booking_repo = Arc::new(BookingRepository::new(db_pool.clone()));
        let processed_event_repo = Arc::new(ProcessedEventRepository::new(db_pool));

        let token_service =
            ConfirmationTokenService::new(token_repo, config.confirmation_token_ttl_secs);
        let email_service = EmailService::new(&config)?;

        let stripe_mode = config.stripe_mode();
        tracing::info!(mode = stripe_mode.as_str(), "Stripe キーモード");

        let verifier = WebhookVerifier::new(
            config.stripe_webhook_secret.expose_secret().clone(),
            config.webhook_tolerance_secs,
        );

        let dispatcher = EventDispatcher::new(
            booking_repo,
            processed_event_repo.clone(),
            token_service.clone(),
            email_service,
            config.confirmation_url_base().to_string(),
            stripe_mode,
        );

        let purger = ProcessedEventPurger::new(
            processed_event_repo,
            config.processed_event_retention_secs,
        );

        Ok((
            Self::from_parts(verifier, dispatcher, token_service),
            purger,
        ))
    }

    /// 構築済みのコンポーネントから AppState を作成（テストではフェイクを注入する）
    pub fn from_parts(
        verifier: WebhookVerifier,
        dispatcher: EventDispatcher,
        token_service: ConfirmationTokenService,
    ) -> Self {
        Self {
            verifier: Arc::new(verifier),
            dispatcher,
            token_service,
        }
    }
}
