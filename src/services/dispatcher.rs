//! Webhook イベントの振り分け
//!
//! 署名検証済みのイベントを種別ごとに処理する。Stripe は同じイベントを再送することが
//! あるため、処理済みイベントIDを記録し、再送分は副作用なしで受理する。

use std::sync::Arc;

use crate::config::StripeMode;
use crate::error::AppError;
use crate::models::{EventType, PaymentEvent, PaymentIntent, TokenInsert};
use crate::repositories::{BookingPayments, ProcessedEventStore};
use crate::services::{ConfirmationTokenService, EmailService};

/// イベント処理の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 状態変更を伴う処理を実行した
    Processed,
    /// 対象外・情報のみのイベント
    Ignored,
    /// 処理済みイベントの再送
    AlreadyProcessed,
}

/// イベントディスパッチャー
#[derive(Clone)]
pub struct EventDispatcher {
    bookings: Arc<dyn BookingPayments>,
    processed_events: Arc<dyn ProcessedEventStore>,
    token_service: ConfirmationTokenService,
    email_service: EmailService,
    confirmation_url_base: String,
    stripe_mode: StripeMode,
}

impl EventDispatcher {
    pub fn new(
        bookings: Arc<dyn BookingPayments>,
        processed_events: Arc<dyn ProcessedEventStore>,
        token_service: ConfirmationTokenService,
        email_service: EmailService,
        confirmation_url_base: String,
        stripe_mode: StripeMode,
    ) -> Self {
        Self {
            bookings,
            processed_events,
            token_service,
            email_service,
            confirmation_url_base,
            stripe_mode,
        }
    }

    /// イベントを処理
    ///
    /// 未知の種別はエラーにせず `Ignored` を返す。
    /// 副作用がすべて成功した後にのみ処理済みとして記録する（失敗時は再送で再実行される）。
    pub async fn dispatch(&self, event: PaymentEvent) -> Result<DispatchOutcome, AppError> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            livemode = event.livemode,
            "Stripe Webhook イベント受信"
        );

        if !self.stripe_mode.matches_livemode(event.livemode) {
            tracing::warn!(
                event_id = %event.id,
                livemode = event.livemode,
                key_mode = self.stripe_mode.as_str(),
                "イベントの livemode がシークレットキーのモードと一致しません"
            );
        }

        if self.processed_events.is_processed(&event.id).await? {
            tracing::info!(event_id = %event.id, "処理済みイベントの再送（スキップ）");
            return Ok(DispatchOutcome::AlreadyProcessed);
        }

        let outcome = match &event.event_type {
            EventType::PaymentIntentSucceeded => self.handle_payment_succeeded(&event).await?,
            EventType::PaymentIntentPaymentFailed => self.handle_payment_failed(&event).await?,
            EventType::PaymentIntentCreated | EventType::ChargeSucceeded => {
                tracing::info!(event_id = %event.id, event_type = %event.event_type, "情報イベント");
                DispatchOutcome::Ignored
            }
            EventType::Other(event_type) => {
                tracing::debug!(event_id = %event.id, event_type = %event_type, "未対応のイベント種別");
                DispatchOutcome::Ignored
            }
        };

        if outcome == DispatchOutcome::Processed {
            let recorded = self
                .processed_events
                .mark_processed(&event.id, event.event_type.as_str())
                .await?;
            if recorded.is_none() {
                // 同一イベントが並行して処理された（副作用は冪等）
                tracing::debug!(event_id = %event.id, "処理済みイベントIDは記録済み");
            }
        }

        Ok(outcome)
    }

    /// payment_intent.succeeded
    ///
    /// 1. 予約を支払い済みにする
    /// 2. 受領メールアドレスがあれば確認トークンを発行してリンクを送信
    async fn handle_payment_succeeded(
        &self,
        event: &PaymentEvent,
    ) -> Result<DispatchOutcome, AppError> {
        let Some(intent) = self.parse_intent(event) else {
            return Ok(DispatchOutcome::Ignored);
        };

        match intent.booking_id() {
            Some(booking_id) => {
                if self.bookings.mark_paid(booking_id, &intent.id).await? {
                    tracing::info!(booking_id = %booking_id, payment_intent = %intent.id, "予約を支払い済みに更新");
                } else {
                    tracing::warn!(booking_id = %booking_id, payment_intent = %intent.id, "予約が見つかりません");
                }
            }
            None => {
                tracing::warn!(payment_intent = %intent.id, "メタデータに予約IDがありません");
            }
        }

        match intent.customer_email() {
            Some(email) => self.issue_confirmation(&intent, email).await?,
            None => {
                tracing::info!(payment_intent = %intent.id, "受領メールアドレスなし（確認メール送信なし）");
            }
        }

        Ok(DispatchOutcome::Processed)
    }

    /// payment_intent.payment_failed
    async fn handle_payment_failed(
        &self,
        event: &PaymentEvent,
    ) -> Result<DispatchOutcome, AppError> {
        let Some(intent) = self.parse_intent(event) else {
            return Ok(DispatchOutcome::Ignored);
        };

        let reason = intent.failure_reason();
        tracing::warn!(payment_intent = %intent.id, reason = ?reason, "決済失敗");

        if let Some(booking_id) = intent.booking_id()
            && !self.bookings.mark_failed(booking_id, &intent.id, reason).await?
        {
            tracing::warn!(booking_id = %booking_id, "予約が見つからないか支払い済みです");
        }

        Ok(DispatchOutcome::Processed)
    }

    /// 確認トークンを発行してメール送信
    ///
    /// トークン保存の失敗はエラー（Stripe の再送に任せる）。
    /// メール送信の失敗はログのみ（トークンは保存済み）。
    /// 決済のトークンが発行済みの場合はメールを再送しない。
    async fn issue_confirmation(&self, intent: &PaymentIntent, email: &str) -> Result<(), AppError> {
        let issued = self
            .token_service
            .issue(email, &intent.id, intent.booking_id(), intent.coach_id())
            .await?;

        let TokenInsert::Created(record) = issued else {
            tracing::info!(payment_intent = %intent.id, "確認メールは送信済み（スキップ）");
            return Ok(());
        };

        let confirmation_url = build_confirmation_url(&self.confirmation_url_base, &record.token);

        if let Err(e) = self
            .email_service
            .send_booking_confirmation_email(email, &confirmation_url, record.expires_at)
            .await
        {
            tracing::error!(error = %e, email = %email, payment_intent = %intent.id, "確認メール送信に失敗");
        }

        Ok(())
    }

    fn parse_intent(&self, event: &PaymentEvent) -> Option<PaymentIntent> {
        match PaymentIntent::from_event(event) {
            Ok(intent) => Some(intent),
            Err(e) => {
                tracing::warn!(event_id = %event.id, error = %e, "PaymentIntent のパースに失敗（スキップ）");
                None
            }
        }
    }
}

/// 確認URLを構築
pub fn build_confirmation_url(base: &str, token: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}token={token}")
}
