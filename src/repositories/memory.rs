//! テスト用のインメモリ実装

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{BookingPayments, ConfirmationTokenStore, ProcessedEventStore};
use crate::models::{ConfirmationToken, NewConfirmationToken, ProcessedEvent, TokenInsert};

#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<String, ConfirmationToken>>,
    fail_writes: AtomicBool,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以降の書き込みを接続エラーで失敗させる
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    /// 有効期限を書き換える（期限切れのシナリオ用）
    pub fn set_expires_at(&self, token: &str, expires_at: OffsetDateTime) {
        if let Some(record) = self.tokens.lock().unwrap().get_mut(token) {
            record.expires_at = expires_at;
        }
    }
}

#[async_trait]
impl ConfirmationTokenStore for InMemoryTokenStore {
    async fn insert(&self, token: NewConfirmationToken) -> Result<TokenInsert, sqlx::Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut tokens = self.tokens.lock().unwrap();
        if let Some(existing) = tokens
            .values()
            .find(|t| t.payment_reference == token.payment_reference)
        {
            return Ok(TokenInsert::Existing(existing.clone()));
        }
        let record = token.into_record();
        tokens.insert(record.token.clone(), record.clone());
        Ok(TokenInsert::Created(record))
    }

    async fn find(&self, token: &str) -> Result<Option<ConfirmationToken>, sqlx::Error> {
        Ok(self.tokens.lock().unwrap().get(token).cloned())
    }

    async fn consume_if_valid(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<ConfirmationToken>, sqlx::Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut tokens = self.tokens.lock().unwrap();
        match tokens.get_mut(token) {
            Some(record) if record.is_consumable_at(now) => {
                record.used = true;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// 呼び出しを記録する予約ストア
///
/// 状態を持ち、支払い済みの予約は失敗で上書きしない。
#[derive(Default)]
pub struct RecordingBookings {
    pub paid: Mutex<Vec<(String, String)>>,
    pub failed: Mutex<Vec<(String, String, Option<String>)>>,
    statuses: Mutex<HashMap<String, &'static str>>,
}

impl RecordingBookings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paid_calls(&self) -> Vec<(String, String)> {
        self.paid.lock().unwrap().clone()
    }

    pub fn failed_calls(&self) -> Vec<(String, String, Option<String>)> {
        self.failed.lock().unwrap().clone()
    }

    pub fn status(&self, booking_id: &str) -> Option<&'static str> {
        self.statuses.lock().unwrap().get(booking_id).copied()
    }
}

#[async_trait]
impl BookingPayments for RecordingBookings {
    async fn mark_paid(
        &self,
        booking_id: &str,
        payment_intent_id: &str,
    ) -> Result<bool, sqlx::Error> {
        self.paid
            .lock()
            .unwrap()
            .push((booking_id.to_string(), payment_intent_id.to_string()));
        self.statuses
            .lock()
            .unwrap()
            .insert(booking_id.to_string(), "paid");
        Ok(true)
    }

    async fn mark_failed(
        &self,
        booking_id: &str,
        payment_intent_id: &str,
        reason: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        self.failed.lock().unwrap().push((
            booking_id.to_string(),
            payment_intent_id.to_string(),
            reason.map(str::to_string),
        ));
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.get(booking_id) == Some(&"paid") {
            return Ok(false);
        }
        statuses.insert(booking_id.to_string(), "failed");
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryProcessedEvents {
    events: Mutex<HashMap<String, ProcessedEvent>>,
    fail_next_mark: AtomicBool,
}

impl InMemoryProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の mark_processed を1回だけ失敗させる（副作用後の記録失敗）
    pub fn fail_next_mark_processed(&self) {
        self.fail_next_mark.store(true, Ordering::SeqCst);
    }

    pub fn insert_at(&self, event_id: &str, processed_at: OffsetDateTime) {
        self.events.lock().unwrap().insert(
            event_id.to_string(),
            ProcessedEvent {
                event_id: event_id.to_string(),
                event_type: "test".to_string(),
                processed_at,
            },
        );
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEvents {
    async fn is_processed(&self, event_id: &str) -> Result<bool, sqlx::Error> {
        Ok(self.events.lock().unwrap().contains_key(event_id))
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
    ) -> Result<Option<ProcessedEvent>, sqlx::Error> {
        if self.fail_next_mark.swap(false, Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut events = self.events.lock().unwrap();
        if events.contains_key(event_id) {
            return Ok(None);
        }
        let event = ProcessedEvent {
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            processed_at: OffsetDateTime::now_utc(),
        };
        events.insert(event_id.to_string(), event.clone());
        Ok(Some(event))
    }

    async fn purge_before(&self, cutoff: OffsetDateTime) -> Result<u64, sqlx::Error> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|_, e| e.processed_at >= cutoff);
        Ok((before - events.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_bookings_keeps_paid_status() {
        let bookings = RecordingBookings::new();

        assert!(bookings.mark_failed("bk_1", "pi_1", Some("declined")).await.unwrap());
        assert_eq!(bookings.status("bk_1"), Some("failed"));

        assert!(bookings.mark_paid("bk_1", "pi_1").await.unwrap());
        assert!(!bookings.mark_failed("bk_1", "pi_1", None).await.unwrap());
        assert_eq!(bookings.status("bk_1"), Some("paid"));
    }
}
