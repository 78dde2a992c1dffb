use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// Stripe のイベント種別
///
/// 未知の種別は `Other` に入り、エラーにはしない（Stripe 側の種別追加に備える）。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum EventType {
    PaymentIntentSucceeded,
    PaymentIntentPaymentFailed,
    PaymentIntentCreated,
    ChargeSucceeded,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::PaymentIntentPaymentFailed => "payment_intent.payment_failed",
            Self::PaymentIntentCreated => "payment_intent.created",
            Self::ChargeSucceeded => "charge.succeeded",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        match value {
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentIntentPaymentFailed,
            "payment_intent.created" => Self::PaymentIntentCreated,
            "charge.succeeded" => Self::ChargeSucceeded,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 署名検証済みの Stripe イベント
///
/// `data.object` の形は種別ごとに異なるため JSON のまま保持する。
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub livemode: bool,
    pub data: PaymentEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEventData {
    pub object: serde_json::Value,
}

/// PaymentIntent のうち本サービスが参照するフィールド
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub receipt_email: Option<String>,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPaymentError {
    #[serde(default)]
    pub message: Option<String>,
}

impl PaymentIntent {
    pub fn from_event(event: &PaymentEvent) -> Result<Self, serde_json::Error> {
        serde_json::from_value(event.data.object.clone())
    }

    /// 予約ID（フロントエンドは camelCase、バックエンドは snake_case でメタデータを付与する）
    pub fn booking_id(&self) -> Option<&str> {
        self.metadata_value(&["bookingId", "booking_id"])
    }

    pub fn coach_id(&self) -> Option<&str> {
        self.metadata_value(&["coachId", "coach_id"])
    }

    /// 確認メールの宛先
    pub fn customer_email(&self) -> Option<&str> {
        self.receipt_email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| self.metadata_value(&["email"]))
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.last_payment_error
            .as_ref()
            .and_then(|e| e.message.as_deref())
    }

    fn metadata_value(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.metadata.get(*k))
            .map(String::as_str)
            .find(|v| !v.trim().is_empty())
    }
}
