//! Stripe Webhook 署名検証
//!
//! `Stripe-Signature: t=<unix秒>,v1=<hex>` を、生のリクエストボディに対して検証する。
//! 署名対象は `"<t>.<body>"` のバイト列で、HMAC-SHA256 を使う。ボディを一度でも
//! パース・再シリアライズすると署名が一致しなくなるため、必ず受信したバイト列を渡すこと。

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::error::{AppError, WebhookError};
use crate::models::PaymentEvent;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_SCHEME: &str = "v1";

const ERR_HEADER_FORMAT: &str = "Unable to extract timestamp and signatures from header";
const ERR_NO_MATCH: &str = "No signatures found matching the expected signature for payload";
const ERR_TOLERANCE: &str = "Timestamp outside the tolerance zone";

/// Webhook 署名検証器
///
/// 署名シークレットは起動時に注入し、Debug 出力にも現れない。
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    /// # Arguments
    /// * `secret` - Webhook 署名シークレット（whsec_...）
    /// * `tolerance_secs` - 署名タイムスタンプの許容誤差。0 以下で無効
    pub fn new(secret: impl Into<SecretString>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// 署名を検証してイベントをパース
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<PaymentEvent, WebhookError> {
        self.verify_at(
            payload,
            signature_header,
            OffsetDateTime::now_utc().unix_timestamp(),
        )
    }

    pub(crate) fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<PaymentEvent, WebhookError> {
        let header = parse_signature_header(signature_header)
            .ok_or_else(|| WebhookError::SignatureInvalid(ERR_HEADER_FORMAT.to_string()))?;

        let expected = compute_signature(self.secret.expose_secret(), header.timestamp, payload)?;

        let matched = header
            .signatures
            .iter()
            .filter_map(|sig| hex::decode(sig).ok())
            .any(|sig| bool::from(sig.as_slice().ct_eq(expected.as_slice())));

        if !matched {
            return Err(WebhookError::SignatureInvalid(ERR_NO_MATCH.to_string()));
        }

        if self.tolerance_secs > 0 && (now - header.timestamp).abs() > self.tolerance_secs {
            return Err(WebhookError::SignatureInvalid(ERR_TOLERANCE.to_string()));
        }

        // 署名検証後のパース失敗は内部情報を返さない
        serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Webhook ペイロードのパースに失敗");
            WebhookError::InvalidPayload
        })
    }
}

/// パース済み署名ヘッダー
#[derive(Debug)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

/// `t=...,v1=...,v1=...` をパース
///
/// 未知のスキーム（v0 など）は無視する。タイムスタンプまたは v1 署名が無ければ None。
fn parse_signature_header(header: &str) -> Option<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for item in header.split(',') {
        let Some((key, value)) = item.split_once('=') else {
            continue;
        };
        match key.trim() {
            "t" => timestamp = value.trim().parse::<i64>().ok(),
            SIGNATURE_SCHEME => signatures.push(value.trim().to_string()),
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Some(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => None,
    }
}

/// `"<timestamp>.<payload>"` の HMAC-SHA256
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
        tracing::error!(error = %e, "HMAC の初期化エラー");
        AppError::Internal(anyhow::anyhow!("hmac initialization error"))
    })?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// 署名ヘッダーを生成（テスト・ローカル検証用）
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, AppError> {
    let signature = compute_signature(secret, timestamp, payload)?;
    Ok(format!("t={},{}={}", timestamp, SIGNATURE_SCHEME, hex::encode(signature)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;
    const PAYLOAD: &str = r#"{"id":"evt_123","type":"payment_intent.created","created":1700000000,"livemode":false,"data":{"object":{"id":"pi_1"}}}"#;

    fn create_test_verifier() -> WebhookVerifier {
        WebhookVerifier::new(SECRET.to_string(), 300)
    }

    fn assert_signature_invalid(result: Result<PaymentEvent, WebhookError>, expected: &str) {
        match result {
            Err(WebhookError::SignatureInvalid(msg)) => assert_eq!(msg, expected),
            other => panic!("expected SignatureInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_signature_header() {
        let header = parse_signature_header("t=1234567890,v1=abc123,v0=old,v1=def456").unwrap();
        assert_eq!(header.timestamp, 1234567890);
        assert_eq!(header.signatures, vec!["abc123", "def456"]);
    }

    #[test]
    fn test_parse_signature_header_invalid() {
        assert!(parse_signature_header("invalid").is_none());
        assert!(parse_signature_header("t=123").is_none());
        assert!(parse_signature_header("v1=abc").is_none());
        assert!(parse_signature_header("t=abc,v1=abc").is_none());
        assert!(parse_signature_header("").is_none());
    }

    #[test]
    fn test_verify_valid_signature() {
        let verifier = create_test_verifier();
        let header = sign_payload(SECRET, NOW, PAYLOAD.as_bytes()).unwrap();

        let event = verifier.verify_at(PAYLOAD.as_bytes(), &header, NOW).unwrap();
        assert_eq!(event.id, "evt_123");
        assert_eq!(event.event_type.as_str(), "payment_intent.created");
    }

    #[test]
    fn test_verify_with_current_time() {
        let verifier = create_test_verifier();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let header = sign_payload(SECRET, now, PAYLOAD.as_bytes()).unwrap();

        assert!(verifier.verify(PAYLOAD.as_bytes(), &header).is_ok());
    }

    #[test]
    fn test_verify_rejects_any_altered_byte() {
        let verifier = create_test_verifier();
        let header = sign_payload(SECRET, NOW, PAYLOAD.as_bytes()).unwrap();

        for i in 0..PAYLOAD.len() {
            let mut tampered = PAYLOAD.as_bytes().to_vec();
            tampered[i] ^= 0x01;
            assert_signature_invalid(verifier.verify_at(&tampered, &header, NOW), ERR_NO_MATCH);
        }
    }

    #[test]
    fn test_verify_wrong_secret() {
        let verifier = create_test_verifier();
        let header = sign_payload("whsec_other", NOW, PAYLOAD.as_bytes()).unwrap();

        assert_signature_invalid(verifier.verify_at(PAYLOAD.as_bytes(), &header, NOW), ERR_NO_MATCH);
    }

    #[test]
    fn test_verify_accepts_any_matching_v1() {
        let verifier = create_test_verifier();
        let valid = compute_signature(SECRET, NOW, PAYLOAD.as_bytes()).unwrap();
        let header = format!("t={},v1=deadbeef,v1={}", NOW, hex::encode(valid));

        assert!(verifier.verify_at(PAYLOAD.as_bytes(), &header, NOW).is_ok());
    }

    #[test]
    fn test_verify_malformed_header() {
        let verifier = create_test_verifier();
        assert_signature_invalid(
            verifier.verify_at(PAYLOAD.as_bytes(), "garbage", NOW),
            ERR_HEADER_FORMAT,
        );
    }

    #[test]
    fn test_verify_non_hex_signature() {
        let verifier = create_test_verifier();
        let header = format!("t={},v1=not-hex!", NOW);
        assert_signature_invalid(verifier.verify_at(PAYLOAD.as_bytes(), &header, NOW), ERR_NO_MATCH);
    }

    #[test]
    fn test_verify_old_timestamp() {
        let verifier = create_test_verifier();
        let old = NOW - 301;
        let header = sign_payload(SECRET, old, PAYLOAD.as_bytes()).unwrap();

        assert_signature_invalid(verifier.verify_at(PAYLOAD.as_bytes(), &header, NOW), ERR_TOLERANCE);
    }

    #[test]
    fn test_verify_tolerance_disabled() {
        let verifier = WebhookVerifier::new(SECRET.to_string(), 0);
        let header = sign_payload(SECRET, 1_000_000_000, PAYLOAD.as_bytes()).unwrap();

        assert!(verifier.verify_at(PAYLOAD.as_bytes(), &header, NOW).is_ok());
    }

    #[test]
    fn test_verify_valid_signature_invalid_json() {
        let verifier = create_test_verifier();
        let payload = b"not json";
        let header = sign_payload(SECRET, NOW, payload).unwrap();

        assert!(matches!(
            verifier.verify_at(payload, &header, NOW),
            Err(WebhookError::InvalidPayload)
        ));
    }
}
