use secrecy::{ExposeSecret, SecretBox};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 確認エンドポイントを呼び出す公開サイトのオリジン（カンマ区切り、"*" で全許可）
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    // Stripe設定
    /// Stripe シークレットキー（sk_live_ / sk_test_）
    pub stripe_secret_key: SecretBox<String>,
    /// Webhook 署名シークレット（whsec_）
    pub stripe_webhook_secret: SecretBox<String>,
    /// 署名タイムスタンプの許容誤差（秒）
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: i64,
    /// 処理済みイベントIDの保持期間（秒）
    #[serde(default = "default_processed_event_retention_secs")]
    pub processed_event_retention_secs: i64,

    // 確認トークン設定
    #[serde(default)]
    pub confirmation_url_base: Option<String>,
    #[serde(default = "default_confirmation_token_ttl_secs")]
    pub confirmation_token_ttl_secs: i64,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
    #[serde(default)]
    pub smtp_from_address: Option<String>,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const DEFAULT_PROCESSED_EVENT_RETENTION_SECS: i64 = 30 * 24 * 60 * 60;
/// 7日間
pub const DEFAULT_CONFIRMATION_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_CONFIRMATION_URL_BASE: &str = "http://localhost:3000/confirm";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_database_max_connections() -> u32 {
    DEFAULT_DATABASE_MAX_CONNECTIONS
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_webhook_tolerance_secs() -> i64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_processed_event_retention_secs() -> i64 {
    DEFAULT_PROCESSED_EVENT_RETENTION_SECS
}

fn default_confirmation_token_ttl_secs() -> i64 {
    DEFAULT_CONFIRMATION_TOKEN_TTL_SECS
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// シークレットキーのプレフィックスから動作モードを判定
    pub fn stripe_mode(&self) -> StripeMode {
        StripeMode::from_secret_key(self.stripe_secret_key.expose_secret())
    }

    pub fn confirmation_url_base(&self) -> &str {
        self.confirmation_url_base
            .as_deref()
            .unwrap_or(DEFAULT_CONFIRMATION_URL_BASE)
    }
}

/// Stripe のキーモード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripeMode {
    Live,
    Test,
    Unknown,
}

impl StripeMode {
    pub fn from_secret_key(key: &str) -> Self {
        if key.starts_with("sk_live_") || key.starts_with("rk_live_") {
            Self::Live
        } else if key.starts_with("sk_test_") || key.starts_with("rk_test_") {
            Self::Test
        } else {
            Self::Unknown
        }
    }

    /// イベントの livemode と一致するか（判定不能な場合は一致扱い）
    pub fn matches_livemode(&self, livemode: bool) -> bool {
        match self {
            Self::Live => livemode,
            Self::Test => !livemode,
            Self::Unknown => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Test => "test",
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripe_mode_from_secret_key() {
        assert_eq!(StripeMode::from_secret_key("sk_live_abc"), StripeMode::Live);
        assert_eq!(StripeMode::from_secret_key("sk_test_abc"), StripeMode::Test);
        assert_eq!(StripeMode::from_secret_key("rk_test_abc"), StripeMode::Test);
        assert_eq!(StripeMode::from_secret_key("whatever"), StripeMode::Unknown);
    }

    #[test]
    fn test_stripe_mode_matches_livemode() {
        assert!(StripeMode::Live.matches_livemode(true));
        assert!(!StripeMode::Live.matches_livemode(false));
        assert!(StripeMode::Test.matches_livemode(false));
        assert!(StripeMode::Unknown.matches_livemode(true));
        assert!(StripeMode::Unknown.matches_livemode(false));
    }

    #[test]
    fn test_default_confirmation_ttl_is_seven_days() {
        assert_eq!(DEFAULT_CONFIRMATION_TOKEN_TTL_SECS, 604_800);
    }
}
