#[cfg(feature = "email")]
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
#[cfg(feature = "email")]
use secrecy::ExposeSecret;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::Config;
use crate::error::AppError;

const CONFIRMATION_SUBJECT: &str = "Please confirm your booking";

/// メール送信サービス
///
/// `email` フィーチャー有効かつ SMTP 設定がある場合のみ実際に送信する。
/// それ以外（開発環境）はログ出力のみ。
#[derive(Clone)]
pub struct EmailService {
    #[cfg(feature = "email")]
    smtp: Option<SmtpMailer>,
    /// ログ出力のみの送信先（テスト用）
    #[cfg(test)]
    outbox: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(feature = "email")]
#[derive(Clone)]
struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    /// 設定から EmailService を作成
    pub fn new(config: &Config) -> Result<Self, AppError> {
        #[cfg(feature = "email")]
        {
            let smtp = match (&config.smtp_host, &config.smtp_from_address) {
                (Some(host), Some(from)) => Some(SmtpMailer::new(config, host, from)?),
                _ => {
                    tracing::info!("SMTP 未設定（ログ出力のみ）");
                    None
                }
            };
            Ok(Self {
                smtp,
                #[cfg(test)]
                outbox: Default::default(),
            })
        }

        #[cfg(not(feature = "email"))]
        {
            if config.smtp_host.is_some() {
                tracing::warn!("SMTP 設定がありますが email フィーチャーが無効です（ログ出力のみ）");
            }
            Ok(Self::log_only())
        }
    }

    /// 送信せずログ出力のみ行う EmailService
    pub fn log_only() -> Self {
        Self {
            #[cfg(feature = "email")]
            smtp: None,
            #[cfg(test)]
            outbox: Default::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn sent_to(&self) -> Vec<String> {
        self.outbox.lock().unwrap().clone()
    }

    /// 予約確認メールを送信
    ///
    /// `expires_at` は保存済みトークンの有効期限（本文に記載する）。
    ///
    /// # Security
    /// 確認URL（トークンを含む）は SMTP 未設定時の開発ログにのみ出力する
    pub async fn send_booking_confirmation_email(
        &self,
        to: &str,
        confirmation_url: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        let body = confirmation_body(confirmation_url, expires_at);

        #[cfg(feature = "email")]
        if let Some(smtp) = &self.smtp {
            smtp.send(to, CONFIRMATION_SUBJECT, &body).await?;
            tracing::info!(to = %to, "予約確認メール送信完了");
            return Ok(());
        }

        // 開発モード: メール送信せずログ出力のみ
        tracing::info!(to = %to, subject = CONFIRMATION_SUBJECT, "予約確認メール送信（開発モード）");
        tracing::debug!(body = %body, "確認メール本文");

        #[cfg(test)]
        self.outbox.lock().unwrap().push(to.to_string());

        Ok(())
    }
}

fn confirmation_body(confirmation_url: &str, expires_at: OffsetDateTime) -> String {
    let expires = expires_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| expires_at.to_string());
    format!(
        "Thank you for your booking.\n\n\
         Please confirm it by opening the link below. The link can be used once \
         and expires at {expires}.\n\n\
         {confirmation_url}\n"
    )
}

#[cfg(feature = "email")]
impl SmtpMailer {
    fn new(config: &Config, host: &str, from: &str) -> Result<Self, AppError> {
        let from: Mailbox = from.parse().map_err(|e| {
            tracing::error!(error = %e, "送信元アドレスが不正");
            AppError::Email(format!("invalid from address: {e}"))
        })?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::Email(format!("failed to create SMTP transport: {e}")))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(
                username.expose_secret().clone(),
                password.expose_secret().clone(),
            ));
        }

        tracing::info!(host = %host, port = config.smtp_port, "SMTP 送信を有効化");

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| AppError::Email(format!("invalid recipient address: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Email(format!("failed to build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Email(format!("failed to send: {e}")))?;

        Ok(())
    }
}
