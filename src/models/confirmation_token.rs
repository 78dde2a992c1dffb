use sqlx::FromRow;
use time::OffsetDateTime;

/// 予約・決済の確認トークン
///
/// トークン文字列そのものが主キー。メールのリンクに埋め込まれ、一度だけ使用できる。
/// 期限切れの判定は読み出し時に行い、レコードは削除しない。
#[derive(Debug, Clone, FromRow)]
pub struct ConfirmationToken {
    pub token: String,
    pub email: String,
    pub payment_reference: String,
    pub booking_id: Option<String>,
    pub coach_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub used: bool,
}

impl ConfirmationToken {
    /// `now` 時点で期限切れか（expires_at ちょうども期限切れ）
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// `now` 時点で消費可能か
    pub fn is_consumable_at(&self, now: OffsetDateTime) -> bool {
        !self.used && !self.is_expired_at(now)
    }
}

/// 確認トークン書き込みの結果
///
/// 同じ決済（payment_reference）に対するトークンは1件のみ。
/// 既に存在する場合は新規作成せず既存のレコードを返す。
#[derive(Debug, Clone)]
pub enum TokenInsert {
    Created(ConfirmationToken),
    Existing(ConfirmationToken),
}

impl TokenInsert {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn into_record(self) -> ConfirmationToken {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }
}

/// 確認トークン作成時の入力
#[derive(Debug, Clone)]
pub struct NewConfirmationToken {
    pub token: String,
    pub email: String,
    pub payment_reference: String,
    pub booking_id: Option<String>,
    pub coach_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl NewConfirmationToken {
    pub fn into_record(self) -> ConfirmationToken {
        ConfirmationToken {
            token: self.token,
            email: self.email,
            payment_reference: self.payment_reference,
            booking_id: self.booking_id,
            coach_id: self.coach_id,
            created_at: self.created_at,
            expires_at: self.expires_at,
            used: false,
        }
    }
}
