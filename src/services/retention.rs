use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::repositories::ProcessedEventStore;

/// 処理済みイベントIDの削除間隔
pub const PURGE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// 保持期間を過ぎた処理済みイベントIDを定期的に削除する
///
/// 確認トークンは対象外（期限は読み出し時に判定し、レコードは残す）。
#[derive(Clone)]
pub struct ProcessedEventPurger {
    store: Arc<dyn ProcessedEventStore>,
    retention: Duration,
}

impl ProcessedEventPurger {
    pub fn new(store: Arc<dyn ProcessedEventStore>, retention_secs: i64) -> Self {
        Self {
            store,
            retention: Duration::seconds(retention_secs),
        }
    }

    /// 1回分の削除を実行し、削除件数を返す
    pub async fn purge_once(&self, now: OffsetDateTime) -> Result<u64, sqlx::Error> {
        let deleted = self.store.purge_before(now - self.retention).await?;
        if deleted > 0 {
            tracing::info!(deleted, "保持期間切れの処理済みイベントIDを削除");
        }
        Ok(deleted)
    }

    /// バックグラウンドタスクとして起動
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PURGE_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = self.purge_once(OffsetDateTime::now_utc()).await {
                    tracing::error!(error = ?e, "処理済みイベントIDの削除に失敗");
                }
            }
        })
    }
}
