use crate::clock::Clock;
use crate::db::Database;
use crate::models::MentionEvent;
use chrono::Duration;
use std::sync::Arc;

/// Read side of the mention stream written by the ingestion job.
pub struct MentionFeed {
    db: Database,
    clock: Arc<dyn Clock>,
    lookback: Duration,
}

impl MentionFeed {
    pub fn new(db: Database, clock: Arc<dyn Clock>, lookback: Duration) -> Self {
        Self { db, clock, lookback }
    }

    /// Mentions published within the lookback window, newest first.
    pub async fn recent(&self) -> anyhow::Result<Vec<MentionEvent>> {
        let since = self.clock.now() - self.lookback;
        self.db
            .run_blocking(move |db| db.recent_mentions(since))
            .await
    }
}
