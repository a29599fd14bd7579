use crate::db::Database;
use crate::models::Spike;

/// Append-only log of detected spikes. Nothing here updates or deletes.
///
/// Rows carry no uniqueness key: running detection twice over the same
/// window appends the same pairs twice. Consumers that need a canonical feed
/// dedupe on `(candidate_id, source_id)` themselves.
#[derive(Clone)]
pub struct SpikeStore {
    db: Database,
}

impl SpikeStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn persist(&self, spikes: Vec<Spike>) -> anyhow::Result<usize> {
        if spikes.is_empty() {
            return Ok(0);
        }
        self.db
            .run_blocking(move |db| db.append_spikes(&spikes))
            .await
    }

    /// Most recent first, by detection time.
    pub async fn retrieve(&self, limit: usize) -> anyhow::Result<Vec<Spike>> {
        self.db.run_blocking(move |db| db.recent_spikes(limit)).await
    }
}
