use crate::cache::unique_ids;
use crate::client::MetricFetcher;
use crate::clock::Clock;
use crate::db::Database;
use crate::models::CandidateDetails;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub captured_at: DateTime<Utc>,
    pub polled: usize,
    pub degraded: usize,
}

pub struct SnapshotPoller {
    db: Database,
    fetcher: Arc<dyn MetricFetcher>,
    clock: Arc<dyn Clock>,
    max_concurrency: usize,
}

impl SnapshotPoller {
    pub fn new(
        db: Database,
        fetcher: Arc<dyn MetricFetcher>,
        clock: Arc<dyn Clock>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            db,
            fetcher,
            clock,
            max_concurrency: max_concurrency.clamp(1, Semaphore::MAX_PERMITS),
        }
    }

    /// Fetches every candidate (at most `max_concurrency` in flight) and
    /// commits the whole cycle under one shared timestamp. Returns `None` when
    /// there was nothing to poll.
    pub async fn poll(&self, candidate_ids: &[i64]) -> anyhow::Result<Option<PollReport>> {
        let ids = unique_ids(candidate_ids.iter().copied());
        if ids.is_empty() {
            info!("Poller: no candidate IDs supplied, skipping poll");
            return Ok(None);
        }

        let captured_at = self.clock.now();
        let (batch, degraded) = self.fetch_all(&ids).await;

        let polled = batch.len();
        self.db
            .run_blocking(move |db| db.persist_poll_batch(captured_at, &batch))
            .await?;

        info!(
            "Poller: polled {} candidates at {} ({} degraded)",
            polled,
            captured_at.to_rfc3339(),
            degraded
        );
        Ok(Some(PollReport {
            captured_at,
            polled,
            degraded,
        }))
    }

    /// Results come back in the same order as `ids`.
    async fn fetch_all(&self, ids: &[i64]) -> (Vec<CandidateDetails>, usize) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut workers = JoinSet::new();

        for (index, &candidate_id) in ids.iter().enumerate() {
            let semaphore = semaphore.clone();
            let fetcher = self.fetcher.clone();
            workers.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = fetcher.fetch(candidate_id).await;
                (index, candidate_id, result)
            });
        }

        let mut slots: Vec<Option<CandidateDetails>> = vec![None; ids.len()];
        let mut degraded = 0usize;
        while let Some(joined) = workers.join_next().await {
            // A panicked task leaves its slot empty and is degraded below
            let (index, candidate_id, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!("Poller: fetch task aborted: {}", e);
                    continue;
                }
            };
            let details = match result {
                Ok(details) => details,
                Err(e) => {
                    warn!("Poller: fetch for candidate {} failed: {}", candidate_id, e);
                    degraded += 1;
                    CandidateDetails::unknown(candidate_id)
                }
            };
            slots[index] = Some(details);
        }

        let batch = slots
            .into_iter()
            .zip(ids)
            .map(|(slot, &id)| {
                slot.unwrap_or_else(|| {
                    degraded += 1;
                    CandidateDetails::unknown(id)
                })
            })
            .collect();
        (batch, degraded)
    }
}
