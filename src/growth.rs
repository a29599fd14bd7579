use crate::clock::Clock;
use crate::db::{Database, GrowthWindowRow};
use crate::models::{GrowthCandidate, UNKNOWN_NAME};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

/// Baseline snapshots must be at least this old.
pub const BASELINE_AGE_DAYS: i64 = 7;

/// `(current - baseline) / baseline`, or `None` when the baseline is not
/// positive and growth is undefined.
pub fn growth_rate(current: i64, baseline: i64) -> Option<f64> {
    if baseline <= 0 {
        return None;
    }
    Some((current - baseline) as f64 / baseline as f64)
}

/// Keeps the rows whose growth meets `threshold`, highest growth first.
pub fn select_growth(
    rows: Vec<GrowthWindowRow>,
    threshold: f64,
    evaluated_at: DateTime<Utc>,
) -> Vec<GrowthCandidate> {
    let mut candidates: Vec<GrowthCandidate> = rows
        .into_iter()
        .filter_map(|row| {
            let rate = growth_rate(row.current_metric, row.baseline_metric)?;
            if rate < threshold {
                return None;
            }
            let name = if row.name.trim().is_empty() {
                UNKNOWN_NAME.to_string()
            } else {
                row.name
            };
            Some(GrowthCandidate {
                candidate_id: row.candidate_id,
                name,
                current_metric: row.current_metric,
                baseline_metric: row.baseline_metric,
                growth_rate: rate,
                evaluated_at,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.growth_rate
            .partial_cmp(&a.growth_rate)
            .unwrap_or(Ordering::Equal)
            .then(a.candidate_id.cmp(&b.candidate_id))
    });
    candidates
}

pub struct GrowthEvaluator {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl GrowthEvaluator {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn evaluate(&self, growth_threshold: f64) -> anyhow::Result<Vec<GrowthCandidate>> {
        let now = self.clock.now();
        let cutoff = now - Duration::days(BASELINE_AGE_DAYS);
        let rows = self
            .db
            .run_blocking(move |db| db.growth_window_rows(cutoff))
            .await?;

        let candidates = select_growth(rows, growth_threshold, now);
        info!(
            "Growth: {} candidates at or above {:.1}% growth",
            candidates.len(),
            growth_threshold * 100.0
        );
        Ok(candidates)
    }
}
