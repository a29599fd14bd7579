use crate::clock::Clock;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    generated_at: Option<String>,
    #[serde(default, alias = "universe_ids")]
    ids: Vec<i64>,
}

/// The last resolved candidate list, kept on disk between runs.
pub struct CandidateCache {
    path: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

fn parse_generated_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Older files were written without an offset; those are UTC.
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Order-preserving dedup.
pub fn unique_ids(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

impl CandidateCache {
    pub fn new(path: impl AsRef<Path>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ttl,
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached list if it is younger than the TTL. An entry exactly as old
    /// as the TTL is expired. Any unreadable file is a miss.
    pub fn get(&self) -> Option<Vec<i64>> {
        let content = fs::read_to_string(&self.path).ok()?;
        let cached: CacheFile = match serde_json::from_str(&content) {
            Ok(cached) => cached,
            Err(e) => {
                debug!("Candidate cache at {:?} is unreadable: {}", self.path, e);
                return None;
            }
        };
        let generated_at = parse_generated_at(cached.generated_at.as_deref()?)?;
        let age = self.clock.now() - generated_at;
        if age >= self.ttl {
            debug!("Candidate cache expired ({} minutes old)", age.num_minutes());
            return None;
        }
        Some(cached.ids)
    }

    pub fn put(&self, ids: &[i64]) -> anyhow::Result<()> {
        let payload = CacheFile {
            generated_at: Some(self.clock.now().to_rfc3339()),
            ids: unique_ids(ids.iter().copied()),
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string(&payload)?)?;
        Ok(())
    }
}
