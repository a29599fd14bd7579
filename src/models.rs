use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name recorded when a candidate could not be fetched.
pub const UNKNOWN_NAME: &str = "Unknown";

const SQLITE_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Fixed-width UTC text so that lexical order in SQLite matches time order.
pub fn to_sqlite_ts(ts: &DateTime<Utc>) -> String {
    ts.format(SQLITE_TS_FORMAT).to_string()
}

pub fn parse_sqlite_ts(ts: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Timestamps written by other producers: our own format, RFC 3339, or a
/// naive `T`-separated ISO string (taken as UTC).
pub fn parse_loose_ts(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Some(parsed) = parse_sqlite_ts(ts) {
        return Some(parsed);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Everything the metric endpoint tells us about one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDetails {
    pub candidate_id: i64,
    pub name: String,
    pub metric: i64,
    pub root_place_id: Option<i64>,
    pub description: Option<String>,
    pub creator_id: Option<i64>,
    pub creator_name: Option<String>,
    pub genre: Option<String>,
    pub visits: Option<i64>,
}

impl CandidateDetails {
    /// Zero-value stand-in for a candidate whose fetch failed.
    pub fn unknown(candidate_id: i64) -> Self {
        Self {
            candidate_id,
            name: UNKNOWN_NAME.to_string(),
            metric: 0,
            root_place_id: None,
            description: None,
            creator_id: None,
            creator_name: None,
            genre: None,
            visits: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub candidate_id: i64,
    pub name: String,
    pub metric: i64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMetadata {
    pub candidate_id: i64,
    pub name: String,
    pub root_place_id: Option<i64>,
    pub creator_id: Option<i64>,
    pub creator_name: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub visits: Option<i64>,
    pub last_seen_metric: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthCandidate {
    pub candidate_id: i64,
    pub name: String,
    pub current_metric: i64,
    pub baseline_metric: i64,
    pub growth_rate: f64,
    pub evaluated_at: DateTime<Utc>,
}

impl GrowthCandidate {
    pub fn growth_percent(&self) -> f64 {
        self.growth_rate * 100.0
    }

    /// One decimal, for display only.
    pub fn growth_percent_display(&self) -> String {
        format!("{:.1}%", self.growth_percent())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionEvent {
    pub source_id: String,
    pub channel_title: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub view_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spike {
    pub candidate_id: i64,
    pub name: String,
    pub current_metric: i64,
    pub baseline_metric: i64,
    pub growth_percent: f64,
    pub published_at: DateTime<Utc>,
    pub mechanic_label: String,
    pub mention_title: String,
    pub source_id: String,
    pub source_url: String,
    pub channel_title: String,
    pub detected_at: DateTime<Utc>,
}
