use crate::config::Config;
use crate::models::{
    parse_loose_ts, parse_sqlite_ts, to_sqlite_ts, CandidateDetails, CandidateMetadata, MentionEvent, Snapshot,
    Spike,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub mod schema;

/// Current/baseline pair for one candidate, as read by the growth query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrowthWindowRow {
    pub candidate_id: i64,
    pub name: String,
    pub current_metric: i64,
    pub baseline_metric: i64,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn ts_column(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_sqlite_ts(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp '{}'", raw).into(),
        )
    })
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        let conn = Connection::open(path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(schema::CORE_TABLES)?;
        conn.execute_batch(schema::SPIKES_TABLE)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs `f` on the blocking pool so SQLite work never stalls the runtime.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    // --- Snapshots ---

    /// Writes one poll cycle. Either every row lands or none does.
    pub fn persist_poll_batch(
        &self,
        captured_at: DateTime<Utc>,
        batch: &[CandidateDetails],
    ) -> anyhow::Result<()> {
        let ts = to_sqlite_ts(&captured_at);
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut delete = tx.prepare_cached(
                "DELETE FROM snapshots WHERE candidate_id = ?1 AND captured_at = ?2",
            )?;
            let mut insert = tx.prepare_cached(
                "INSERT INTO snapshots (candidate_id, name, metric, captured_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut upsert = tx.prepare_cached(
                "INSERT INTO candidate_metadata (
                    candidate_id, name, root_place_id, creator_id, creator_name,
                    description, genre, visits, last_seen_metric, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(candidate_id) DO UPDATE SET
                    name = ?2, root_place_id = ?3, creator_id = ?4, creator_name = ?5,
                    description = ?6, genre = ?7, visits = ?8, last_seen_metric = ?9,
                    updated_at = ?10",
            )?;

            for details in batch {
                debug!(
                    "Database: Writing snapshot for candidate {} (metric {})",
                    details.candidate_id, details.metric
                );
                delete.execute((details.candidate_id, &ts))?;
                insert.execute((details.candidate_id, &details.name, details.metric, &ts))?;
                upsert.execute(rusqlite::params![
                    details.candidate_id,
                    details.name,
                    details.root_place_id,
                    details.creator_id,
                    details.creator_name,
                    details.description,
                    details.genre,
                    details.visits,
                    details.metric,
                    ts,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn insert_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO snapshots (candidate_id, name, metric, captured_at) VALUES (?1, ?2, ?3, ?4)",
            (
                snapshot.candidate_id,
                &snapshot.name,
                snapshot.metric,
                to_sqlite_ts(&snapshot.captured_at),
            ),
        )?;
        Ok(())
    }

    pub fn list_snapshots(&self, candidate_id: i64) -> anyhow::Result<Vec<Snapshot>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT candidate_id, name, metric, captured_at FROM snapshots
             WHERE candidate_id = ?1 ORDER BY captured_at ASC",
        )?;
        let rows = stmt.query_map([candidate_id], |row| {
            Ok(Snapshot {
                candidate_id: row.get(0)?,
                name: row.get(1)?,
                metric: row.get(2)?,
                captured_at: ts_column(row, 3)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn count_snapshots(&self) -> anyhow::Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn get_metadata(&self, candidate_id: i64) -> anyhow::Result<Option<CandidateMetadata>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT candidate_id, name, root_place_id, creator_id, creator_name,
                        description, genre, visits, last_seen_metric, updated_at
                 FROM candidate_metadata WHERE candidate_id = ?1",
                [candidate_id],
                |row| {
                    Ok(CandidateMetadata {
                        candidate_id: row.get(0)?,
                        name: row.get(1)?,
                        root_place_id: row.get(2)?,
                        creator_id: row.get(3)?,
                        creator_name: row.get(4)?,
                        description: row.get(5)?,
                        genre: row.get(6)?,
                        visits: row.get(7)?,
                        last_seen_metric: row.get(8)?,
                        updated_at: ts_column(row, 9)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Latest snapshot per candidate joined with the latest snapshot at or
    /// before `baseline_cutoff`. Both sides rank by `captured_at DESC, rowid
    /// DESC`, so the most recently inserted row wins a timestamp tie.
    /// Candidates without a positive baseline are left out.
    pub fn growth_window_rows(
        &self,
        baseline_cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<GrowthWindowRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "WITH ranked_current AS (
                SELECT candidate_id, name, metric,
                       ROW_NUMBER() OVER (
                           PARTITION BY candidate_id ORDER BY captured_at DESC, rowid DESC
                       ) AS rn
                FROM snapshots
             ),
             ranked_baseline AS (
                SELECT candidate_id, metric,
                       ROW_NUMBER() OVER (
                           PARTITION BY candidate_id ORDER BY captured_at DESC, rowid DESC
                       ) AS rn
                FROM snapshots
                WHERE captured_at <= ?1
             )
             SELECT cur.candidate_id,
                    COALESCE(meta.name, cur.name),
                    cur.metric,
                    base.metric
             FROM ranked_current cur
             JOIN ranked_baseline base
               ON base.candidate_id = cur.candidate_id AND base.rn = 1
             LEFT JOIN candidate_metadata meta ON meta.candidate_id = cur.candidate_id
             WHERE cur.rn = 1 AND base.metric > 0
             ORDER BY cur.candidate_id",
        )?;

        let rows = stmt.query_map([to_sqlite_ts(&baseline_cutoff)], |row| {
            Ok(GrowthWindowRow {
                candidate_id: row.get(0)?,
                name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                current_metric: row.get(2)?,
                baseline_metric: row.get(3)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        debug!("Database: Growth window query returned {} rows", results.len());
        Ok(results)
    }

    // --- Mentions ---

    pub fn save_mention(&self, mention: &MentionEvent) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO mention_events (source_id, channel_title, title, published_at, view_count)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_id) DO UPDATE SET
                channel_title = ?2, title = ?3, published_at = ?4, view_count = ?5",
            (
                &mention.source_id,
                &mention.channel_title,
                &mention.title,
                to_sqlite_ts(&mention.published_at),
                mention.view_count,
            ),
        )?;
        Ok(())
    }

    /// Mentions published at or after `since`. `mention_events` is filled by
    /// another job, so `published_at` is compared as a point in time rather
    /// than as text, and rows whose timestamp can't be read are skipped.
    pub fn recent_mentions(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<MentionEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT source_id, channel_title, title, published_at, view_count,
                    strftime('%Y-%m-%d %H:%M:%f', published_at)
             FROM mention_events
             WHERE julianday(published_at) IS NULL
                OR julianday(published_at) >= julianday(?1)
             ORDER BY julianday(published_at) DESC",
        )?;
        let rows = stmt.query_map([to_sqlite_ts(&since)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (source_id, channel_title, title, raw_published, view_count, normalized) = row?;
            let published_at = parse_loose_ts(&raw_published)
                .or_else(|| normalized.as_deref().and_then(parse_sqlite_ts));
            let Some(published_at) = published_at else {
                warn!(
                    "Database: skipping mention {} with unreadable published_at '{}'",
                    source_id, raw_published
                );
                continue;
            };
            results.push(MentionEvent {
                source_id,
                channel_title,
                title,
                published_at,
                view_count,
            });
        }
        Ok(results)
    }

    // --- Spikes ---

    pub fn append_spikes(&self, spikes: &[Spike]) -> anyhow::Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        conn.execute_batch(schema::SPIKES_TABLE)?;
        let tx = conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO spikes (
                    candidate_id, name, current_metric, baseline_metric, growth_percent,
                    published_at, mechanic_label, mention_title, source_id, source_url,
                    channel_title, detected_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for spike in spikes {
                insert.execute(rusqlite::params![
                    spike.candidate_id,
                    spike.name,
                    spike.current_metric,
                    spike.baseline_metric,
                    spike.growth_percent,
                    to_sqlite_ts(&spike.published_at),
                    spike.mechanic_label,
                    spike.mention_title,
                    spike.source_id,
                    spike.source_url,
                    spike.channel_title,
                    to_sqlite_ts(&spike.detected_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(spikes.len())
    }

    pub fn recent_spikes(&self, limit: usize) -> anyhow::Result<Vec<Spike>> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(schema::SPIKES_TABLE)?;
        let mut stmt = conn.prepare(
            "SELECT candidate_id, name, current_metric, baseline_metric, growth_percent,
                    published_at, mechanic_label, mention_title, source_id, source_url,
                    channel_title, detected_at
             FROM spikes
             ORDER BY detected_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(Spike {
                candidate_id: row.get(0)?,
                name: row.get(1)?,
                current_metric: row.get(2)?,
                baseline_metric: row.get(3)?,
                growth_percent: row.get(4)?,
                published_at: ts_column(row, 5)?,
                mechanic_label: row.get(6)?,
                mention_title: row.get(7)?,
                source_id: row.get(8)?,
                source_url: row.get(9)?,
                channel_title: row.get(10)?,
                detected_at: ts_column(row, 11)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        debug!("Database: Loaded {} spikes", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn test_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    fn details(id: i64, name: &str, metric: i64) -> CandidateDetails {
        CandidateDetails {
            name: name.to_string(),
            metric,
            genre: Some("Adventure".to_string()),
            ..CandidateDetails::unknown(id)
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_poll_batch_writes_snapshots_and_metadata() {
        let db = test_db();
        db.persist_poll_batch(t0(), &[details(1, "Alpha", 100), details(2, "Beta", 50)])
            .unwrap();
        assert_eq!(db.count_snapshots().unwrap(), 2);

        // Same timestamp again: overwritten, not duplicated
        db.persist_poll_batch(t0(), &[details(1, "Alpha Renamed", 120)])
            .unwrap();
        assert_eq!(db.count_snapshots().unwrap(), 2);
        let series = db.list_snapshots(1).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].metric, 120);

        let meta = db.get_metadata(1).unwrap().unwrap();
        assert_eq!(meta.name, "Alpha Renamed");
        assert_eq!(meta.last_seen_metric, 120);
        assert_eq!(meta.genre.as_deref(), Some("Adventure"));
        assert_eq!(meta.updated_at, t0());
        assert!(db.get_metadata(99).unwrap().is_none());
    }

    #[test]
    fn test_poll_batch_is_atomic() {
        let db = test_db();
        {
            // Simulated failure on the third row of the batch
            let conn = db.conn.lock().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER fail_mid_batch BEFORE INSERT ON snapshots
                 WHEN NEW.candidate_id = 3
                 BEGIN SELECT RAISE(ABORT, 'simulated failure'); END;",
            )
            .unwrap();
        }

        let batch = vec![details(1, "A", 10), details(2, "B", 20), details(3, "C", 30)];
        let result = db.persist_poll_batch(t0(), &batch);
        assert!(result.is_err());
        assert_eq!(db.count_snapshots().unwrap(), 0);
        assert!(db.get_metadata(1).unwrap().is_none());
    }

    #[test]
    fn test_growth_window_rows() {
        let db = test_db();
        let now = t0();
        let week_ago = now - Duration::days(7);

        // Growing candidate with two baseline-eligible rows; the later one wins
        db.persist_poll_batch(week_ago - Duration::days(1), &[details(1, "Alpha", 1)]).unwrap();
        db.persist_poll_batch(week_ago, &[details(1, "Alpha", 5000), details(2, "Zero", 0)])
            .unwrap();
        // Too recent to be a baseline
        db.persist_poll_batch(now - Duration::days(3), &[details(3, "Fresh", 10)]).unwrap();
        db.persist_poll_batch(
            now,
            &[details(1, "Alpha", 10000), details(2, "Zero", 500), details(3, "Fresh", 900)],
        )
        .unwrap();

        let rows = db.growth_window_rows(week_ago).unwrap();
        assert_eq!(
            rows,
            vec![GrowthWindowRow {
                candidate_id: 1,
                name: "Alpha".to_string(),
                current_metric: 10000,
                baseline_metric: 5000,
            }]
        );
    }

    #[test]
    fn test_growth_window_tie_break_prefers_latest_insert() {
        let db = test_db();
        {
            // Bypass the primary key to force a timestamp tie
            let conn = db.conn.lock().unwrap();
            conn.execute_batch(
                "DROP TABLE snapshots;
                 CREATE TABLE snapshots (candidate_id INTEGER, name TEXT, metric INTEGER, captured_at TEXT);",
            )
            .unwrap();
        }
        let base = t0() - Duration::days(8);
        for metric in [100, 200] {
            db.insert_snapshot(&Snapshot {
                candidate_id: 7,
                name: "Tie".to_string(),
                metric,
                captured_at: base,
            })
            .unwrap();
        }

        let rows = db.growth_window_rows(t0() - Duration::days(7)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].current_metric, 200);
        assert_eq!(rows[0].baseline_metric, 200);
    }

    #[test]
    fn test_recent_mentions_window() {
        let db = test_db();
        let now = t0();
        for (id, hours_ago) in [("fresh", 1), ("edge", 48), ("stale", 49)] {
            db.save_mention(&MentionEvent {
                source_id: id.to_string(),
                channel_title: "Channel".to_string(),
                title: format!("Video {}", id),
                published_at: now - Duration::hours(hours_ago),
                view_count: 10,
            })
            .unwrap();
        }

        let mentions = db.recent_mentions(now - Duration::hours(48)).unwrap();
        let ids: Vec<_> = mentions.iter().map(|m| m.source_id.as_str()).collect();
        assert_eq!(ids, vec!["fresh", "edge"]);
    }

    #[test]
    fn test_recent_mentions_mixed_timestamp_formats() {
        let db = test_db();
        let since = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        db.save_mention(&MentionEvent {
            source_id: "ours".to_string(),
            channel_title: "Channel".to_string(),
            title: "Native row".to_string(),
            published_at: since + Duration::hours(3),
            view_count: 5,
        })
        .unwrap();
        {
            let conn = db.conn.lock().unwrap();
            for (id, published_at) in [
                ("iso_fresh", "2025-06-01T14:00:00Z"),
                ("offset_fresh", "2025-06-01T15:30:00+02:00"),
                ("iso_stale", "2025-06-01T10:00:00Z"),
                ("no_fraction_edge", "2025-06-01 12:00:00"),
                ("garbage", "sometime last week"),
            ] {
                conn.execute(
                    "INSERT INTO mention_events (source_id, channel_title, title, published_at, view_count)
                     VALUES (?1, 'Channel', 'External row', ?2, 1)",
                    (id, published_at),
                )
                .unwrap();
            }
        }

        let mentions = db.recent_mentions(since).unwrap();
        let ids: Vec<_> = mentions.iter().map(|m| m.source_id.as_str()).collect();
        assert_eq!(ids, vec!["ours", "iso_fresh", "offset_fresh", "no_fraction_edge"]);
        assert_eq!(
            mentions[2].published_at,
            Utc.with_ymd_and_hms(2025, 6, 1, 13, 30, 0).unwrap()
        );
        assert_eq!(mentions[3].published_at, since);
    }

    #[test]
    fn test_spikes_table_created_on_first_use() {
        let db = Database::open(":memory:").unwrap();
        // No execute_init: reading and appending must still work
        assert!(db.recent_spikes(10).unwrap().is_empty());
        let spike = Spike {
            candidate_id: 1,
            name: "Game".to_string(),
            current_metric: 2,
            baseline_metric: 1,
            growth_percent: 100.0,
            published_at: t0(),
            mechanic_label: "Pets".to_string(),
            mention_title: "New Pets".to_string(),
            source_id: "abc".to_string(),
            source_url: "https://youtube.com/watch?v=abc".to_string(),
            channel_title: "Chan".to_string(),
            detected_at: t0(),
        };
        assert_eq!(db.append_spikes(&[spike.clone()]).unwrap(), 1);
        assert_eq!(db.recent_spikes(10).unwrap(), vec![spike]);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let db = test_db();
        let count = db
            .run_blocking(|db| {
                db.persist_poll_batch(t0(), &[details(1, "A", 1)])?;
                db.count_snapshots()
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
