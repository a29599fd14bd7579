/// Snapshot series, latest-known metadata and the mention feed.
pub const CORE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS snapshots (
        candidate_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        metric INTEGER NOT NULL,
        captured_at TEXT NOT NULL,
        PRIMARY KEY (candidate_id, captured_at)
    );
    CREATE INDEX IF NOT EXISTS idx_snapshots_captured ON snapshots (captured_at);

    CREATE TABLE IF NOT EXISTS candidate_metadata (
        candidate_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        root_place_id INTEGER,
        creator_id INTEGER,
        creator_name TEXT,
        description TEXT,
        genre TEXT,
        visits INTEGER,
        last_seen_metric INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    );

    -- Written by the external ingestion job; read-only here.
    CREATE TABLE IF NOT EXISTS mention_events (
        source_id TEXT PRIMARY KEY,
        channel_title TEXT NOT NULL DEFAULT '',
        title TEXT NOT NULL DEFAULT '',
        published_at TEXT NOT NULL,
        view_count INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_mentions_published ON mention_events (published_at);
";

/// Append-only; deliberately has no key.
pub const SPIKES_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS spikes (
        candidate_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        current_metric INTEGER NOT NULL,
        baseline_metric INTEGER NOT NULL,
        growth_percent REAL NOT NULL,
        published_at TEXT NOT NULL,
        mechanic_label TEXT NOT NULL,
        mention_title TEXT NOT NULL,
        source_id TEXT NOT NULL,
        source_url TEXT NOT NULL,
        channel_title TEXT NOT NULL,
        detected_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_spikes_detected ON spikes (detected_at);
";
