use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub candidate_cache_path: String,
    pub candidate_limit: usize,
    pub cache_ttl_hours: u64,

    // Polling
    pub max_poll_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub games_base_url: String,
    pub discovery_endpoints: Vec<String>,
    pub user_agent: String,

    // Detection
    pub growth_threshold: f64,
    pub mention_lookback_hours: i64,
    pub fuzzy_threshold: f64,
    pub keyword_hints: Vec<String>,
    pub mention_url_prefix: String,
    pub spike_limit: usize,

    pub cycle_interval: Duration,
}

/// File that may override the discovery endpoint list.
pub const SETTINGS_FILE: &str = "early_shift.toml";

pub const DEFAULT_DISCOVERY_ENDPOINTS: &[&str] = &[
    "https://games.roproxy.com/v1/discovery/universes",
    "https://games.roblox.com/v1/discovery/universes",
];

pub const DEFAULT_KEYWORD_HINTS: &[&str] = &[
    "new", "update", "secret", "mechanic", "code", "feature", "quest", "event",
];

/// Upper bound for hour-based settings (about a century), well inside what
/// `chrono::Duration` can hold.
pub const MAX_WINDOW_HOURS: i64 = 24 * 365 * 100;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    let parsed: Vec<String> = env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if parsed.is_empty() {
        default.iter().map(|s| s.to_string()).collect()
    } else {
        parsed
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let cycle_interval = match env::var("CYCLE_INTERVAL") {
            Ok(raw) => humantime::parse_duration(raw.trim())
                .map_err(|e| anyhow::anyhow!("CYCLE_INTERVAL '{}' is invalid: {}", raw, e))?,
            Err(_) => Duration::from_secs(4 * 60 * 60),
        };
        if cycle_interval.is_zero() {
            anyhow::bail!("CYCLE_INTERVAL must be greater than zero");
        }

        let growth_threshold: f64 = env_or("GROWTH_THRESHOLD", 0.25);
        if !growth_threshold.is_finite() {
            anyhow::bail!("GROWTH_THRESHOLD must be a finite number");
        }

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/early_shift.db".to_string()),
            candidate_cache_path: env::var("CANDIDATE_CACHE_PATH")
                .unwrap_or_else(|_| "data/early_shift.top_universes.json".to_string()),
            candidate_limit: env_or("CANDIDATE_LIMIT", 500),
            cache_ttl_hours: env_or("CACHE_TTL_HOURS", 4u64).min(MAX_WINDOW_HOURS as u64),
            max_poll_concurrency: env_or("MAX_POLL_CONCURRENCY", 12usize)
                .clamp(1, tokio::sync::Semaphore::MAX_PERMITS),
            fetch_timeout_secs: env_or("FETCH_TIMEOUT_SECS", 20),
            games_base_url: env::var("GAMES_BASE_URL")
                .unwrap_or_else(|_| "https://games.roproxy.com/v1/games".to_string()),
            discovery_endpoints: Self::load_discovery_endpoints(),
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "EarlyShiftBot/1.0".to_string()),
            growth_threshold,
            mention_lookback_hours: env_or("MENTION_LOOKBACK_HOURS", 48i64)
                .clamp(0, MAX_WINDOW_HOURS),
            fuzzy_threshold: env_or("FUZZY_THRESHOLD", 82.0),
            keyword_hints: env_list("KEYWORD_HINTS", DEFAULT_KEYWORD_HINTS)
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
            mention_url_prefix: env::var("MENTION_URL_PREFIX")
                .unwrap_or_else(|_| "https://youtube.com/watch?v=".to_string()),
            spike_limit: env_or("SPIKE_LIMIT", 50),
            cycle_interval,
        })
    }

    /// `early_shift.toml` wins over `DISCOVERY_ENDPOINTS`, which wins over the
    /// built-in list.
    pub fn load_discovery_endpoints() -> Vec<String> {
        if let Ok(content) = fs::read_to_string(SETTINGS_FILE) {
            if let Some(endpoints) = Self::parse_settings_endpoints(&content) {
                return endpoints;
            }
        }
        env_list("DISCOVERY_ENDPOINTS", DEFAULT_DISCOVERY_ENDPOINTS)
    }

    fn parse_settings_endpoints(content: &str) -> Option<Vec<String>> {
        #[derive(Deserialize)]
        struct Settings {
            #[serde(default)]
            discovery_endpoints: Vec<String>,
        }
        let settings = toml::from_str::<Settings>(content).ok()?;
        if settings.discovery_endpoints.is_empty() {
            None
        } else {
            Some(settings.discovery_endpoints)
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours.min(MAX_WINDOW_HOURS as u64) as i64)
    }

    pub fn mention_lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.mention_lookback_hours.clamp(0, MAX_WINDOW_HOURS))
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.fetch_timeout())
            .user_agent(&self.user_agent)
            .build()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: ":memory:".to_string(),
            candidate_cache_path: "early_shift.top_universes.json".to_string(),
            candidate_limit: 500,
            cache_ttl_hours: 4,
            max_poll_concurrency: 12,
            fetch_timeout_secs: 20,
            games_base_url: "https://games.roproxy.com/v1/games".to_string(),
            discovery_endpoints: DEFAULT_DISCOVERY_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            user_agent: "EarlyShiftBot/1.0".to_string(),
            growth_threshold: 0.25,
            mention_lookback_hours: 48,
            fuzzy_threshold: 82.0,
            keyword_hints: DEFAULT_KEYWORD_HINTS.iter().map(|s| s.to_string()).collect(),
            mention_url_prefix: "https://youtube.com/watch?v=".to_string(),
            spike_limit: 50,
            cycle_interval: Duration::from_secs(4 * 60 * 60),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("candidate_cache_path", &self.candidate_cache_path)
            .field("candidate_limit", &self.candidate_limit)
            .field("cache_ttl_hours", &self.cache_ttl_hours)
            .field("max_poll_concurrency", &self.max_poll_concurrency)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("games_base_url", &self.games_base_url)
            .field("discovery_endpoints", &self.discovery_endpoints)
            .field("growth_threshold", &self.growth_threshold)
            .field("mention_lookback_hours", &self.mention_lookback_hours)
            .field("fuzzy_threshold", &self.fuzzy_threshold)
            .field("keyword_hints", &self.keyword_hints.join(","))
            .field("spike_limit", &self.spike_limit)
            .field(
                "cycle_interval",
                &humantime::format_duration(self.cycle_interval).to_string(),
            )
            .finish_non_exhaustive()
    }
}
