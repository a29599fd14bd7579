use crate::config::Config;
use crate::models::{CandidateDetails, UNKNOWN_NAME};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Largest page the discovery API hands out.
const MAX_DISCOVERY_PAGE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no data returned for candidate {0}")]
    Empty(i64),
}

/// Fetches the current metric and descriptive fields for one candidate.
#[async_trait]
pub trait MetricFetcher: Send + Sync {
    async fn fetch(&self, candidate_id: i64) -> Result<CandidateDetails, FetchError>;
}

/// Produces candidate IDs from the discovery endpoints.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn discover(&self, limit: usize) -> Vec<i64>;
}

/// Fetches a single discovery page. `Ok(None)` means the endpoint answered
/// with something other than 200 and paging should stop there.
#[async_trait]
pub trait DiscoveryPages: Send + Sync {
    async fn fetch_page(
        &self,
        endpoint: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<Option<DiscoveryPage>, FetchError>;
}

#[derive(Deserialize)]
struct GamesResponse {
    #[serde(default)]
    data: Vec<GameEntry>,
}

#[derive(Deserialize)]
struct GameEntry {
    name: Option<String>,
    playing: Option<i64>,
    #[serde(rename = "rootPlaceId")]
    root_place_id: Option<i64>,
    description: Option<String>,
    creator: Option<CreatorEntry>,
    genre: Option<String>,
    visits: Option<i64>,
}

#[derive(Deserialize)]
struct CreatorEntry {
    id: Option<i64>,
    name: Option<String>,
}

/// Turns a `/v1/games` response body into details for `candidate_id`.
pub fn parse_details_payload(candidate_id: i64, body: &[u8]) -> Result<CandidateDetails, FetchError> {
    let response: GamesResponse = serde_json::from_slice(body)?;
    let game = response
        .data
        .into_iter()
        .next()
        .ok_or(FetchError::Empty(candidate_id))?;
    let (creator_id, creator_name) = match game.creator {
        Some(creator) => (creator.id, creator.name),
        None => (None, None),
    };

    Ok(CandidateDetails {
        candidate_id,
        name: game.name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        metric: game.playing.unwrap_or(0).max(0),
        root_place_id: game.root_place_id,
        description: game.description,
        creator_id,
        creator_name,
        genre: game.genre,
        visits: game.visits,
    })
}

/// One page of discovery results. `entries` counts every listed entry,
/// including ones without a usable ID.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryPage {
    pub entries: usize,
    pub ids: Vec<i64>,
    pub next_cursor: Option<String>,
}

fn entry_id(entry: &Value) -> Option<i64> {
    let raw = entry
        .get("id")
        .filter(|v| !v.is_null())
        .or_else(|| entry.get("universeId"))?;
    let id = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

/// Accepts either `data` or `universes` for the entries and either
/// `nextPageCursor` or `nextPageToken` for the cursor.
pub fn parse_discovery_page(payload: &Value) -> DiscoveryPage {
    let entries = payload
        .get("data")
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
        .or_else(|| payload.get("universes").and_then(Value::as_array));

    let (entries, ids) = entries
        .map(|entries| (entries.len(), entries.iter().filter_map(entry_id).collect()))
        .unwrap_or_default();

    let next_cursor = ["nextPageCursor", "nextPageToken"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_str))
        .find(|cursor| !cursor.is_empty())
        .map(str::to_string);

    DiscoveryPage {
        entries,
        ids,
        next_cursor,
    }
}

pub struct RoProxyClient {
    http: reqwest::Client,
    games_base_url: String,
    discovery_endpoints: Vec<String>,
}

impl RoProxyClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            http: config.http_client()?,
            games_base_url: config.games_base_url.clone(),
            discovery_endpoints: config.discovery_endpoints.clone(),
        })
    }
}

/// Pages through one endpoint, adding unseen IDs to `ids` until `limit`
/// is reached or the endpoint runs dry.
async fn collect_from_endpoint(
    pages: &dyn DiscoveryPages,
    endpoint: &str,
    limit: usize,
    ids: &mut Vec<i64>,
    seen: &mut HashSet<i64>,
) -> Result<(), FetchError> {
    let mut cursor: Option<String> = None;
    while ids.len() < limit {
        let page_size = MAX_DISCOVERY_PAGE.min(limit - ids.len());
        let Some(page) = pages.fetch_page(endpoint, page_size, cursor.as_deref()).await? else {
            break;
        };
        if page.entries == 0 {
            break;
        }
        for id in page.ids {
            if ids.len() >= limit {
                break;
            }
            if seen.insert(id) {
                ids.push(id);
            }
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(())
}

/// Tries each endpoint in order and keeps the IDs of the first one that
/// yields any. A failing endpoint is logged and the next one is tried.
pub async fn discover_ids(
    pages: &dyn DiscoveryPages,
    endpoints: &[String],
    limit: usize,
) -> Vec<i64> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    for endpoint in endpoints {
        if let Err(e) = collect_from_endpoint(pages, endpoint, limit, &mut ids, &mut seen).await {
            warn!("Discovery: unable to fetch from {}: {}", endpoint, e);
        }
        if !ids.is_empty() {
            debug!("Discovery: {} yielded {} candidates", endpoint, ids.len());
            break;
        }
    }
    ids
}

#[async_trait]
impl DiscoveryPages for RoProxyClient {
    async fn fetch_page(
        &self,
        endpoint: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<Option<DiscoveryPage>, FetchError> {
        let mut query = vec![
            ("SortType", "Popular".to_string()),
            ("Limit", page_size.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("Cursor", cursor.to_string()));
        }

        let resp = self
            .http
            .get(endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&query)
            .send()
            .await?;
        if resp.status() != reqwest::StatusCode::OK {
            debug!("Discovery: {} answered {}", endpoint, resp.status());
            return Ok(None);
        }
        let body = resp.bytes().await?;
        let payload: Value = serde_json::from_slice(&body)?;
        Ok(Some(parse_discovery_page(&payload)))
    }
}

#[async_trait]
impl DiscoverySource for RoProxyClient {
    async fn discover(&self, limit: usize) -> Vec<i64> {
        discover_ids(self, &self.discovery_endpoints, limit).await
    }
}

#[async_trait]
impl MetricFetcher for RoProxyClient {
    async fn fetch(&self, candidate_id: i64) -> Result<CandidateDetails, FetchError> {
        let resp = self
            .http
            .get(&self.games_base_url)
            .query(&[("universeIds", candidate_id)])
            .send()
            .await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(FetchError::Status(resp.status()));
        }
        let body = resp.bytes().await?;
        parse_details_payload(candidate_id, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Reply {
        Page(DiscoveryPage),
        NotOk,
        Broken,
    }

    /// Canned discovery pages keyed by endpoint and cursor.
    #[derive(Default)]
    struct FakePages {
        replies: HashMap<(String, Option<String>), Reply>,
        calls: Mutex<Vec<(String, usize, Option<String>)>>,
    }

    impl FakePages {
        fn page(mut self, endpoint: &str, cursor: Option<&str>, ids: &[i64], next: Option<&str>) -> Self {
            let page = DiscoveryPage {
                entries: ids.len(),
                ids: ids.to_vec(),
                next_cursor: next.map(str::to_string),
            };
            self.replies
                .insert((endpoint.to_string(), cursor.map(str::to_string)), Reply::Page(page));
            self
        }

        fn reply(mut self, endpoint: &str, reply: Reply) -> Self {
            self.replies.insert((endpoint.to_string(), None), reply);
            self
        }

        fn calls(&self) -> Vec<(String, usize, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DiscoveryPages for FakePages {
        async fn fetch_page(
            &self,
            endpoint: &str,
            page_size: usize,
            cursor: Option<&str>,
        ) -> Result<Option<DiscoveryPage>, FetchError> {
            self.calls.lock().unwrap().push((
                endpoint.to_string(),
                page_size,
                cursor.map(str::to_string),
            ));
            match self.replies.get(&(endpoint.to_string(), cursor.map(str::to_string))) {
                Some(Reply::Page(page)) => Ok(Some(page.clone())),
                Some(Reply::NotOk) => Ok(None),
                Some(Reply::Broken) => Err(FetchError::Decode(
                    serde_json::from_str::<Value>("<html>").unwrap_err(),
                )),
                None => Ok(Some(DiscoveryPage::default())),
            }
        }
    }

    fn endpoints(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn three_pages() -> FakePages {
        FakePages::default()
            .page("a", None, &[1, 2, 3], Some("c1"))
            .page("a", Some("c1"), &[3, 4, 5], Some("c2"))
            .page("a", Some("c2"), &[6, 7], None)
    }

    #[tokio::test]
    async fn test_discovery_follows_cursor_and_dedups() {
        let pages = three_pages();
        let ids = discover_ids(&pages, &endpoints(&["a"]), 10).await;
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);

        // Page size shrinks with the remaining budget
        let calls = pages.calls();
        assert_eq!(
            calls,
            vec![
                ("a".to_string(), 10, None),
                ("a".to_string(), 7, Some("c1".to_string())),
                ("a".to_string(), 5, Some("c2".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_discovery_stops_at_limit() {
        let pages = three_pages();
        let ids = discover_ids(&pages, &endpoints(&["a"]), 4).await;
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(pages.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_discovery_fails_over_to_next_endpoint() {
        let pages = FakePages::default()
            .reply("broken", Reply::Broken)
            .reply("refused", Reply::NotOk)
            .page("good", None, &[9, 10], None)
            .page("unused", None, &[99], None);

        let ids = discover_ids(&pages, &endpoints(&["broken", "refused", "good", "unused"]), 50).await;
        assert_eq!(ids, vec![9, 10]);

        let called: Vec<_> = pages.calls().into_iter().map(|(e, _, _)| e).collect();
        assert_eq!(called, vec!["broken", "refused", "good"]);
    }

    #[tokio::test]
    async fn test_discovery_page_without_ids_keeps_paging() {
        let mut pages = FakePages::default()
            .page("empty", None, &[], Some("loop"))
            .page("sparse", Some("next"), &[42], None);
        // Two listed entries, neither with a usable ID
        pages.replies.insert(
            ("sparse".to_string(), None),
            Reply::Page(DiscoveryPage {
                entries: 2,
                ids: vec![],
                next_cursor: Some("next".to_string()),
            }),
        );

        let ids = discover_ids(&pages, &endpoints(&["empty", "sparse"]), 5).await;
        assert_eq!(ids, vec![42]);

        // An empty page ends that endpoint even when it carries a cursor
        assert!(!pages
            .calls()
            .iter()
            .any(|(_, _, cursor)| cursor.as_deref() == Some("loop")));
    }

    #[tokio::test]
    async fn test_discovery_nothing_found() {
        let pages = FakePages::default().reply("refused", Reply::NotOk);
        assert!(discover_ids(&pages, &endpoints(&["refused", "blank"]), 5).await.is_empty());
        assert!(discover_ids(&pages, &[], 5).await.is_empty());
    }

    #[test]
    fn test_parse_details_payload() {
        let body = json!({
            "data": [{
                "name": "Blox Fruits",
                "playing": 412000,
                "rootPlaceId": 2753915549i64,
                "description": "Become a master swordsman",
                "creator": {"id": 4372130, "name": "Gamer Robot Inc"},
                "genre": "Adventure",
                "visits": 41000000000i64
            }]
        })
        .to_string();

        let details = parse_details_payload(994732206, body.as_bytes()).unwrap();
        assert_eq!(details.candidate_id, 994732206);
        assert_eq!(details.name, "Blox Fruits");
        assert_eq!(details.metric, 412000);
        assert_eq!(details.root_place_id, Some(2753915549));
        assert_eq!(details.creator_id, Some(4372130));
        assert_eq!(details.creator_name.as_deref(), Some("Gamer Robot Inc"));
        assert_eq!(details.visits, Some(41000000000));
    }

    #[test]
    fn test_parse_details_payload_defaults_and_failures() {
        let details = parse_details_payload(5, br#"{"data": [{}]}"#).unwrap();
        assert_eq!(details, CandidateDetails::unknown(5));

        let negative = parse_details_payload(5, br#"{"data": [{"playing": -3}]}"#).unwrap();
        assert_eq!(negative.metric, 0);

        assert!(matches!(
            parse_details_payload(5, br#"{"data": []}"#),
            Err(FetchError::Empty(5))
        ));
        assert!(matches!(
            parse_details_payload(5, br#"{}"#),
            Err(FetchError::Empty(5))
        ));
        assert!(matches!(
            parse_details_payload(5, b"<html>"),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_discovery_page() {
        let page = parse_discovery_page(&json!({
            "data": [{"id": 11}, {"universeId": 22}, {"id": "33"}, {"name": "no id"}, {"id": 0}],
            "nextPageCursor": "abc"
        }));
        assert_eq!(page.entries, 5);
        assert_eq!(page.ids, vec![11, 22, 33]);
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));

        let page = parse_discovery_page(&json!({
            "universes": [{"universeId": 7}],
            "nextPageCursor": "",
            "nextPageToken": "tok"
        }));
        assert_eq!(page.ids, vec![7]);
        assert_eq!(page.next_cursor.as_deref(), Some("tok"));

        let page = parse_discovery_page(&json!({"data": []}));
        assert_eq!(page, DiscoveryPage::default());
    }
}
