use crate::cache::{unique_ids, CandidateCache};
use crate::client::DiscoverySource;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Well-known universes used when every discovery endpoint is down.
pub const FALLBACK_UNIVERSES: &[i64] = &[
    994732206, 245662005, 383310974, 47545, 210851291, 4924922222, 185655149, 10977891899,
    5902977743, 8737602446, 1537690962, 1182249705, 142823291, 1400147734, 920587237,
    8149070699, 3351674303, 5569431581, 6381829480, 4872321990, 4520749081, 13822889,
    9498006165, 488667523, 286090429, 3823781113, 447452406, 2010620636, 2013640567,
    3291301470, 511316432, 2216618303, 3145447021, 5926001758, 3192707582, 275420544,
    263761432, 92012076, 1377239466, 6284583030, 2988862959, 2583109575, 1540764883,
    5763726676, 3019923553, 5938036553,
];

/// One layer of the resolution chain. `None` (or an empty list) hands over
/// to the next layer.
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, limit: usize) -> Option<Vec<i64>>;

    /// Whether a result from this layer becomes the new cache entry.
    fn refreshes_cache(&self) -> bool {
        true
    }
}

pub struct CachedIds {
    cache: Arc<CandidateCache>,
}

impl CachedIds {
    pub fn new(cache: Arc<CandidateCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl ResolutionStrategy for CachedIds {
    fn name(&self) -> &str {
        "cache"
    }

    async fn resolve(&self, _limit: usize) -> Option<Vec<i64>> {
        self.cache.get()
    }

    fn refreshes_cache(&self) -> bool {
        false
    }
}

pub struct DiscoveryIds {
    source: Arc<dyn DiscoverySource>,
}

impl DiscoveryIds {
    pub fn new(source: Arc<dyn DiscoverySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ResolutionStrategy for DiscoveryIds {
    fn name(&self) -> &str {
        "discovery"
    }

    async fn resolve(&self, limit: usize) -> Option<Vec<i64>> {
        Some(self.source.discover(limit).await)
    }
}

pub struct StaticSeed {
    ids: Vec<i64>,
}

impl StaticSeed {
    pub fn new(ids: Vec<i64>) -> Self {
        Self { ids }
    }
}

impl Default for StaticSeed {
    fn default() -> Self {
        Self::new(FALLBACK_UNIVERSES.to_vec())
    }
}

#[async_trait]
impl ResolutionStrategy for StaticSeed {
    fn name(&self) -> &str {
        "static fallback"
    }

    /// The whole seed list, so the cache keeps all of it.
    async fn resolve(&self, _limit: usize) -> Option<Vec<i64>> {
        Some(self.ids.clone())
    }
}

/// Walks the strategies in priority order and returns the first non-empty
/// answer, truncated to the requested limit.
pub struct CandidateResolver {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
    cache: Arc<CandidateCache>,
}

impl CandidateResolver {
    pub fn new(strategies: Vec<Box<dyn ResolutionStrategy>>, cache: Arc<CandidateCache>) -> Self {
        Self { strategies, cache }
    }

    /// Cache, then discovery, then the static seed list.
    pub fn standard(cache: Arc<CandidateCache>, source: Arc<dyn DiscoverySource>) -> Self {
        Self::new(
            vec![
                Box::new(CachedIds::new(cache.clone())),
                Box::new(DiscoveryIds::new(source)),
                Box::new(StaticSeed::default()),
            ],
            cache,
        )
    }

    pub async fn resolve(&self, limit: usize) -> Vec<i64> {
        if limit == 0 {
            return Vec::new();
        }

        for strategy in &self.strategies {
            let ids = match strategy.resolve(limit).await {
                Some(ids) if !ids.is_empty() => unique_ids(ids),
                _ => {
                    debug!("Resolver: {} produced nothing", strategy.name());
                    continue;
                }
            };

            if strategy.refreshes_cache() {
                if let Err(e) = self.cache.put(&ids) {
                    warn!("Resolver: failed to write candidate cache: {}", e);
                }
            }

            info!(
                "Resolver: {} candidates from {}",
                ids.len().min(limit),
                strategy.name()
            );
            return ids.into_iter().take(limit).collect();
        }

        warn!("Resolver: every strategy came back empty");
        Vec::new()
    }
}
