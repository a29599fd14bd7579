use crate::cache::CandidateCache;
use crate::client::{DiscoverySource, MetricFetcher, RoProxyClient};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::correlate::Correlator;
use crate::db::Database;
use crate::growth::GrowthEvaluator;
use crate::models::Spike;
use crate::poller::{PollReport, SnapshotPoller};
use crate::resolver::CandidateResolver;
use crate::services::mentions::MentionFeed;
use crate::services::spikes::SpikeStore;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub candidates: usize,
    pub poll: Option<PollReport>,
    pub growth_candidates: usize,
    pub mentions: usize,
    pub spikes: Vec<Spike>,
}

#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub growth_candidates: usize,
    pub mentions: usize,
    pub spikes: Vec<Spike>,
}

/// One full pass: resolve, poll, evaluate growth, correlate with mentions
/// and append the resulting spikes.
pub struct MonitorCycle {
    resolver: CandidateResolver,
    poller: SnapshotPoller,
    evaluator: GrowthEvaluator,
    mentions: MentionFeed,
    correlator: Correlator,
    store: SpikeStore,
    candidate_limit: usize,
    growth_threshold: f64,
    interval: Duration,
}

impl MonitorCycle {
    pub fn build(
        config: &Config,
        db: Database,
        clock: Arc<dyn Clock>,
        source: Arc<dyn DiscoverySource>,
        fetcher: Arc<dyn MetricFetcher>,
    ) -> Self {
        let cache = Arc::new(CandidateCache::new(
            &config.candidate_cache_path,
            config.cache_ttl(),
            clock.clone(),
        ));
        Self {
            resolver: CandidateResolver::standard(cache, source),
            poller: SnapshotPoller::new(
                db.clone(),
                fetcher,
                clock.clone(),
                config.max_poll_concurrency,
            ),
            evaluator: GrowthEvaluator::new(db.clone(), clock.clone()),
            mentions: MentionFeed::new(db.clone(), clock.clone(), config.mention_lookback()),
            correlator: Correlator::from_config(config, clock),
            store: SpikeStore::new(db),
            candidate_limit: config.candidate_limit,
            growth_threshold: config.growth_threshold,
            interval: config.cycle_interval,
        }
    }

    /// Wires the live HTTP client and the system clock.
    pub fn from_config(config: &Config, db: Database) -> anyhow::Result<Self> {
        let client = Arc::new(RoProxyClient::new(config)?);
        Ok(Self::build(
            config,
            db,
            Arc::new(SystemClock),
            client.clone(),
            client,
        ))
    }

    pub fn store(&self) -> &SpikeStore {
        &self.store
    }

    /// Resolve and poll only.
    pub async fn poll(&self, limit: usize) -> anyhow::Result<(usize, Option<PollReport>)> {
        let ids = self.resolver.resolve(limit).await;
        let report = self.poller.poll(&ids).await?;
        Ok((ids.len(), report))
    }

    /// Growth evaluation and correlation over what is already stored.
    pub async fn detect(&self, persist: bool) -> anyhow::Result<Detection> {
        let candidates = self.evaluator.evaluate(self.growth_threshold).await?;
        if candidates.is_empty() {
            debug!("Monitor: no growth candidates this cycle");
            return Ok(Detection::default());
        }

        let mentions = self.mentions.recent().await?;
        let spikes = self.correlator.correlate(&candidates, &mentions);
        if persist {
            self.store.persist(spikes.clone()).await?;
        }

        Ok(Detection {
            growth_candidates: candidates.len(),
            mentions: mentions.len(),
            spikes,
        })
    }

    pub async fn run_once(&self) -> anyhow::Result<CycleSummary> {
        info!("Monitor: cycle started");
        let (candidates, poll) = self.poll(self.candidate_limit).await?;
        let detection = self.detect(true).await?;

        info!(
            "Monitor: cycle complete, {} growth candidates, {} spikes",
            detection.growth_candidates,
            detection.spikes.len()
        );
        Ok(CycleSummary {
            candidates,
            poll,
            growth_candidates: detection.growth_candidates,
            mentions: detection.mentions,
            spikes: detection.spikes,
        })
    }

    /// Repeats the cycle forever. A failed cycle is logged and the next tick
    /// tries again.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!("Monitor cycle failed: {:#}", e);
            }
        }
    }
}
