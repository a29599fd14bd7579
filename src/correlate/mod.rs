use crate::clock::Clock;
use crate::config::Config;
use crate::models::{GrowthCandidate, MentionEvent, Spike};
use std::sync::Arc;
use tracing::{debug, info};

pub mod mechanic;
pub mod similarity;

pub use mechanic::extract_mechanic;
pub use similarity::partial_ratio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Partial-ratio score reached the threshold.
    Fuzzy,
    /// Title carries a hint keyword and the literal candidate name.
    Keyword,
}

/// Pairs growth candidates with mention events that talk about them.
pub struct Correlator {
    fuzzy_threshold: f64,
    keyword_hints: Vec<String>,
    mention_url_prefix: String,
    clock: Arc<dyn Clock>,
}

impl Correlator {
    pub fn new(
        fuzzy_threshold: f64,
        keyword_hints: Vec<String>,
        mention_url_prefix: String,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fuzzy_threshold,
            keyword_hints: keyword_hints.into_iter().map(|k| k.to_lowercase()).collect(),
            mention_url_prefix,
            clock,
        }
    }

    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.fuzzy_threshold,
            config.keyword_hints.clone(),
            config.mention_url_prefix.clone(),
            clock,
        )
    }

    /// How (if at all) `title` refers to the candidate called `name`.
    pub fn match_kind(&self, name: &str, title: &str) -> Option<MatchKind> {
        let name = name.to_lowercase();
        let title = title.to_lowercase();

        if partial_ratio(&name, &title) >= self.fuzzy_threshold {
            return Some(MatchKind::Fuzzy);
        }
        let hinted = self
            .keyword_hints
            .iter()
            .any(|k| !k.is_empty() && title.contains(k.as_str()));
        if hinted && !name.is_empty() && title.contains(&name) {
            return Some(MatchKind::Keyword);
        }
        None
    }

    pub fn source_url(&self, source_id: &str) -> String {
        format!("{}{}", self.mention_url_prefix, source_id)
    }

    /// One spike per matching (candidate, mention) pair. Every spike from a
    /// single call shares the same `detected_at`.
    pub fn correlate(&self, candidates: &[GrowthCandidate], mentions: &[MentionEvent]) -> Vec<Spike> {
        let detected_at = self.clock.now();
        let mut spikes = Vec::new();

        for candidate in candidates {
            for mention in mentions {
                if mention.title.trim().is_empty() {
                    continue;
                }
                let Some(kind) = self.match_kind(&candidate.name, &mention.title) else {
                    continue;
                };
                debug!(
                    "Correlator: {:?} match between '{}' and '{}'",
                    kind, candidate.name, mention.title
                );
                spikes.push(Spike {
                    candidate_id: candidate.candidate_id,
                    name: candidate.name.clone(),
                    current_metric: candidate.current_metric,
                    baseline_metric: candidate.baseline_metric,
                    growth_percent: candidate.growth_percent(),
                    published_at: mention.published_at,
                    mechanic_label: extract_mechanic(&mention.title),
                    mention_title: mention.title.clone(),
                    source_id: mention.source_id.clone(),
                    source_url: self.source_url(&mention.source_id),
                    channel_title: mention.channel_title.clone(),
                    detected_at,
                });
            }
        }

        info!(
            "Correlator: {} spikes from {} candidates x {} mentions",
            spikes.len(),
            candidates.len(),
            mentions.len()
        );
        spikes
    }
}
