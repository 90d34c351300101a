//! Similarity matching between a candidate and the existing clusters.
//!
//! The default [`LinearMatcher`] scans every cluster once per submission, which
//! is fine for the few hundred clusters a deliberation session produces. A
//! larger population would want an indexed nearest-neighbour lookup (e.g. over
//! embeddings) behind the same [`Matcher`] trait; the aggregator only sees the
//! resulting [`Match`].

use std::collections::HashSet;

use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use crate::config::{DEFAULT_MERGE_THRESHOLD, MatchConfig, check_threshold};
use crate::error::Result;
use crate::model::{Candidate, ClusterId};
use crate::normalize_text;
use crate::store::ClusterStore;

/// A symmetric, deterministic similarity ratio in [0, 1].
pub trait Similarity {
    fn ratio(&self, a: &str, b: &str) -> f64;
}

impl<F> Similarity for F
where
    F: Fn(&str, &str) -> f64,
{
    fn ratio(&self, a: &str, b: &str) -> f64 {
        self(a, b)
    }
}

/// Built-in text similarity metrics. Both compare normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Normalized Levenshtein distance over characters.
    #[default]
    EditRatio,
    /// Jaccard overlap of whitespace tokens.
    TokenOverlap,
}

impl Similarity for Metric {
    fn ratio(&self, a: &str, b: &str) -> f64 {
        let a = normalize_text(a);
        let b = normalize_text(b);
        match self {
            Metric::EditRatio => normalized_levenshtein(&a, &b),
            Metric::TokenOverlap => token_jaccard(&a, &b),
        }
    }
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let ta: HashSet<&str> = a.split_whitespace().collect();
    let tb: HashSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let inter = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    inter / union
}

/// The cluster a candidate should be merged into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub id: ClusterId,
    /// Position in creation order.
    pub index: usize,
    pub similarity: f64,
}

pub trait Matcher {
    /// Best cluster at or above the merge threshold, or `None` when the
    /// candidate is a new point of view.
    fn best_match(&self, store: &ClusterStore, candidate: &Candidate) -> Option<Match>;
}

/// Linear scan over the store in creation order.
#[derive(Debug, Clone)]
pub struct LinearMatcher<S = Metric> {
    threshold: f64,
    keyword_scoped: bool,
    metric: S,
}

impl LinearMatcher<Metric> {
    pub fn from_config(cfg: &MatchConfig) -> Result<Self> {
        Self::with_metric(cfg.threshold, cfg.keyword_scoped, cfg.metric)
    }
}

impl Default for LinearMatcher<Metric> {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MERGE_THRESHOLD,
            keyword_scoped: true,
            metric: Metric::default(),
        }
    }
}

impl<S: Similarity> LinearMatcher<S> {
    /// Fails unless `threshold` is a number in [0, 1].
    pub fn with_metric(threshold: f64, keyword_scoped: bool, metric: S) -> Result<Self> {
        check_threshold(threshold)?;
        Ok(Self {
            threshold,
            keyword_scoped,
            metric,
        })
    }
}

impl<S: Similarity> Matcher for LinearMatcher<S> {
    fn best_match(&self, store: &ClusterStore, candidate: &Candidate) -> Option<Match> {
        let mut best: Option<Match> = None;
        for (index, cluster) in store.iter().enumerate() {
            if self.keyword_scoped && cluster.keyword != candidate.keyword {
                continue;
            }
            let similarity = self
                .metric
                .ratio(&candidate.refined_text, &cluster.representative_text);
            // strict '>' keeps the earliest cluster on ties
            if best.is_none_or(|b| similarity > b.similarity) {
                best = Some(Match {
                    id: cluster.id,
                    index,
                    similarity,
                });
            }
        }

        match best {
            Some(m) if m.similarity >= self.threshold => {
                debug!(
                    "match: cluster={} similarity={:.3} threshold={:.3}",
                    m.id, m.similarity, self.threshold
                );
                Some(m)
            }
            Some(m) => {
                debug!(
                    "no match: nearest cluster={} similarity={:.3} below threshold={:.3}",
                    m.id, m.similarity, self.threshold
                );
                None
            }
            None => {
                debug!("no match: no comparable clusters for keyword {:?}", candidate.keyword);
                None
            }
        }
    }
}
