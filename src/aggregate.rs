//! Merge-or-create decisions and score policies.
//!
//! Each [`ScoreView`] has exactly one update policy:
//!
//! | view               | domain    | new cluster          | on merge                          |
//! |--------------------|-----------|----------------------|-----------------------------------|
//! | Representativeness | [0, 1]    | configured baseline  | `+ increment`, capped at 1        |
//! | Polarity           | [-1, 1]   | candidate polarity   | `(score + candidate) / 2`         |
//!
//! The polarity average is pairwise, so merging A then B into a cluster can
//! end on a different score than B then A. Both orders stay inside the domain.
//!
//! Civility is tracked separately as the exact mean over all folded
//! submissions, which does not depend on order.

use clap::ValueEnum;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, ScoreConfig};
use crate::model::{Candidate, ClusterId, SubmissionOutcome};
use crate::seed::SeedOpinion;
use crate::similarity::Match;
use crate::store::ClusterStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScoreView {
    /// How strongly a position is held, in [0, 1].
    #[default]
    Representativeness,
    /// Signed stance on the agree/disagree axis, in [-1, 1].
    Polarity,
}

impl ScoreView {
    pub fn domain(&self) -> (f64, f64) {
        match self {
            ScoreView::Representativeness => (0.0, 1.0),
            ScoreView::Polarity => (-1.0, 1.0),
        }
    }

    pub fn clamp(&self, score: f64) -> f64 {
        let (lo, hi) = self.domain();
        if score.is_nan() {
            return 0.0_f64.clamp(lo, hi);
        }
        score.clamp(lo, hi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScorePolicy {
    FixedIncrement { step: f64 },
    RunningAverage,
}

/// Applies the matcher's verdict to the store.
#[derive(Debug, Clone)]
pub struct Aggregator {
    scoring: ScoreConfig,
    max_samples: usize,
}

impl Aggregator {
    pub fn new(scoring: ScoreConfig, max_samples: usize) -> Self {
        Self {
            scoring,
            max_samples,
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(cfg.scoring, cfg.max_samples)
    }

    pub fn policy(&self) -> ScorePolicy {
        match self.scoring.view {
            ScoreView::Representativeness => ScorePolicy::FixedIncrement {
                step: self.scoring.increment,
            },
            ScoreView::Polarity => ScorePolicy::RunningAverage,
        }
    }

    /// Score of a freshly created cluster.
    pub fn initial_score(&self, candidate: &Candidate) -> f64 {
        let view = self.scoring.view;
        match view {
            ScoreView::Representativeness => view.clamp(self.scoring.baseline),
            ScoreView::Polarity => view.clamp(candidate.polarity),
        }
    }

    /// Score after folding `candidate` into a cluster currently at `current`.
    pub fn merged_score(&self, current: f64, candidate: &Candidate) -> f64 {
        let next = match self.policy() {
            ScorePolicy::FixedIncrement { step } => current + step,
            ScorePolicy::RunningAverage => (current + candidate.polarity) / 2.0,
        };
        self.scoring.view.clamp(next)
    }

    /// Plant a checked seed as its own cluster.
    pub(crate) fn plant(
        &self,
        store: &mut ClusterStore,
        seed: &SeedOpinion,
        civility: f64,
    ) -> ClusterId {
        let view = self.scoring.view;
        let score = view.clamp(seed.score.unwrap_or(self.scoring.baseline));
        let id = store.insert(
            seed.keyword.trim(),
            seed.refined_text.trim(),
            &seed.original_text,
            score,
            unit(civility),
        );
        debug!("planted seed cluster {} for keyword {:?}", id, seed.keyword);
        id
    }

    /// Merge into `verdict` or create a new cluster. Mutates at most one cluster.
    pub fn apply(
        &self,
        store: &mut ClusterStore,
        candidate: &Candidate,
        verdict: Option<Match>,
    ) -> SubmissionOutcome {
        if let Some(m) = verdict {
            if let Some(cluster) = store.get_mut(m.id) {
                cluster.support_count += 1;
                cluster.score = self.merged_score(cluster.score, candidate);
                let n = cluster.support_count as f64;
                cluster.civility =
                    unit(cluster.civility + (candidate.civility - cluster.civility) / n);
                cluster.record_sample(&candidate.original_text, self.max_samples);
                debug!(
                    "merged into {}: support={} score={:.3}",
                    cluster.id, cluster.support_count, cluster.score
                );
                return SubmissionOutcome::Merged {
                    id: cluster.id,
                    support_count: cluster.support_count,
                    score: cluster.score,
                    similarity: m.similarity,
                };
            }
            warn!("matched cluster {} is not in the store, creating a new one", m.id);
        }

        let id = store.insert(
            &candidate.keyword,
            &candidate.refined_text,
            &candidate.original_text,
            self.initial_score(candidate),
            unit(candidate.civility),
        );
        info!("created cluster {} for keyword {:?}", id, candidate.keyword);
        SubmissionOutcome::Created { id }
    }
}

// NaN counts as fully uncivil
fn unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}
