use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable cluster identifier. Assigned by the store in creation order, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub u64);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A consolidated group of equivalent opinions.
///
/// Clusters are only ever created and updated by the engine, so a cluster read
/// from a store always satisfies: `support_count` equals the number of folded
/// submissions, `score` lies in the view's domain and `civility` in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpinionCluster {
    pub id: ClusterId,
    /// Classifier label. Not unique across clusters.
    pub keyword: String,
    /// Refined sentence shown on the map and compared against new submissions.
    pub representative_text: String,
    /// Most recent verbatim submissions, oldest first.
    pub original_samples: Vec<String>,
    /// Number of accepted submissions folded into this cluster, always >= 1.
    pub support_count: u64,
    pub score: f64,
    /// Mean civility of the folded submissions.
    pub civility: f64,
}

impl OpinionCluster {
    pub(crate) fn record_sample(&mut self, sample: &str, max_samples: usize) {
        self.original_samples.push(sample.to_string());
        let max = max_samples.max(1);
        if self.original_samples.len() > max {
            let excess = self.original_samples.len() - max;
            self.original_samples.drain(..excess);
        }
    }
}

/// A decoded and validated classifier result for one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub keyword: String,
    /// Stance on the agree/disagree axis, within [-1, 1].
    pub polarity: f64,
    pub refined_text: String,
    pub original_text: String,
    /// Civility of the original text, in [0, 1]. Rated by the engine.
    pub civility: f64,
}

/// What happened to one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Created {
        id: ClusterId,
    },
    Merged {
        id: ClusterId,
        support_count: u64,
        score: f64,
        similarity: f64,
    },
    /// Off-topic or noise. The store was not touched.
    Rejected { reason: String },
}

impl SubmissionOutcome {
    /// Cluster the submission was attributed to, if it was accepted.
    pub fn cluster_id(&self) -> Option<ClusterId> {
        match self {
            SubmissionOutcome::Created { id } | SubmissionOutcome::Merged { id, .. } => Some(*id),
            SubmissionOutcome::Rejected { .. } => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SubmissionOutcome::Rejected { .. })
    }
}

impl fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionOutcome::Created { id } => write!(f, "created cluster {id}"),
            SubmissionOutcome::Merged {
                id,
                support_count,
                score,
                similarity,
            } => write!(
                f,
                "merged into cluster {id} (support: {support_count}, score: {score:.2}, similarity: {similarity:.2})"
            ),
            SubmissionOutcome::Rejected { reason } => write!(f, "rejected ({reason})"),
        }
    }
}
