#![forbid(unsafe_code)]
//! # opinion_garden
//!
//! Consolidates free-text public-policy opinions into a small, growing set of
//! opinion clusters that feed a live deliberation map.
//!
//! Each submission goes through the same pipeline:
//!
//! 1. a [`Classifier`] turns the raw text into `keyword|stance|refined text`,
//!    or rejects it as off-topic;
//! 2. [`decode_response`] strictly decodes that answer into a [`Candidate`];
//! 3. a [`Matcher`] looks for the most similar existing cluster;
//! 4. the [`Aggregator`] merges into that cluster or creates a new one.
//!
//! The [`projection`] module turns the resulting [`ClusterStore`] into
//! display-ready structures (treemap hierarchy, scatter points, consensus
//! banner).
//!
//! Every accepted submission is also given a civility rating by the
//! [`CivilityRater`], and a session can start from [`SeedOpinion`]s instead of
//! an empty store (see [`default_garden`]).
//!
//! ## Example
//! ```
//! use opinion_garden::{ClassifyRequest, ClassifierError, Engine, EngineConfig, SubmissionOutcome};
//!
//! let classifier = |req: &ClassifyRequest| -> Result<String, ClassifierError> {
//!     if req.text.contains("VPN") {
//!         Ok("기술적 실효성|반대|우회 기술이 존재하는 상황에서 차단은 효과가 제한적입니다".to_string())
//!     } else {
//!         Ok("IRRELEVANT".to_string())
//!     }
//! };
//! let mut engine = Engine::new(classifier, EngineConfig::default()).unwrap();
//!
//! let first = engine.submit("VPN 우회로 차단은 무의미하다").unwrap();
//! assert!(matches!(first, SubmissionOutcome::Created { .. }));
//!
//! let second = engine.submit("VPN 쓰면 그만인데 차단해봤자").unwrap();
//! assert!(matches!(second, SubmissionOutcome::Merged { support_count: 2, .. }));
//!
//! assert!(engine.submit("오늘 날씨 좋네요").unwrap().is_rejected());
//! assert_eq!(engine.store().len(), 1);
//! ```

pub mod aggregate;
pub mod civility;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod model;
pub mod projection;
pub mod seed;
pub mod similarity;
pub mod store;

pub use aggregate::{Aggregator, ScorePolicy, ScoreView};
pub use civility::{CivilityRater, DEFAULT_CIVILITY_PENALTY};
pub use classifier::{
    ChatClassifier, ClassifyRequest, Classifier, Decoded, Lexicon, LexiconClassifier,
    REJECTION_TOKEN, build_system_prompt, decode_response,
};
pub use config::{EngineConfig, MatchConfig, ScoreConfig, TopicContext};
pub use engine::{Engine, SharedEngine};
pub use error::{ClassifierError, Error, ParseError, SubmitError};
pub use export::{ExportFormat, csv_safe_cell, export_clusters, export_map, render_summary};
pub use model::{Candidate, ClusterId, OpinionCluster, SubmissionOutcome};
pub use projection::{ConsensusSummary, DeliberationMap, MapNode, ScatterPoint};
pub use seed::{SeedOpinion, default_garden, load_seeds};
pub use similarity::{LinearMatcher, Match, Matcher, Metric, Similarity};
pub use store::{ClusterQuery, ClusterStore, SortKey};

/// Normalizes text for similarity comparison.
///
/// Lowercases, turns `-`, `_` and `/` into spaces, drops every other
/// non-alphanumeric character and collapses whitespace.
///
/// # Example
/// ```
/// use opinion_garden::normalize_text;
/// assert_eq!(normalize_text("  VPN-우회로,  차단은 무의미하다! "), "vpn 우회로 차단은 무의미하다");
/// ```
pub fn normalize_text(content: &str) -> String {
    let cleaned: String = content
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            '-' | '_' | '/' => Some(' '),
            c if c.is_alphanumeric() || c.is_whitespace() => Some(c),
            _ => None,
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
