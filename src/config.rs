//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Files are JSON:
//!
//! ```json
//! {
//!   "topic": { "title": "Four-day work week", "description": "Should the state mandate it?" },
//!   "matching": { "threshold": 0.7, "keyword_scoped": false, "metric": "token_overlap" },
//!   "scoring": { "view": "polarity" },
//!   "civility": { "cues": ["idiot", "clown"], "penalty": 0.5 }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregate::ScoreView;
use crate::civility::CivilityRater;
use crate::error::{Error, Result};
use crate::similarity::Metric;

/// Default merge threshold for the similarity ratio.
pub const DEFAULT_MERGE_THRESHOLD: f64 = 0.65;
/// Default number of verbatim samples retained per cluster.
pub const DEFAULT_MAX_SAMPLES: usize = 5;
/// Default upper bound for classifier keywords, in characters.
pub const DEFAULT_MAX_KEYWORD_CHARS: usize = 32;

/// Fixed topic description handed to the classifier so it can judge relevance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicContext {
    pub title: String,
    pub description: String,
}

impl Default for TopicContext {
    fn default() -> Self {
        Self {
            title: "호주, 16세 미만 SNS 사용 원천 차단 추진".to_string(),
            description: "호주 정부가 16세 미만 청소년의 소셜미디어 계정 보유를 금지하는 법안을 시행한다. \
                          기업은 연령 확인 의무를 지며 위반 시 벌금을 문다. \
                          쟁점: 청소년 정신건강 보호 대 실효성(VPN 우회), 프라이버시 침해, 청소년의 소통 권리."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum similarity ratio in [0, 1] required to merge into an existing cluster.
    pub threshold: f64,
    /// Only compare against clusters carrying the candidate's keyword.
    pub keyword_scoped: bool,
    pub metric: Metric,
}

/// The merge threshold must be a number in [0, 1]; NaN would never merge anything.
pub(crate) fn check_threshold(t: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&t) {
        return Err(Error::Config(format!(
            "matching.threshold must be within [0, 1], got {t}"
        )));
    }
    Ok(())
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        check_threshold(self.threshold)
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MERGE_THRESHOLD,
            keyword_scoped: true,
            metric: Metric::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    pub view: ScoreView,
    /// Starting score of a new cluster when the view has no classifier-provided value.
    pub baseline: f64,
    /// Step added per merge under the fixed-increment policy.
    pub increment: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            view: ScoreView::default(),
            baseline: 0.5,
            increment: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub topic: TopicContext,
    pub matching: MatchConfig,
    pub scoring: ScoreConfig,
    pub civility: CivilityRater,
    pub max_samples: usize,
    pub max_keyword_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            topic: TopicContext::default(),
            matching: MatchConfig::default(),
            scoring: ScoreConfig::default(),
            civility: CivilityRater::default(),
            max_samples: DEFAULT_MAX_SAMPLES,
            max_keyword_chars: DEFAULT_MAX_KEYWORD_CHARS,
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: EngineConfig = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Engines refuse a config that fails this check.
    pub fn validate(&self) -> Result<()> {
        self.matching.validate()?;
        self.civility.validate()?;
        if self.max_samples == 0 {
            return Err(Error::Config("max_samples must be at least 1".into()));
        }
        if self.max_keyword_chars == 0 {
            return Err(Error::Config("max_keyword_chars must be at least 1".into()));
        }
        let (lo, hi) = self.scoring.view.domain();
        if !(lo..=hi).contains(&self.scoring.baseline) {
            return Err(Error::Config(format!(
                "scoring.baseline must be within [{lo}, {hi}] for the {:?} view, got {}",
                self.scoring.view, self.scoring.baseline
            )));
        }
        if !self.scoring.increment.is_finite() || self.scoring.increment < 0.0 {
            return Err(Error::Config(format!(
                "scoring.increment must be a non-negative number, got {}",
                self.scoring.increment
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{ "matching": { "threshold": 0.8 } }"#).unwrap();
        assert_eq!(cfg.matching.threshold, 0.8);
        assert!(cfg.matching.keyword_scoped);
        assert_eq!(cfg.max_samples, DEFAULT_MAX_SAMPLES);
        assert_eq!(cfg.scoring.view, ScoreView::Representativeness);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = EngineConfig::default();
        cfg.matching.threshold = 1.5;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        let mut cfg = EngineConfig::default();
        cfg.matching.threshold = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.max_keyword_chars = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.max_samples = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.scoring.baseline = -0.5;
        assert!(cfg.validate().is_err());
        cfg.scoring.view = ScoreView::Polarity;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(
            &path,
            r#"{ "scoring": { "view": "polarity", "baseline": 0.0 }, "max_samples": 2 }"#,
        )
        .unwrap();
        let cfg = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.scoring.view, ScoreView::Polarity);
        assert_eq!(cfg.max_samples, 2);
    }
}
