//! Civility ("품격") rating of raw submissions.
//!
//! Every accepted submission carries a civility rating in [0, 1], derived from
//! insult and mockery cues in the verbatim text. Clusters keep the mean rating
//! of everything folded into them, and display queries can hide clusters below
//! a minimum (see [`ClusterQuery::min_civility`](crate::ClusterQuery::min_civility)).
//! The rating never affects matching or scores.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::normalize_text;

/// Default amount subtracted from a perfect rating per cue hit.
pub const DEFAULT_CIVILITY_PENALTY: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CivilityRater {
    /// Insult or mockery cues, matched on normalized text.
    pub cues: Vec<String>,
    pub penalty: f64,
}

impl Default for CivilityRater {
    fn default() -> Self {
        Self {
            cues: [
                "꼰대", "뭘 알아", "미쳤", "닥쳐", "병신", "멍청", "쓰레기", "개같", "ㅋㅋ", "idiot",
                "stupid", "shut up",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            penalty: DEFAULT_CIVILITY_PENALTY,
        }
    }
}

impl CivilityRater {
    /// `1 - penalty * hits`, clamped into [0, 1].
    pub fn rate(&self, text: &str) -> f64 {
        let norm = normalize_text(text);
        let hits = crate::classifier::cue_hits(&norm, &self.cues);
        (1.0 - self.penalty * hits as f64).clamp(0.0, 1.0)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.penalty.is_finite() || self.penalty < 0.0 {
            return Err(Error::Config(format!(
                "civility.penalty must be a non-negative number, got {}",
                self.penalty
            )));
        }
        Ok(())
    }
}
