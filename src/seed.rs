//! Seed opinions for starting a session from a non-empty garden.
//!
//! A seed is planted as its own cluster with a support count of 1, exactly as
//! if it had been submitted once. Seed files are JSON arrays:
//!
//! ```json
//! [
//!   {
//!     "keyword": "실효성 및 기술",
//!     "refined_text": "기술적 차단보다는 미디어 리터러시 교육이 근본적인 해결책이 될 수 있습니다.",
//!     "original_text": "기술적으로 막는 건 불가능함. 교육이 중요하지.",
//!     "score": 0.95,
//!     "civility": 0.85
//!   }
//! ]
//! ```
//!
//! `score` is read in the engine's score view and clamped into its domain;
//! without one the view's baseline is used. Without `civility` the original
//! text is rated.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedOpinion {
    pub keyword: String,
    pub refined_text: String,
    pub original_text: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub civility: Option<f64>,
}

impl SeedOpinion {
    /// Structural checks that do not depend on the engine config.
    pub(crate) fn check(&self, max_keyword_chars: usize) -> std::result::Result<(), String> {
        if self.keyword.trim().is_empty() {
            return Err("keyword is empty".into());
        }
        let len = self.keyword.chars().count();
        if len > max_keyword_chars {
            return Err(format!("keyword has {len} characters (max: {max_keyword_chars})"));
        }
        if self.refined_text.trim().is_empty() {
            return Err("refined_text is empty".into());
        }
        for (name, value) in [("score", self.score), ("civility", self.civility)] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(format!("{name} is not a finite number"));
            }
        }
        Ok(())
    }
}

/// Load seed opinions from a JSON file.
pub fn load_seeds<P: AsRef<Path>>(path: P) -> Result<Vec<SeedOpinion>> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Check a whole batch up front so that planting is all-or-nothing.
pub(crate) fn check_all(seeds: &[SeedOpinion], max_keyword_chars: usize) -> Result<()> {
    for (index, seed) in seeds.iter().enumerate() {
        seed.check(max_keyword_chars)
            .map_err(|reason| Error::Seed { index, reason })?;
    }
    Ok(())
}

fn seed(keyword: &str, original: &str, refined: &str, civility: f64, score: f64) -> SeedOpinion {
    SeedOpinion {
        keyword: keyword.to_string(),
        refined_text: refined.to_string(),
        original_text: original.to_string(),
        score: Some(score),
        civility: Some(civility),
    }
}

/// Seven curated opinions on the default topic, one to three per keyword.
pub fn default_garden() -> Vec<SeedOpinion> {
    vec![
        seed(
            "실효성 및 기술",
            "꼰대들이 뭘 알아? VPN 쓰면 됨.",
            "우회 기술이 보편화된 상황에서 강제적 차단은 실효성이 낮다는 기술적 우려가 있습니다.",
            0.2,
            0.5,
        ),
        seed(
            "보호 및 규제 필요성",
            "애들 망치는 틱톡 금지 찬성!",
            "청소년 보호를 위해 플랫폼의 유해한 영향력을 규제할 필요성에 깊이 공감합니다.",
            0.3,
            0.6,
        ),
        seed(
            "실효성 및 기술",
            "기술적으로 막는 건 불가능함. 교육이 중요하지.",
            "기술적 차단보다는 미디어 리터러시 교육이 근본적인 해결책이 될 수 있습니다.",
            0.85,
            0.95,
        ),
        seed(
            "보호 및 규제 필요성",
            "알고리즘 중독 심각함. 기업 책임 물어야 함.",
            "알고리즘의 중독성 문제는 심각하며, 이에 대한 기업의 사회적 책임을 강화해야 합니다.",
            0.9,
            0.92,
        ),
        seed(
            "프라이버시/기본권",
            "개인정보 털어가면서 나이 확인한다고? 미쳤네.",
            "연령 인증 과정에서 발생할 수 있는 과도한 개인정보 수집과 프라이버시 침해를 우려합니다.",
            0.4,
            0.7,
        ),
        seed(
            "프라이버시/기본권",
            "부모가 관리해야지 왜 국가가 나서?",
            "국가의 일괄적 규제보다는 가정 내에서의 지도와 자율성이 우선시되어야 한다고 생각합니다.",
            0.75,
            0.88,
        ),
        seed(
            "프라이버시/기본권",
            "청소년도 시민인데 기본권 침해임.",
            "청소년의 디지털 정보 접근권과 자기결정권 또한 중요한 가치로 고려되어야 합니다.",
            0.8,
            0.85,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_garden_is_valid() {
        let garden = default_garden();
        assert_eq!(garden.len(), 7);
        assert!(check_all(&garden, 32).is_ok());
    }

    #[test]
    fn bad_seed_reports_its_index() {
        let mut garden = default_garden();
        garden[3].keyword = "  ".into();
        match check_all(&garden, 32) {
            Err(Error::Seed { index, reason }) => {
                assert_eq!(index, 3);
                assert!(reason.contains("keyword"));
            }
            other => panic!("expected a seed error, got {other:?}"),
        }

        let mut garden = default_garden();
        garden[0].score = Some(f64::NAN);
        assert!(matches!(check_all(&garden, 32), Err(Error::Seed { index: 0, .. })));
        assert!(matches!(check_all(&default_garden(), 5), Err(Error::Seed { index: 0, .. })));
    }

    #[test]
    fn loads_partial_seeds_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        fs::write(
            &path,
            r#"[ { "keyword": "transit", "refined_text": "More night buses.", "original_text": "buses pls" } ]"#,
        )
        .unwrap();
        let seeds = load_seeds(&path).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].score, None);
        assert_eq!(seeds[0].civility, None);
    }
}
