//! Submission pipeline: classify, decode, match, aggregate.
//!
//! [`Engine`] owns its store and is meant for single-threaded use.
//! [`SharedEngine`] keeps the store behind a mutex so several actors can
//! submit concurrently. There the slow classifier call runs outside the
//! lock and only the match-then-update step is a critical section, which
//! keeps support counts from losing updates.
//!
//! Both engines validate their [`EngineConfig`] on construction and refuse
//! one that would break the merge rules (e.g. a NaN threshold).

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use rayon::prelude::*;

use crate::aggregate::Aggregator;
use crate::civility::CivilityRater;
use crate::classifier::{ClassifyRequest, Classifier, Decoded, decode_response};
use crate::config::{EngineConfig, TopicContext};
use crate::error::{Error, SubmitError};
use crate::model::{Candidate, ClusterId, OpinionCluster, SubmissionOutcome};
use crate::projection::{self, DeliberationMap};
use crate::seed::{self, SeedOpinion};
use crate::similarity::{LinearMatcher, Matcher};
use crate::store::{ClusterQuery, ClusterStore};

/// Stateless part of the pipeline, shared by both engines.
#[derive(Debug)]
struct Pipeline<C, M> {
    classifier: C,
    matcher: M,
    aggregator: Aggregator,
    civility: CivilityRater,
    topic: TopicContext,
    max_keyword_chars: usize,
}

impl<C, M> Pipeline<C, M> {
    fn new(classifier: C, matcher: M, config: EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            classifier,
            matcher,
            aggregator: Aggregator::from_config(&config),
            civility: config.civility,
            topic: config.topic,
            max_keyword_chars: config.max_keyword_chars,
        })
    }

    /// Plant every seed or, if any is invalid, none.
    fn plant(
        &self,
        store: &mut ClusterStore,
        seeds: &[SeedOpinion],
    ) -> Result<Vec<ClusterId>, Error> {
        seed::check_all(seeds, self.max_keyword_chars)?;
        Ok(seeds
            .iter()
            .map(|s| {
                let civility = s
                    .civility
                    .unwrap_or_else(|| self.civility.rate(&s.original_text));
                self.aggregator.plant(store, s, civility)
            })
            .collect())
    }
}

impl<C: Classifier, M: Matcher> Pipeline<C, M> {
    /// Everything up to the store. Blank input is rejected without a classifier call.
    fn classify(&self, raw: &str, keyword_hints: Vec<String>) -> Result<Decoded, SubmitError> {
        let text = raw.trim();
        if text.is_empty() {
            return Ok(Decoded::Rejected("empty submission".to_string()));
        }
        let request = ClassifyRequest {
            topic: self.topic.clone(),
            text: text.to_string(),
            keyword_hints,
        };
        let answer = self.classifier.classify(&request).inspect_err(|e| {
            warn!("classification failed: {e}");
        })?;
        let mut decoded =
            decode_response(&answer, text, self.max_keyword_chars).inspect_err(|e| {
                warn!("undecodable classifier answer {answer:?}: {e}");
            })?;
        if let Decoded::Candidate(c) = &mut decoded {
            c.civility = self.civility.rate(text);
        }
        Ok(decoded)
    }

    /// The atomic store mutation for one accepted candidate.
    fn fold(&self, store: &mut ClusterStore, candidate: &Candidate) -> SubmissionOutcome {
        let verdict = self.matcher.best_match(store, candidate);
        self.aggregator.apply(store, candidate, verdict)
    }
}

fn rejected(reason: String) -> SubmissionOutcome {
    debug!("submission rejected: {reason}");
    SubmissionOutcome::Rejected { reason }
}

/// Single-threaded engine that owns its cluster store.
#[derive(Debug)]
pub struct Engine<C, M = LinearMatcher> {
    pipeline: Pipeline<C, M>,
    store: ClusterStore,
}

impl<C: Classifier> Engine<C> {
    /// Engine with the default linear matcher configured from `config.matching`.
    pub fn new(classifier: C, config: EngineConfig) -> Result<Self, Error> {
        let matcher = LinearMatcher::from_config(&config.matching)?;
        Self::with_matcher(classifier, matcher, config)
    }
}

impl<C: Classifier, M: Matcher> Engine<C, M> {
    pub fn with_matcher(classifier: C, matcher: M, config: EngineConfig) -> Result<Self, Error> {
        Ok(Self {
            pipeline: Pipeline::new(classifier, matcher, config)?,
            store: ClusterStore::new(),
        })
    }

    /// Plant seed opinions, each as its own cluster. All-or-nothing.
    pub fn plant(&mut self, seeds: &[SeedOpinion]) -> Result<Vec<ClusterId>, Error> {
        self.pipeline.plant(&mut self.store, seeds)
    }

    /// Process one opinion. On `Err` the store is unchanged and the text may be resubmitted.
    pub fn submit(&mut self, raw: &str) -> Result<SubmissionOutcome, SubmitError> {
        let hints = self.store.keywords();
        match self.pipeline.classify(raw, hints)? {
            Decoded::Rejected(reason) => Ok(rejected(reason)),
            Decoded::Candidate(c) => Ok(self.pipeline.fold(&mut self.store, &c)),
        }
    }

    pub fn store(&self) -> &ClusterStore {
        &self.store
    }

    pub fn into_store(self) -> ClusterStore {
        self.store
    }

    pub fn query(&self, q: &ClusterQuery) -> Vec<&OpinionCluster> {
        self.store.query(q)
    }

    pub fn map(&self) -> DeliberationMap {
        projection::project(&self.store, &self.pipeline.topic.title)
    }
}

/// Engine that can be shared between threads.
#[derive(Debug)]
pub struct SharedEngine<C, M = LinearMatcher> {
    pipeline: Pipeline<C, M>,
    store: Mutex<ClusterStore>,
}

impl<C: Classifier + Sync> SharedEngine<C> {
    pub fn new(classifier: C, config: EngineConfig) -> Result<Self, Error> {
        let matcher = LinearMatcher::from_config(&config.matching)?;
        Self::with_matcher(classifier, matcher, config)
    }
}

impl<C: Classifier + Sync, M: Matcher + Sync> SharedEngine<C, M> {
    pub fn with_matcher(classifier: C, matcher: M, config: EngineConfig) -> Result<Self, Error> {
        Ok(Self {
            pipeline: Pipeline::new(classifier, matcher, config)?,
            store: Mutex::new(ClusterStore::new()),
        })
    }

    pub fn plant(&self, seeds: &[SeedOpinion]) -> Result<Vec<ClusterId>, Error> {
        self.pipeline.plant(&mut self.lock(), seeds)
    }

    // every critical section completes its mutation, so a poisoned store is still consistent
    fn lock(&self) -> MutexGuard<'_, ClusterStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn submit(&self, raw: &str) -> Result<SubmissionOutcome, SubmitError> {
        let hints = self.lock().keywords();
        let decoded = self.pipeline.classify(raw, hints)?;
        Ok(self.commit(decoded))
    }

    fn commit(&self, decoded: Decoded) -> SubmissionOutcome {
        match decoded {
            Decoded::Rejected(reason) => rejected(reason),
            Decoded::Candidate(c) => {
                let mut store = self.lock();
                self.pipeline.fold(&mut store, &c)
            }
        }
    }

    /// Classify all texts in parallel, then fold them into the store in input order.
    ///
    /// Keyword hints are taken once, before the batch starts.
    pub fn submit_batch<S: AsRef<str> + Sync>(
        &self,
        texts: &[S],
    ) -> Vec<Result<SubmissionOutcome, SubmitError>> {
        let hints = self.lock().keywords();
        let decoded: Vec<Result<Decoded, SubmitError>> = texts
            .par_iter()
            .map(|t| self.pipeline.classify(t.as_ref(), hints.clone()))
            .collect();
        decoded
            .into_iter()
            .map(|d| d.map(|d| self.commit(d)))
            .collect()
    }

    /// Copy of the current store.
    pub fn snapshot(&self) -> ClusterStore {
        self.lock().clone()
    }

    /// Like [`Engine::query`], but returns copies taken under the lock.
    pub fn query(&self, q: &ClusterQuery) -> Vec<OpinionCluster> {
        self.lock().query(q).into_iter().cloned().collect()
    }

    pub fn map(&self) -> DeliberationMap {
        projection::project(&self.lock(), &self.pipeline.topic.title)
    }

    pub fn into_store(self) -> ClusterStore {
        self.store.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;
    use crate::store::SortKey;
    use std::cell::Cell;

    fn fixed(answer: &'static str) -> impl Fn(&ClassifyRequest) -> Result<String, ClassifierError> {
        move |_: &ClassifyRequest| Ok(answer.to_string())
    }

    #[test]
    fn blank_input_skips_classifier() {
        let calls = Cell::new(0);
        let clf = |_: &ClassifyRequest| -> Result<String, ClassifierError> {
            calls.set(calls.get() + 1);
            Ok("k|찬성|text".to_string())
        };
        let mut engine = Engine::new(clf, EngineConfig::default()).unwrap();
        assert!(engine.submit("   ").unwrap().is_rejected());
        assert_eq!(calls.get(), 0);
        assert!(engine.store().is_empty());
    }

    #[test]
    fn classifier_failure_leaves_store_untouched() {
        let failing = |_: &ClassifyRequest| -> Result<String, ClassifierError> {
            Err(ClassifierError::Unavailable("connection refused".into()))
        };
        let mut engine = Engine::new(failing, EngineConfig::default()).unwrap();
        let err = engine.submit("anything").unwrap_err();
        assert!(matches!(err, SubmitError::Classification(_)));
        assert!(err.is_retryable());
        assert!(engine.store().is_empty());
    }

    #[test]
    fn garbage_answer_is_parse_failure() {
        let mut engine = Engine::new(fixed("sure! here you go"), EngineConfig::default())
            .unwrap();
        let err = engine.submit("text").unwrap_err();
        assert!(matches!(err, SubmitError::Parse(_)));
        assert!(engine.store().is_empty());
    }

    #[test]
    fn hints_carry_known_keywords() {
        let seen = std::cell::RefCell::new(Vec::new());
        let clf = |req: &ClassifyRequest| -> Result<String, ClassifierError> {
            seen.borrow_mut().push(req.keyword_hints.clone());
            Ok("privacy|반대|age checks collect too much data".to_string())
        };
        let mut engine = Engine::new(clf, EngineConfig::default()).unwrap();
        engine.submit("first").unwrap();
        engine.submit("second").unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![Vec::<String>::new(), vec!["privacy".to_string()]]
        );
    }

    #[test]
    fn shared_batch_folds_in_input_order() {
        let engine = SharedEngine::new(
            |req: &ClassifyRequest| -> Result<String, ClassifierError> {
                if req.text.starts_with("off") {
                    Ok("IRRELEVANT".to_string())
                } else {
                    Ok(format!("k|찬성|{}", req.text))
                }
            },
            EngineConfig::default(),
        )
        .unwrap();
        let texts = vec![
            "teach media literacy in every school",
            "off topic",
            "teach media literacy in every school!",
            "fine the platforms for addictive feeds",
        ];
        let results = engine.submit_batch(&texts);
        assert_eq!(results.len(), 4);
        assert!(matches!(results[0], Ok(SubmissionOutcome::Created { .. })));
        assert!(results[1].as_ref().unwrap().is_rejected());
        assert!(matches!(
            results[2],
            Ok(SubmissionOutcome::Merged { support_count: 2, .. })
        ));
        assert!(matches!(results[3], Ok(SubmissionOutcome::Created { .. })));

        let store = engine.into_store();
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_support(), 3);
    }

    #[test]
    fn concurrent_submissions_do_not_lose_updates() {
        let engine = SharedEngine::new(fixed("k|찬성|same sentence"), EngineConfig::default())
            .unwrap();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..25 {
                        engine.submit("same").unwrap();
                    }
                });
            }
        });
        let store = engine.snapshot();
        assert_eq!(store.len(), 1);
        assert_eq!(store.iter().next().unwrap().support_count, 200);
    }

    #[test]
    fn invalid_config_is_refused() {
        let broken: [fn(&mut EngineConfig); 4] = [
            |c: &mut EngineConfig| c.matching.threshold = f64::NAN,
            |c: &mut EngineConfig| c.matching.threshold = -1.0,
            |c: &mut EngineConfig| c.max_keyword_chars = 0,
            |c: &mut EngineConfig| c.civility.penalty = f64::INFINITY,
        ];
        for breaks in broken {
            let mut cfg = EngineConfig::default();
            breaks(&mut cfg);
            assert!(matches!(
                Engine::new(fixed("k|찬성|x"), cfg.clone()),
                Err(Error::Config(_))
            ));
            assert!(SharedEngine::new(fixed("k|찬성|x"), cfg.clone()).is_err());
            let matcher: LinearMatcher = LinearMatcher::default();
            assert!(Engine::with_matcher(fixed("k|찬성|x"), matcher, cfg).is_err());
        }
    }

    #[test]
    fn civility_is_rated_from_the_original_text() {
        let mut engine =
            Engine::new(fixed("기술|반대|차단은 효과가 제한적입니다"), EngineConfig::default())
                .unwrap();
        let id = engine
            .submit("꼰대들이 뭘 알아? VPN 쓰면 됨.")
            .unwrap()
            .cluster_id()
            .unwrap();
        assert!((engine.store().get(id).unwrap().civility - 0.2).abs() < 1e-9);

        engine.submit("VPN 때문에 차단 효과가 없습니다").unwrap();
        let c = engine.store().get(id).unwrap();
        assert_eq!(c.support_count, 2);
        assert!((c.civility - 0.6).abs() < 1e-9);

        let polite = engine.query(&ClusterQuery::default().min_civility(0.7));
        assert!(polite.is_empty());
    }

    #[test]
    fn planting_is_all_or_nothing() {
        let mut engine = Engine::new(fixed("IRRELEVANT"), EngineConfig::default()).unwrap();
        let mut seeds = seed::default_garden();
        seeds[5].refined_text = String::new();
        assert!(matches!(engine.plant(&seeds), Err(Error::Seed { index: 5, .. })));
        assert!(engine.store().is_empty());

        let ids = engine.plant(&seed::default_garden()).unwrap();
        assert_eq!(ids.len(), 7);
        assert_eq!(engine.store().total_support(), 7);
        assert_eq!(
            engine.store().keywords(),
            vec!["실효성 및 기술", "보호 및 규제 필요성", "프라이버시/기본권"]
        );
    }

    #[test]
    fn seeds_without_civility_are_rated() {
        let engine = SharedEngine::new(fixed("IRRELEVANT"), EngineConfig::default()).unwrap();
        let seed = SeedOpinion {
            keyword: "k".into(),
            refined_text: "refined".into(),
            original_text: "미쳤네 진짜".into(),
            score: None,
            civility: None,
        };
        let ids = engine.plant(&[seed]).unwrap();
        let c = &engine.query(&ClusterQuery::default())[0];
        assert_eq!(c.id, ids[0]);
        assert!((c.civility - 0.6).abs() < 1e-9);
        assert_eq!(c.score, 0.5);
    }

    #[test]
    fn shared_query_returns_filtered_copies() {
        let engine = SharedEngine::new(
            |req: &ClassifyRequest| -> Result<String, ClassifierError> {
                Ok(format!("{}|찬성|{}", req.text, req.text))
            },
            EngineConfig::default(),
        )
        .unwrap();
        engine.submit_batch(&["a", "b", "a"]);
        let top = engine.query(&ClusterQuery::sorted_by(SortKey::SupportCount).limit(1));
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].keyword, "a");
        assert_eq!(top[0].support_count, 2);
        assert_eq!(engine.query(&ClusterQuery::default().keyword("b")).len(), 1);
    }
}
