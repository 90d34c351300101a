use std::collections::{HashMap, HashSet};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::model::{ClusterId, OpinionCluster};

/// In-memory collection of clusters, kept in creation order.
///
/// The store only grows: there is no way to remove or split a cluster.
/// Outside the crate it is read-only; clusters change only through the
/// engine, which keeps support counts and scores consistent.
///
/// ```compile_fail
/// let mut store = opinion_garden::ClusterStore::new();
/// store.insert("k", "text", "sample", 42.0, 1.0);
/// ```
///
/// ```compile_fail
/// # use opinion_garden::{ClusterId, ClusterStore};
/// let mut store = ClusterStore::new();
/// store.get_mut(ClusterId(1)).unwrap().support_count = 0;
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterStore {
    clusters: Vec<OpinionCluster>,
    #[serde(skip)]
    next_id: u64,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cluster with a support count of 1 and return its id.
    pub(crate) fn insert(
        &mut self,
        keyword: &str,
        text: &str,
        sample: &str,
        score: f64,
        civility: f64,
    ) -> ClusterId {
        self.next_id += 1;
        let id = ClusterId(self.next_id);
        self.clusters.push(OpinionCluster {
            id,
            keyword: keyword.to_string(),
            representative_text: text.to_string(),
            original_samples: vec![sample.to_string()],
            support_count: 1,
            score,
            civility,
        });
        id
    }

    pub fn get(&self, id: ClusterId) -> Option<&OpinionCluster> {
        self.position(id).map(|i| &self.clusters[i])
    }

    pub(crate) fn get_mut(&mut self, id: ClusterId) -> Option<&mut OpinionCluster> {
        self.position(id).map(|i| &mut self.clusters[i])
    }

    // ids are handed out in push order, so the vector is sorted by id
    fn position(&self, id: ClusterId) -> Option<usize> {
        self.clusters.binary_search_by_key(&id, |c| c.id).ok()
    }

    /// Clusters in creation order.
    pub fn iter(&self) -> std::slice::Iter<'_, OpinionCluster> {
        self.clusters.iter()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Distinct keywords in first-seen order.
    pub fn keywords(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.clusters
            .iter()
            .filter(|c| seen.insert(c.keyword.as_str()))
            .map(|c| c.keyword.clone())
            .collect()
    }

    /// Number of accepted submissions across all clusters.
    pub fn total_support(&self) -> u64 {
        self.clusters.iter().map(|c| c.support_count).sum()
    }

    /// Filter and sort the clusters for display.
    pub fn query(&self, q: &ClusterQuery) -> Vec<&OpinionCluster> {
        let mut out: Vec<&OpinionCluster> = self
            .clusters
            .iter()
            .filter(|c| q.keyword.as_deref().is_none_or(|k| c.keyword == k))
            .filter(|c| q.min_score.is_none_or(|min| c.score >= min))
            .filter(|c| q.min_civility.is_none_or(|min| c.civility >= min))
            .collect();

        // stable sort: equal keys stay in creation order
        match q.sort {
            SortKey::Creation => {}
            SortKey::SupportCount => out.sort_by(|a, b| b.support_count.cmp(&a.support_count)),
            SortKey::Score => out.sort_by(|a, b| b.score.total_cmp(&a.score)),
            SortKey::Keyword => out.sort_by(|a, b| a.keyword.cmp(&b.keyword)),
        }

        if let Some(cap) = q.per_keyword {
            let mut taken: HashMap<&str, usize> = HashMap::new();
            out.retain(|c| {
                let n = taken.entry(c.keyword.as_str()).or_insert(0);
                *n += 1;
                *n <= cap
            });
        }
        if let Some(limit) = q.limit {
            out.truncate(limit);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Creation,
    /// Descending.
    SupportCount,
    /// Descending.
    Score,
    /// Ascending.
    Keyword,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterQuery {
    pub keyword: Option<String>,
    pub min_score: Option<f64>,
    /// Hide clusters whose mean civility is below this value.
    pub min_civility: Option<f64>,
    pub sort: SortKey,
    /// Keep at most this many clusters per keyword, after sorting.
    pub per_keyword: Option<usize>,
    pub limit: Option<usize>,
}

impl ClusterQuery {
    pub fn sorted_by(sort: SortKey) -> Self {
        Self {
            sort,
            ..Default::default()
        }
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn min_score(mut self, min: f64) -> Self {
        self.min_score = Some(min);
        self
    }

    pub fn min_civility(mut self, min: f64) -> Self {
        self.min_civility = Some(min);
        self
    }

    pub fn per_keyword(mut self, cap: usize) -> Self {
        self.per_keyword = Some(cap);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> ClusterStore {
        fixtures::grown(&[
            ("tech", "vpn makes bans useless", "vpn", 0.4, 3),
            ("privacy", "age checks leak data", "age", 0.9, 1),
            ("tech", "teach literacy instead", "teach", 0.7, 2),
            ("safety", "algorithms are addictive", "algo", 0.9, 1),
        ])
    }

    fn ids(v: &[&OpinionCluster]) -> Vec<u64> {
        v.iter().map(|c| c.id.0).collect()
    }

    #[test]
    fn ids_are_sequential_and_lookup_works() {
        let s = sample_store();
        assert_eq!(s.len(), 4);
        assert_eq!(ids(&s.iter().collect::<Vec<_>>()), vec![1, 2, 3, 4]);
        assert_eq!(s.get(ClusterId(2)).unwrap().keyword, "privacy");
        assert!(s.get(ClusterId(9)).is_none());
        assert_eq!(s.total_support(), 7);
    }

    #[test]
    fn keywords_are_distinct_in_first_seen_order() {
        assert_eq!(sample_store().keywords(), vec!["tech", "privacy", "safety"]);
    }

    #[test]
    fn sort_by_support_then_creation() {
        let s = sample_store();
        let out = s.query(&ClusterQuery::sorted_by(SortKey::SupportCount));
        assert_eq!(ids(&out), vec![1, 3, 2, 4]);
    }

    #[test]
    fn sort_by_score_breaks_ties_by_creation() {
        let s = sample_store();
        let out = s.query(&ClusterQuery::sorted_by(SortKey::Score));
        assert_eq!(ids(&out), vec![2, 4, 3, 1]);
    }

    #[test]
    fn filters_and_caps() {
        let s = sample_store();
        let out = s.query(&ClusterQuery::sorted_by(SortKey::Score).keyword("tech"));
        assert_eq!(ids(&out), vec![3, 1]);

        let out = s.query(&ClusterQuery::default().min_score(0.7));
        assert_eq!(ids(&out), vec![2, 3, 4]);

        let out = s.query(&ClusterQuery::sorted_by(SortKey::Keyword).per_keyword(1));
        assert_eq!(ids(&out), vec![2, 4, 1]);

        let out = s.query(&ClusterQuery::sorted_by(SortKey::SupportCount).limit(2));
        assert_eq!(ids(&out), vec![1, 3]);
    }

    #[test]
    fn civility_filter_hides_rude_clusters() {
        let mut s = sample_store();
        let rude = s.insert("tech", "bans are for idiots", "lol", 0.1, 0.2);
        let all = s.query(&ClusterQuery::default());
        assert_eq!(all.len(), 5);

        let out = s.query(&ClusterQuery::sorted_by(SortKey::Score).min_civility(0.4));
        assert!(out.iter().all(|c| c.id != rude));
        assert_eq!(ids(&out), vec![2, 4, 3, 1]);
        // the bound is inclusive
        assert_eq!(s.query(&ClusterQuery::default().min_civility(0.2)).len(), 5);
    }

    #[test]
    fn empty_store_queries_are_empty() {
        let s = ClusterStore::new();
        assert!(s.is_empty());
        assert!(s.query(&ClusterQuery::default()).is_empty());
        assert!(s.keywords().is_empty());
    }
}
