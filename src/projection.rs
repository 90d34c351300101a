//! Read-only views of the cluster store for the deliberation map.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::model::{ClusterId, OpinionCluster};
use crate::store::ClusterStore;

/// Node of the area-proportional (treemap) hierarchy: root, keyword, cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapNode {
    pub name: String,
    /// Support count for leaves, sum of children otherwise.
    pub weight: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ClusterId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MapNode>,
}

/// One cluster on the score/support plane.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub id: ClusterId,
    pub keyword: String,
    pub label: String,
    /// Cluster score (representativeness or polarity).
    pub x: f64,
    /// Support count.
    pub y: u64,
    /// Fraction of all accepted submissions held by this cluster.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusSummary {
    pub total_support: u64,
    pub cluster_count: usize,
    /// Keyword with the most support; earliest keyword wins ties.
    pub leading_keyword: Option<String>,
    pub leading_share: f64,
}

/// Everything the presentation layer needs, in one serializable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliberationMap {
    pub hierarchy: MapNode,
    pub scatter: Vec<ScatterPoint>,
    pub consensus: ConsensusSummary,
}

pub fn hierarchy(store: &ClusterStore, root_label: &str) -> MapNode {
    let mut by_keyword: BTreeMap<&str, Vec<&OpinionCluster>> = BTreeMap::new();
    for c in store.iter() {
        by_keyword.entry(c.keyword.as_str()).or_default().push(c);
    }

    let children: Vec<MapNode> = by_keyword
        .into_iter()
        .map(|(keyword, clusters)| {
            let leaves: Vec<MapNode> = clusters
                .into_iter()
                .map(|c| MapNode {
                    name: c.representative_text.clone(),
                    weight: c.support_count,
                    id: Some(c.id),
                    children: Vec::new(),
                })
                .collect();
            MapNode {
                name: keyword.to_string(),
                weight: leaves.iter().map(|l| l.weight).sum(),
                id: None,
                children: leaves,
            }
        })
        .collect();

    MapNode {
        name: root_label.to_string(),
        weight: children.iter().map(|c| c.weight).sum(),
        id: None,
        children,
    }
}

pub fn scatter(store: &ClusterStore) -> Vec<ScatterPoint> {
    let total = store.total_support();
    store
        .iter()
        .map(|c| ScatterPoint {
            id: c.id,
            keyword: c.keyword.clone(),
            label: c.representative_text.clone(),
            x: c.score,
            y: c.support_count,
            share: share(c.support_count, total),
        })
        .collect()
}

pub fn consensus(store: &ClusterStore) -> ConsensusSummary {
    let total = store.total_support();
    let mut support: HashMap<&str, u64> = HashMap::new();
    for c in store.iter() {
        *support.entry(c.keyword.as_str()).or_insert(0) += c.support_count;
    }

    let mut leading: Option<(String, u64)> = None;
    for keyword in store.keywords() {
        let n = support.get(keyword.as_str()).copied().unwrap_or(0);
        if leading.as_ref().is_none_or(|(_, best)| n > *best) {
            leading = Some((keyword, n));
        }
    }

    let (leading_keyword, leading_share) = match leading {
        Some((k, n)) => (Some(k), share(n, total)),
        None => (None, 0.0),
    };
    ConsensusSummary {
        total_support: total,
        cluster_count: store.len(),
        leading_keyword,
        leading_share,
    }
}

pub fn project(store: &ClusterStore, title: &str) -> DeliberationMap {
    DeliberationMap {
        hierarchy: hierarchy(store, title),
        scatter: scatter(store),
        consensus: consensus(store),
    }
}

fn share(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
