use crate::core::fingerprint::{Fingerprint, ImageRecord};
use rayon::prelude::*;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarityGroup {
    pub id: usize,
    pub members: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    /// Union every pair whose distance is at most `threshold`.
    UnionFind { threshold: f64 },
    /// DBSCAN; `min_points` counts the point itself.
    Dbscan { epsilon: f64, min_points: usize },
}

/// Partition `records` into similarity groups.
///
/// Records are ordered by path first, so group ids and member order only
/// depend on the corpus and the strategy, never on how the fingerprints were
/// computed. Groups are numbered from 1 by their smallest member index;
/// singletons and noise never form a group.
pub fn group_records(records: &[ImageRecord], strategy: Strategy) -> Vec<SimilarityGroup> {
    let mut ordered: Vec<&ImageRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.original_path.cmp(&b.original_path));
    ordered.dedup_by(|a, b| a.original_path == b.original_path);

    if ordered.len() < 2 {
        return Vec::new();
    }

    let clusters = match strategy {
        Strategy::UnionFind { threshold } => union_find_clusters(&ordered, threshold),
        Strategy::Dbscan {
            epsilon,
            min_points,
        } => dbscan_clusters(&ordered, epsilon, min_points),
    };

    number_clusters(clusters)
        .into_iter()
        .map(|(id, indices)| SimilarityGroup {
            id,
            members: indices
                .into_iter()
                .map(|i| ordered[i].original_path.clone())
                .collect(),
        })
        .collect()
}

fn is_close(a: &Fingerprint, b: &Fingerprint, threshold: f64) -> bool {
    match (a, b) {
        (Fingerprint::Hash(x), Fingerprint::Hash(y)) if threshold >= 0.0 => {
            let limit = threshold.floor().min(f64::from(u32::MAX)) as u32;
            x.distance_within(y, limit).is_some()
        }
        _ => a.distance_to(b) <= threshold,
    }
}

/// Indices `j > i` that sit within `threshold` of record `i`, for every `i`.
fn close_pairs(records: &[&ImageRecord], threshold: f64) -> Vec<Vec<usize>> {
    (0..records.len())
        .into_par_iter()
        .map(|i| {
            ((i + 1)..records.len())
                .filter(|&j| is_close(&records[i].fingerprint, &records[j].fingerprint, threshold))
                .collect()
        })
        .collect()
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// The smaller index always becomes the root.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
        }
    }
}

fn union_find_clusters(records: &[&ImageRecord], threshold: f64) -> Vec<Vec<usize>> {
    let mut set = DisjointSet::new(records.len());
    for (i, neighbours) in close_pairs(records, threshold).into_iter().enumerate() {
        for j in neighbours {
            set.union(i, j);
        }
    }

    let mut components: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    for i in 0..records.len() {
        let root = set.find(i);
        components[root].push(i);
    }
    components.into_iter().filter(|c| c.len() > 1).collect()
}

fn dbscan_clusters(records: &[&ImageRecord], epsilon: f64, min_points: usize) -> Vec<Vec<usize>> {
    let n = records.len();

    // Symmetric neighbourhoods, excluding the point itself.
    let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, close) in close_pairs(records, epsilon).into_iter().enumerate() {
        for j in close {
            neighbours[i].push(j);
            neighbours[j].push(i);
        }
    }
    for list in &mut neighbours {
        list.sort_unstable();
    }

    let is_core = |i: usize| neighbours[i].len() + 1 >= min_points;

    let mut label: Vec<Option<usize>> = vec![None; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for start in 0..n {
        if label[start].is_some() || !is_core(start) {
            continue;
        }
        let cluster_id = clusters.len();
        let mut members = vec![start];
        label[start] = Some(cluster_id);

        let mut frontier = vec![start];
        while let Some(point) = frontier.pop() {
            if !is_core(point) {
                continue;
            }
            for &next in &neighbours[point] {
                if label[next].is_none() {
                    label[next] = Some(cluster_id);
                    members.push(next);
                    frontier.push(next);
                }
            }
        }
        clusters.push(members);
    }

    clusters.into_iter().filter(|c| c.len() > 1).collect()
}

/// Sort members, order clusters by their first member and assign ids from 1.
fn number_clusters(mut clusters: Vec<Vec<usize>>) -> Vec<(usize, Vec<usize>)> {
    for cluster in &mut clusters {
        cluster.sort_unstable();
    }
    clusters.sort_by_key(|c| c[0]);
    clusters
        .into_iter()
        .enumerate()
        .map(|(i, c)| (i + 1, c))
        .collect()
}
