//! Greedy histogram clustering for context maps
//!
//! Each `(block type, context)` histogram starts in its own cluster. The pair
//! whose merge increases the estimated cost the least is merged while there
//! are more clusters than prefix codes allowed, or while merging saves bits.

use crate::histogram::Histogram;

/// Clusters above this count are first reduced within groups of contexts
const PAIRWISE_LIMIT: usize = 128;

/// Result of clustering: the context map and one histogram per cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    /// Cluster index of every input histogram
    pub map: Vec<u8>,
    /// Merged histogram of every cluster, indexed by cluster
    pub histograms: Vec<Histogram>,
}

struct Cluster {
    members: Vec<usize>,
    histogram: Histogram,
    cost: f64,
}

impl Cluster {
    fn merge_cost(&self, other: &Self) -> (Histogram, f64) {
        let merged = self.histogram.merged(&other.histogram);
        let cost = merged.cost();
        (merged, cost - self.cost - other.cost)
    }
}

/// Merge clusters greedily until at most `max_clusters` remain and no merge saves bits
fn merge_greedy(mut clusters: Vec<Cluster>, max_clusters: usize) -> Vec<Cluster> {
    let n = clusters.len();
    let mut alive = vec![true; n];
    let mut delta = vec![vec![f64::INFINITY; n]; n];
    for i in 0..n {
        for j in i + 1..n {
            delta[i][j] = clusters[i].merge_cost(&clusters[j]).1;
        }
    }

    let mut remaining = n;
    while remaining > 1 {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in (0..n).filter(|&i| alive[i]) {
            for j in (i + 1..n).filter(|&j| alive[j]) {
                if best.is_none_or(|(_, _, cost)| delta[i][j] < cost) {
                    best = Some((i, j, delta[i][j]));
                }
            }
        }
        let Some((i, j, cost)) = best else { break };
        if remaining <= max_clusters && cost >= 0.0 {
            break;
        }

        let (merged, _) = clusters[i].merge_cost(&clusters[j]);
        let members = std::mem::take(&mut clusters[j].members);
        clusters[i].members.extend(members);
        clusters[i].cost = merged.cost();
        clusters[i].histogram = merged;
        alive[j] = false;
        remaining -= 1;

        for k in (0..n).filter(|&k| alive[k] && k != i) {
            let cost = clusters[i].merge_cost(&clusters[k]).1;
            let (low, high) = if k < i { (k, i) } else { (i, k) };
            delta[low][high] = cost;
        }
    }

    clusters
        .into_iter()
        .zip(alive)
        .filter_map(|(cluster, alive)| alive.then_some(cluster))
        .collect()
}

/// Cluster histograms into at most `max_clusters` groups
///
/// Histograms are grouped `group_size` at a time (the contexts of one block
/// type) before clusters of different groups are compared. Empty histograms
/// take the cluster of the histogram before them so context map runs stay
/// long. Cluster indices follow first use.
pub fn cluster_histograms(histograms: &[Histogram], group_size: usize, max_clusters: usize) -> Clustering {
    let max_clusters = max_clusters.clamp(1, 256);
    let alphabet_size = histograms.first().map_or(1, |h| h.counts().len());
    let singleton = |index: usize| Cluster {
        members: vec![index],
        histogram: histograms[index].clone(),
        cost: histograms[index].cost(),
    };

    let mut clusters: Vec<Cluster> = Vec::new();
    for (group, chunk) in histograms.chunks(group_size.max(1)).enumerate() {
        let start = group * group_size.max(1);
        let group_clusters: Vec<Cluster> = (start..start + chunk.len())
            .filter(|&index| !histograms[index].is_empty())
            .map(singleton)
            .collect();
        clusters.extend(merge_greedy(group_clusters, max_clusters));
    }
    while clusters.len() > PAIRWISE_LIMIT {
        // Fold neighbours until the pairwise search is affordable
        let mut folded = Vec::with_capacity(clusters.len().div_ceil(2));
        let mut iter = clusters.into_iter();
        while let Some(mut first) = iter.next() {
            if let Some(second) = iter.next() {
                first.histogram.add_histogram(&second.histogram);
                first.members.extend(second.members);
                first.cost = first.histogram.cost();
            }
            folded.push(first);
        }
        clusters = folded;
    }
    let clusters = merge_greedy(clusters, max_clusters);

    let mut owner = vec![None; histograms.len()];
    for (cluster_index, cluster) in clusters.iter().enumerate() {
        for &member in &cluster.members {
            owner[member] = Some(cluster_index);
        }
    }
    let mut renumber: Vec<Option<u8>> = vec![None; clusters.len()];
    let mut order = Vec::with_capacity(clusters.len());
    let mut map = Vec::with_capacity(histograms.len());
    let mut previous = 0u8;
    for slot in owner {
        let id = match slot {
            Some(cluster_index) => *renumber[cluster_index].get_or_insert_with(|| {
                order.push(cluster_index);
                (order.len() - 1) as u8
            }),
            None => previous,
        };
        map.push(id);
        previous = id;
    }

    let mut merged: Vec<Option<Histogram>> = clusters.into_iter().map(|c| Some(c.histogram)).collect();
    let mut ordered: Vec<Histogram> = order
        .into_iter()
        .filter_map(|cluster_index| merged[cluster_index].take())
        .collect();
    if ordered.is_empty() {
        ordered.push(Histogram::new(alphabet_size));
    }
    Clustering {
        map,
        histograms: ordered,
    }
}
