//! 1-D density clustering over offset bins
//!
//! Fine-grained offset bins from one true alignment land within a
//! few bin widths of each other; grouping them before consensus
//! keeps the vote from splitting across neighboring bins.

/// One cluster of neighboring offset bins
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Weighted mean offset of the member bins (seconds)
    pub centroid: f64,
    /// Aggregate vote weight
    pub weight: f64,
    /// Member bin count
    pub bins: usize,
}

/// Group `(offset, weight)` bins into clusters: neighbors within
/// `eps` seconds chain together, clusters with fewer than `min_pts`
/// bins are discarded. Returns the heaviest surviving cluster.
pub fn densest_cluster(bins: &[(f64, f64)], eps: f64, min_pts: usize) -> Option<Cluster> {
    if bins.is_empty() {
        return None;
    }

    let mut sorted = bins.to_vec();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut best: Option<Cluster> = None;
    let mut start = 0usize;

    for i in 1..=sorted.len() {
        let gap_breaks = i == sorted.len() || sorted[i].0 - sorted[i - 1].0 > eps;
        if !gap_breaks {
            continue;
        }

        let members = &sorted[start..i];
        if members.len() >= min_pts {
            let weight: f64 = members.iter().map(|(_, w)| w).sum();
            let centroid = members.iter().map(|(o, w)| o * w).sum::<f64>() / weight;
            let candidate = Cluster {
                centroid,
                weight,
                bins: members.len(),
            };
            if best.as_ref().map_or(true, |b| candidate.weight > b.weight) {
                best = Some(candidate);
            }
        }
        start = i;
    }

    best
}
