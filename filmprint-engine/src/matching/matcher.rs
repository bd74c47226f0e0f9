//! Offset-histogram consensus matching
//!
//! Joins a fragment's hashes against the store, accumulates
//! `(track, offset)` votes, filters implausible and pathological
//! bins, and selects the maximum-weight alignment. When the full
//! 12-hex lookup comes back empty, degraded lookups on 8- and 6-hex
//! prefixes run at reduced vote weight; coarse collisions are
//! absorbed by the voting, not treated as errors.

use crate::fingerprint::FingerprintTuple;
use crate::matching::cluster;
use crate::store::{FingerprintStore, HashHit};
use filmprint_common::params::{MatcherParams, MIN_HASHES};
use filmprint_common::time::round2;
use filmprint_common::{Error, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// A scored `(track, offset)` decision
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub track_id: i64,
    /// Seconds into the stored track that align with fragment time 0
    pub offset: f64,
    /// Aggregate vote weight behind the winning alignment
    pub score: f64,
    /// Number of fragment hashes checked
    pub total_checked: usize,
    /// 0–100
    pub confidence: f64,
    /// Whether the offset fits inside the track's duration
    pub valid_offset: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct VoteCell {
    weight: f64,
    raw_count: u64,
}

/// Find the best-aligned `(track, offset)` for a fragment hash list.
///
/// `track_id` restricts the search to a single stored track;
/// `fragment_duration` feeds the plausibility filter.
pub async fn find_match(
    store: &dyn FingerprintStore,
    hashes: &[FingerprintTuple],
    track_id: Option<i64>,
    fragment_duration: f64,
    params: &MatcherParams,
) -> Result<MatchOutcome> {
    if hashes.len() < MIN_HASHES {
        return Err(Error::EmptyQuery {
            count: hashes.len(),
            minimum: MIN_HASHES,
        });
    }

    let hash_set: HashSet<String> = hashes.iter().map(|h| h.hash.clone()).collect();
    let hits = store.query_by_hashes(track_id, &hash_set).await?;
    debug!(
        fragment_hashes = hashes.len(),
        unique = hash_set.len(),
        store_hits = hits.len(),
        "Primary hash lookup"
    );

    let mut votes = accumulate_votes(hashes, &hits, 12, 1.0, params.delta_tolerance);

    if votes.is_empty() {
        for tier in &params.fallbacks {
            let prefixes: HashSet<String> = hash_set
                .iter()
                .filter(|h| h.len() >= tier.prefix_len)
                .map(|h| h[..tier.prefix_len].to_string())
                .collect();
            if prefixes.is_empty() {
                continue;
            }
            let hits = store.query_by_hash_prefixes(track_id, &prefixes).await?;
            debug!(
                prefix_len = tier.prefix_len,
                weight = tier.weight,
                store_hits = hits.len(),
                "Fallback hash lookup"
            );
            votes = accumulate_votes(
                hashes,
                &hits,
                tier.prefix_len,
                tier.weight,
                params.delta_tolerance,
            );
            if !votes.is_empty() {
                break;
            }
        }
    }

    if votes.is_empty() {
        return Err(Error::NoMatch);
    }

    // Plausibility: an alignment must start inside the track and
    // leave room for the fragment (with slack for ragged endings).
    let mut durations: HashMap<i64, Option<f64>> = HashMap::new();
    for (tr, _) in votes.keys() {
        if let std::collections::hash_map::Entry::Vacant(entry) = durations.entry(*tr) {
            entry.insert(store.get_track_duration(*tr).await?);
        }
    }
    let anomaly_cap = params.anomaly_factor * hashes.len() as f64;
    votes.retain(|(tr, bin), cell| {
        let offset = *bin as f64 * params.delta_tolerance;
        if offset < -1e-9 {
            return false;
        }
        if let Some(Some(duration)) = durations.get(tr) {
            if offset > duration - fragment_duration + params.plausibility_slack {
                return false;
            }
        }
        // pathological collision bins drown real consensus
        (cell.raw_count as f64) <= anomaly_cap
    });

    if votes.is_empty() {
        return Err(Error::NoMatch);
    }

    let (winner_track, offset, score) = select_consensus(&votes, params);

    let mut confidence = (score / hashes.len() as f64).min(1.0);
    if params.entropy_adjustment {
        confidence *= entropy_factor(&votes);
    }

    let duration = durations.get(&winner_track).copied().flatten();
    let valid_offset = match duration {
        Some(d) => {
            offset >= 0.0 && offset <= d - fragment_duration + params.plausibility_slack
        }
        None => offset >= 0.0,
    };

    let outcome = MatchOutcome {
        track_id: winner_track,
        offset,
        score,
        total_checked: hashes.len(),
        confidence: round2(confidence * 100.0),
        valid_offset,
    };
    info!(
        track_id = outcome.track_id,
        offset = format_args!("{:.2}", outcome.offset),
        score = format_args!("{:.1}", outcome.score),
        confidence = outcome.confidence,
        "Consensus match"
    );
    Ok(outcome)
}

/// Bin every `(fragment hash, store hit)` pair's offset difference
/// into the vote table. `key_len` selects how much of the token the
/// join runs on (12 = full token, shorter for fallback tiers).
fn accumulate_votes(
    hashes: &[FingerprintTuple],
    hits: &[HashHit],
    key_len: usize,
    weight: f64,
    delta_tolerance: f64,
) -> HashMap<(i64, i64), VoteCell> {
    let mut index: HashMap<&str, Vec<(i64, f64)>> = HashMap::new();
    for hit in hits {
        let key = &hit.hash[..key_len.min(hit.hash.len())];
        index.entry(key).or_default().push((hit.track_id, hit.offset));
    }

    let mut votes: HashMap<(i64, i64), VoteCell> = HashMap::new();
    for fragment in hashes {
        let key = &fragment.hash[..key_len.min(fragment.hash.len())];
        let Some(entries) = index.get(key) else {
            continue;
        };
        for &(track, t2) in entries {
            let delta = t2 - fragment.offset;
            let bin = (delta / delta_tolerance).round() as i64;
            let cell = votes.entry((track, bin)).or_default();
            cell.weight += weight;
            cell.raw_count += 1;
        }
    }
    votes
}

/// Pick the winning `(track, offset, score)`.
///
/// At fine bin widths the surviving bins of each track are clustered
/// first so one alignment split across neighboring bins still wins;
/// at coarse widths (or when no cluster survives) the heaviest single
/// bin decides.
fn select_consensus(
    votes: &HashMap<(i64, i64), VoteCell>,
    params: &MatcherParams,
) -> (i64, f64, f64) {
    let fine_bins = params.delta_tolerance < 0.1;

    if fine_bins {
        let mut per_track: HashMap<i64, Vec<(f64, f64)>> = HashMap::new();
        for ((tr, bin), cell) in votes {
            per_track
                .entry(*tr)
                .or_default()
                .push((*bin as f64 * params.delta_tolerance, cell.weight));
        }

        let mut best: Option<(i64, cluster::Cluster)> = None;
        for (tr, bins) in &per_track {
            if let Some(c) =
                cluster::densest_cluster(bins, params.cluster.eps, params.cluster.min_pts)
            {
                if best.as_ref().map_or(true, |(_, b)| c.weight > b.weight) {
                    best = Some((*tr, c));
                }
            }
        }
        if let Some((tr, c)) = best {
            return (tr, round2(c.centroid), c.weight);
        }
    }

    let ((tr, bin), cell) = votes
        .iter()
        .max_by(|a, b| {
            a.1.weight
                .partial_cmp(&b.1.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("non-empty vote table");
    (*tr, round2(*bin as f64 * params.delta_tolerance), cell.weight)
}

/// `1 - H_e / log N` over the surviving bins: flat (ambiguous)
/// distributions score near 0, concentrated ones near 1.
fn entropy_factor(votes: &HashMap<(i64, i64), VoteCell>) -> f64 {
    let n = votes.len();
    if n <= 1 {
        return 1.0;
    }
    let total: f64 = votes.values().map(|c| c.weight).sum();
    if total <= 0.0 {
        return 1.0;
    }
    let entropy: f64 = votes
        .values()
        .map(|c| {
            let p = c.weight / total;
            if p > 0.0 {
                -p * p.ln()
            } else {
                0.0
            }
        })
        .sum();
    (1.0 - entropy / (n as f64).ln()).max(0.0)
}
