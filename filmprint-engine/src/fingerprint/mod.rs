//! Combinatorial hash generation
//!
//! Pairs each peak (anchor) with a bounded fan-out of the peaks that
//! follow it in scan order, and reduces each surviving pair to a
//! 12-hex-char SHA-1 token plus the anchor time. The same parameters
//! and string conventions must be used at ingest and query; mixing
//! them destroys recall.

use crate::dsp::Peak;
use filmprint_common::params::{HashMode, HashParams};
use filmprint_common::time::{quantize, round_to};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

/// One fingerprint: token plus quantized anchor time
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintTuple {
    /// 12 leading hex chars of SHA-1 over the pair's canonical string
    pub hash: String,
    /// Anchor time in seconds, on the `time_precision` grid
    pub offset: f64,
}

/// Fan-out after density scaling: dense signals get proportionally
/// fewer targets per anchor so the hash count stays bounded.
pub fn effective_fan(n_peaks: usize, span_seconds: f64, params: &HashParams) -> usize {
    if span_seconds <= 0.0 {
        return params.fan_value.max(1);
    }
    let density = n_peaks as f64 / span_seconds;
    if density <= 0.0 {
        return params.fan_value.max(1);
    }
    let scaled = (params.fan_value as f64 * params.target_density / density).floor() as usize;
    scaled.clamp(1, params.fan_value)
}

/// Generate `(hash, anchor_time)` tuples from a peak list.
///
/// Deterministic for identical input and parameters. Stops (with a
/// warning) once `max_hashes` tuples have been emitted.
pub fn generate_hashes(peaks: &[Peak], params: &HashParams) -> Vec<FingerprintTuple> {
    if peaks.len() < 2 {
        debug!(count = peaks.len(), "Too few peaks to form pairs");
        return Vec::new();
    }

    let times: Vec<f64> = peaks
        .iter()
        .map(|p| quantize(p.t as f64, params.time_precision))
        .collect();

    let (mut t_min, mut t_max) = (f64::MAX, f64::MIN);
    for &t in &times {
        t_min = t_min.min(t);
        t_max = t_max.max(t);
    }
    let fan = effective_fan(peaks.len(), t_max - t_min, params);

    let mut hashes = Vec::new();
    for i in 0..peaks.len() {
        let t1 = times[i];
        let end = (i + fan).min(peaks.len() - 1);
        for j in (i + 1)..=end {
            let delta = round_to(times[j] - t1, 5);
            if delta <= params.min_delta || delta >= params.max_delta {
                continue;
            }

            let input = hash_input(params.mode, delta, &peaks[i], &peaks[j]);
            let digest = Sha1::digest(input.as_bytes());
            let token = format!("{:x}", digest)[..12].to_string();

            hashes.push(FingerprintTuple {
                hash: token,
                offset: t1,
            });
            if hashes.len() >= params.max_hashes {
                warn!(max_hashes = params.max_hashes, "Hash cap reached, truncating");
                return hashes;
            }
        }
    }

    debug!(count = hashes.len(), fan, "Generated hashes");
    hashes
}

/// Canonical delimited string for one peak pair.
///
/// Fixed conventions (identical at ingest and query):
/// freqs-only uses whole-Hz fields; freqs+amps adds tenth-Hz and
/// hundredth-amplitude fields.
fn hash_input(mode: HashMode, delta: f64, anchor: &Peak, target: &Peak) -> String {
    match mode {
        HashMode::DeltaOnly => format!("{:.5}", delta),
        HashMode::Freqs => format!("{:.5}|{:.0}|{:.0}", delta, anchor.f, target.f),
        HashMode::FreqsAmps => format!(
            "{:.5}|{:.1}|{:.1}|{:.2}|{:.2}",
            delta, anchor.f, target.f, anchor.a, target.a
        ),
    }
}
