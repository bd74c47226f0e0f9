//! Tunable engine parameters
//!
//! All DSP, hashing, and matching parameters live here as plain
//! structs with documented defaults. They are passed explicitly into
//! each pipeline invocation. Stored fingerprints depend on the peak
//! and hash parameters, so one installation must use one set for both
//! ingest and query.

use serde::{Deserialize, Serialize};

/// Working sample rate for all pipelines (Hz)
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Minimum usable signal length (seconds)
pub const MIN_SIGNAL_SECONDS: f64 = 0.5;

/// Minimum hash count for both ingest and query
pub const MIN_HASHES: usize = 5;

/// Spectral peak extraction parameters
///
/// Values are part of the fingerprint contract: changing them
/// invalidates stored fingerprints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakParams {
    /// STFT window length (n_fft). 1024 at 16 kHz gives 15.625 Hz bins.
    pub frame_size: usize,
    /// STFT hop length in samples
    pub hop_size: usize,
    /// Lower band edge, inclusive (Hz)
    pub min_freq: f32,
    /// Upper band edge, inclusive (Hz)
    pub max_freq: f32,
    /// Relative amplitude gate: a cell must exceed
    /// `threshold * column_max` to qualify
    pub threshold: f32,
    /// Optional absolute gate on post-normalization magnitude
    pub absolute_threshold: Option<f32>,
    /// Optional hard cap on returned peaks (top by amplitude)
    pub max_peaks: Option<usize>,
    /// Apply a 3-sample median prefilter to the signal
    pub median_filter: bool,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            hop_size: 256,
            min_freq: 100.0,
            max_freq: 4000.0,
            threshold: 0.6,
            absolute_threshold: None,
            max_peaks: None,
            median_filter: true,
        }
    }
}

/// Which peak attributes participate in the hash input string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashMode {
    /// `"{dt}"`: coarsest, most distortion-tolerant, most collisions
    DeltaOnly,
    /// `"{dt}|{f1}|{f2}"`: the production default
    Freqs,
    /// `"{dt}|{f1}|{f2}|{a1}|{a2}"`: most selective, least robust
    FreqsAmps,
}

/// Combinatorial hash generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashParams {
    /// Base cap on targets per anchor (dynamically reduced on dense
    /// signals, see `target_density`)
    pub fan_value: usize,
    /// Minimum anchor→target spacing (seconds, exclusive)
    pub min_delta: f64,
    /// Maximum anchor→target spacing (seconds, exclusive)
    pub max_delta: f64,
    /// Quantum for all peak times and deltas (seconds)
    pub time_precision: f64,
    /// Reference peak density (peaks/s) used to scale the fan-out
    pub target_density: f64,
    /// Hard cap on emitted hashes per signal
    pub max_hashes: usize,
    /// Which peak attributes feed the hash
    pub mode: HashMode,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            fan_value: 15,
            min_delta: 0.5,
            max_delta: 8.0,
            time_precision: 0.05,
            target_density: 100.0,
            max_hashes: 200_000,
            mode: HashMode::Freqs,
        }
    }
}

/// One tier of the matcher's hash-prefix fallback
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FallbackTier {
    /// How many leading hex chars of the token to compare
    pub prefix_len: usize,
    /// Vote weight for matches found at this tier
    pub weight: f64,
}

/// 1-D density clustering over surviving offset bins
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Maximum gap between neighboring bins in one cluster (seconds)
    pub eps: f64,
    /// Minimum bins per cluster
    pub min_pts: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self { eps: 2.0, min_pts: 3 }
    }
}

/// Offset-consensus matcher parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherParams {
    /// Offset histogram bin width (seconds). 0.02 is refine-quality;
    /// 0.5 is the coarse profile.
    pub delta_tolerance: f64,
    /// Prefix fallback tiers tried in order when the full-token
    /// lookup returns nothing. Weights are empirical.
    pub fallbacks: Vec<FallbackTier>,
    /// Slack added to the plausible-offset upper bound (seconds)
    pub plausibility_slack: f64,
    /// Bins with more than `anomaly_factor * |H|` raw matches are
    /// treated as pathological collisions and dropped
    pub anomaly_factor: f64,
    /// Clustering of fine bins; applied when `delta_tolerance` is
    /// fine (< ~0.1 s)
    pub cluster: ClusterParams,
    /// Down-weight ambiguous vote distributions by their entropy
    pub entropy_adjustment: bool,
}

impl Default for MatcherParams {
    fn default() -> Self {
        Self {
            delta_tolerance: 0.02,
            fallbacks: vec![
                FallbackTier { prefix_len: 8, weight: 0.3 },
                FallbackTier { prefix_len: 6, weight: 0.1 },
            ],
            plausibility_slack: 3.0,
            anomaly_factor: 100.0,
            cluster: ClusterParams::default(),
            entropy_adjustment: false,
        }
    }
}

/// Cross-correlation refinement parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineParams {
    /// Run the refiner after a successful vote
    pub enabled: bool,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Ingest retry policy for sparse signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryParams {
    /// Amount subtracted from `PeakParams::threshold` on retry
    pub threshold_drop: f32,
    /// Amount added to `HashParams::fan_value` on retry
    pub fan_boost: usize,
}

impl Default for RetryParams {
    fn default() -> Self {
        Self { threshold_drop: 0.2, fan_boost: 5 }
    }
}

/// Complete engine parameter set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineParams {
    pub peaks: PeakParams,
    pub hashes: HashParams,
    pub matcher: MatcherParams,
    pub refine: RefineParams,
    pub retry: RetryParams,
}

impl EngineParams {
    /// The relaxed parameter set used for the single ingest retry:
    /// lower relative threshold, larger fan-out.
    pub fn relaxed(&self) -> Self {
        let mut relaxed = self.clone();
        relaxed.peaks.threshold = (self.peaks.threshold - self.retry.threshold_drop).max(0.05);
        relaxed.hashes.fan_value = self.hashes.fan_value + self.retry.fan_boost;
        relaxed
    }
}
