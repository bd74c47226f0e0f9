//! Spectral peak extraction
//!
//! Finds time–frequency cells that are simultaneously a 3×3 local
//! maximum, above a per-frame relative threshold, and (optionally)
//! above an absolute magnitude gate, restricted to the configured
//! frequency band.
//!
//! Peaks are returned frequency-major (ascending bin, then ascending
//! time). Hash pairing walks this order, so it is part of the
//! fingerprint contract and must not change between ingest and query.

use crate::dsp::filter;
use crate::dsp::stft::Spectrogram;
use filmprint_common::params::PeakParams;
use tracing::debug;

/// One detected spectral maximum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Seconds from signal start
    pub t: f32,
    /// Hz
    pub f: f32,
    /// STFT magnitude
    pub a: f32,
}

/// Extract spectral peaks from mono PCM.
///
/// Returns an empty vector whenever any stage yields the empty set
/// (silent input, band without bins, no cell passing the gates).
pub fn extract_peaks(samples: &[f32], sample_rate: u32, params: &PeakParams) -> Vec<Peak> {
    let filtered;
    let signal = if params.median_filter {
        filtered = filter::median3(samples);
        &filtered[..]
    } else {
        samples
    };

    let spec = Spectrogram::compute(signal, sample_rate, params.frame_size, params.hop_size);
    if spec.is_empty() {
        debug!("Spectrogram empty, no peaks");
        return Vec::new();
    }

    // Band restriction: inclusive on both edges.
    let bin_lo = (params.min_freq / spec.bin_hz).ceil() as usize;
    let bin_hi = ((params.max_freq / spec.bin_hz).floor() as usize).min(spec.n_bins() - 1);
    if bin_lo > bin_hi {
        debug!(
            min_freq = params.min_freq,
            max_freq = params.max_freq,
            "No STFT bins inside requested band"
        );
        return Vec::new();
    }

    let n_frames = spec.n_frames();

    // Per-frame maximum over the banded rows, with epsilon standing
    // in for silent frames to keep the relative gate well-defined.
    let mut col_max = vec![f32::EPSILON; n_frames];
    for bin in bin_lo..=bin_hi {
        for frame in 0..n_frames {
            let m = spec.mag(bin, frame);
            if m > col_max[frame] {
                col_max[frame] = m;
            }
        }
    }

    let mut peaks = Vec::new();
    for bin in bin_lo..=bin_hi {
        for frame in 0..n_frames {
            let m = spec.mag(bin, frame);

            if m <= params.threshold * col_max[frame] {
                continue;
            }
            if let Some(abs) = params.absolute_threshold {
                if m <= abs {
                    continue;
                }
            }
            if !is_local_max(&spec, bin, frame, bin_lo, bin_hi) {
                continue;
            }

            peaks.push(Peak {
                t: spec.time(frame),
                f: spec.freq(bin),
                a: m,
            });
        }
    }

    if let Some(cap) = params.max_peaks {
        if peaks.len() > cap {
            // Keep the strongest, then restore the scan order the
            // hash generator depends on.
            peaks.sort_by(|a, b| b.a.partial_cmp(&a.a).unwrap_or(std::cmp::Ordering::Equal));
            peaks.truncate(cap);
            peaks.sort_by(|a, b| {
                (a.f, a.t)
                    .partial_cmp(&(b.f, b.t))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    debug!(count = peaks.len(), "Extracted peaks");
    peaks
}

/// 3×3 dilation test: the cell equals the maximum of its
/// neighborhood, clamped to the banded submatrix.
#[inline]
fn is_local_max(spec: &Spectrogram, bin: usize, frame: usize, bin_lo: usize, bin_hi: usize) -> bool {
    let m = spec.mag(bin, frame);
    let b_start = bin.saturating_sub(1).max(bin_lo);
    let b_end = (bin + 1).min(bin_hi);
    let f_start = frame.saturating_sub(1);
    let f_end = (frame + 1).min(spec.n_frames() - 1);

    for b in b_start..=b_end {
        for f in f_start..=f_end {
            if spec.mag(b, f) > m {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, secs: f32, sr: u32) -> Vec<f32> {
        (0..(secs * sr as f32) as usize)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn test_tone_peaks_at_tone_frequency() {
        let samples = sine(437.5, 2.0, 16_000);
        let peaks = extract_peaks(&samples, 16_000, &PeakParams::default());
        assert!(!peaks.is_empty());
        for p in &peaks {
            assert!(
                (p.f - 437.5).abs() < 32.0,
                "peak at {} Hz far from tone",
                p.f
            );
        }
    }

    #[test]
    fn test_band_is_respected() {
        // tone below the band floor must produce nothing in-band
        let samples = sine(50.0, 2.0, 16_000);
        let peaks = extract_peaks(&samples, 16_000, &PeakParams::default());
        for p in &peaks {
            assert!(p.f >= 100.0 && p.f <= 4000.0);
        }
    }

    #[test]
    fn test_silence_yields_no_peaks() {
        let samples = vec![0.0f32; 32_000];
        let peaks = extract_peaks(&samples, 16_000, &PeakParams::default());
        assert!(peaks.is_empty());
    }

    #[test]
    fn test_too_short_for_one_frame_yields_no_peaks() {
        let samples = sine(440.0, 0.01, 16_000);
        let peaks = extract_peaks(&samples, 16_000, &PeakParams::default());
        assert!(peaks.is_empty());
    }

    #[test]
    fn test_max_peaks_caps_and_keeps_scan_order() {
        let mut samples = sine(437.5, 2.0, 16_000);
        let other = sine(1000.0, 2.0, 16_000);
        for (a, b) in samples.iter_mut().zip(other.iter()) {
            *a = 0.6 * *a + 0.4 * b;
        }
        let mut params = PeakParams {
            max_peaks: Some(10),
            ..PeakParams::default()
        };
        params.threshold = 0.3;
        let peaks = extract_peaks(&samples, 16_000, &params);
        assert!(peaks.len() <= 10);
        for w in peaks.windows(2) {
            let ordered = w[0].f < w[1].f || (w[0].f == w[1].f && w[0].t <= w[1].t);
            assert!(ordered, "peaks not in frequency-major order");
        }
    }

    #[test]
    fn test_absolute_threshold_gates() {
        let samples = sine(437.5, 2.0, 16_000);
        let params = PeakParams {
            absolute_threshold: Some(f32::MAX),
            ..PeakParams::default()
        };
        let peaks = extract_peaks(&samples, 16_000, &params);
        assert!(peaks.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let samples = sine(880.0, 1.5, 16_000);
        let a = extract_peaks(&samples, 16_000, &PeakParams::default());
        let b = extract_peaks(&samples, 16_000, &PeakParams::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_frequency_major_order() {
        let mut samples = sine(437.5, 2.0, 16_000);
        let other = sine(2000.0, 2.0, 16_000);
        for (a, b) in samples.iter_mut().zip(other.iter()) {
            *a = 0.5 * (*a + b);
        }
        let peaks = extract_peaks(&samples, 16_000, &PeakParams::default());
        for w in peaks.windows(2) {
            let ordered = w[0].f < w[1].f || (w[0].f == w[1].f && w[0].t <= w[1].t);
            assert!(ordered);
        }
    }
}
