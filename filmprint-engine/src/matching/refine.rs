//! Cross-correlation offset refinement
//!
//! After the vote picks a raw offset, the fragment is correlated
//! against the stored track's PCM at that position for sub-hash
//! precision. Failures here are non-fatal: the caller logs and keeps
//! the raw offset.

use crate::store::FingerprintStore;
use filmprint_common::{Error, Result};
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::debug;

/// Refined offset plus normalized correlation in [0, 1]
#[derive(Debug, Clone, Copy)]
pub struct Refinement {
    pub offset: f64,
    pub correlation: f64,
}

/// Cross-correlate `fragment` against the stored track window at
/// `raw_offset` and return the lag-corrected offset.
pub async fn refine_offset(
    store: &dyn FingerprintStore,
    track_id: i64,
    raw_offset: f64,
    fragment: &[f32],
    sample_rate: u32,
) -> Result<Refinement> {
    if fragment.is_empty() {
        return Err(Error::InvalidInput("empty fragment for refinement".into()));
    }

    let start_sample = (raw_offset * sample_rate as f64).floor().max(0.0) as u64;
    let window = store
        .load_pcm_segment(track_id, start_sample, fragment.len())
        .await?;

    let fragment = fragment.to_vec();
    let result = tokio::task::spawn_blocking(move || correlate(&fragment, &window))
        .await
        .map_err(|e| Error::Internal(format!("correlation task failed: {}", e)))??;
    let (lag, correlation) = result;

    let refined = raw_offset + lag as f64 / sample_rate as f64;
    debug!(
        track_id,
        raw_offset = format_args!("{:.3}", raw_offset),
        lag,
        refined = format_args!("{:.3}", refined),
        correlation = format_args!("{:.3}", correlation),
        "Refined offset"
    );

    Ok(Refinement {
        offset: refined.max(0.0),
        correlation,
    })
}

/// Full linear cross-correlation via FFT.
///
/// Returns `(lag, normalized_peak)` where positive lag means the
/// fragment aligns later in the window than the raw estimate.
fn correlate(fragment: &[f32], window: &[f32]) -> Result<(i64, f64)> {
    let n = fragment.len();
    let m = window.len();
    if n == 0 || m == 0 {
        return Err(Error::InvalidInput("empty correlation input".into()));
    }

    let energy_x: f64 = fragment.iter().map(|&x| (x as f64) * (x as f64)).sum();
    let energy_y: f64 = window.iter().map(|&y| (y as f64) * (y as f64)).sum();
    if energy_x <= 0.0 || energy_y <= 0.0 {
        return Err(Error::InvalidInput(
            "silent correlation input (zero energy)".into(),
        ));
    }

    let size = (n + m - 1).next_power_of_two();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(size);
    let ifft = planner.plan_fft_inverse(size);

    let mut fx: Vec<Complex<f64>> = fragment
        .iter()
        .map(|&x| Complex::new(x as f64, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();
    let mut fy: Vec<Complex<f64>> = window
        .iter()
        .map(|&y| Complex::new(y as f64, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();

    fft.process(&mut fx);
    fft.process(&mut fy);

    // circular correlation: IFFT(Y * conj(X)); index l holds lag l,
    // negative lags wrap to size - |l|
    let mut product: Vec<Complex<f64>> = fy
        .iter()
        .zip(fx.iter())
        .map(|(y, x)| y * x.conj())
        .collect();
    ifft.process(&mut product);

    let scale = 1.0 / size as f64;
    let mut best_lag = 0i64;
    let mut best_value = f64::MIN;
    for lag in -(n as i64 - 1)..=(m as i64 - 1) {
        let idx = if lag >= 0 {
            lag as usize
        } else {
            size - lag.unsigned_abs() as usize
        };
        let value = product[idx].re * scale;
        if value > best_value {
            best_value = value;
            best_lag = lag;
        }
    }

    let normalized = (best_value / (energy_x * energy_y).sqrt()).clamp(-1.0, 1.0);
    Ok((best_lag, normalized.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise_like(seed: u64, len: usize) -> Vec<f32> {
        // deterministic pseudo-noise; rich enough for a sharp
        // correlation peak
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f32 / (1u64 << 31) as f32) - 1.0
            })
            .collect()
    }

    #[test]
    fn test_zero_lag_perfect_alignment() {
        let signal = noise_like(7, 4096);
        let (lag, corr) = correlate(&signal, &signal).unwrap();
        assert_eq!(lag, 0);
        assert!(corr > 0.99);
    }

    #[test]
    fn test_positive_lag_detected() {
        // window contains the fragment starting 100 samples in
        let base = noise_like(11, 5000);
        let fragment = base[0..4000].to_vec();
        let mut window = vec![0.0f32; 4000];
        window[100..4000].copy_from_slice(&base[0..3900]);
        let (lag, corr) = correlate(&fragment, &window).unwrap();
        assert_eq!(lag, 100);
        assert!(corr > 0.9);
    }

    #[test]
    fn test_negative_lag_detected() {
        // window starts 150 samples past the fragment's start, so
        // the alignment sits before the window origin
        let base = noise_like(13, 5000);
        let fragment = base[0..4000].to_vec();
        let window = base[150..4150].to_vec();
        let (lag, _) = correlate(&fragment, &window).unwrap();
        assert_eq!(lag, -150);
    }

    #[test]
    fn test_silent_window_fails() {
        let fragment = noise_like(17, 1000);
        let window = vec![0.0f32; 1000];
        assert!(correlate(&fragment, &window).is_err());
    }

    #[test]
    fn test_unrelated_signals_score_low() {
        let a = noise_like(19, 4096);
        let b = noise_like(23, 4096);
        let (_, corr) = correlate(&a, &b).unwrap();
        assert!(corr < 0.2, "unrelated correlation {} too high", corr);
    }
}
