//! Signal preparation: downmix, resample to 16 kHz, normalize
//!
//! The front of both pipelines. Output is always mono f32 at
//! `TARGET_SAMPLE_RATE` with peak amplitude 1.0; the query path
//! additionally runs the Butterworth bandpass for noise resistance.

use crate::dsp::filter;
use filmprint_common::params::{MIN_SIGNAL_SECONDS, TARGET_SAMPLE_RATE};
use filmprint_common::{Error, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Mono PCM at the engine's working sample rate
#[derive(Debug, Clone)]
pub struct PreparedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PreparedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Average interleaved channels down to mono.
pub fn downmix_interleaved(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Prepare a mono stream for peak extraction.
///
/// Resamples to 16 kHz, rejects silent (`EmptySignal`) and sub-0.5 s
/// (`TooShort`) input, peak-normalizes to 1.0, and optionally applies
/// the 100–4000 Hz Butterworth bandpass (query path only).
pub fn prepare(samples: &[f32], sample_rate: u32, bandpass: bool) -> Result<PreparedAudio> {
    if sample_rate == 0 {
        return Err(Error::InvalidInput("sample rate is zero".into()));
    }
    if samples.is_empty() {
        return Err(Error::EmptySignal);
    }

    let mut signal = if sample_rate == TARGET_SAMPLE_RATE {
        samples.to_vec()
    } else {
        resample_mono(samples, sample_rate, TARGET_SAMPLE_RATE)?
    };

    let peak = signal.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
    if peak == 0.0 {
        return Err(Error::EmptySignal);
    }

    let seconds = signal.len() as f64 / TARGET_SAMPLE_RATE as f64;
    if seconds < MIN_SIGNAL_SECONDS {
        return Err(Error::TooShort { seconds });
    }

    for x in signal.iter_mut() {
        *x /= peak;
    }

    if bandpass {
        signal = filter::butterworth_bandpass(&signal, TARGET_SAMPLE_RATE, 100.0, 4000.0);
    }

    debug!(
        samples = signal.len(),
        seconds = format_args!("{:.2}", seconds),
        bandpass,
        "Prepared signal"
    );

    Ok(PreparedAudio {
        samples: signal,
        sample_rate: TARGET_SAMPLE_RATE,
    })
}

/// Resample a mono stream with rubato's sinc interpolator.
///
/// Single-pass: chunk size equals the input length. 256-tap filter,
/// 0.95 cutoff, BlackmanHarris2 window.
fn resample_mono(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| Error::Internal(format!("resampler construction failed: {}", e)))?;

    let waves_in = vec![samples.to_vec()];
    let mut waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| Error::Internal(format!("resampling failed: {}", e)))?;

    debug!(
        in_frames = samples.len(),
        in_rate = from_rate,
        out_frames = waves_out[0].len(),
        out_rate = to_rate,
        "Resampled"
    );

    Ok(waves_out.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, secs: f32, sr: u32) -> Vec<f32> {
        (0..(secs * sr as f32) as usize)
            .map(|i| 0.25 * (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn test_silence_rejected() {
        let silent = vec![0.0f32; 16_000];
        assert!(matches!(
            prepare(&silent, 16_000, false),
            Err(Error::EmptySignal)
        ));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(prepare(&[], 16_000, false), Err(Error::EmptySignal)));
    }

    #[test]
    fn test_short_rejected() {
        let short = sine(440.0, 0.3, 16_000);
        match prepare(&short, 16_000, false) {
            Err(Error::TooShort { seconds }) => assert!(seconds < 0.5),
            other => panic!("expected TooShort, got {:?}", other.map(|p| p.samples.len())),
        }
    }

    #[test]
    fn test_normalizes_to_unit_peak() {
        let quiet = sine(440.0, 1.0, 16_000);
        let prepared = prepare(&quiet, 16_000, false).unwrap();
        let peak = prepared.samples.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        assert!((peak - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_resamples_to_16k() {
        let hi = sine(440.0, 1.0, 44_100);
        let prepared = prepare(&hi, 44_100, false).unwrap();
        assert_eq!(prepared.sample_rate, 16_000);
        let expected = 16_000.0;
        let got = prepared.samples.len() as f64;
        assert!(
            (got - expected).abs() / expected < 0.01,
            "expected ~{} samples, got {}",
            expected,
            got
        );
    }

    #[test]
    fn test_downmix_averages_channels() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        let mono = downmix_interleaved(&stereo, 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_bandpass_applied_on_request() {
        // rumble at 30 Hz should mostly vanish through the query path
        let rumble = sine(30.0, 1.0, 16_000);
        let plain = prepare(&rumble, 16_000, false).unwrap();
        let filtered = prepare(&rumble, 16_000, true).unwrap();
        let energy =
            |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>() / s.len() as f32;
        assert!(energy(&filtered.samples[4000..]) < energy(&plain.samples[4000..]) * 0.05);
    }
}
