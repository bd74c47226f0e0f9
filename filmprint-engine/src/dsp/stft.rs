//! Magnitude short-time Fourier transform
//!
//! Hann-windowed, non-centered frames. Frame `k` covers samples
//! `[k*hop, k*hop + n_fft)`; its reported time is `k*hop/sr`, and bin
//! `b` maps to `b*sr/n_fft` Hz. Both pipelines use the same grid, so
//! any constant bias cancels in the offset arithmetic.

use rustfft::{num_complex::Complex, FftPlanner};

/// Magnitude spectrogram, stored frequency-major: row `b` holds the
/// magnitudes of bin `b` across all frames.
pub struct Spectrogram {
    data: Vec<f32>,
    n_bins: usize,
    n_frames: usize,
    /// Hz per bin (`sr / n_fft`)
    pub bin_hz: f32,
    /// Seconds per frame step (`hop / sr`)
    pub frame_secs: f32,
}

impl Spectrogram {
    /// Compute the magnitude STFT of `samples`.
    ///
    /// Returns an empty spectrogram (zero frames) when the signal is
    /// shorter than one window.
    pub fn compute(samples: &[f32], sample_rate: u32, frame_size: usize, hop_size: usize) -> Self {
        let n_bins = frame_size / 2 + 1;
        let bin_hz = sample_rate as f32 / frame_size as f32;
        let frame_secs = hop_size as f32 / sample_rate as f32;

        let n_frames = if samples.len() >= frame_size {
            (samples.len() - frame_size) / hop_size + 1
        } else {
            0
        };

        let mut spec = Self {
            data: vec![0.0; n_bins * n_frames],
            n_bins,
            n_frames,
            bin_hz,
            frame_secs,
        };
        if n_frames == 0 {
            return spec;
        }

        let window = hann_window(frame_size);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size);
        let mut buffer = vec![Complex::new(0.0f32, 0.0f32); frame_size];
        let mut scratch = vec![Complex::new(0.0f32, 0.0f32); fft.get_inplace_scratch_len()];

        for frame in 0..n_frames {
            let start = frame * hop_size;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(samples[start + i] * window[i], 0.0);
            }
            fft.process_with_scratch(&mut buffer, &mut scratch);
            for bin in 0..n_bins {
                spec.data[bin * n_frames + frame] = buffer[bin].norm();
            }
        }
        spec
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn is_empty(&self) -> bool {
        self.n_frames == 0
    }

    #[inline]
    pub fn mag(&self, bin: usize, frame: usize) -> f32 {
        self.data[bin * self.n_frames + frame]
    }

    /// Center frequency of bin `b` in Hz
    #[inline]
    pub fn freq(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_hz
    }

    /// Time of frame `k` in seconds
    #[inline]
    pub fn time(&self, frame: usize) -> f32 {
        frame as f32 * self.frame_secs
    }
}

/// Periodic Hann window
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|n| {
            let x = 2.0 * std::f32::consts::PI * n as f32 / size as f32;
            0.5 * (1.0 - x.cos())
        })
        .collect()
}
