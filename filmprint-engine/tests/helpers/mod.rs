//! Shared fixtures for integration tests
//!
//! Synthesizes deterministic test audio (melodies, tones, seeded
//! noise) and writes it as mono 16 kHz WAV, plus engine setup over a
//! temp-dir SQLite store.

use filmprint_common::params::EngineParams;
use filmprint_engine::ingest::Ingestor;
use filmprint_engine::query::QueryEngine;
use filmprint_engine::store::{FingerprintStore, SqliteStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const SAMPLE_RATE: u32 = 16_000;

/// A small note set so that frequency rows recur; pairing needs the
/// same frequency to show up more than once per track.
const NOTES: [f32; 8] = [440.0, 587.33, 659.25, 783.99, 880.0, 1046.5, 1318.5, 1568.0];

/// Deterministic pseudo-melody: 0.4 s notes drawn from `NOTES`.
pub fn melody(seed: u64, seconds: f32) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let total = (seconds * SAMPLE_RATE as f32) as usize;
    let note_len = (0.4 * SAMPLE_RATE as f32) as usize;

    let mut samples = Vec::with_capacity(total);
    let mut freq = NOTES[rng.gen_range(0..NOTES.len())];
    for i in 0..total {
        if i % note_len == 0 {
            freq = NOTES[rng.gen_range(0..NOTES.len())];
        }
        let t = i as f32 / SAMPLE_RATE as f32;
        samples.push(0.4 * (2.0 * std::f32::consts::PI * freq * t).sin());
    }
    samples
}

/// Pure tone
pub fn tone(freq: f32, seconds: f32) -> Vec<f32> {
    (0..(seconds * SAMPLE_RATE as f32) as usize)
        .map(|i| 0.4 * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

/// Add seeded white noise at the given SNR (dB) relative to the
/// signal's own power.
pub fn with_noise(samples: &[f32], snr_db: f32, seed: u64) -> Vec<f32> {
    let signal_power =
        samples.iter().map(|x| x * x).sum::<f32>() / samples.len() as f32;
    let noise_power = signal_power / 10f32.powf(snr_db / 10.0);
    // uniform [-1, 1) has power 1/3
    let scale = (3.0 * noise_power).sqrt();

    let mut rng = StdRng::seed_from_u64(seed);
    samples
        .iter()
        .map(|&x| x + scale * rng.gen_range(-1.0f32..1.0))
        .collect()
}

/// Mix `other` into `samples` at `gain_db` (negative = quieter).
pub fn mix(samples: &[f32], other: &[f32], gain_db: f32) -> Vec<f32> {
    let gain = 10f32.powf(gain_db / 20.0);
    samples
        .iter()
        .zip(other.iter().chain(std::iter::repeat(&0.0)))
        .map(|(a, b)| a + gain * b)
        .collect()
}

pub fn write_wav(path: &Path, samples: &[f32]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    for &s in samples {
        let v = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(v).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

/// Engine wired to a temp-dir SQLite store.
pub struct TestEngine {
    pub store: Arc<dyn FingerprintStore>,
    pub ingestor: Ingestor,
    pub query: QueryEngine,
    pub dir: TempDir,
}

impl TestEngine {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store: Arc<dyn FingerprintStore> = Arc::new(
            SqliteStore::connect(&dir.path().join("test.db"))
                .await
                .expect("store"),
        );
        let params = EngineParams::default();
        let ingestor = Ingestor::new(
            store.clone(),
            params.clone(),
            dir.path().join("media"),
            "ffmpeg".into(),
        );
        let query = QueryEngine::new(
            store.clone(),
            params,
            "ffmpeg".into(),
            Duration::from_secs(60),
        );
        Self {
            store,
            ingestor,
            query,
            dir,
        }
    }

    /// Write `samples` to a WAV inside the temp dir.
    pub fn wav(&self, name: &str, samples: &[f32]) -> PathBuf {
        let path = self.dir.path().join(name);
        write_wav(&path, samples);
        path
    }
}
