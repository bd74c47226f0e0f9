//! Canonical WAV read/write
//!
//! Stored tracks keep their decoded PCM as mono 16-bit WAV at the
//! working sample rate; the refiner reads windows back out of those
//! files, zero-padded past EOF.

use filmprint_common::{Error, Result};
use std::path::Path;

/// Write mono f32 samples as 16-bit PCM WAV.
pub fn write_mono_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
    for &s in samples {
        let v = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer
            .write_sample(v)
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
    Ok(())
}

/// Read a whole WAV file as mono f32 (channels averaged).
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let interleaved = read_f32_samples(&mut reader)?;
    let mono = if channels <= 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    Ok((mono, spec.sample_rate))
}

/// Read `n_samples` mono frames starting at `start_sample`,
/// zero-padding when the request extends past end of file.
pub fn read_wav_segment(path: &Path, start_sample: u64, n_samples: usize) -> Result<Vec<f32>> {
    let mut reader = open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    reader
        .seek(start_sample.min(u32::MAX as u64) as u32)
        .map_err(Error::Io)?;

    let mut out = Vec::with_capacity(n_samples);
    let mut frame = vec![0.0f32; channels];
    let mut ch = 0usize;

    match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            for s in reader.samples::<i32>() {
                let s = s.map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
                frame[ch] = s as f32 * scale;
                ch += 1;
                if ch == channels {
                    out.push(frame.iter().sum::<f32>() / channels as f32);
                    ch = 0;
                    if out.len() == n_samples {
                        break;
                    }
                }
            }
        }
        hound::SampleFormat::Float => {
            for s in reader.samples::<f32>() {
                let s = s.map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
                frame[ch] = s;
                ch += 1;
                if ch == channels {
                    out.push(frame.iter().sum::<f32>() / channels as f32);
                    ch = 0;
                    if out.len() == n_samples {
                        break;
                    }
                }
            }
        }
    }

    out.resize(n_samples, 0.0);
    Ok(out)
}

fn open(path: &Path) -> Result<hound::WavReader<std::io::BufReader<std::fs::File>>> {
    hound::WavReader::open(path)
        .map_err(|e| Error::DecodeFailure(format!("{}: {}", path.display(), e)))
}

fn read_f32_samples(
    reader: &mut hound::WavReader<std::io::BufReader<std::fs::File>>,
) -> Result<Vec<f32>> {
    let spec = reader.spec();
    match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map(|v| v as f32 * scale)
                        .map_err(|e| Error::DecodeFailure(e.to_string()))
                })
                .collect()
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| Error::DecodeFailure(e.to_string())))
            .collect(),
    }
}
