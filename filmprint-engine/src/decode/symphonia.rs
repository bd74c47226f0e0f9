//! In-process audio decoding via symphonia
//!
//! Decodes any audio container symphonia understands into mono f32
//! at the stream's native rate. Channel mixing averages all channels.

use filmprint_common::{Error, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Mono PCM at the source's native sample rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode an audio file to mono f32.
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path)
        .map_err(|e| Error::DecodeFailure(format!("open {}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::DecodeFailure(format!("format probe failed: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::DecodeFailure("no audio track in container".into()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::DecodeFailure("sample rate missing from codec params".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::DecodeFailure(format!("decoder creation failed: {}", e)))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(symphonia::core::errors::Error::ResetRequired) => break,
            Err(e) => return Err(Error::DecodeFailure(format!("packet read failed: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => append_mono(&decoded, &mut samples),
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                // recoverable per-packet corruption, keep going
                warn!(error = %e, "Decode error (continuing)");
            }
            Err(e) => return Err(Error::DecodeFailure(format!("decode failed: {}", e))),
        }
    }

    debug!(
        path = %path.display(),
        samples = samples.len(),
        sample_rate,
        "Decoded audio"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Mix a decoded buffer down to mono and append it.
fn append_mono(buffer: &AudioBufferRef, out: &mut Vec<f32>) {
    use symphonia::core::conv::FromSample;

    let channels = buffer.spec().channels.count();
    let frames = buffer.frames();
    out.reserve(frames);

    for frame_idx in 0..frames {
        let mut sum = 0.0f32;
        for ch in 0..channels {
            let sample = match buffer {
                AudioBufferRef::U8(buf) => f32::from_sample(buf.chan(ch)[frame_idx]),
                AudioBufferRef::U16(buf) => f32::from_sample(buf.chan(ch)[frame_idx]),
                AudioBufferRef::U24(buf) => f32::from_sample(buf.chan(ch)[frame_idx]),
                AudioBufferRef::U32(buf) => f32::from_sample(buf.chan(ch)[frame_idx]),
                AudioBufferRef::S8(buf) => f32::from_sample(buf.chan(ch)[frame_idx]),
                AudioBufferRef::S16(buf) => f32::from_sample(buf.chan(ch)[frame_idx]),
                AudioBufferRef::S24(buf) => f32::from_sample(buf.chan(ch)[frame_idx]),
                AudioBufferRef::S32(buf) => f32::from_sample(buf.chan(ch)[frame_idx]),
                AudioBufferRef::F32(buf) => buf.chan(ch)[frame_idx],
                AudioBufferRef::F64(buf) => buf.chan(ch)[frame_idx] as f32,
            };
            sum += sample;
        }
        out.push(sum / channels as f32);
    }
}
