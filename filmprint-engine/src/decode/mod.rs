//! Input decoding
//!
//! Audio containers decode in-process with symphonia; video
//! containers are first demuxed to mono 16 kHz WAV by a scoped
//! ffmpeg child process, then decoded the same way.

pub mod ffmpeg;
pub mod symphonia;
pub mod wav;

use filmprint_common::Result;
use std::path::Path;

pub use self::symphonia::DecodedAudio;

/// Decode any supported input to mono f32 PCM.
///
/// `scratch_dir` receives the intermediate WAV when ffmpeg is needed;
/// callers pass a scoped temp dir so the intermediate dies with the
/// pipeline.
pub async fn decode_input(
    ffmpeg_path: &str,
    input: &Path,
    scratch_dir: &Path,
) -> Result<DecodedAudio> {
    let audio_path = if ffmpeg::is_audio_container(input) {
        input.to_path_buf()
    } else {
        ffmpeg::extract_audio(ffmpeg_path, input, scratch_dir).await?
    };

    let decoded =
        tokio::task::spawn_blocking(move || symphonia::decode_file(&audio_path))
            .await
            .map_err(|e| filmprint_common::Error::Internal(format!("decode task failed: {}", e)))??;

    Ok(decoded)
}
