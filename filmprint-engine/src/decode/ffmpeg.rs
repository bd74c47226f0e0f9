//! Video container demuxing via a scoped ffmpeg child process
//!
//! `ffmpeg -i <input> -vn -acodec pcm_s16le -ar 16000 -ac 1 <out.wav>`
//!
//! The child is spawned with kill-on-drop, so cancelling the parent
//! pipeline terminates the demux instead of leaking it.

use filmprint_common::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Extract the audio stream of a video container into `out_dir` as
/// mono 16 kHz WAV. Returns the path of the produced file.
pub async fn extract_audio(
    ffmpeg_path: &str,
    input: &Path,
    out_dir: &Path,
) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("fragment");
    let output = out_dir.join(format!("{}.wav", stem));

    debug!(
        input = %input.display(),
        output = %output.display(),
        "Extracting audio with ffmpeg"
    );

    let result = Command::new(ffmpeg_path)
        .arg("-y")
        .arg("-i")
        .arg(input)
        .arg("-vn")
        .args(["-acodec", "pcm_s16le"])
        .args(["-ar", "16000"])
        .args(["-ac", "1"])
        .arg(&output)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::DecodeFailure(format!("ffmpeg binary not found: {}", ffmpeg_path))
            }
            _ => Error::DecodeFailure(format!("failed to run ffmpeg: {}", e)),
        })?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join(" | ");
        return Err(Error::DecodeFailure(format!(
            "ffmpeg exited with {}: {}",
            result.status, tail
        )));
    }

    Ok(output)
}

/// File extensions symphonia handles in-process; everything else goes
/// through ffmpeg first.
pub fn is_audio_container(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("wav" | "mp3" | "flac" | "ogg" | "oga" | "m4a" | "aac" | "mka")
    )
}
