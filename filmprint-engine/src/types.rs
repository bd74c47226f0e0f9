//! Result documents returned to callers
//!
//! Shapes match the external interface: times in seconds,
//! confidences in [0, 100].

use serde::Serialize;

/// The matched stored track
#[derive(Debug, Clone, Serialize)]
pub struct TrackInfo {
    pub id: i64,
    pub language: String,
    pub track_path: String,
}

/// The scored alignment
#[derive(Debug, Clone, Serialize)]
pub struct MatchInfo {
    /// Offset from the vote consensus (seconds)
    pub raw_offset: f64,
    /// Consensus confidence, 0–100
    pub raw_confidence: f64,
    /// Correlation-refined offset; absent when refinement was
    /// skipped or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refined_offset: Option<f64>,
    /// Normalized correlation peak, 0–100; absent with
    /// `refined_offset`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corr_confidence: Option<f64>,
    /// Aggregate vote weight behind the winner
    pub score: f64,
    /// Fragment hashes checked
    pub total_checked: usize,
    /// Whether the offset fits inside the track duration
    pub valid_offset: bool,
}

/// Full identification response
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub audio_track: TrackInfo,
    #[serde(rename = "match")]
    pub match_info: MatchInfo,
}
