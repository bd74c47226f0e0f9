//! Common error types for filmprint

use thiserror::Error;

/// Common result type for filmprint operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-wide error taxonomy
///
/// Variants group into four caller-visible classes: invalid input
/// (rejected uploads), no match, timeout, and internal failures.
/// `exit_code` maps the class for the CLI the same way the HTTP
/// statuses would map for a web front end.
#[derive(Error, Debug)]
pub enum Error {
    /// Input could not be decoded to PCM
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// Signal contains no non-zero sample
    #[error("Empty signal: audio contains no usable samples")]
    EmptySignal,

    /// Signal shorter than the usable minimum (0.5 s)
    #[error("Audio too short: {seconds:.2} s (minimum 0.5 s)")]
    TooShort { seconds: f64 },

    /// Ingest produced fewer than the minimum hash count even after
    /// the relaxed-threshold retry
    #[error("Insufficient fingerprints: {count} hashes (minimum {minimum})")]
    InsufficientFingerprints { count: usize, minimum: usize },

    /// Query fragment yielded fewer hashes than the matcher requires
    #[error("Empty query: {count} hashes (minimum {minimum})")]
    EmptyQuery { count: usize, minimum: usize },

    /// No stored track aligned with the fragment
    #[error("No match found")]
    NoMatch,

    /// A track for this movie/language (or identical content) already exists
    #[error("Duplicate track: {0}")]
    DuplicateTrack(String),

    /// Referenced track does not exist
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// Query exceeded its wall-time budget
    #[error("Query timed out after {seconds} s")]
    Timeout { seconds: u64 },

    /// Pipeline was cancelled at a stage boundary
    #[error("Operation cancelled")]
    Cancelled,

    /// Database error
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map the error class to a process exit code.
    ///
    /// 2 = rejected input (400-class), 3 = no match / unknown track
    /// (404-class), 4 = timeout (504-class), 1 = everything else
    /// (500-class).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::EmptySignal
            | Error::TooShort { .. }
            | Error::InsufficientFingerprints { .. }
            | Error::EmptyQuery { .. }
            | Error::DuplicateTrack(_)
            | Error::InvalidInput(_) => 2,
            Error::NoMatch | Error::TrackNotFound(_) => 3,
            Error::Timeout { .. } => 4,
            _ => 1,
        }
    }

    /// True for the transient store failures the orchestrators may
    /// retry once.
    pub fn is_transient_store(&self) -> bool {
        matches!(
            self,
            Error::Store(sqlx::Error::PoolTimedOut) | Error::Store(sqlx::Error::Io(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_classes() {
        assert_eq!(Error::EmptySignal.exit_code(), 2);
        assert_eq!(Error::TooShort { seconds: 0.3 }.exit_code(), 2);
        assert_eq!(
            Error::EmptyQuery { count: 2, minimum: 5 }.exit_code(),
            2
        );
        assert_eq!(Error::NoMatch.exit_code(), 3);
        assert_eq!(Error::TrackNotFound("track 7".into()).exit_code(), 3);
        assert_eq!(Error::Timeout { seconds: 15 }.exit_code(), 4);
        assert_eq!(Error::Internal("boom".into()).exit_code(), 1);
        assert_eq!(Error::DecodeFailure("bad".into()).exit_code(), 1);
    }

    #[test]
    fn test_display_includes_detail() {
        let err = Error::InsufficientFingerprints { count: 3, minimum: 5 };
        assert!(err.to_string().contains("3 hashes"));
    }
}
