//! Fingerprint persistence
//!
//! The engine talks to storage through the `FingerprintStore` trait;
//! `SqliteStore` is the production implementation. The store is the
//! single point of shared mutable state in the system: it serializes
//! conflicting writes and allows concurrent reads, and a query issued
//! after an ingest commit observes all of that ingest's fingerprints.

pub mod sqlite;

use crate::fingerprint::FingerprintTuple;
use async_trait::async_trait;
use filmprint_common::Result;
use std::collections::HashSet;

pub use sqlite::SqliteStore;

/// One stored audio track
#[derive(Debug, Clone)]
pub struct TrackRecord {
    pub id: i64,
    pub movie_id: i64,
    pub language: String,
    /// Canonical decoded mono 16 kHz WAV
    pub track_path: String,
    /// Seconds; None until the first ingest completes
    pub duration_secs: Option<f64>,
    /// SHA-256 of the source bytes, for idempotent re-ingest
    pub content_hash: String,
}

/// One row returned by a hash lookup
#[derive(Debug, Clone)]
pub struct HashHit {
    pub hash: String,
    pub track_id: i64,
    pub offset: f64,
}

/// Storage contract consumed by the ingest and query pipelines.
///
/// Fingerprints are append-only and immutable after insert;
/// `(track_id, hash, offset)` is the natural key but duplicates
/// across inserts are permitted; they reinforce matches.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Create a track row (and its movie row on demand). Fails with
    /// `DuplicateTrack` when `(movie_id, language)` already exists.
    async fn insert_track(
        &self,
        movie_id: i64,
        language: &str,
        track_path: &str,
        content_hash: &str,
    ) -> Result<i64>;

    /// Append fingerprints for a track, atomically per call.
    async fn bulk_insert_fingerprints(
        &self,
        track_id: i64,
        fingerprints: &[FingerprintTuple],
    ) -> Result<u64>;

    /// Set the track duration and raise the owning movie's duration
    /// monotonically.
    async fn update_track_duration(&self, track_id: i64, seconds: f64) -> Result<()>;

    /// All fingerprint rows whose hash is in `hashes`, optionally
    /// restricted to one track. Cost is proportional to the number of
    /// matching rows, not the table size.
    async fn query_by_hashes(
        &self,
        track_id: Option<i64>,
        hashes: &HashSet<String>,
    ) -> Result<Vec<HashHit>>;

    /// All fingerprint rows whose hash starts with one of `prefixes`
    /// (the matcher's degraded-lookup tiers).
    async fn query_by_hash_prefixes(
        &self,
        track_id: Option<i64>,
        prefixes: &HashSet<String>,
    ) -> Result<Vec<HashHit>>;

    async fn get_track(&self, track_id: i64) -> Result<TrackRecord>;

    async fn get_track_duration(&self, track_id: i64) -> Result<Option<f64>>;

    async fn find_track(&self, movie_id: i64, language: &str) -> Result<Option<TrackRecord>>;

    async fn find_track_by_content_hash(&self, content_hash: &str)
        -> Result<Option<TrackRecord>>;

    async fn list_tracks(&self) -> Result<Vec<TrackRecord>>;

    /// Read `n_samples` mono frames of the track's canonical PCM
    /// starting at `start_sample`, zero-padded past EOF.
    async fn load_pcm_segment(
        &self,
        track_id: i64,
        start_sample: u64,
        n_samples: usize,
    ) -> Result<Vec<f32>>;
}
