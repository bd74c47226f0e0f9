//! Ingest pipeline
//!
//! decode → prepare → peaks → hashes → store commit. One retry with
//! relaxed peak threshold and raised fan-out when a sparse signal
//! yields too few hashes. Scratch files live in a scoped temp dir so
//! every exit path (including cancellation) releases them.

use crate::decode::{self, wav};
use crate::dsp::{peaks, prepare};
use crate::fingerprint::{self, FingerprintTuple};
use crate::store::FingerprintStore;
use filmprint_common::params::{EngineParams, MIN_HASHES};
use filmprint_common::time::round2;
use filmprint_common::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One ingest request: a source file attached to a movie/language
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source: PathBuf,
    pub movie_id: i64,
    pub language: String,
}

/// Successful ingest summary
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub track_id: i64,
    pub movie_id: i64,
    pub language: String,
    pub track_path: String,
    pub fingerprints: u64,
    pub duration_secs: f64,
}

/// Composes the ingest pipeline over an explicit store handle.
pub struct Ingestor {
    store: Arc<dyn FingerprintStore>,
    params: EngineParams,
    media_dir: PathBuf,
    ffmpeg_path: String,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn FingerprintStore>,
        params: EngineParams,
        media_dir: PathBuf,
        ffmpeg_path: String,
    ) -> Self {
        Self {
            store,
            params,
            media_dir,
            ffmpeg_path,
        }
    }

    /// Run the full ingest for one source file.
    pub async fn ingest(
        &self,
        request: &IngestRequest,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome> {
        info!(
            source = %request.source.display(),
            movie_id = request.movie_id,
            language = %request.language,
            "Ingest started"
        );

        // Idempotency: same movie/language, or byte-identical source.
        if self
            .store
            .find_track(request.movie_id, &request.language)
            .await?
            .is_some()
        {
            return Err(Error::DuplicateTrack(format!(
                "movie {} already has a '{}' track",
                request.movie_id, request.language
            )));
        }
        let content_hash = file_sha256(&request.source).await?;
        if let Some(existing) = self.store.find_track_by_content_hash(&content_hash).await? {
            return Err(Error::DuplicateTrack(format!(
                "identical audio already ingested as track {}",
                existing.id
            )));
        }
        checkpoint(cancel)?;

        // Scratch dir for the decoder's intermediate WAV; removed on
        // drop along every exit path.
        let scratch = tempfile::tempdir()?;
        let decoded =
            decode::decode_input(&self.ffmpeg_path, &request.source, scratch.path()).await?;
        checkpoint(cancel)?;

        let params = self.params.clone();
        let (prepared, hashes) = tokio::task::spawn_blocking(move || {
            let prepared = prepare::prepare(&decoded.samples, decoded.sample_rate, false)?;
            let mut hashes = hash_signal(&prepared.samples, prepared.sample_rate, &params);
            if hashes.len() < MIN_HASHES {
                let relaxed = params.relaxed();
                debug!(
                    hashes = hashes.len(),
                    threshold = relaxed.peaks.threshold,
                    fan_value = relaxed.hashes.fan_value,
                    "Sparse signal, retrying with relaxed parameters"
                );
                hashes = hash_signal(&prepared.samples, prepared.sample_rate, &relaxed);
            }
            Ok::<_, Error>((prepared, hashes))
        })
        .await
        .map_err(|e| Error::Internal(format!("ingest task failed: {}", e)))??;

        if hashes.len() < MIN_HASHES {
            return Err(Error::InsufficientFingerprints {
                count: hashes.len(),
                minimum: MIN_HASHES,
            });
        }
        checkpoint(cancel)?;

        // Canonical PCM into the media dir, then the store commit.
        let track_path = self.write_canonical_pcm(&prepared).await?;
        let duration = round2(prepared.duration_seconds());

        match self
            .commit(request, &track_path, &content_hash, &hashes, duration)
            .await
        {
            Ok(outcome) => {
                info!(
                    track_id = outcome.track_id,
                    fingerprints = outcome.fingerprints,
                    duration_secs = outcome.duration_secs,
                    "Ingest complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                // the canonical WAV is orphaned if the rows never landed
                if let Err(rm) = std::fs::remove_file(&track_path) {
                    warn!(
                        path = %track_path.display(),
                        error = %rm,
                        "Failed to remove orphaned track PCM"
                    );
                }
                Err(e)
            }
        }
    }

    async fn write_canonical_pcm(&self, prepared: &prepare::PreparedAudio) -> Result<PathBuf> {
        let tracks_dir = self.media_dir.join("tracks");
        std::fs::create_dir_all(&tracks_dir)?;
        let path = tracks_dir.join(format!("track-{}.wav", Uuid::new_v4().simple()));

        let samples = prepared.samples.clone();
        let sample_rate = prepared.sample_rate;
        let out = path.clone();
        tokio::task::spawn_blocking(move || wav::write_mono_wav(&out, &samples, sample_rate))
            .await
            .map_err(|e| Error::Internal(format!("pcm write task failed: {}", e)))??;

        Ok(path)
    }

    async fn commit(
        &self,
        request: &IngestRequest,
        track_path: &Path,
        content_hash: &str,
        hashes: &[FingerprintTuple],
        duration: f64,
    ) -> Result<IngestOutcome> {
        let track_id = self
            .store
            .insert_track(
                request.movie_id,
                &request.language,
                &track_path.to_string_lossy(),
                content_hash,
            )
            .await?;

        // one retry for transient store hiccups; permanent errors
        // surface immediately
        let stored = match self.store.bulk_insert_fingerprints(track_id, hashes).await {
            Ok(n) => n,
            Err(e) if e.is_transient_store() => {
                warn!(error = %e, "Transient store error, retrying bulk insert");
                self.store.bulk_insert_fingerprints(track_id, hashes).await?
            }
            Err(e) => return Err(e),
        };

        self.store.update_track_duration(track_id, duration).await?;

        Ok(IngestOutcome {
            track_id,
            movie_id: request.movie_id,
            language: request.language.clone(),
            track_path: track_path.to_string_lossy().into_owned(),
            fingerprints: stored,
            duration_secs: duration,
        })
    }
}

/// peaks → hashes for one parameter set
fn hash_signal(samples: &[f32], sample_rate: u32, params: &EngineParams) -> Vec<FingerprintTuple> {
    let peaks = peaks::extract_peaks(samples, sample_rate, &params.peaks);
    fingerprint::generate_hashes(&peaks, &params.hashes)
}

/// SHA-256 of the source bytes, off the async runtime
async fn file_sha256(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let contents = std::fs::read(&path)?;
        Ok(format!("{:x}", Sha256::digest(&contents)))
    })
    .await
    .map_err(|e| Error::Internal(format!("hash task failed: {}", e)))?
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_sha256_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"filmprint").unwrap();
        let a = file_sha256(&path).await.unwrap();
        let b = file_sha256(&path).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_checkpoint_respects_cancellation() {
        let token = CancellationToken::new();
        assert!(checkpoint(&token).is_ok());
        token.cancel();
        assert!(matches!(checkpoint(&token), Err(Error::Cancelled)));
    }
}
