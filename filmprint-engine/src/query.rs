//! Query pipeline
//!
//! decode → prepare (with bandpass) → peaks → hashes → vote →
//! optional correlation refinement. The whole run is bounded by a
//! wall-time budget; exceeding it reports `Timeout`, never a store
//! error. Refinement failures are logged and swallowed; the raw
//! offset still answers.

use crate::decode;
use crate::dsp::{peaks, prepare};
use crate::fingerprint;
use crate::matching::{self, refine};
use crate::store::FingerprintStore;
use crate::types::{MatchInfo, MatchReport, TrackInfo};
use filmprint_common::params::EngineParams;
use filmprint_common::time::round2;
use filmprint_common::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One identification request
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub fragment: PathBuf,
    /// Restrict the search to one movie
    pub movie_id: Option<i64>,
    /// Language of the target track (required when the movie has
    /// several)
    pub language: Option<String>,
    /// Run the cross-correlation refiner
    pub refine: bool,
}

/// Composes the query pipeline over an explicit store handle.
pub struct QueryEngine {
    store: Arc<dyn FingerprintStore>,
    params: EngineParams,
    ffmpeg_path: String,
    timeout: Duration,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn FingerprintStore>,
        params: EngineParams,
        ffmpeg_path: String,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            params,
            ffmpeg_path,
            timeout,
        }
    }

    /// Identify a fragment, bounded by the configured wall time.
    pub async fn identify(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<MatchReport> {
        let seconds = self.timeout.as_secs();
        match tokio::time::timeout(self.timeout, self.run(request, cancel)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { seconds }),
        }
    }

    async fn run(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<MatchReport> {
        info!(
            fragment = %request.fragment.display(),
            movie_id = request.movie_id,
            "Query started"
        );

        let target_track = self.resolve_target(request).await?;

        let scratch = tempfile::tempdir()?;
        let decoded =
            decode::decode_input(&self.ffmpeg_path, &request.fragment, scratch.path()).await?;
        checkpoint(cancel)?;

        let params = self.params.clone();
        let (prepared, hashes) = tokio::task::spawn_blocking(move || {
            // bandpass on the query path only: fragments arrive noisy
            let prepared = prepare::prepare(&decoded.samples, decoded.sample_rate, true)?;
            let peaks = peaks::extract_peaks(&prepared.samples, prepared.sample_rate, &params.peaks);
            let hashes = fingerprint::generate_hashes(&peaks, &params.hashes);
            Ok::<_, Error>((prepared, hashes))
        })
        .await
        .map_err(|e| Error::Internal(format!("query task failed: {}", e)))??;
        checkpoint(cancel)?;

        let fragment_duration = prepared.duration_seconds();
        let outcome = matching::find_match(
            self.store.as_ref(),
            &hashes,
            target_track,
            fragment_duration,
            &self.params.matcher,
        )
        .await?;
        checkpoint(cancel)?;

        let track = self.store.get_track(outcome.track_id).await?;

        let mut refined_offset = None;
        let mut corr_confidence = None;
        if request.refine && self.params.refine.enabled {
            match refine::refine_offset(
                self.store.as_ref(),
                outcome.track_id,
                outcome.offset,
                &prepared.samples,
                prepared.sample_rate,
            )
            .await
            {
                Ok(refine::Refinement { offset, correlation }) => {
                    refined_offset = Some(round2(offset));
                    corr_confidence = Some(round2((correlation * 100.0).clamp(0.0, 100.0)));
                }
                Err(e) => {
                    warn!(error = %e, "Refinement failed, keeping raw offset");
                }
            }
        }

        Ok(MatchReport {
            audio_track: TrackInfo {
                id: track.id,
                language: track.language,
                track_path: track.track_path,
            },
            match_info: MatchInfo {
                raw_offset: round2(outcome.offset),
                raw_confidence: outcome.confidence,
                refined_offset,
                corr_confidence,
                score: round2(outcome.score),
                total_checked: outcome.total_checked,
                valid_offset: outcome.valid_offset,
            },
        })
    }

    /// Resolve the optional movie/language restriction to one track.
    async fn resolve_target(&self, request: &QueryRequest) -> Result<Option<i64>> {
        let Some(movie_id) = request.movie_id else {
            return Ok(None);
        };

        if let Some(language) = &request.language {
            return match self.store.find_track(movie_id, language).await? {
                Some(track) => Ok(Some(track.id)),
                None => Err(Error::TrackNotFound(format!(
                    "movie {} has no '{}' track",
                    movie_id, language
                ))),
            };
        }

        let tracks: Vec<_> = self
            .store
            .list_tracks()
            .await?
            .into_iter()
            .filter(|t| t.movie_id == movie_id)
            .collect();
        match tracks.len() {
            0 => Err(Error::TrackNotFound(format!(
                "movie {} has no tracks",
                movie_id
            ))),
            1 => Ok(Some(tracks[0].id)),
            _ => Err(Error::InvalidInput(format!(
                "movie {} has {} language tracks; pass a language",
                movie_id,
                tracks.len()
            ))),
        }
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
