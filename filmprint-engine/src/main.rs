//! filmprint: movie soundtrack fingerprinting and fragment
//! identification
//!
//! Subcommands:
//! - `ingest`: decode a soundtrack, fingerprint it, and append it to
//!   the index
//! - `identify`: match a short fragment against the index and report
//!   the aligned (track, offset) with confidence
//! - `tracks`: list stored tracks
//!
//! Results print as JSON on stdout; the exit code maps the error
//! class (2 rejected input, 3 no match, 4 timeout, 1 internal).

use clap::{Parser, Subcommand};
use filmprint_common::{config, Error, Result};
use filmprint_engine::ingest::{IngestRequest, Ingestor};
use filmprint_engine::query::{QueryEngine, QueryRequest};
use filmprint_engine::store::{FingerprintStore, SqliteStore};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 15;

#[derive(Parser)]
#[command(name = "filmprint", version, about = "Movie soundtrack fingerprinting")]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "FILMPRINT_DB", global = true)]
    database: Option<PathBuf>,

    /// Directory for canonical track PCM
    #[arg(long, env = "FILMPRINT_MEDIA_DIR", global = true)]
    media_dir: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long, env = "FILMPRINT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fingerprint a soundtrack and add it to the index
    Ingest {
        /// Audio or video file
        file: PathBuf,
        /// Movie the track belongs to
        #[arg(long)]
        movie_id: i64,
        /// Language tag of this track
        #[arg(long)]
        language: String,
    },
    /// Identify which track and offset a fragment came from
    Identify {
        /// Fragment file (audio or video)
        file: PathBuf,
        /// Restrict the search to one movie
        #[arg(long)]
        movie_id: Option<i64>,
        /// Language of the target track
        #[arg(long)]
        language: Option<String>,
        /// Skip cross-correlation refinement
        #[arg(long)]
        no_refine: bool,
        /// Wall-time budget in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// List stored tracks
    Tracks,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "Command failed");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("filmprint {}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(cli.config.as_deref())?;
    let params = config.engine_params();
    let db_path = config::resolve_database_path(cli.database.as_deref(), &config);
    let media_dir = config::resolve_media_dir(cli.media_dir.as_deref(), &config);
    let ffmpeg_path = config.ffmpeg_path.clone().unwrap_or_else(|| "ffmpeg".into());

    let store: Arc<dyn FingerprintStore> = Arc::new(SqliteStore::connect(&db_path).await?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Ingest {
            file,
            movie_id,
            language,
        } => {
            let ingestor = Ingestor::new(store, params, media_dir, ffmpeg_path);
            let outcome = ingestor
                .ingest(
                    &IngestRequest {
                        source: file,
                        movie_id,
                        language,
                    },
                    &cancel,
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome).map_err(into_internal)?);
        }
        Command::Identify {
            file,
            movie_id,
            language,
            no_refine,
            timeout_secs,
        } => {
            let timeout = Duration::from_secs(
                timeout_secs
                    .or(config.query_timeout_secs)
                    .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
            );
            let engine = QueryEngine::new(store, params, ffmpeg_path, timeout);
            let report = engine
                .identify(
                    &QueryRequest {
                        fragment: file,
                        movie_id,
                        language,
                        refine: !no_refine,
                    },
                    &cancel,
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&report).map_err(into_internal)?);
        }
        Command::Tracks => {
            let tracks = store.list_tracks().await?;
            let rows: Vec<_> = tracks
                .iter()
                .map(|t| {
                    json!({
                        "id": t.id,
                        "movie_id": t.movie_id,
                        "language": t.language,
                        "track_path": t.track_path,
                        "duration_secs": t.duration_secs,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows).map_err(into_internal)?);
        }
    }

    Ok(())
}

fn into_internal(e: serde_json::Error) -> Error {
    Error::Internal(format!("serialization failed: {}", e))
}
