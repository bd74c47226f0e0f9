//! SQLite fingerprint store
//!
//! Schema: one row per track, one row per fingerprint, indexed on
//! `hash` and `(audio_track_id, hash)` so lookups scale with the
//! number of matching rows. WAL mode gives concurrent readers while
//! SQLite serializes conflicting writers.

use crate::decode::wav;
use crate::fingerprint::FingerprintTuple;
use crate::store::{FingerprintStore, HashHit, TrackRecord};
use async_trait::async_trait;
use filmprint_common::{Error, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rows per INSERT statement; keeps bind counts under SQLite's limit.
const INSERT_BATCH: usize = 300;

/// Hashes per SELECT ... IN (...) statement.
const QUERY_BATCH: usize = 400;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and initialize the
    /// schema.
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        debug!(url = %db_url, "Connecting to database");
        let pool = SqlitePool::connect(&db_url).await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        info!(path = %db_path.display(), "Fingerprint store ready");
        Ok(store)
    }

    /// In-memory store for tests. Single connection: each SQLite
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS movies (
                id INTEGER PRIMARY KEY,
                duration_secs REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audio_tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                movie_id INTEGER NOT NULL REFERENCES movies(id),
                language TEXT NOT NULL,
                track_path TEXT NOT NULL,
                duration_secs REAL,
                content_hash TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fingerprints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                audio_track_id INTEGER NOT NULL REFERENCES audio_tracks(id),
                hash TEXT NOT NULL,
                "offset" REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for ddl in [
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_tracks_movie_language \
             ON audio_tracks(movie_id, language)",
            "CREATE INDEX IF NOT EXISTS idx_tracks_content_hash \
             ON audio_tracks(content_hash)",
            "CREATE INDEX IF NOT EXISTS idx_fingerprints_hash \
             ON fingerprints(hash)",
            "CREATE INDEX IF NOT EXISTS idx_fingerprints_track_hash \
             ON fingerprints(audio_track_id, hash)",
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }

        Ok(())
    }

    fn row_to_track(row: &sqlx::sqlite::SqliteRow) -> TrackRecord {
        TrackRecord {
            id: row.get("id"),
            movie_id: row.get("movie_id"),
            language: row.get("language"),
            track_path: row.get("track_path"),
            duration_secs: row.get("duration_secs"),
            content_hash: row.get("content_hash"),
        }
    }
}

#[async_trait]
impl FingerprintStore for SqliteStore {
    async fn insert_track(
        &self,
        movie_id: i64,
        language: &str,
        track_path: &str,
        content_hash: &str,
    ) -> Result<i64> {
        if self.find_track(movie_id, language).await?.is_some() {
            return Err(Error::DuplicateTrack(format!(
                "movie {} already has a '{}' track",
                movie_id, language
            )));
        }

        sqlx::query("INSERT OR IGNORE INTO movies (id) VALUES (?)")
            .bind(movie_id)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO audio_tracks (movie_id, language, track_path, content_hash)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(movie_id)
        .bind(language)
        .bind(track_path)
        .bind(content_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn bulk_insert_fingerprints(
        &self,
        track_id: i64,
        fingerprints: &[FingerprintTuple],
    ) -> Result<u64> {
        if fingerprints.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for chunk in fingerprints.chunks(INSERT_BATCH) {
            let mut builder = sqlx::QueryBuilder::new(
                r#"INSERT INTO fingerprints (audio_track_id, hash, "offset") "#,
            );
            builder.push_values(chunk, |mut b, fp| {
                b.push_bind(track_id)
                    .push_bind(fp.hash.as_str())
                    .push_bind(fp.offset);
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!(track_id, count = fingerprints.len(), "Stored fingerprints");
        Ok(fingerprints.len() as u64)
    }

    async fn update_track_duration(&self, track_id: i64, seconds: f64) -> Result<()> {
        sqlx::query("UPDATE audio_tracks SET duration_secs = ? WHERE id = ?")
            .bind(seconds)
            .bind(track_id)
            .execute(&self.pool)
            .await?;

        // movie duration only ever grows
        sqlx::query(
            r#"
            UPDATE movies
            SET duration_secs = CASE
                WHEN duration_secs IS NULL OR duration_secs < ?1 THEN ?1
                ELSE duration_secs
            END
            WHERE id = (SELECT movie_id FROM audio_tracks WHERE id = ?2)
            "#,
        )
        .bind(seconds)
        .bind(track_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_by_hashes(
        &self,
        track_id: Option<i64>,
        hashes: &HashSet<String>,
    ) -> Result<Vec<HashHit>> {
        let mut hits = Vec::new();
        let all: Vec<&String> = hashes.iter().collect();

        for chunk in all.chunks(QUERY_BATCH) {
            let mut builder = sqlx::QueryBuilder::new(
                r#"SELECT hash, audio_track_id, "offset" FROM fingerprints WHERE hash IN ("#,
            );
            let mut separated = builder.separated(", ");
            for hash in chunk {
                separated.push_bind(hash.as_str());
            }
            builder.push(")");
            if let Some(id) = track_id {
                builder.push(" AND audio_track_id = ").push_bind(id);
            }

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in rows {
                hits.push(HashHit {
                    hash: row.get("hash"),
                    track_id: row.get("audio_track_id"),
                    offset: row.get("offset"),
                });
            }
        }

        Ok(hits)
    }

    async fn query_by_hash_prefixes(
        &self,
        track_id: Option<i64>,
        prefixes: &HashSet<String>,
    ) -> Result<Vec<HashHit>> {
        let mut hits = Vec::new();

        // One indexed range scan per prefix: hex tokens sort below
        // the prefix followed by 'g'.
        for prefix in prefixes {
            let upper = format!("{}g", prefix);
            let mut builder = sqlx::QueryBuilder::new(
                r#"SELECT hash, audio_track_id, "offset" FROM fingerprints WHERE hash >= "#,
            );
            builder.push_bind(prefix.as_str());
            builder.push(" AND hash < ").push_bind(upper);
            if let Some(id) = track_id {
                builder.push(" AND audio_track_id = ").push_bind(id);
            }

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in rows {
                hits.push(HashHit {
                    hash: row.get("hash"),
                    track_id: row.get("audio_track_id"),
                    offset: row.get("offset"),
                });
            }
        }

        Ok(hits)
    }

    async fn get_track(&self, track_id: i64) -> Result<TrackRecord> {
        let row = sqlx::query(
            r#"
            SELECT id, movie_id, language, track_path, duration_secs, content_hash
            FROM audio_tracks WHERE id = ?
            "#,
        )
        .bind(track_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_track(&r))
            .ok_or_else(|| Error::TrackNotFound(format!("track {}", track_id)))
    }

    async fn get_track_duration(&self, track_id: i64) -> Result<Option<f64>> {
        let row = sqlx::query("SELECT duration_secs FROM audio_tracks WHERE id = ?")
            .bind(track_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(r.get("duration_secs")),
            None => Err(Error::TrackNotFound(format!("track {}", track_id))),
        }
    }

    async fn find_track(&self, movie_id: i64, language: &str) -> Result<Option<TrackRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, movie_id, language, track_path, duration_secs, content_hash
            FROM audio_tracks WHERE movie_id = ? AND language = ?
            "#,
        )
        .bind(movie_id)
        .bind(language)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_track(&r)))
    }

    async fn find_track_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<TrackRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, movie_id, language, track_path, duration_secs, content_hash
            FROM audio_tracks WHERE content_hash = ? LIMIT 1
            "#,
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_track(&r)))
    }

    async fn list_tracks(&self) -> Result<Vec<TrackRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, movie_id, language, track_path, duration_secs, content_hash
            FROM audio_tracks ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_track).collect())
    }

    async fn load_pcm_segment(
        &self,
        track_id: i64,
        start_sample: u64,
        n_samples: usize,
    ) -> Result<Vec<f32>> {
        let track = self.get_track(track_id).await?;
        let path = PathBuf::from(track.track_path);
        tokio::task::spawn_blocking(move || wav::read_wav_segment(&path, start_sample, n_samples))
            .await
            .map_err(|e| Error::Internal(format!("pcm read task failed: {}", e)))?
    }
}
