//! Configuration file loading tests

use filmprint_common::config::{self, TomlConfig};
use filmprint_common::Error;
use std::path::PathBuf;

#[test]
fn test_load_explicit_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        database_path = "/data/filmprint.db"
        media_dir = "/data/media"
        query_timeout_secs = 30
        ffmpeg_path = "/usr/local/bin/ffmpeg"

        [engine]
        threshold = 0.8
        "#,
    )
    .unwrap();

    let cfg = config::load_config(Some(&path)).unwrap();
    assert_eq!(cfg.database_path, Some(PathBuf::from("/data/filmprint.db")));
    assert_eq!(cfg.query_timeout_secs, Some(30));
    assert_eq!(cfg.ffmpeg_path.as_deref(), Some("/usr/local/bin/ffmpeg"));
    assert_eq!(cfg.engine_params().peaks.threshold, 0.8);
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.toml");
    let err = config::load_config(Some(&path)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_malformed_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "database_path = [not, toml").unwrap();
    let err = config::load_config(Some(&path)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_resolution_falls_back_through_tiers() {
    let cfg = TomlConfig {
        database_path: Some(PathBuf::from("/toml/db.sqlite")),
        ..Default::default()
    };
    // TOML applies when CLI is absent
    assert_eq!(
        config::resolve_database_path(None, &cfg),
        PathBuf::from("/toml/db.sqlite")
    );
    // CLI wins
    assert_eq!(
        config::resolve_database_path(Some(std::path::Path::new("/cli/db.sqlite")), &cfg),
        PathBuf::from("/cli/db.sqlite")
    );
}
