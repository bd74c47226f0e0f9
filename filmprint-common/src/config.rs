//! Configuration loading and path resolution
//!
//! Resolution follows the priority order:
//! 1. Command-line argument (highest)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::params::{EngineParams, FallbackTier};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// On-disk configuration file (`config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// SQLite database file
    pub database_path: Option<PathBuf>,
    /// Directory for canonical track PCM and scratch fragments
    pub media_dir: Option<PathBuf>,
    /// Wall-time budget for one identification (seconds)
    pub query_timeout_secs: Option<u64>,
    /// ffmpeg binary used to demux video containers
    pub ffmpeg_path: Option<String>,
    /// Engine parameter overrides
    #[serde(default)]
    pub engine: EngineOverrides,
}

/// Subset of engine parameters exposed through the config file.
///
/// The peak/hash grid parameters are deliberately *not* exposed here:
/// stored fingerprints depend on them, and silently changing them in
/// a config file would orphan the whole index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineOverrides {
    /// Relative peak threshold
    pub threshold: Option<f32>,
    /// Fan-out per anchor
    pub fan_value: Option<usize>,
    /// Matcher offset bin width (seconds)
    pub delta_tolerance: Option<f64>,
    /// Prefix fallback tiers (empirical weights)
    pub fallbacks: Option<Vec<FallbackTier>>,
    /// Entropy down-weighting of ambiguous vote distributions
    pub entropy_adjustment: Option<bool>,
    /// Cross-correlation refinement
    pub refine: Option<bool>,
}

impl TomlConfig {
    /// Apply the `[engine]` overrides on top of the defaults.
    pub fn engine_params(&self) -> EngineParams {
        let mut params = EngineParams::default();
        let o = &self.engine;
        if let Some(threshold) = o.threshold {
            params.peaks.threshold = threshold;
        }
        if let Some(fan_value) = o.fan_value {
            params.hashes.fan_value = fan_value;
        }
        if let Some(tol) = o.delta_tolerance {
            params.matcher.delta_tolerance = tol;
        }
        if let Some(fallbacks) = &o.fallbacks {
            params.matcher.fallbacks = fallbacks.clone();
        }
        if let Some(entropy) = o.entropy_adjustment {
            params.matcher.entropy_adjustment = entropy;
        }
        if let Some(refine) = o.refine {
            params.refine.enabled = refine;
        }
        params
    }
}

/// Load the configuration file.
///
/// `explicit` (from the CLI) wins; otherwise `$FILMPRINT_CONFIG`,
/// then the platform config dir (`~/.config/filmprint/config.toml`).
/// A missing file is not an error; defaults apply.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let candidate = explicit
        .map(PathBuf::from)
        .or_else(|| std::env::var("FILMPRINT_CONFIG").ok().map(PathBuf::from))
        .or_else(|| dirs::config_dir().map(|d| d.join("filmprint").join("config.toml")));

    let Some(path) = candidate else {
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        if explicit.is_some() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("parse {} failed: {}", path.display(), e)))
}

/// Resolve the database path: CLI > env > TOML > `./filmprint.db`.
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    resolve_path(cli_arg, "FILMPRINT_DB", config.database_path.as_deref())
        .unwrap_or_else(|| PathBuf::from("filmprint.db"))
}

/// Resolve the media directory: CLI > env > TOML > `./media`.
pub fn resolve_media_dir(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    resolve_path(cli_arg, "FILMPRINT_MEDIA_DIR", config.media_dir.as_deref())
        .unwrap_or_else(|| PathBuf::from("media"))
}

fn resolve_path(
    cli_arg: Option<&Path>,
    env_var: &str,
    toml_value: Option<&Path>,
) -> Option<PathBuf> {
    let mut sources = Vec::new();
    if cli_arg.is_some() {
        sources.push("command line");
    }
    let env_value = std::env::var(env_var).ok().filter(|v| !v.trim().is_empty());
    if env_value.is_some() {
        sources.push("environment");
    }
    if toml_value.is_some() {
        sources.push("TOML");
    }
    if sources.len() > 1 {
        warn!(
            "{} set in multiple sources: {}. Using {} (highest priority).",
            env_var,
            sources.join(", "),
            sources[0]
        );
    }

    cli_arg
        .map(PathBuf::from)
        .or(env_value.map(PathBuf::from))
        .or(toml_value.map(PathBuf::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_configured() {
        let cfg = TomlConfig::default();
        assert_eq!(
            resolve_database_path(None, &cfg),
            PathBuf::from("filmprint.db")
        );
        assert_eq!(resolve_media_dir(None, &cfg), PathBuf::from("media"));
    }

    #[test]
    fn test_cli_wins_over_toml() {
        let cfg = TomlConfig {
            database_path: Some(PathBuf::from("/from/toml.db")),
            ..Default::default()
        };
        let resolved = resolve_database_path(Some(Path::new("/from/cli.db")), &cfg);
        assert_eq!(resolved, PathBuf::from("/from/cli.db"));
    }

    #[test]
    fn test_engine_overrides_apply() {
        let toml = r#"
            [engine]
            threshold = 0.7
            fan_value = 12
            entropy_adjustment = true

            [[engine.fallbacks]]
            prefix_len = 8
            weight = 0.5
        "#;
        let cfg: TomlConfig = toml::from_str(toml).unwrap();
        let params = cfg.engine_params();
        assert_eq!(params.peaks.threshold, 0.7);
        assert_eq!(params.hashes.fan_value, 12);
        assert!(params.matcher.entropy_adjustment);
        assert_eq!(params.matcher.fallbacks.len(), 1);
        assert_eq!(params.matcher.fallbacks[0].weight, 0.5);
    }

    #[test]
    fn test_unset_overrides_keep_defaults() {
        let cfg: TomlConfig = toml::from_str("").unwrap();
        let params = cfg.engine_params();
        assert_eq!(params.peaks.threshold, 0.6);
        assert_eq!(params.matcher.fallbacks.len(), 2);
    }
}
