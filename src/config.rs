//! Resolver configuration loaded from `~/.config/streamfall/config.toml`.
//!
//! Every field has a default, so a missing file (or an empty one) yields a
//! working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Variant picked first when a master manifest lists several levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartLevel {
    /// Highest bandwidth variant.
    Highest,
    /// Lowest bandwidth variant (fastest first frame).
    #[default]
    Lowest,
}

/// Load behaviour for one class of request (manifest, level or fragment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` means fail fast.
    pub max_retries: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Per-attempt timeout, in milliseconds.
    pub timeout_ms: u64,
}

impl RetryPolicy {
    /// Fail-fast policy with the given timeout.
    pub const fn fail_fast(timeout_ms: u64) -> Self {
        Self {
            max_retries: 0,
            retry_delay_ms: 0,
            timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Total number of attempts, first one included.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Retry policies handed to every new engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadPolicy {
    pub manifest: RetryPolicy,
    pub level: RetryPolicy,
    pub fragment: RetryPolicy,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            manifest: RetryPolicy::fail_fast(10_000),
            level: RetryPolicy::fail_fast(10_000),
            fragment: RetryPolicy {
                max_retries: 2,
                retry_delay_ms: 500,
                timeout_ms: 20_000,
            },
        }
    }
}

/// Top-level resolver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Consecutive non-fatal stream errors tolerated before the fatal path.
    pub error_budget: u32,
    /// Folder, next to the progressive file, holding the adaptive renditions.
    pub adaptive_subfolder: String,
    /// Manifest file name inside `<subfolder>/<name>/`. `{name}` is the
    /// progressive file stem.
    pub manifest_name: String,
    /// File extensions recognised as progressive media.
    pub progressive_extensions: Vec<String>,
    /// Base URL that relative sources are joined to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// First variant requested from a master manifest.
    pub start_level: StartLevel,
    /// Fragments buffered by the headless engine before playback counts as
    /// settled.
    pub prefetch_fragments: usize,
    pub load: LoadPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            error_budget: 5,
            adaptive_subfolder: "hls".to_string(),
            manifest_name: "{name}.m3u8".to_string(),
            progressive_extensions: ["mp4", "webm", "mov", "m4v", "mkv"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            base_url: None,
            start_level: StartLevel::Lowest,
            prefetch_fragments: 3,
            load: LoadPolicy::default(),
        }
    }
}

impl ResolverConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid resolver configuration")
    }

    /// Load the configuration from `path`, or from the default location
    /// when `path` is `None`.
    ///
    /// A missing default file yields the defaults. An explicitly given path
    /// must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Serialise back to TOML (used by `streamfall config`).
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialise configuration")
    }
}

/// Return the path to the default config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamfall")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let config = ResolverConfig::from_toml_str("").unwrap();
        assert_eq!(config, ResolverConfig::default());
        assert_eq!(config.error_budget, 5);
        assert_eq!(config.load.manifest.max_retries, 0);
        assert_eq!(config.load.fragment.max_retries, 2);
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
error_budget = 3
adaptive_subfolder = "adaptive"
start_level = "highest"

[load.fragment]
max_retries = 1
retry_delay_ms = 250
timeout_ms = 5000
"#;
        let config = ResolverConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.error_budget, 3);
        assert_eq!(config.adaptive_subfolder, "adaptive");
        assert_eq!(config.start_level, StartLevel::Highest);
        assert_eq!(config.load.fragment.attempts(), 2);
        assert_eq!(config.load.fragment.retry_delay(), Duration::from_millis(250));
        // untouched sections keep their defaults
        assert_eq!(config.load.manifest, RetryPolicy::fail_fast(10_000));
        assert_eq!(config.manifest_name, "{name}.m3u8");
    }

    #[test]
    fn invalid_config_is_an_error() {
        assert!(ResolverConfig::from_toml_str("error_budget = \"lots\"").is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let path = Path::new("/definitely/not/here/streamfall.toml");
        assert!(ResolverConfig::load(Some(path)).is_err());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = ResolverConfig {
            base_url: Some("https://cdn.example.com/".into()),
            ..ResolverConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("error_budget = 5"));
        assert_eq!(ResolverConfig::from_toml_str(&text).unwrap(), config);
    }
}
