//! Configuration for ytdl-relay
//!
//! Settings are grouped into sub-configs (`server`, `download`, `retention`),
//! each with serde per-field defaults so a partial config deserializes into a
//! fully usable one. Defaults match the traditional deployment: port 5000,
//! output under `/tmp/yt-dlp`, two concurrent fragments, four-hour retention.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use utoipa::ToSchema;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Download / yt-dlp settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Disk retention settings
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServerConfig {
    /// Address the API server binds to
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,
}

/// Download settings
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Directory downloads are written to; each job gets an `<id>/` subdirectory
    #[serde(default = "default_output_dir")]
    #[schema(value_type = String)]
    pub output_dir: PathBuf,

    /// Number of media fragments yt-dlp fetches concurrently
    #[serde(default = "default_concurrent_fragments")]
    pub concurrent_fragments: u32,

    /// Explicit path to the yt-dlp binary; discovered on PATH when unset
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub ytdlp_path: Option<PathBuf>,
}

/// Disk retention settings
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RetentionConfig {
    /// Age in seconds after which an untracked job directory is deleted
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Seconds between periodic retention sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Seconds to wait after startup before the first sweep
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/tmp/yt-dlp")
}

fn default_concurrent_fragments() -> u32 {
    2
}

fn default_max_age_secs() -> u64 {
    4 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    10 * 60
}

fn default_startup_delay_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            concurrent_fragments: default_concurrent_fragments(),
            ytdlp_path: None,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            startup_delay_secs: default_startup_delay_secs(),
        }
    }
}

impl RetentionConfig {
    /// Maximum age of an untracked job directory before it is swept
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Interval between periodic sweeps
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Delay before the first sweep after startup
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

impl Config {
    /// Validate the configuration, returning an error describing the first
    /// invalid setting encountered
    pub fn validate(&self) -> Result<()> {
        if self.download.output_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "output_dir must not be empty".to_string(),
                key: Some("download.output_dir".to_string()),
            });
        }

        if self.download.concurrent_fragments == 0 {
            return Err(Error::Config {
                message: "concurrent_fragments must be at least 1".to_string(),
                key: Some("download.concurrent_fragments".to_string()),
            });
        }

        if self.retention.sweep_interval_secs == 0 {
            return Err(Error::Config {
                message: "sweep_interval_secs must be at least 1".to_string(),
                key: Some("retention.sweep_interval_secs".to_string()),
            });
        }

        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind_address.port(), 5000);
        assert_eq!(config.download.output_dir, PathBuf::from("/tmp/yt-dlp"));
        assert_eq!(config.download.concurrent_fragments, 2);
        assert!(config.download.ytdlp_path.is_none());
        assert_eq!(config.retention.max_age(), Duration::from_secs(4 * 60 * 60));
        assert_eq!(config.retention.sweep_interval(), Duration::from_secs(600));
        config.validate().expect("defaults must validate");
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"server": {"bind_address": "127.0.0.1:8080"}}"#).unwrap();
        assert_eq!(config.server.bind_address.port(), 8080);
        assert_eq!(config.download.concurrent_fragments, 2);
        assert_eq!(config.retention.max_age_secs, 14400);
    }

    #[test]
    fn test_validate_rejects_empty_output_dir() {
        let mut config = Config::default();
        config.download.output_dir = PathBuf::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("output_dir"));
    }

    #[test]
    fn test_validate_rejects_zero_fragments() {
        let mut config = Config::default();
        config.download.concurrent_fragments = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_sweep_interval() {
        let mut config = Config::default();
        config.retention.sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
