//! # Configuration Management Module
//!
//! Settings for the containment engine, the logging setup of the binary and
//! the randomized stress driver, loaded from a single TOML file.
//!
//! ## Configuration Structure
//!
//! - [`WorldConfig`] - dispatch pool size, aggregate recompute tuning and the
//!   stall watchdog threshold
//! - [`LoggingConfig`] - log level and optional log file
//! - [`StressConfig`] - shape of the `worldtree stress` workload
//!
//! ## Usage
//!
//! ```rust,no_run
//! use worldtree::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Create default configuration
//!     Config::create_default("config.toml").await?;
//!
//!     // Load configuration from file
//!     let config = Config::load("config.toml").await?;
//!     println!("Dispatch threads: {}", config.world.dispatch_threads);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [world]
//! dispatch_threads = 3
//! recompute_interval = 1024
//! recompute_peak_ratio_bits = 32
//! stall_warning_ms = 5000
//!
//! [logging]
//! level = "info"
//! file = "worldtree.log"
//!
//! [stress]
//! threads = 8
//! moves_per_thread = 2000
//! ```
//!
//! Every section and field is optional; missing values take the defaults
//! shown above.

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::world::Tuning;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub stress: StressConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Worker threads delivering deferred notifications.
    pub dispatch_threads: usize,
    /// Decreases a content sum absorbs before it is rebuilt from scratch.
    pub recompute_interval: u32,
    /// Sums are also rebuilt once they fall below `peak / 2^bits`.
    pub recompute_peak_ratio_bits: u32,
    /// Blocking waits log a warning each time this many milliseconds pass.
    pub stall_warning_ms: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            dispatch_threads: 3,
            recompute_interval: 1024,
            recompute_peak_ratio_bits: 32,
            stall_warning_ms: 5000,
        }
    }
}

impl WorldConfig {
    pub fn tuning(&self) -> Tuning {
        Tuning {
            recompute_interval: self.recompute_interval.max(1),
            peak_ratio: 2f64.powi(-(self.recompute_peak_ratio_bits.min(1000) as i32)),
            stall_warning: Duration::from_millis(self.stall_warning_ms.max(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("worldtree.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Concurrent movers.
    pub threads: usize,
    pub moves_per_thread: usize,
    /// Nested crates the movers shuffle items between.
    pub containers: usize,
    /// Small movable items.
    pub items: usize,
    /// RNG seed; each mover derives its own stream from it.
    pub seed: u64,
    /// Give up (and fail) if the run has not finished by then.
    pub timeout_seconds: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            moves_per_thread: 2000,
            containers: 12,
            items: 48,
            seed: 0x5eed,
            timeout_seconds: 120,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_config_default() {
        let config = WorldConfig::default();
        assert_eq!(config.dispatch_threads, 3);
        assert_eq!(config.recompute_interval, 1024);
        assert_eq!(config.recompute_peak_ratio_bits, 32);
        assert_eq!(config.stall_warning_ms, 5000);
    }

    #[test]
    fn test_tuning_matches_engine_defaults() {
        let tuning = WorldConfig::default().tuning();
        assert_eq!(tuning, Tuning::default());
    }

    #[test]
    fn test_tuning_clamps_degenerate_values() {
        let config = WorldConfig {
            recompute_interval: 0,
            stall_warning_ms: 0,
            ..WorldConfig::default()
        };
        let tuning = config.tuning();
        assert_eq!(tuning.recompute_interval, 1);
        assert_eq!(tuning.stall_warning, Duration::from_millis(1));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str("[world]\ndispatch_threads = 7\n").unwrap();
        assert_eq!(config.world.dispatch_threads, 7);
        assert_eq!(config.world.recompute_interval, 1024);
        assert_eq!(config.stress, StressConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serializes_to_json() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["world"]["dispatch_threads"], 3);
        assert_eq!(json["stress"]["threads"], 8);
    }

    #[tokio::test]
    async fn test_create_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[tokio::test]
    async fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = Config::load(path.to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
        let fallback = Config::load_or_default(path.to_str().unwrap()).await.unwrap();
        assert_eq!(fallback, Config::default());
    }
}
