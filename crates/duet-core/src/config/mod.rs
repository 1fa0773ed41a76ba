//! Configuration management for Duet.
//!
//! This module handles loading, saving, and validating Duet configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/duet/config.toml` |
//! | macOS | `~/Library/Application Support/Duet/config.toml` |
//! | Windows | `%APPDATA%\Duet\config.toml` |
//!
//! Chunk size and backpressure thresholds are local sender decisions and are
//! never communicated to the peer, so they can be tuned freely.
//!
//! ## Example
//!
//! ```rust,ignore
//! use duet_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Chunk size: {}", config.transfer.chunk_size);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest chunk payload the TCP adapter can frame.
pub const MAX_CHUNK_SIZE: usize = crate::channel::tcp::MAX_PAYLOAD_SIZE - 4;

/// Main configuration struct for Duet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
    /// Pairing settings
    pub pairing: PairingConfig,
}

/// General configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where received files are saved
    pub output_dir: Option<PathBuf>,
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Payload bytes per chunk frame
    pub chunk_size: usize,
    /// Pause sending while the channel buffers more than this many bytes
    pub high_water_mark: u64,
    /// Delay between backpressure re-checks
    #[serde(with = "humantime_serde")]
    pub backpressure_retry: Duration,
    /// What to do with an offer that arrives while a download is running
    pub offer_policy: OfferPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            high_water_mark: crate::DEFAULT_HIGH_WATER_MARK,
            backpressure_retry: Duration::from_millis(crate::DEFAULT_BACKPRESSURE_RETRY_MS),
            offer_policy: OfferPolicy::Reject,
        }
    }
}

impl TransferConfig {
    /// Check that the values can drive a transfer.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for a zero or oversized chunk size, or a
    /// zero retry delay.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig {
                key: "transfer.chunk_size".to_string(),
                reason: "must be at least 1 byte".to_string(),
            });
        }

        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig {
                key: "transfer.chunk_size".to_string(),
                reason: format!("must not exceed {MAX_CHUNK_SIZE} bytes"),
            });
        }

        if self.backpressure_retry.is_zero() {
            return Err(Error::InvalidConfig {
                key: "transfer.backpressure_retry".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Policy for an offer received while a download is still busy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferPolicy {
    /// Keep the running download and refuse the new offer
    #[default]
    Reject,
    /// Cancel the running download and accept the new offer
    Replace,
}

/// Pairing configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Base of generated pairing links; `None` uses the listening address
    pub base_url: Option<String>,
    /// TCP port for `duet listen`
    pub port: u16,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            port: crate::DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;

        config.transfer.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "duet", "Duet")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis();
        if millis % 1000 == 0 {
            serializer.serialize_str(&format!("{}s", millis / 1000))
        } else {
            serializer.serialize_str(&format!("{millis}ms"))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();

        let parsed = if let Some(ms) = s.strip_suffix("ms") {
            ms.parse().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            let mins: u64 = mins.parse().map_err(serde::de::Error::custom)?;
            return mins
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| serde::de::Error::custom("duration too large"));
        } else {
            return Err(serde::de::Error::custom("invalid duration format"));
        };

        parsed.map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.transfer.chunk_size, crate::DEFAULT_CHUNK_SIZE);
        assert_eq!(config.transfer.high_water_mark, crate::DEFAULT_HIGH_WATER_MARK);
        assert_eq!(config.transfer.backpressure_retry, Duration::from_millis(50));
        assert_eq!(config.transfer.offer_policy, OfferPolicy::Reject);
        assert_eq!(config.pairing.port, crate::DEFAULT_PORT);
        assert!(config.general.output_dir.is_none());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config").join("config.toml");

        let mut original = Config::default();
        original.transfer.chunk_size = 64 * 1024;
        original.transfer.offer_policy = OfferPolicy::Replace;
        original.pairing.base_url = Some("https://duet.example/".to_string());

        original.save_to(&config_path).expect("save");
        let loaded = Config::load_from(&config_path).expect("load");

        assert_eq!(loaded.transfer.chunk_size, 64 * 1024);
        assert_eq!(loaded.transfer.offer_policy, OfferPolicy::Replace);
        assert_eq!(
            loaded.pairing.base_url.as_deref(),
            Some("https://duet.example/")
        );
    }

    #[test]
    fn test_config_load_missing_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.transfer.chunk_size, crate::DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_config_deserialization_partial() {
        let partial_toml = r#"
[transfer]
high_water_mark = 1000000
backpressure_retry = "20ms"
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.transfer.high_water_mark, 1_000_000);
        assert_eq!(config.transfer.backpressure_retry, Duration::from_millis(20));
        assert_eq!(config.transfer.chunk_size, crate::DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_duration_minutes() {
        let config: Config = toml::from_str("[transfer]\nbackpressure_retry = \"2m\"\n").unwrap();
        assert_eq!(config.transfer.backpressure_retry, Duration::from_secs(120));

        let huge = format!("[transfer]\nbackpressure_retry = \"{}m\"\n", u64::MAX);
        assert!(toml::from_str::<Config>(&huge).is_err());
    }

    #[test]
    fn test_duration_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");

        assert!(
            toml_str.contains("backpressure_retry = \"50ms\""),
            "Duration should be serialized as human-readable"
        );
        assert!(toml_str.contains("offer_policy = \"reject\""));
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let config = TransferConfig {
            chunk_size: 0,
            ..Default::default()
        };

        match config.validate() {
            Err(Error::InvalidConfig { key, .. }) => assert_eq!(key, "transfer.chunk_size"),
            other => panic!("Expected InvalidConfig, got: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_oversized_chunk() {
        let config = TransferConfig {
            chunk_size: MAX_CHUNK_SIZE + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[transfer]\nchunk_size = 0\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_config_path() {
        assert!(Config::config_path().ends_with("config.toml"));
    }
}
