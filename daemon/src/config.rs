//! Daemon configuration file.

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/qns/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default log level; `RUST_LOG` still overrides.
    pub log_level: String,
    /// Number of subscription slots to bring up.
    pub slot_count: u8,
    /// Where the last-known Wi-Fi country code is persisted.
    pub country_code_path: String,
    /// Optional carrier bundle (JSON) applied to every slot at startup.
    pub carrier_config_path: Option<String>,
    /// Optional replay script (JSON lines of timed feed events). When set
    /// the daemon drives the engine from the script and exits.
    pub replay_path: Option<String>,
    /// Replay time multiplier; 0 replays as fast as possible.
    pub replay_speed: f32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            slot_count: 1,
            country_code_path: "/var/lib/qns/country-code".to_string(),
            carrier_config_path: None,
            replay_path: None,
            replay_speed: 1.0,
        }
    }
}

pub fn parse_config(text: &str) -> Result<Config> {
    toml::from_str(text).context("failed to parse config file")
}

/// Load the config, falling back to defaults when the file is absent.
pub async fn load_config(path: &str) -> Result<Config> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => parse_config(&text),
        Err(e) => {
            warn!("no config file at {path} ({e}), using defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.slot_count, 1);
        assert!(config.replay_path.is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let config = parse_config(
            "slot_count = 2\nreplay_path = \"/tmp/events.jsonl\"\nreplay_speed = 0.0\n",
        )
        .unwrap();
        assert_eq!(config.slot_count, 2);
        assert_eq!(config.replay_path.as_deref(), Some("/tmp/events.jsonl"));
        assert_eq!(config.replay_speed, 0.0);
        // untouched fields keep defaults
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_config("slot_count = \"many\"").is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let config = load_config("/nonexistent/qns.toml").await.unwrap();
        assert_eq!(config.slot_count, 1);
    }

    #[tokio::test]
    async fn test_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            slot_count: 2,
            log_level: "debug".to_string(),
            ..Config::default()
        };
        tokio::fs::write(&path, toml::to_string(&config).unwrap())
            .await
            .unwrap();
        let loaded = load_config(path.to_str().unwrap()).await.unwrap();
        assert_eq!(loaded.slot_count, 2);
        assert_eq!(loaded.log_level, "debug");
    }
}
