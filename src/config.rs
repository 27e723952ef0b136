//! Connection settings, persisted as TOML.
//!
//! The config lives at `$XDG_CONFIG_HOME/atomspace-bridge/config.toml`
//! (falling back to `~/.config/...`). Every field has a default, so a partial
//! file or no file at all is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Settings consumed by the fetcher and the command channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Command and HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Live WebSocket endpoint of the CogServer.
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,
    /// Path appended to legacy HTTP targets before `/atoms`.
    #[serde(default = "default_api_path")]
    pub api_path: String,
    /// Asset loaded by `Fetcher::fetch_sample`.
    #[serde(default = "default_sample_data_file")]
    pub sample_data_file: String,
    /// Targets ending with this suffix are fetched as static assets.
    #[serde(default = "default_asset_suffix")]
    pub asset_suffix: String,
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_websocket_url() -> String {
    "ws://localhost:18080/json".into()
}
fn default_api_path() -> String {
    "/api/v1.1".into()
}
fn default_sample_data_file() -> String {
    "atoms-new-format.json".into()
}
fn default_asset_suffix() -> String {
    ".json".into()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            websocket_url: default_websocket_url(),
            api_path: default_api_path(),
            sample_data_file: default_sample_data_file(),
            asset_suffix: default_asset_suffix(),
        }
    }
}

impl BridgeConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse a TOML document.
    pub fn from_toml(text: &str, origin: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Load from an explicit file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text, &path.display().to_string())
    }

    /// Load from the XDG location, or defaults when no file exists there.
    pub fn resolve() -> ConfigResult<Self> {
        let path = default_config_path()?;
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading config");
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// `$XDG_CONFIG_HOME/atomspace-bridge/config.toml`, with the usual fallback.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    let config_home = match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".config"))
            .map_err(|_| ConfigError::NoHome)?,
    };
    Ok(config_home.join("atomspace-bridge").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cogserver_setup() {
        let config = BridgeConfig::default();
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.command_timeout(), Duration::from_secs(10));
        assert_eq!(config.websocket_url, "ws://localhost:18080/json");
        assert_eq!(config.api_path, "/api/v1.1");
        assert_eq!(config.asset_suffix, ".json");
        assert_eq!(config.sample_data_file, "atoms-new-format.json");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = BridgeConfig::from_toml("timeout_ms = 250\n", "inline").unwrap();
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.websocket_url, default_websocket_url());
    }

    #[test]
    fn bad_toml_reports_origin() {
        let err = BridgeConfig::from_toml("timeout_ms = \"soon\"", "cfg.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == "cfg.toml"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "websocket_url = \"ws://atoms:9000/json\"\n").unwrap();
        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config.websocket_url, "ws://atoms:9000/json");

        let missing = BridgeConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
