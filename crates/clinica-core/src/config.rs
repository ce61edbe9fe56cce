//! Application configuration management.
//!
//! Configuration is layered, lowest to highest priority:
//!
//! 1. Hardcoded defaults
//! 2. `~/.config/clinica/config.json` (optional)
//! 3. Environment variables with the same key names (`API_URL`, `API_TIMEOUT`, ...)
//! 4. The server's `/config` endpoint, applied with [`AppConfig::merge_remote`]
//!
//! The server never overrides `API_URL`; that value is how we found it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Application name used for config/data directory paths
const APP_DIR: &str = "clinica";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_API_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_API_RETRIES: u32 = 3;
const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1000;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

/// Keys understood in env, config file and the remote `/config` payload.
pub const RECOGNIZED_KEYS: &[&str] = &[
    "API_URL",
    "API_TIMEOUT",
    "API_RETRIES",
    "APP_NAME",
    "APP_VERSION",
    "APP_ENV",
    "CACHE_TTL",
    "CACHE_ENABLED",
    "SYNC_INTERVAL",
    "MAX_SYNC_ATTEMPTS",
    "DATA_DIR",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(rename = "API_URL")]
    pub api_url: String,
    #[serde(rename = "API_TIMEOUT")]
    pub api_timeout_ms: u64,
    #[serde(rename = "API_RETRIES")]
    pub api_retries: u32,
    #[serde(rename = "APP_NAME")]
    pub app_name: String,
    #[serde(rename = "APP_VERSION")]
    pub app_version: String,
    #[serde(rename = "APP_ENV")]
    pub app_env: String,
    #[serde(rename = "CACHE_TTL")]
    pub cache_ttl_ms: u64,
    #[serde(rename = "CACHE_ENABLED")]
    pub cache_enabled: bool,
    #[serde(rename = "SYNC_INTERVAL")]
    pub sync_interval_secs: u64,
    /// `None` keeps failing operations queued forever.
    #[serde(rename = "MAX_SYNC_ATTEMPTS")]
    pub max_sync_attempts: Option<u32>,
    #[serde(rename = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_timeout_ms: DEFAULT_API_TIMEOUT_MS,
            api_retries: DEFAULT_API_RETRIES,
            app_name: "Clinica Estetica".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            app_env: "development".to_string(),
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            cache_enabled: true,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            max_sync_attempts: None,
            data_dir: None,
        }
    }
}

impl AppConfig {
    /// Load defaults, the optional config file and the process environment.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Ok(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay values found by `lookup` (normally `std::env::var`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for key in RECOGNIZED_KEYS {
            if let Some(raw) = lookup(key) {
                self.set_key(key, &raw);
            }
        }
    }

    /// Overlay the payload of the server's `/config` endpoint.
    /// Accepts either a bare object or a `{ success, data }` envelope.
    pub fn merge_remote(&mut self, remote: &Value) {
        let object = remote
            .get("data")
            .filter(|d| d.is_object())
            .unwrap_or(remote);

        let Some(map) = object.as_object() else {
            warn!("Remote config is not an object, ignoring");
            return;
        };

        for (key, value) in map {
            if key == "API_URL" {
                continue;
            }
            let raw = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            self.set_key(key, &raw);
        }
    }

    /// Set one recognized key from its string form.
    /// Returns false for unknown keys or unparseable values.
    fn set_key(&mut self, key: &str, raw: &str) -> bool {
        let raw = raw.trim();
        let applied = match key {
            "API_URL" if !raw.is_empty() => {
                self.api_url = raw.trim_end_matches('/').to_string();
                true
            }
            "API_TIMEOUT" => parse_into(raw, &mut self.api_timeout_ms),
            "API_RETRIES" => parse_into(raw, &mut self.api_retries),
            "APP_NAME" => {
                self.app_name = raw.to_string();
                true
            }
            "APP_VERSION" => {
                self.app_version = raw.to_string();
                true
            }
            "APP_ENV" => {
                self.app_env = raw.to_string();
                true
            }
            "CACHE_TTL" => parse_into(raw, &mut self.cache_ttl_ms),
            "CACHE_ENABLED" => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => {
                    self.cache_enabled = true;
                    true
                }
                "false" | "0" | "no" => {
                    self.cache_enabled = false;
                    true
                }
                _ => false,
            },
            "SYNC_INTERVAL" => parse_into(raw, &mut self.sync_interval_secs),
            "MAX_SYNC_ATTEMPTS" => {
                if raw.is_empty() {
                    self.max_sync_attempts = None;
                    true
                } else {
                    raw.parse().map(|n| self.max_sync_attempts = Some(n)).is_ok()
                }
            }
            "DATA_DIR" if !raw.is_empty() => {
                self.data_dir = Some(PathBuf::from(raw));
                true
            }
            _ => false,
        };

        if applied {
            debug!(key, "Config value applied");
        } else if RECOGNIZED_KEYS.contains(&key) {
            warn!(key, value = raw, "Ignoring invalid config value");
        }
        applied
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Directory for snapshots, the pending queue and log files.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_DIR))
    }
}

fn parse_into<T: std::str::FromStr>(raw: &str, slot: &mut T) -> bool {
    match raw.parse() {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api_timeout(), Duration::from_secs(10));
        assert_eq!(config.api_retries, 3);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert!(config.cache_enabled);
        assert_eq!(config.sync_interval(), Duration::from_secs(30));
        assert_eq!(config.max_sync_attempts, None);
    }

    #[test]
    fn test_apply_env() {
        let env: HashMap<&str, &str> = [
            ("API_URL", "https://clinica.example.cl/api/"),
            ("API_TIMEOUT", "2500"),
            ("API_RETRIES", "5"),
            ("CACHE_ENABLED", "false"),
            ("MAX_SYNC_ATTEMPTS", "10"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_url, "https://clinica.example.cl/api");
        assert_eq!(config.api_timeout_ms, 2500);
        assert_eq!(config.api_retries, 5);
        assert!(!config.cache_enabled);
        assert_eq!(config.max_sync_attempts, Some(10));
    }

    #[test]
    fn test_invalid_env_value_keeps_default() {
        let mut config = AppConfig::default();
        config.apply_env(|k| (k == "API_RETRIES").then(|| "many".to_string()));
        assert_eq!(config.api_retries, 3);
    }

    #[test]
    fn test_merge_remote_envelope() {
        let mut config = AppConfig::default();
        config.merge_remote(&json!({
            "success": true,
            "data": {
                "API_URL": "http://evil.example",
                "APP_NAME": "Clinica Bella",
                "APP_ENV": "production",
                "CACHE_TTL": 60000,
                "CACHE_ENABLED": true,
                "UNKNOWN": "ignored"
            }
        }));

        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.app_name, "Clinica Bella");
        assert_eq!(config.app_env, "production");
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_config_file_format_round_trips_keys() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"API_RETRIES": 1, "SYNC_INTERVAL": 5}"#).unwrap();
        assert_eq!(parsed.api_retries, 1);
        assert_eq!(parsed.sync_interval_secs, 5);
        assert_eq!(parsed.api_timeout_ms, DEFAULT_API_TIMEOUT_MS);
    }
}
