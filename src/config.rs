use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KegError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory under which every source lays out its installs.
    /// Defaults to `~/.keg`.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Sources that must answer listings with empty results and refuse
    /// downloads (administratively disabled).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_sources: Vec<String>,

    /// host -> bearer token, injected on requests to that host.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub auth_tokens: HashMap<String, String>,

    /// Per-request timeout in seconds for every backend call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Concurrent-stream cap applied to the CDN backend.
    #[serde(default = "default_max_streams")]
    pub max_cdn_streams: usize,

    #[serde(default = "default_central_url")]
    pub central_url: String,

    #[serde(default = "default_disco_url")]
    pub disco_url: String,

    #[serde(default = "default_zulu_url")]
    pub zulu_url: String,

    /// Platform suffix used by the CDN's archive names.
    #[serde(default = "default_zulu_platform")]
    pub zulu_platform: String,

    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
}

fn default_root_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".keg")
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_streams() -> usize {
    8
}

fn default_central_url() -> String {
    "https://repo.maven.apache.org/maven2".to_string()
}

fn default_disco_url() -> String {
    "https://api.foojay.io/disco/v3.0".to_string()
}

fn default_zulu_url() -> String {
    "https://cdn.azul.com/zulu/bin".to_string()
}

fn default_zulu_platform() -> String {
    if cfg!(target_os = "macos") {
        "macosx_x64".to_string()
    } else {
        "linux_x64".to_string()
    }
}

fn default_catalog_url() -> String {
    "https://api.sdkman.io/2".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            disabled_sources: Vec::new(),
            auth_tokens: HashMap::new(),
            request_timeout_secs: default_request_timeout(),
            max_cdn_streams: default_max_streams(),
            central_url: default_central_url(),
            disco_url: default_disco_url(),
            zulu_url: default_zulu_url(),
            zulu_platform: default_zulu_platform(),
            catalog_url: default_catalog_url(),
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("keg"))
            .ok_or_else(|| KegError::Config("Cannot determine config directory".to_string()))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load the on-disk config, falling back to defaults when none exists.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map_err(|e| KegError::Config(format!("Invalid config at {}: {}", path.display(), e)))
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        std::fs::create_dir_all(&dir)?;
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::config_path()?, raw)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_disabled(&self, source_name: &str) -> bool {
        self.disabled_sources
            .iter()
            .any(|name| name.eq_ignore_ascii_case(source_name))
    }

    /// Cache directory for slow listing payloads.
    pub fn response_cache_dir(&self) -> PathBuf {
        self.root_dir.join(".cache").join("responses")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.root_dir.ends_with(".keg"));
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_cdn_streams, 8);
        assert!(config.disabled_sources.is_empty());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"disabled_sources":["catalog"]}"#).unwrap();
        assert!(config.is_disabled("catalog"));
        assert!(config.is_disabled("CATALOG"));
        assert!(!config.is_disabled("zulu"));
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_roundtrip() {
        let mut config = AppConfig::default();
        config.disabled_sources.push("disco".to_string());
        let raw = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&raw).unwrap();
        assert!(back.is_disabled("disco"));
        assert_eq!(back.central_url, config.central_url);
    }
}
