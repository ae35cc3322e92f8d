//! Client configuration: an optional JSON file, overridden by command-line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8069";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Value of the backend's `session_id` cookie.
    pub session_id: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub upload_timeout: Duration,
    pub history_limit: usize,
    pub upload_history_limit: usize,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_id: None,
            // Commands may run up to the backend's own 300s limit.
            request_timeout: Duration::from_secs(330),
            upload_timeout: Duration::from_secs(600),
            history_limit: 100,
            upload_history_limit: 20,
            user_agent: format!("devterm/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// `<config dir>/devterm/config.json`, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("devterm").join("config.json"))
    }

    /// Load from `path`. A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("read config {}", path.display()));
            }
        };
        serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    /// URL that every `/developer_terminal/` route is joined onto.
    pub fn endpoint_base(&self) -> Result<reqwest::Url> {
        let base = self.base_url.trim_end_matches('/');
        reqwest::Url::parse(&format!("{base}/developer_terminal/"))
            .with_context(|| format!("invalid base URL {}", self.base_url))
    }
}
