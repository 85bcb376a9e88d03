//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;

/// Default base URL of the project service API.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/v1";

/// Per-call request timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// get-session and list-projects.
    pub read: Duration,
    /// Initiate, including the file upload.
    pub initiate: Duration,
    pub chat: Duration,
    /// Analysis runs synchronously on the server and can take minutes.
    pub analyze: Duration,
    pub audit: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(30),
            initiate: Duration::from_secs(60),
            chat: Duration::from_secs(60),
            analyze: Duration::from_secs(300),
            audit: Duration::from_secs(180),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint path is joined onto.
    pub base_url: Url,
    /// Pinned user id. A fresh uuid is minted when unset.
    pub user_id: Option<String>,
    pub timeouts: Timeouts,
    /// When set, logs go to a daily-rolling file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Configuration pointing at `base_url` with default timeouts.
    pub fn with_base_url(base_url: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| (key == "AEFNE_BASE_URL").then(|| base_url.to_string()))
    }

    /// Build the configuration from `AEFNE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Timeouts::default();

        let base_url = match lookup("AEFNE_BASE_URL") {
            Some(raw) => parse_base_url(&raw).map_err(|message| ConfigError::InvalidValue {
                key: "AEFNE_BASE_URL".to_string(),
                message,
            })?,
            None => parse_base_url(DEFAULT_BASE_URL).map_err(|message| {
                ConfigError::InvalidValue {
                    key: "AEFNE_BASE_URL".to_string(),
                    message,
                }
            })?,
        };

        let user_id = lookup("AEFNE_USER_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let timeouts = Timeouts {
            read: secs(&lookup, "AEFNE_READ_TIMEOUT_SECS", defaults.read)?,
            initiate: secs(&lookup, "AEFNE_INITIATE_TIMEOUT_SECS", defaults.initiate)?,
            chat: secs(&lookup, "AEFNE_CHAT_TIMEOUT_SECS", defaults.chat)?,
            analyze: secs(&lookup, "AEFNE_ANALYZE_TIMEOUT_SECS", defaults.analyze)?,
            audit: secs(&lookup, "AEFNE_AUDIT_TIMEOUT_SECS", defaults.audit)?,
        };

        let log_dir = lookup("AEFNE_LOG_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            base_url,
            user_id,
            timeouts,
            log_dir,
        })
    }

    /// Create the log directory if file logging is configured.
    pub fn prepare_log_dir(&self) -> Result<Option<&Path>, ConfigError> {
        let Some(dir) = &self.log_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        Ok(Some(dir.as_path()))
    }
}

/// Parse a base URL, making sure it ends with `/` so `Url::join` keeps the
/// last path segment.
fn parse_base_url(raw: &str) -> Result<Url, String> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme {other}")),
    }
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "timeout must be greater than zero".to_string(),
            }),
            Ok(n) => Ok(Duration::from_secs(n)),
            Err(e) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        },
    }
}
