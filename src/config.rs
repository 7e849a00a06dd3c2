//! Endpoint and client configuration.
//!
//! Every endpoint path has a hardcoded fallback. A JSON config file may
//! override any of them, and CLI flags override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::RunKind;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub submit: String,
    pub dns_submit: String,
    /// Push-stream base; the run id is appended verbatim.
    pub events: String,
    pub dns_events: String,
    pub regions: String,
    pub cities: String,
    pub isps: String,
    pub clear_logs: String,
    /// Base for screenshot and whois artifact links.
    pub artifacts: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            submit: "/run".into(),
            dns_submit: "/dns/run".into(),
            events: "/events/".into(),
            dns_events: "/events/".into(),
            regions: "/api/geo/regions".into(),
            cities: "/api/geo/cities".into(),
            isps: "/api/geo/isps".into(),
            clear_logs: "/logs/clear".into(),
            artifacts: "/logs/".into(),
        }
    }
}

impl Endpoints {
    pub fn submit_path(&self, kind: RunKind) -> &str {
        match kind {
            RunKind::Generic => &self.submit,
            RunKind::Dns => &self.dns_submit,
        }
    }

    pub fn events_base(&self, kind: RunKind) -> &str {
        match kind {
            RunKind::Generic => &self.events,
            RunKind::Dns => &self.dns_events,
        }
    }
}

/// Contents of the optional config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    pub endpoints: Endpoints,
}

/// Resolved settings used to build a `CheckClient`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub request_timeout: Duration,
    pub endpoints: Endpoints,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>, endpoints: Endpoints) -> Self {
        Self {
            server: server.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            endpoints,
            user_agent: format!("checkrun/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("checkrun").join("config.json"))
}

/// Load the config file. An explicit path must exist; the default location
/// is used only when present.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(FileConfig::default()),
        },
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parse config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(cfg)
}
