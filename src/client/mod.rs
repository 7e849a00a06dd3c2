//! HTTP access to the check server.
//!
//! `CheckClient` composes endpoint URLs from the configured server and paths;
//! the submodules implement one collaborator each.

pub mod geo;
pub mod logs;
pub mod stream;
pub mod submit;

use crate::config::{ClientConfig, Endpoints};
use crate::model::{RunId, RunKind};
use anyhow::{Context, Result};
use reqwest::Url;
use std::time::Duration;

#[derive(Clone)]
pub struct CheckClient {
    pub(crate) http: reqwest::Client,
    base: Url,
    endpoints: Endpoints,
    request_timeout: Duration,
}

impl CheckClient {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        let base = Url::parse(&cfg.server)
            .with_context(|| format!("invalid server url {:?}", cfg.server))?;
        // No client-wide timeout: it would also cut push streams, which stay
        // open for the whole run.
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base,
            endpoints: cfg.endpoints.clone(),
            request_timeout: cfg.request_timeout,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Resolve a configured path (absolute or relative) against the server.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid endpoint path {path:?}"))
    }

    pub fn submit_url(&self, kind: RunKind) -> Result<Url> {
        self.url(self.endpoints.submit_path(kind))
    }

    /// Push-stream address: the configured base with the run id appended.
    pub fn events_url(&self, kind: RunKind, run_id: &RunId) -> Result<Url> {
        self.url(&format!("{}{}", self.endpoints.events_base(kind), run_id))
    }

    /// Absolute link to a server-side artifact (screenshot or whois dump).
    pub fn artifact_url(&self, relative: &str) -> String {
        artifact_url(&self.base, &self.endpoints.artifacts, relative)
    }
}

pub fn artifact_url(base: &Url, artifacts: &str, relative: &str) -> String {
    let path = format!("{}{}", artifacts, relative.trim_start_matches('/'));
    match base.join(&path) {
        Ok(u) => u.to_string(),
        Err(_) => path,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &str) -> CheckClient {
        CheckClient::new(&ClientConfig::new(server, Endpoints::default())).unwrap()
    }

    #[test]
    fn events_url_appends_run_id_to_base() {
        let c = client("http://checks.local:5000");
        let u = c.events_url(RunKind::Generic, &RunId::new("ab12cd")).unwrap();
        assert_eq!(u.as_str(), "http://checks.local:5000/events/ab12cd");
    }

    #[test]
    fn artifact_links_join_relative_paths() {
        let c = client("http://checks.local");
        assert_eq!(
            c.artifact_url("2025-10-26/img.png"),
            "http://checks.local/logs/2025-10-26/img.png"
        );
    }

    #[test]
    fn rejects_unparseable_server() {
        assert!(CheckClient::new(&ClientConfig::new("not a url", Endpoints::default())).is_err());
    }
}
