//! Server-side log clearing.

use super::CheckClient;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

#[derive(Deserialize)]
struct ClearFailure {
    message: Option<String>,
}

pub async fn clear_logs(client: &CheckClient) -> Result<()> {
    let url = client.url(&client.endpoints().clear_logs)?;
    tracing::info!(%url, "clearing server logs");
    let resp = client
        .http
        .post(url)
        .timeout(client.request_timeout())
        .send()
        .await
        .context("Network error while trying to clear logs")?;
    if resp.status().is_success() {
        return Ok(());
    }
    let message = resp
        .json::<ClearFailure>()
        .await
        .ok()
        .and_then(|f| f.message)
        .unwrap_or_else(|| "Unknown error".into());
    Err(anyhow!("Error clearing logs: {message}"))
}
