//! Run submission: post the form, get a run id back.

use super::CheckClient;
use crate::model::{CheckForm, RunId, RunKind};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The request never produced a response.
    #[error("Network error submitting run.")]
    Transport(#[source] reqwest::Error),
    #[error("Error: {message} ({status})")]
    Rejected { status: u16, message: String },
    /// A success response without a usable run id.
    #[error("Error: invalid submission response: {0}")]
    Decode(String),
    #[error("Error: {0}")]
    Endpoint(String),
}

#[derive(Deserialize)]
struct Accepted {
    run_id: Option<String>,
}

#[derive(Deserialize)]
struct Rejection {
    error: Option<String>,
}

/// Best-effort message from a failure body: structured `error` first, raw
/// text when the body is not JSON.
fn rejection_message(body: &str) -> String {
    match serde_json::from_str::<Rejection>(body) {
        Ok(r) => r.error.unwrap_or_else(|| "Unknown error".into()),
        Err(_) => body.trim().to_string(),
    }
}

pub async fn submit_run(
    client: &CheckClient,
    kind: RunKind,
    form: &CheckForm,
) -> Result<RunId, SubmissionError> {
    let url = client
        .submit_url(kind)
        .map_err(|e| SubmissionError::Endpoint(format!("{e:#}")))?;
    tracing::info!(%url, ?kind, "submitting run");

    let resp = client
        .http
        .post(url)
        .timeout(client.request_timeout())
        .form(form.fields())
        .send()
        .await
        .map_err(SubmissionError::Transport)?;

    let status = resp.status();
    let body = resp.text().await.map_err(SubmissionError::Transport)?;

    if !status.is_success() {
        return Err(SubmissionError::Rejected {
            status: status.as_u16(),
            message: rejection_message(&body),
        });
    }

    let accepted: Accepted =
        serde_json::from_str(&body).map_err(|e| SubmissionError::Decode(e.to_string()))?;
    match accepted.run_id.filter(|id| !id.is_empty()) {
        Some(id) => Ok(RunId::new(id)),
        None => Err(SubmissionError::Decode("missing run_id".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_server::{self, Reply};
    use crate::config::{ClientConfig, Endpoints};

    fn client(server: &str) -> CheckClient {
        CheckClient::new(&ClientConfig::new(server, Endpoints::default())).unwrap()
    }

    fn form() -> CheckForm {
        let mut f = CheckForm::default();
        f.push("urls", "https://a.test\nhttps://b.test");
        f.push("country", "us");
        f
    }

    #[tokio::test]
    async fn accepted_response_yields_run_id() {
        let server = test_server::spawn(|req| {
            assert_eq!(req.method, "POST");
            assert_eq!(req.path, "/run");
            assert!(req.body.contains("country=us"));
            Reply::Json(202, r#"{"run_id":"abc123"}"#.into())
        })
        .await;
        let id = submit_run(&client(&server), RunKind::Generic, &form())
            .await
            .unwrap();
        assert_eq!(id, RunId::new("abc123"));
    }

    #[tokio::test]
    async fn dns_kind_posts_to_its_own_endpoint() {
        let server = test_server::spawn(|req| {
            if req.path == "/dns/run" {
                Reply::Json(202, r#"{"run_id":"d1"}"#.into())
            } else {
                Reply::Text(404, "not found".into())
            }
        })
        .await;
        let id = submit_run(&client(&server), RunKind::Dns, &form())
            .await
            .unwrap();
        assert_eq!(id.as_str(), "d1");
    }

    #[tokio::test]
    async fn structured_error_is_used_when_present() {
        let server =
            test_server::spawn(|_| Reply::Json(422, r#"{"error":"Country is required"}"#.into()))
                .await;
        let err = submit_run(&client(&server), RunKind::Generic, &form())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Error: Country is required (422)");
    }

    #[tokio::test]
    async fn raw_text_is_the_fallback_message() {
        let server = test_server::spawn(|_| Reply::Text(400, "No URLs provided".into())).await;
        let err = submit_run(&client(&server), RunKind::Generic, &form())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Error: No URLs provided (400)");
    }

    #[tokio::test]
    async fn non_success_is_a_failure_even_with_a_run_id_body() {
        let server =
            test_server::spawn(|_| Reply::Json(500, r#"{"run_id":"abc"}"#.into())).await;
        let err = submit_run(&client(&server), RunKind::Generic, &form())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::Rejected { status: 500, ref message } if message == "Unknown error"
        ));
    }

    #[tokio::test]
    async fn success_without_run_id_is_a_decode_error() {
        let server = test_server::spawn(|_| Reply::Json(202, r#"{"ok":true}"#.into())).await;
        let err = submit_run(&client(&server), RunKind::Generic, &form())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = submit_run(&client(&format!("http://{addr}")), RunKind::Generic, &form())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Transport(_)));
        assert_eq!(err.to_string(), "Network error submitting run.");
    }
}
