//! Push-stream transport: one long-lived GET per run, framed as
//! server-sent events.

use super::CheckClient;
use crate::model::{RunId, RunKind};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("event stream failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("event stream rejected with HTTP {0}")]
    Status(u16),
    #[error("event stream closed before the run finished")]
    Closed,
    #[error("invalid event stream address: {0}")]
    Endpoint(String),
}

/// Incremental `text/event-stream` framing.
///
/// Feed raw chunks in; complete `data` payloads come out. Chunk boundaries
/// may fall anywhere, including inside a UTF-8 sequence or a CRLF pair.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
    ready: VecDeque<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        while let Some(nl) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=nl).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.line(&String::from_utf8_lossy(&line));
        }
    }

    fn line(&mut self, line: &str) {
        if line.is_empty() {
            if !self.data.is_empty() {
                self.ready.push_back(self.data.join("\n"));
                self.data.clear();
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
    }

    pub fn next_message(&mut self) -> Option<String> {
        self.ready.pop_front()
    }
}

/// An open push stream scoped to one run id. Dropping it closes the
/// connection.
pub struct EventStream {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
}

impl EventStream {
    /// Next complete `data` payload. `Err(Closed)` when the server ends the
    /// stream; the caller decides whether that was expected.
    pub async fn next_message(&mut self) -> Result<String, StreamError> {
        loop {
            if let Some(msg) = self.decoder.next_message() {
                return Ok(msg);
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.decoder.push(&chunk),
                Some(Err(e)) => return Err(StreamError::Transport(e)),
                None => return Err(StreamError::Closed),
            }
        }
    }
}

pub async fn open_stream(
    client: &CheckClient,
    kind: RunKind,
    run_id: &RunId,
) -> Result<EventStream, StreamError> {
    let url = client
        .events_url(kind, run_id)
        .map_err(|e| StreamError::Endpoint(format!("{e:#}")))?;
    tracing::debug!(%url, "opening event stream");
    let resp = client
        .http
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(StreamError::Transport)?;
    if !resp.status().is_success() {
        return Err(StreamError::Status(resp.status().as_u16()));
    }
    Ok(EventStream {
        body: resp.bytes_stream().boxed(),
        decoder: SseDecoder::default(),
    })
}
