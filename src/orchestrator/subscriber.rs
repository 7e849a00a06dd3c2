//! Push-stream subscriber: reads one run's stream and forwards the events
//! of its own kind to the controller loop.

use super::controller::Internal;
use super::slot::StreamHandle;
use crate::client::stream::{open_stream, StreamError};
use crate::client::CheckClient;
use crate::model::{RunId, RunKind, StreamEvent};
use tokio::sync::mpsc::UnboundedSender;

pub(crate) fn spawn_subscriber(
    client: CheckClient,
    kind: RunKind,
    run_id: RunId,
    generation: u64,
    tx: UnboundedSender<Internal>,
) -> StreamHandle {
    let task_run_id = run_id.clone();
    let task = tokio::spawn(async move {
        if let Err(error) = subscribe(&client, kind, &task_run_id, generation, &tx).await {
            let _ = tx.send(Internal::StreamFailed {
                kind,
                generation,
                error,
            });
        }
    });
    StreamHandle::new(run_id, generation, task)
}

/// Returns `Ok` only after forwarding the run's terminal event.
async fn subscribe(
    client: &CheckClient,
    kind: RunKind,
    run_id: &RunId,
    generation: u64,
    tx: &UnboundedSender<Internal>,
) -> Result<(), StreamError> {
    let mut stream = open_stream(client, kind, run_id).await?;
    tracing::info!(%run_id, ?kind, "event stream open");
    loop {
        let data = stream.next_message().await?;
        let event = match StreamEvent::decode(&data) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::warn!(%run_id, error = %e, "skipping malformed event");
                continue;
            }
        };
        if !event.belongs_to(kind) {
            tracing::trace!(%run_id, event = event.type_name(), "ignoring event outside vocabulary");
            continue;
        }
        let terminal = event.is_terminal();
        if tx
            .send(Internal::Stream {
                kind,
                generation,
                event,
            })
            .is_err()
        {
            return Ok(());
        }
        if terminal {
            return Ok(());
        }
    }
}
