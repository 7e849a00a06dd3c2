//! Single-slot ownership of a controller's live push stream.

use crate::model::RunId;
use tokio::task::JoinHandle;

/// A running subscriber task. Dropping the handle aborts the task, which
/// drops the connection with it.
pub(crate) struct StreamHandle {
    run_id: RunId,
    generation: u64,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub(crate) fn new(run_id: RunId, generation: u64, task: JoinHandle<()>) -> Self {
        Self {
            run_id,
            generation,
            task,
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Holds at most one stream; installing a new one always closes the old one
/// first.
#[derive(Default)]
pub(crate) struct StreamSlot {
    current: Option<StreamHandle>,
}

impl StreamSlot {
    pub(crate) fn replace(&mut self, next: StreamHandle) {
        if let Some(prev) = self.close() {
            tracing::debug!(run_id = %prev, "closed previous stream before opening a new one");
        }
        self.current = Some(next);
    }

    /// Close the occupant, if any, and return its run id.
    pub(crate) fn close(&mut self) -> Option<RunId> {
        self.current.take().map(|h| h.run_id.clone())
    }

    pub(crate) fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Whether messages tagged with `generation` come from the open stream.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|h| h.generation == generation)
    }

    #[cfg(test)]
    pub(crate) fn run_id(&self) -> Option<&RunId> {
        self.current.as_ref().map(|h| &h.run_id)
    }
}
