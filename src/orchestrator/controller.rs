//! Run lifecycle controller.
//!
//! One loop owns both per-kind controllers. Network work (submissions,
//! push streams) runs in spawned tasks that only report back here, so all
//! state changes happen in order on this loop.

use super::slot::StreamSlot;
use super::subscriber::spawn_subscriber;
use crate::client::stream::StreamError;
use crate::client::submit::{submit_run, SubmissionError};
use crate::client::CheckClient;
use crate::model::{CheckForm, Run, RunId, RunKind, RunState, StreamEvent};
use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Start a run of this kind, superseding any active one.
    Submit(RunKind),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    Ready,
    Busy,
}

impl TriggerState {
    pub fn label(self, kind: RunKind) -> &'static str {
        match self {
            TriggerState::Ready => kind.ready_label(),
            TriggerState::Busy => kind.busy_label(),
        }
    }
}

/// Events for presentation layers.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The kind's result collection was reset for a new submission.
    Cleared { kind: RunKind },
    Trigger { kind: RunKind, state: TriggerState },
    Stream { kind: RunKind, event: StreamEvent },
    SubmissionFailed { kind: RunKind, message: String },
    /// The push stream ended before a terminal event.
    StreamLost { kind: RunKind, message: String },
    Info(String),
}

/// Completions reported back to the loop by spawned tasks.
pub(crate) enum Internal {
    Submitted {
        kind: RunKind,
        generation: u64,
        result: Result<RunId, SubmissionError>,
    },
    Stream {
        kind: RunKind,
        generation: u64,
        event: StreamEvent,
    },
    StreamFailed {
        kind: RunKind,
        generation: u64,
        error: StreamError,
    },
}

/// Submission forms; a kind without a form cannot be started.
#[derive(Debug, Clone, Default)]
pub(crate) struct Forms {
    pub generic: Option<CheckForm>,
    pub dns: Option<CheckForm>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ControllerOptions {
    /// Submit every kind that has a form as soon as the loop starts.
    pub submit_on_launch: bool,
    /// Return once every submitted controller is idle again.
    pub exit_when_idle: bool,
}

#[derive(Debug)]
struct Trigger {
    state: TriggerState,
}

impl Trigger {
    /// Returns true when the state changed.
    fn engage(&mut self) -> bool {
        let changed = self.state != TriggerState::Busy;
        self.state = TriggerState::Busy;
        changed
    }

    /// Returns true when the state changed; releasing twice is a no-op.
    fn release(&mut self) -> bool {
        let changed = self.state != TriggerState::Ready;
        self.state = TriggerState::Ready;
        changed
    }
}

struct RunController {
    kind: RunKind,
    form: Option<CheckForm>,
    trigger: Trigger,
    generation: u64,
    pending: Option<AbortHandle>,
    slot: StreamSlot,
    run: Option<Run>,
    used: bool,
}

impl RunController {
    fn new(kind: RunKind, form: Option<CheckForm>) -> Self {
        Self {
            kind,
            form,
            trigger: Trigger {
                state: TriggerState::Ready,
            },
            generation: 0,
            pending: None,
            slot: StreamSlot::default(),
            run: None,
            used: false,
        }
    }

    fn is_idle(&self) -> bool {
        self.trigger.state == TriggerState::Ready && self.pending.is_none() && !self.slot.is_open()
    }

    fn set_trigger(&mut self, state: TriggerState, events: &UnboundedSender<AppEvent>) {
        let changed = match state {
            TriggerState::Busy => self.trigger.engage(),
            TriggerState::Ready => self.trigger.release(),
        };
        if changed {
            let _ = events.send(AppEvent::Trigger {
                kind: self.kind,
                state,
            });
        }
    }

    fn submit(
        &mut self,
        client: &CheckClient,
        internal: &UnboundedSender<Internal>,
        events: &UnboundedSender<AppEvent>,
    ) {
        let Some(form) = self.form.clone() else {
            let _ = events.send(AppEvent::Info(format!(
                "No {} configured; nothing to submit.",
                self.kind.title()
            )));
            return;
        };
        self.generation += 1;
        self.used = true;
        self.set_trigger(TriggerState::Busy, events);
        let _ = events.send(AppEvent::Cleared { kind: self.kind });
        if let Some(prev) = self.slot.close() {
            tracing::info!(run_id = %prev, kind = ?self.kind, "superseded by a new submission");
        }
        if let Some(prev) = self.pending.take() {
            prev.abort();
        }
        self.run = None;

        let kind = self.kind;
        let generation = self.generation;
        let client = client.clone();
        let tx = internal.clone();
        let task = tokio::spawn(async move {
            let result = submit_run(&client, kind, &form).await;
            let _ = tx.send(Internal::Submitted {
                kind,
                generation,
                result,
            });
        });
        self.pending = Some(task.abort_handle());
    }

    fn on_submitted(
        &mut self,
        generation: u64,
        result: Result<RunId, SubmissionError>,
        client: &CheckClient,
        internal: &UnboundedSender<Internal>,
        events: &UnboundedSender<AppEvent>,
    ) {
        if generation != self.generation {
            tracing::debug!(kind = ?self.kind, generation, "dropping stale submission result");
            return;
        }
        self.pending = None;
        match result {
            Ok(run_id) => {
                tracing::info!(%run_id, kind = ?self.kind, "run accepted");
                self.run = Some(Run::new(run_id.clone(), self.kind));
                let handle = spawn_subscriber(
                    client.clone(),
                    self.kind,
                    run_id,
                    generation,
                    internal.clone(),
                );
                self.slot.replace(handle);
            }
            Err(e) => {
                tracing::warn!(kind = ?self.kind, error = %e, "submission failed");
                let _ = events.send(AppEvent::SubmissionFailed {
                    kind: self.kind,
                    message: e.to_string(),
                });
                self.set_trigger(TriggerState::Ready, events);
            }
        }
    }

    fn on_stream_event(
        &mut self,
        generation: u64,
        event: StreamEvent,
        events: &UnboundedSender<AppEvent>,
    ) {
        if !self.slot.is_current(generation) {
            tracing::debug!(
                kind = ?self.kind,
                event = event.type_name(),
                "dropping event from a closed stream"
            );
            return;
        }
        let terminal = event.is_terminal();
        if let Some(run) = self.run.as_mut() {
            match &event {
                StreamEvent::RunFinished(f) | StreamEvent::DnsRunFinished(f) => {
                    run.state = RunState::Finished;
                    run.totals = f.totals;
                }
                _ => run.state = RunState::Running,
            }
        }
        let _ = events.send(AppEvent::Stream {
            kind: self.kind,
            event,
        });
        if terminal {
            self.slot.close();
            if let Some(run) = self.run.as_ref() {
                tracing::info!(
                    run_id = %run.id,
                    kind = ?run.kind,
                    state = ?run.state,
                    ok = run.totals.map(|t| t.ok),
                    err = run.totals.map(|t| t.err),
                    "run finished, stream closed"
                );
            }
            self.set_trigger(TriggerState::Ready, events);
        }
    }

    fn on_stream_failed(
        &mut self,
        generation: u64,
        error: StreamError,
        events: &UnboundedSender<AppEvent>,
    ) {
        if !self.slot.is_current(generation) {
            tracing::debug!(kind = ?self.kind, error = %error, "ignoring failure of a closed stream");
            return;
        }
        let run_id = self.slot.close();
        tracing::warn!(run_id = ?run_id.as_ref().map(RunId::as_str), kind = ?self.kind, error = %error, "event stream failed");
        self.run = None;
        let _ = events.send(AppEvent::StreamLost {
            kind: self.kind,
            message: format!("{error}. Resubmit to start a new run."),
        });
        self.set_trigger(TriggerState::Ready, events);
    }

    fn shutdown(&mut self) {
        self.slot.close();
        if let Some(p) = self.pending.take() {
            p.abort();
        }
    }
}

struct Controllers {
    generic: RunController,
    dns: RunController,
}

impl Controllers {
    fn get_mut(&mut self, kind: RunKind) -> &mut RunController {
        match kind {
            RunKind::Generic => &mut self.generic,
            RunKind::Dns => &mut self.dns,
        }
    }

    fn all_idle(&self) -> bool {
        self.generic.is_idle() && self.dns.is_idle()
    }

    fn any_used(&self) -> bool {
        self.generic.used || self.dns.used
    }

    fn handle(
        &mut self,
        msg: Internal,
        client: &CheckClient,
        internal: &UnboundedSender<Internal>,
        events: &UnboundedSender<AppEvent>,
    ) {
        match msg {
            Internal::Submitted {
                kind,
                generation,
                result,
            } => self
                .get_mut(kind)
                .on_submitted(generation, result, client, internal, events),
            Internal::Stream {
                kind,
                generation,
                event,
            } => self.get_mut(kind).on_stream_event(generation, event, events),
            Internal::StreamFailed {
                kind,
                generation,
                error,
            } => self.get_mut(kind).on_stream_failed(generation, error, events),
        }
    }

    fn shutdown(&mut self) {
        self.generic.shutdown();
        self.dns.shutdown();
    }
}

/// Drive both run kinds until quit (or, headless, until everything started
/// has finished).
pub(crate) async fn run_controller(
    client: CheckClient,
    forms: Forms,
    opts: ControllerOptions,
    event_tx: UnboundedSender<AppEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let (int_tx, mut int_rx) = mpsc::unbounded_channel::<Internal>();
    let mut ctl = Controllers {
        generic: RunController::new(RunKind::Generic, forms.generic),
        dns: RunController::new(RunKind::Dns, forms.dns),
    };

    if opts.submit_on_launch {
        for kind in RunKind::ALL {
            let c = ctl.get_mut(kind);
            if c.form.is_some() {
                c.submit(&client, &int_tx, &event_tx);
            }
        }
    }
    let mut commands_open = true;

    loop {
        if opts.exit_when_idle && ctl.all_idle() && (ctl.any_used() || !commands_open) {
            break;
        }
        tokio::select! {
            cmd = cmd_rx.recv(), if commands_open => {
                match cmd {
                    Some(UiCommand::Submit(kind)) => {
                        ctl.get_mut(kind).submit(&client, &int_tx, &event_tx);
                    }
                    Some(UiCommand::Quit) => break,
                    None => {
                        commands_open = false;
                        if !opts.exit_when_idle {
                            break;
                        }
                    }
                }
            }
            Some(msg) = int_rx.recv() => {
                ctl.handle(msg, &client, &int_tx, &event_tx);
            }
        }
    }

    ctl.shutdown();
    Ok(())
}
