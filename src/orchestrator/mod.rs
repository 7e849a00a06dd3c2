//! Application-level orchestration.
//!
//! This module owns run lifecycle control (submit, stream, supersede) for both
//! run kinds and post-run processing such as exports. UI/CLI layers talk to it
//! through `UiCommand` and `AppEvent` only.

mod controller;
mod post_process;
mod slot;
mod subscriber;

pub use controller::{AppEvent, TriggerState};
pub(crate) use controller::{run_controller, ControllerOptions, Forms, UiCommand};
pub(crate) use post_process::process_run_completion;
#[cfg(feature = "tui")]
pub(crate) use post_process::{export_board_json, timestamped_export_path};
