//! Post-run processing utilities.
//!
//! Runs after a terminal event reaches a presentation layer: writes the
//! requested exports and reports what happened.

use crate::reconcile::Board;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub export_messages: Vec<String>,
}

/// Write the board as pretty JSON.
pub(crate) fn export_board_json(path: &Path, board: &Board) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(&board.snapshot()).context("serialize board")?;
    std::fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Default export file name in the current directory.
#[cfg_attr(not(feature = "tui"), allow(dead_code))]
pub(crate) fn timestamped_export_path() -> Result<PathBuf> {
    let stamp = time::OffsetDateTime::now_local()
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc())
        .format(time::macros::format_description!(
            "[year]-[month]-[day]_[hour]-[minute]-[second]"
        ))
        .unwrap_or_else(|_| "now".into());
    let current_dir = std::env::current_dir().context("get current directory")?;
    Ok(current_dir.join(format!("checkrun-{stamp}.json")))
}

/// Process a finished run: refresh the configured export, if any.
pub(crate) fn process_run_completion(export_json: Option<&Path>, board: &Board) -> ProcessedRun {
    let mut export_messages = Vec::new();
    if let Some(path) = export_json {
        match export_board_json(path, board) {
            Ok(()) => export_messages.push(format!("Exported JSON: {}", path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }
    ProcessedRun { export_messages }
}
