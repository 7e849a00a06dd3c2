use crate::orchestrator::{export_board_json, timestamped_export_path};
use crate::reconcile::Board;
use anyhow::Result;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Save the board to a timestamped file in the current directory.
pub fn save_board(board: &Board) -> Result<std::path::PathBuf> {
    let path = timestamped_export_path()?;
    export_board_json(&path, board)?;
    Ok(path)
}

/// Save the board and update state.info with the saved path message.
pub fn save_and_show_path(state: &mut UiState) {
    match save_board(&state.board) {
        Ok(path) => {
            state.info = format!("Saved: {}", path.display());
            state.last_exported_path = Some(path.display().to_string());
        }
        Err(e) => {
            state.info = format!("Save failed: {e:#}");
        }
    }
}

/// Initialize the clipboard manager thread if not already initialized.
/// Operations run sequentially, and each clipboard instance stays alive for a
/// while so Linux clipboard managers can read it.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue text for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
