use crate::model::RunKind;
use crate::orchestrator::AppEvent;
use crate::reconcile::{Board, Card, Entry, Panel};

/// Tabs in display order; the last one is the help screen.
pub const TABS: [&str; 3] = ["URL checks", "DNS checks", "Help"];

#[derive(Default)]
pub struct UiState {
    pub tab: usize,
    pub board: Board,
    pub info: String,
    /// Index into the current panel's cards.
    pub selected: usize,
    pub last_exported_path: Option<String>,
}

impl UiState {
    /// The run kind shown on the current tab, if it is a results tab.
    pub fn kind(&self) -> Option<RunKind> {
        match self.tab {
            0 => Some(RunKind::Generic),
            1 => Some(RunKind::Dns),
            _ => None,
        }
    }

    pub fn panel(&self) -> Option<&Panel> {
        self.kind().map(|k| self.board.panel(k))
    }

    pub fn show_kind(&mut self, kind: RunKind) {
        self.tab = match kind {
            RunKind::Generic => 0,
            RunKind::Dns => 1,
        };
        self.selected = 0;
    }

    pub fn next_tab(&mut self) {
        self.tab = (self.tab + 1) % TABS.len();
        self.selected = 0;
    }

    pub fn selected_card(&self) -> Option<&Card> {
        self.panel()?.cards().nth(self.selected)
    }

    pub fn move_selection(&mut self, delta: isize) {
        let count = self.panel().map(|p| p.cards().count()).unwrap_or(0);
        if count == 0 {
            self.selected = 0;
            return;
        }
        self.selected = self
            .selected
            .saturating_add_signed(delta)
            .min(count - 1);
    }

    pub fn apply(&mut self, ev: &AppEvent) {
        self.board.apply(ev);
        match ev {
            AppEvent::Cleared { kind } => {
                if self.kind() == Some(*kind) {
                    self.selected = 0;
                }
            }
            AppEvent::SubmissionFailed { kind, message }
            | AppEvent::StreamLost { kind, message } => {
                self.info = format!("{}: {message}", kind.title());
            }
            AppEvent::Info(msg) => self.info = msg.clone(),
            AppEvent::Trigger { .. } | AppEvent::Stream { .. } => {}
        }
    }

    /// Index of the first rendered line of the selected card, given the
    /// number of lines each entry takes.
    pub fn selected_line(&self, lines_for: impl Fn(&Entry) -> usize) -> usize {
        let Some(panel) = self.panel() else {
            return 0;
        };
        let mut line = 0;
        let mut card_idx = 0;
        for e in panel.entries() {
            if matches!(e, Entry::Card(_)) {
                if card_idx == self.selected {
                    return line;
                }
                card_idx += 1;
            }
            line += lines_for(e);
        }
        line
    }
}
