//! Result panels: the keyed, ordered state that cards and run headers live in.
//!
//! A `Panel` is one controller's result collection. Its visual order is a
//! list of entry references; card and header contents live in maps keyed by
//! `CardKey` / `RunId`, so replacing a card never moves or duplicates it.

pub mod card;
pub mod header;

pub use card::{Artifact, Card, CardKey, CardStatus};
pub use header::RunHeader;

use crate::model::{RunId, RunKind, StreamEvent};
use crate::orchestrator::{AppEvent, TriggerState};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Header(RunId),
    Card(CardKey),
    /// Synthetic error shown when a submission fails.
    Notice(String),
}

/// What an applied stream event touched.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Header(RunId),
    Card(CardKey),
}

#[derive(Debug, Clone)]
pub struct Panel {
    pub kind: RunKind,
    pub trigger: TriggerState,
    entries: Vec<Entry>,
    cards: HashMap<CardKey, Card>,
    headers: HashMap<RunId, RunHeader>,
}

impl Panel {
    pub fn new(kind: RunKind) -> Self {
        Self {
            kind,
            trigger: TriggerState::Ready,
            entries: Vec::new(),
            cards: HashMap::new(),
            headers: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cards.clear();
        self.headers.clear();
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn card(&self, key: &CardKey) -> Option<&Card> {
        self.cards.get(key)
    }

    pub fn header(&self, run_id: &RunId) -> Option<&RunHeader> {
        self.headers.get(run_id)
    }

    /// Cards in visual order.
    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Card(k) => self.cards.get(k),
            _ => None,
        })
    }

    pub fn headers(&self) -> impl Iterator<Item = &RunHeader> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Header(id) => self.headers.get(id),
            _ => None,
        })
    }

    pub fn push_notice(&mut self, message: impl Into<String>) {
        self.entries.push(Entry::Notice(message.into()));
    }

    fn upsert_header(&mut self, header: RunHeader) {
        let id = header.run_id.clone();
        if self.headers.insert(id.clone(), header).is_none() {
            self.entries.insert(0, Entry::Header(id));
        }
    }

    /// Insert or replace a card. A new key is appended; an existing key keeps
    /// its position.
    fn upsert_card(&mut self, card: Card) -> CardKey {
        let key = card.key.clone();
        if self.cards.insert(key.clone(), card).is_none() {
            self.entries.push(Entry::Card(key.clone()));
        }
        key
    }

    /// Route one stream event of this panel's kind.
    pub fn apply(&mut self, ev: &StreamEvent) -> Option<Change> {
        if !ev.belongs_to(self.kind) {
            return None;
        }
        match ev {
            StreamEvent::RunStarted(s) | StreamEvent::DnsRunStarted(s) => {
                self.upsert_header(RunHeader::from_started(self.kind, s));
                Some(Change::Header(s.run_id.clone()))
            }
            StreamEvent::RunFinished(f) | StreamEvent::DnsRunFinished(f) => {
                match self.headers.get_mut(&f.run_id) {
                    Some(h) => h.finish(f.totals),
                    None => self.upsert_header(RunHeader::from_finished(self.kind, f)),
                }
                Some(Change::Header(f.run_id.clone()))
            }
            _ => {
                let run_id = ev.run_id()?;
                let subject = ev.subject()?;
                let key = CardKey::new(run_id, subject);
                let card = card::reconcile(self.cards.get(&key), ev)?;
                if card.out_of_order {
                    tracing::debug!(key = key.as_str(), "finish without start, appending card");
                }
                Some(Change::Card(self.upsert_card(card)))
            }
        }
    }
}

/// Both result panels, kept in sync with controller output.
#[derive(Debug, Clone)]
pub struct Board {
    pub generic: Panel,
    pub dns: Panel,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            generic: Panel::new(RunKind::Generic),
            dns: Panel::new(RunKind::Dns),
        }
    }
}

impl Board {
    pub fn panel(&self, kind: RunKind) -> &Panel {
        match kind {
            RunKind::Generic => &self.generic,
            RunKind::Dns => &self.dns,
        }
    }

    pub fn panel_mut(&mut self, kind: RunKind) -> &mut Panel {
        match kind {
            RunKind::Generic => &mut self.generic,
            RunKind::Dns => &mut self.dns,
        }
    }

    /// Project one controller event onto the board.
    pub fn apply(&mut self, ev: &AppEvent) -> Option<Change> {
        match ev {
            AppEvent::Cleared { kind } => {
                self.panel_mut(*kind).clear();
                None
            }
            AppEvent::Trigger { kind, state } => {
                self.panel_mut(*kind).trigger = *state;
                None
            }
            AppEvent::SubmissionFailed { kind, message }
            | AppEvent::StreamLost { kind, message } => {
                self.panel_mut(*kind).push_notice(message.clone());
                None
            }
            AppEvent::Stream { kind, event } => self.panel_mut(*kind).apply(event),
            AppEvent::Info(_) => None,
        }
    }

    /// Cards and headers in panel order, for JSON export.
    pub fn snapshot(&self) -> serde_json::Value {
        let panel = |p: &Panel| {
            serde_json::json!({
                "kind": p.kind,
                "headers": p.headers().map(|h| serde_json::json!({
                    "run_id": h.run_id,
                    "title": h.title(),
                    "status": h.status_text(),
                    "detail": h,
                })).collect::<Vec<_>>(),
                "cards": p.cards().collect::<Vec<_>>(),
                "notices": p.entries().iter().filter_map(|e| match e {
                    Entry::Notice(m) => Some(m.clone()),
                    _ => None,
                }).collect::<Vec<_>>(),
            })
        };
        serde_json::json!({
            "generic": panel(&self.generic),
            "dns": panel(&self.dns),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(json: &str) -> StreamEvent {
        StreamEvent::decode(json).unwrap()
    }

    fn subjects(p: &Panel) -> Vec<&str> {
        p.cards().map(|c| c.subject.as_str()).collect()
    }

    #[test]
    fn start_then_finish_leaves_one_finished_card_in_place() {
        let mut p = Panel::new(RunKind::Generic);
        p.apply(&ev(r#"{"type":"run_started","run_id":"r1"}"#));
        p.apply(&ev(r#"{"type":"check_started","run_id":"r1","url":"https://a.test"}"#));
        p.apply(&ev(r#"{"type":"check_started","run_id":"r1","url":"https://b.test"}"#));
        p.apply(&ev(
            r#"{"type":"check_finished","run_id":"r1","url":"https://a.test","result":"success"}"#,
        ));

        assert_eq!(subjects(&p), vec!["https://a.test", "https://b.test"]);
        let first = p.cards().next().unwrap();
        assert_eq!(first.status, CardStatus::Ok);
        assert!(!first.out_of_order);
        assert_eq!(p.cards().filter(|c| c.subject == "https://a.test").count(), 1);
    }

    #[test]
    fn finish_without_start_appends_one_card() {
        let mut p = Panel::new(RunKind::Generic);
        p.apply(&ev(r#"{"type":"check_started","run_id":"r1","url":"x"}"#));
        let change = p.apply(&ev(
            r#"{"type":"check_finished","run_id":"r1","url":"y","result":"timeout"}"#,
        ));
        assert!(matches!(change, Some(Change::Card(_))));
        assert_eq!(subjects(&p), vec!["x", "y"]);
        assert!(p.cards().last().unwrap().out_of_order);
    }

    #[test]
    fn repeated_events_for_one_subject_never_duplicate() {
        let mut p = Panel::new(RunKind::Dns);
        for _ in 0..3 {
            p.apply(&ev(r#"{"type":"dns_check_started","run_id":"d1","domain":"a.test"}"#));
            p.apply(&ev(
                r#"{"type":"dns_check_finished","run_id":"d1","domain":"a.test","ips":["1.1.1.1"]}"#,
            ));
        }
        assert_eq!(p.cards().count(), 1);
        assert_eq!(p.entries().len(), 1);
    }

    #[test]
    fn headers_go_to_the_front_and_take_totals() {
        let mut p = Panel::new(RunKind::Generic);
        p.apply(&ev(r#"{"type":"check_started","run_id":"r1","url":"x"}"#));
        p.apply(&ev(r#"{"type":"run_started","run_id":"r1"}"#));
        assert_eq!(p.entries()[0], Entry::Header(RunId::new("r1")));

        p.apply(&ev(
            r#"{"type":"run_finished","run_id":"r1","totals":{"ok":1,"err":0,"time_ms":1500}}"#,
        ));
        let h = p.header(&RunId::new("r1")).unwrap();
        assert_eq!(h.status_text(), "(Finished in 1.5s. OK: 1, Err: 0)");
        assert_eq!(p.headers().count(), 1);
    }

    #[test]
    fn terminal_event_without_header_inserts_one() {
        let mut p = Panel::new(RunKind::Dns);
        p.apply(&ev(r#"{"type":"dns_run_finished","run_id":"d2"}"#));
        assert_eq!(p.entries(), &[Entry::Header(RunId::new("d2"))]);
        assert_eq!(p.headers().next().unwrap().status_text(), "(Finished)");
    }

    #[test]
    fn foreign_kind_events_are_ignored() {
        let mut p = Panel::new(RunKind::Generic);
        assert!(p
            .apply(&ev(r#"{"type":"dns_check_started","run_id":"d1","domain":"a.test"}"#))
            .is_none());
        assert!(p.apply(&StreamEvent::Unrecognized).is_none());
        assert!(p.entries().is_empty());
    }

    #[test]
    fn board_clears_and_records_notices_per_panel() {
        let mut b = Board::default();
        b.apply(&AppEvent::Stream {
            kind: RunKind::Generic,
            event: ev(r#"{"type":"check_started","run_id":"r1","url":"x"}"#),
        });
        b.apply(&AppEvent::Stream {
            kind: RunKind::Dns,
            event: ev(r#"{"type":"dns_check_started","run_id":"d1","domain":"a.test"}"#),
        });
        b.apply(&AppEvent::Cleared {
            kind: RunKind::Generic,
        });
        b.apply(&AppEvent::SubmissionFailed {
            kind: RunKind::Generic,
            message: "Network error submitting run.".into(),
        });

        assert_eq!(b.generic.cards().count(), 0);
        assert_eq!(
            b.generic.entries(),
            &[Entry::Notice("Network error submitting run.".into())]
        );
        assert_eq!(b.dns.cards().count(), 1);

        let snap = b.snapshot();
        assert_eq!(snap["dns"]["cards"][0]["subject"], "a.test");
        assert_eq!(snap["generic"]["notices"][0], "Network error submitting run.");
    }
}
