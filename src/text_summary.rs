//! Text rendering of cards and run headers for CLI output.

use crate::reconcile::{Artifact, Board, Card, Change, Panel, RunHeader};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// How a card's artifact reads as text. `link` turns a relative artifact
/// path into something the user can open.
pub(crate) fn artifact_text(artifact: &Artifact, link: &dyn Fn(&str) -> String) -> Option<String> {
    match artifact {
        Artifact::Pending | Artifact::None => None,
        Artifact::Screenshot(p) => Some(format!("screenshot: {}", link(p))),
        Artifact::NoScreenshot => Some("(no screenshot)".into()),
        Artifact::Details(p) => Some(format!("details: {}", link(p))),
        Artifact::NoData => Some("(no data)".into()),
    }
}

pub(crate) fn header_line(h: &RunHeader) -> String {
    format!("== {} {}", h.title(), h.status_text())
}

pub(crate) fn card_lines(card: &Card, link: &dyn Fn(&str) -> String) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {}  [{}]",
        card.status.icon(),
        card.subject,
        card.status_text
    )];
    for d in &card.details {
        let mark = if d.flagged { "!" } else { " " };
        lines.push(format!("   {mark} {}", d.text));
    }
    if let Some(a) = artifact_text(&card.artifact, link) {
        lines.push(format!("     {a}"));
    }
    lines
}

/// Lines to print for a change that just landed on a panel. Started cards
/// are skipped; text mode only reports outcomes.
pub(crate) fn change_lines(
    panel: &Panel,
    change: &Change,
    link: &dyn Fn(&str) -> String,
) -> Vec<String> {
    match change {
        Change::Header(id) => panel.header(id).map(header_line).into_iter().collect(),
        Change::Card(key) => match panel.card(key) {
            Some(c) if c.status != crate::reconcile::CardStatus::Running => card_lines(c, link),
            _ => Vec::new(),
        },
    }
}

/// Final per-panel summary once every run has ended.
pub(crate) fn build_text_summary(board: &Board) -> TextSummary {
    let mut lines = Vec::new();
    for panel in [&board.generic, &board.dns] {
        let headers: Vec<&RunHeader> = panel.headers().collect();
        let notices: Vec<&str> = panel
            .entries()
            .iter()
            .filter_map(|e| match e {
                crate::reconcile::Entry::Notice(m) => Some(m.as_str()),
                _ => None,
            })
            .collect();
        if headers.is_empty() && notices.is_empty() && panel.cards().next().is_none() {
            continue;
        }
        lines.push(format!("{}:", panel.kind.title()));
        for h in headers {
            lines.push(format!("  {} {}", h.title(), h.status_text()));
        }
        let total = panel.cards().count();
        let failed = panel
            .cards()
            .filter(|c| c.status == crate::reconcile::CardStatus::Error)
            .count();
        let unfinished = panel
            .cards()
            .filter(|c| c.status == crate::reconcile::CardStatus::Running)
            .count();
        lines.push(format!(
            "  {total} card(s): {} ok, {failed} error, {unfinished} unfinished",
            total - failed - unfinished
        ));
        for n in notices {
            lines.push(format!("  {n}"));
        }
    }
    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunKind, StreamEvent};
    use crate::orchestrator::AppEvent;

    fn apply(board: &mut Board, kind: RunKind, json: &str) -> Option<Change> {
        board.apply(&AppEvent::Stream {
            kind,
            event: StreamEvent::decode(json).unwrap(),
        })
    }

    fn link(p: &str) -> String {
        format!("http://h/logs/{p}")
    }

    #[test]
    fn finished_card_lines_include_flag_and_artifact() {
        let mut b = Board::default();
        let change = apply(
            &mut b,
            RunKind::Dns,
            r#"{"type":"dns_check_finished","run_id":"d1","domain":"a.test","ips":["1.2.3.4"],"owner":"Whois Error","whois_log_path":"x/a.json"}"#,
        )
        .unwrap();
        let lines = change_lines(&b.dns, &change, &link);
        assert_eq!(lines[0], "✅ a.test  [resolved]");
        assert!(lines.contains(&"   ! Owner: Whois Error".to_string()));
        assert_eq!(lines.last().unwrap(), "     details: http://h/logs/x/a.json");
    }

    #[test]
    fn started_cards_print_nothing() {
        let mut b = Board::default();
        let change = apply(
            &mut b,
            RunKind::Generic,
            r#"{"type":"check_started","run_id":"r1","url":"u"}"#,
        )
        .unwrap();
        assert!(change_lines(&b.generic, &change, &link).is_empty());
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut b = Board::default();
        apply(&mut b, RunKind::Generic, r#"{"type":"run_started","run_id":"r1","settings":{"country":"de"}}"#);
        apply(&mut b, RunKind::Generic, r#"{"type":"check_finished","run_id":"r1","url":"a","result":"success"}"#);
        apply(&mut b, RunKind::Generic, r#"{"type":"check_finished","run_id":"r1","url":"b","result":"timeout"}"#);
        apply(&mut b, RunKind::Generic, r#"{"type":"check_started","run_id":"r1","url":"c"}"#);
        apply(
            &mut b,
            RunKind::Generic,
            r#"{"type":"run_finished","run_id":"r1","totals":{"ok":1,"err":1,"time_ms":2000}}"#,
        );
        let s = build_text_summary(&b);
        assert_eq!(
            s.lines,
            vec![
                "URL checks:".to_string(),
                "  Run: r1 (DE, ? URLs) (Finished in 2s. OK: 1, Err: 1)".to_string(),
                "  3 card(s): 1 ok, 1 error, 1 unfinished".to_string(),
            ]
        );
    }
}
