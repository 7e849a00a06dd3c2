//! Card rendering: each check event maps to the card for its subject.

use crate::model::{CheckFinished, DnsCheckFinished, RunId, RunKind, StreamEvent};
use serde::Serialize;
use std::fmt::Write as _;

/// Owner strings the DNS checker uses to report a failed whois lookup.
pub const OWNER_ERROR_SENTINELS: [&str; 2] = ["Whois Error", "Whois Parse Error"];

/// Stable identity of a card: `result-<run>-<subject>`.
///
/// ASCII alphanumerics are kept; every other byte is written as `_xx`, so
/// the key is injective over (run id, subject) and the `-` separators are
/// unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CardKey(String);

impl CardKey {
    pub fn new(run_id: &RunId, subject: &str) -> Self {
        let mut key = String::from("result-");
        escape_into(&mut key, run_id.as_str());
        key.push('-');
        escape_into(&mut key, subject);
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape_into(out: &mut String, raw: &str) {
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() {
            out.push(b as char);
        } else {
            let _ = write!(out, "_{b:02x}");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Running,
    Ok,
    Error,
}

impl CardStatus {
    pub fn icon(self) -> &'static str {
        match self {
            CardStatus::Running => "🔄",
            CardStatus::Ok => "✅",
            CardStatus::Error => "❌",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailLine {
    pub text: String,
    /// Rendered with error emphasis.
    pub flagged: bool,
}

impl DetailLine {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            flagged: false,
        }
    }
}

/// What a card links to. Paths are relative to the artifacts base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum Artifact {
    Pending,
    Screenshot(String),
    NoScreenshot,
    Details(String),
    NoData,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub key: CardKey,
    pub run_id: RunId,
    pub kind: RunKind,
    pub subject: String,
    pub status: CardStatus,
    pub status_text: String,
    pub details: Vec<DetailLine>,
    pub artifact: Artifact,
    /// Finished without a start ever being seen for this subject.
    pub out_of_order: bool,
}

/// Placeholder card for a `*_check_started` event.
pub fn started(kind: RunKind, run_id: &RunId, subject: &str) -> Card {
    Card {
        key: CardKey::new(run_id, subject),
        run_id: run_id.clone(),
        kind,
        subject: subject.to_string(),
        status: CardStatus::Running,
        status_text: "Running...".into(),
        details: vec![DetailLine::plain("...")],
        artifact: Artifact::Pending,
        out_of_order: false,
    }
}

pub fn check_finished(ev: &CheckFinished) -> Card {
    let verdict = ev.result.as_deref().unwrap_or("unknown");
    let (status, details) = if ev.is_success() {
        let ttfb = ev
            .ttfb_ms
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".into());
        (
            CardStatus::Ok,
            format!("HTTP {} | TTFB: {} ms", ev.http_code.unwrap_or(200), ttfb),
        )
    } else {
        let code = ev
            .http_code
            .map(|c| format!(" ({c})"))
            .unwrap_or_default();
        (
            CardStatus::Error,
            format!(
                "Error: {verdict}{code} | {}",
                ev.notes.as_deref().unwrap_or("")
            )
            .trim_end()
            .to_string(),
        )
    };
    let artifact = match ev.screenshot() {
        Some(name) => Artifact::Screenshot(name.to_string()),
        None => Artifact::NoScreenshot,
    };
    Card {
        key: CardKey::new(&ev.run_id, &ev.url),
        run_id: ev.run_id.clone(),
        kind: RunKind::Generic,
        subject: ev.url.clone(),
        status,
        status_text: verdict.to_string(),
        details: vec![DetailLine::plain(details)],
        artifact,
        out_of_order: false,
    }
}

fn location_line(ev: &DnsCheckFinished) -> String {
    let country = ev.country_name.as_deref().filter(|s| !s.is_empty());
    let city = ev.city.as_deref().filter(|s| !s.is_empty());
    match (city, country) {
        (Some(city), Some(country)) => format!("Location: {city}, {country}"),
        (None, Some(country)) => format!("Location: {country}"),
        _ => "Location: not found".into(),
    }
}

pub fn dns_check_finished(ev: &DnsCheckFinished) -> Card {
    let error = ev.error.as_deref().filter(|e| !e.is_empty());
    let mut details = Vec::new();
    let (status, status_text) = match error {
        Some(err) => {
            details.push(DetailLine {
                text: format!("Error: {err}"),
                flagged: true,
            });
            (CardStatus::Error, "error".to_string())
        }
        None => {
            if ev.ips.is_empty() {
                details.push(DetailLine::plain("no IPs found"));
            } else {
                details.push(DetailLine::plain(format!("IPs: {}", ev.ips.join(", "))));
                details.push(DetailLine::plain(location_line(ev)));
            }
            let owner = ev.owner.as_deref().unwrap_or("Unknown");
            details.push(DetailLine {
                text: format!("Owner: {owner}"),
                flagged: OWNER_ERROR_SENTINELS.contains(&owner),
            });
            (CardStatus::Ok, "resolved".to_string())
        }
    };
    let artifact = match (ev.whois_log_path.as_deref().filter(|p| !p.is_empty()), error) {
        (Some(path), _) => Artifact::Details(path.to_string()),
        (None, None) => Artifact::NoData,
        (None, Some(_)) => Artifact::None,
    };
    Card {
        key: CardKey::new(&ev.run_id, &ev.domain),
        run_id: ev.run_id.clone(),
        kind: RunKind::Dns,
        subject: ev.domain.clone(),
        status,
        status_text,
        details,
        artifact,
        out_of_order: false,
    }
}

/// Map a check-level event onto the card for its subject. Run-level and
/// unrecognized events yield `None`.
pub fn reconcile(existing: Option<&Card>, ev: &StreamEvent) -> Option<Card> {
    let mut card = match ev {
        StreamEvent::CheckStarted(e) => started(RunKind::Generic, &e.run_id, &e.url),
        StreamEvent::DnsCheckStarted(e) => started(RunKind::Dns, &e.run_id, &e.domain),
        StreamEvent::CheckFinished(e) => check_finished(e),
        StreamEvent::DnsCheckFinished(e) => dns_check_finished(e),
        _ => return None,
    };
    if matches!(
        ev,
        StreamEvent::CheckFinished(_) | StreamEvent::DnsCheckFinished(_)
    ) {
        card.out_of_order = existing.is_none();
    }
    Some(card)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> StreamEvent {
        StreamEvent::decode(json).unwrap()
    }

    fn texts(card: &Card) -> Vec<&str> {
        card.details.iter().map(|d| d.text.as_str()).collect()
    }

    #[test]
    fn keys_do_not_collide_after_normalization() {
        let run = RunId::new("r1");
        assert_ne!(CardKey::new(&run, "a.test"), CardKey::new(&run, "at.est"));
        assert_ne!(CardKey::new(&run, "a-b"), CardKey::new(&RunId::new("r1-a"), "b"));
        assert_eq!(CardKey::new(&run, "a.test"), CardKey::new(&run, "a.test"));
        assert_eq!(CardKey::new(&run, "a.b").as_str(), "result-r1-a_2eb");
    }

    #[test]
    fn successful_http_check_shows_code_and_ttfb() {
        let ev = decode(
            r#"{"type":"check_finished","run_id":"r1","url":"https://a.test","result":"success","http_code":200,"ttfb_ms":42}"#,
        );
        let card = reconcile(None, &ev).unwrap();
        assert_eq!(card.status, CardStatus::Ok);
        let line = &card.details[0].text;
        assert!(line.contains("200") && line.contains("42"), "{line}");
        assert_eq!(line, "HTTP 200 | TTFB: 42 ms");
        assert_eq!(card.artifact, Artifact::NoScreenshot);
        assert!(card.out_of_order);
    }

    #[test]
    fn success_defaults_missing_fields() {
        let ev = decode(r#"{"type":"check_finished","run_id":"r1","url":"u","result":"success"}"#);
        let card = reconcile(None, &ev).unwrap();
        assert_eq!(texts(&card), vec!["HTTP 200 | TTFB: - ms"]);
    }

    #[test]
    fn failed_http_check_concatenates_verdict_code_and_notes() {
        let ev = decode(
            r#"{"type":"check_finished","run_id":"r1","url":"u","result":"http_error","http_code":503,"notes":"upstream down","png_name":"d/x.png"}"#,
        );
        let card = reconcile(None, &ev).unwrap();
        assert_eq!(card.status, CardStatus::Error);
        assert_eq!(card.status_text, "http_error");
        assert_eq!(texts(&card), vec!["Error: http_error (503) | upstream down"]);
        assert_eq!(card.artifact, Artifact::Screenshot("d/x.png".into()));

        let ev = decode(r#"{"type":"check_finished","run_id":"r1","url":"u","result":"timeout"}"#);
        assert_eq!(texts(&reconcile(None, &ev).unwrap()), vec!["Error: timeout |"]);
    }

    #[test]
    fn dns_without_addresses_omits_location_and_flags_sentinel_owner() {
        let ev = decode(
            r#"{"type":"dns_check_finished","run_id":"r1","domain":"a.test","ips":[],"owner":"Whois Error"}"#,
        );
        let card = reconcile(None, &ev).unwrap();
        assert_eq!(texts(&card), vec!["no IPs found", "Owner: Whois Error"]);
        assert!(card.details[1].flagged);
        assert!(!card.details.iter().any(|d| d.text.starts_with("Location")));
        assert_eq!(card.artifact, Artifact::NoData);
    }

    #[test]
    fn dns_location_variants() {
        let base = r#"{"type":"dns_check_finished","run_id":"r1","domain":"a.test","ips":["1.2.3.4","5.6.7.8"],"owner":"Example Net""#;
        let both = decode(&format!(
            r#"{base},"city":"Paris","country_name":"France","whois_log_path":"d/a.json"}}"#
        ));
        let card = reconcile(None, &both).unwrap();
        assert_eq!(
            texts(&card),
            vec!["IPs: 1.2.3.4, 5.6.7.8", "Location: Paris, France", "Owner: Example Net"]
        );
        assert!(!card.details[2].flagged);
        assert_eq!(card.artifact, Artifact::Details("d/a.json".into()));

        let country = decode(&format!(r#"{base},"country_name":"France"}}"#));
        assert_eq!(texts(&reconcile(None, &country).unwrap())[1], "Location: France");

        let none = decode(&format!(r#"{base},"city":"Paris"}}"#));
        assert_eq!(texts(&reconcile(None, &none).unwrap())[1], "Location: not found");
    }

    #[test]
    fn dns_error_selects_error_state_without_no_data_marker() {
        let ev = decode(
            r#"{"type":"dns_check_finished","run_id":"r1","domain":"bad.test","error":"DNS lookup failed"}"#,
        );
        let card = reconcile(None, &ev).unwrap();
        assert_eq!(card.status, CardStatus::Error);
        assert_eq!(texts(&card), vec!["Error: DNS lookup failed"]);
        assert_eq!(card.artifact, Artifact::None);
    }

    #[test]
    fn parse_error_owner_is_also_flagged() {
        let ev = decode(
            r#"{"type":"dns_check_finished","run_id":"r1","domain":"a.test","ips":["1.1.1.1"],"owner":"Whois Parse Error"}"#,
        );
        let card = reconcile(None, &ev).unwrap();
        assert!(card.details.last().unwrap().flagged);
    }

    #[test]
    fn started_events_render_placeholders_for_both_kinds() {
        for json in [
            r#"{"type":"check_started","run_id":"r1","url":"https://a.test"}"#,
            r#"{"type":"dns_check_started","run_id":"r1","domain":"a.test"}"#,
        ] {
            let card = reconcile(None, &decode(json)).unwrap();
            assert_eq!(card.status, CardStatus::Running);
            assert_eq!(texts(&card), vec!["..."]);
            assert_eq!(card.artifact, Artifact::Pending);
        }
    }

    #[test]
    fn finish_after_start_is_in_order() {
        let start = reconcile(
            None,
            &decode(r#"{"type":"check_started","run_id":"r1","url":"u"}"#),
        )
        .unwrap();
        let done = reconcile(
            Some(&start),
            &decode(r#"{"type":"check_finished","run_id":"r1","url":"u","result":"success"}"#),
        )
        .unwrap();
        assert_eq!(done.key, start.key);
        assert!(!done.out_of_order);
    }

    #[test]
    fn run_level_events_are_not_cards() {
        assert!(reconcile(None, &decode(r#"{"type":"run_started","run_id":"r1"}"#)).is_none());
        assert!(reconcile(None, &StreamEvent::Unrecognized).is_none());
    }

    #[test]
    fn null_addresses_replace_the_running_card() {
        let started = reconcile(
            None,
            &decode(r#"{"type":"dns_check_started","run_id":"r1","domain":"a.test"}"#),
        )
        .unwrap();
        let ev = decode(
            r#"{"type":"dns_check_finished","run_id":"r1","domain":"a.test","ips":null,"owner":null}"#,
        );
        let card = reconcile(Some(&started), &ev).unwrap();
        assert_ne!(card.status, CardStatus::Running);
        assert_eq!(texts(&card), vec!["no IPs found", "Owner: Unknown"]);
    }
}
