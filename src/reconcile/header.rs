use crate::model::{RunFinished, RunId, RunKind, RunStarted, Totals};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HeaderStatus {
    Running,
    Finished { totals: Option<Totals> },
}

/// Per-run banner shown above that run's cards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunHeader {
    pub run_id: RunId,
    pub kind: RunKind,
    pub started_at: Option<String>,
    pub country: Option<String>,
    pub subject_count: Option<usize>,
    pub status: HeaderStatus,
}

fn count_entries(v: &serde_json::Value) -> Option<usize> {
    match v {
        serde_json::Value::Array(a) => Some(a.len()),
        serde_json::Value::Object(o) => Some(o.len()),
        _ => None,
    }
}

impl RunHeader {
    pub fn from_started(kind: RunKind, ev: &RunStarted) -> Self {
        let settings = ev.settings.as_ref();
        let listed = settings.and_then(|s| match kind {
            RunKind::Generic => s.urls.as_ref(),
            RunKind::Dns => s.domains.as_ref(),
        });
        Self {
            run_id: ev.run_id.clone(),
            kind,
            started_at: ev.ts.clone(),
            country: settings
                .and_then(|s| s.country.clone())
                .filter(|c| !c.is_empty()),
            subject_count: listed.and_then(count_entries).or(ev.total),
            status: HeaderStatus::Running,
        }
    }

    /// Header for a terminal event whose start was never seen.
    pub fn from_finished(kind: RunKind, ev: &RunFinished) -> Self {
        Self {
            run_id: ev.run_id.clone(),
            kind,
            started_at: None,
            country: None,
            subject_count: None,
            status: HeaderStatus::Finished { totals: ev.totals },
        }
    }

    pub fn finish(&mut self, totals: Option<Totals>) {
        self.status = HeaderStatus::Finished { totals };
    }

    pub fn title(&self) -> String {
        let count = self
            .subject_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".into());
        match self.kind {
            RunKind::Generic => {
                let country = self
                    .country
                    .as_deref()
                    .map(str::to_uppercase)
                    .unwrap_or_else(|| "N/A".into());
                format!("Run: {} ({country}, {count} URLs)", self.run_id)
            }
            RunKind::Dns => format!("DNS run: {} ({count} domains)", self.run_id),
        }
    }

    pub fn status_text(&self) -> String {
        match &self.status {
            HeaderStatus::Running => "(Running...)".into(),
            HeaderStatus::Finished { totals: Some(t) } => totals_text(t),
            HeaderStatus::Finished { totals: None } => "(Finished)".into(),
        }
    }
}

pub fn totals_text(t: &Totals) -> String {
    format!(
        "(Finished in {}s. OK: {}, Err: {})",
        t.elapsed_secs(),
        t.ok,
        t.err
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StreamEvent;

    fn started(json: &str) -> RunStarted {
        match StreamEvent::decode(json).unwrap() {
            StreamEvent::RunStarted(s) | StreamEvent::DnsRunStarted(s) => s,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn totals_convert_milliseconds_to_seconds() {
        let t = Totals {
            ok: 7,
            err: 2,
            time_ms: 12345,
        };
        assert_eq!(totals_text(&t), "(Finished in 12.345s. OK: 7, Err: 2)");
        let whole = Totals {
            ok: 1,
            err: 0,
            time_ms: 3000,
        };
        assert_eq!(totals_text(&whole), "(Finished in 3s. OK: 1, Err: 0)");
    }

    #[test]
    fn generic_title_uses_settings() {
        let h = RunHeader::from_started(
            RunKind::Generic,
            &started(
                r#"{"type":"run_started","run_id":"r1","settings":{"country":"us","urls":["a","b","c"]}}"#,
            ),
        );
        assert_eq!(h.title(), "Run: r1 (US, 3 URLs)");
        assert_eq!(h.status_text(), "(Running...)");
    }

    #[test]
    fn missing_settings_fall_back_to_placeholders() {
        let h = RunHeader::from_started(
            RunKind::Generic,
            &started(r#"{"type":"run_started","run_id":"r1"}"#),
        );
        assert_eq!(h.title(), "Run: r1 (N/A, ? URLs)");
    }

    #[test]
    fn dns_title_counts_total() {
        let h = RunHeader::from_started(
            RunKind::Dns,
            &started(r#"{"type":"dns_run_started","run_id":"d1","total":4}"#),
        );
        assert_eq!(h.title(), "DNS run: d1 (4 domains)");
    }

    #[test]
    fn finish_without_totals() {
        let mut h = RunHeader::from_started(
            RunKind::Dns,
            &started(r#"{"type":"dns_run_started","run_id":"d1"}"#),
        );
        h.finish(None);
        assert_eq!(h.status_text(), "(Finished)");
    }
}
