use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Server-assigned opaque run identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Generic,
    Dns,
}

impl RunKind {
    pub const ALL: [RunKind; 2] = [RunKind::Generic, RunKind::Dns];

    /// Trigger label while the controller is ready.
    pub fn ready_label(self) -> &'static str {
        match self {
            RunKind::Generic => "Run checks",
            RunKind::Dns => "Run DNS check",
        }
    }

    /// Trigger label while a run is being submitted or streamed.
    pub fn busy_label(self) -> &'static str {
        match self {
            RunKind::Generic => "Running...",
            RunKind::Dns => "Checking...",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            RunKind::Generic => "URL checks",
            RunKind::Dns => "DNS checks",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Finished,
}

/// Servers send `null` for fields they have no value for; treat it like an
/// absent field.
fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ok: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub err: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_ms: u64,
}

impl Totals {
    pub fn elapsed_secs(&self) -> f64 {
        self.time_ms as f64 / 1000.0
    }
}

/// One submitted batch, as tracked by its controller.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: RunId,
    pub kind: RunKind,
    pub state: RunState,
    pub totals: Option<Totals>,
}

impl Run {
    pub fn new(id: RunId, kind: RunKind) -> Self {
        Self {
            id,
            kind,
            state: RunState::Pending,
            totals: None,
        }
    }
}

/// Form fields sent with a submission, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckForm {
    fields: Vec<(String, String)>,
}

impl CheckForm {
    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.fields.push((name.to_string(), value.into()));
    }

    /// Adds the field only when a value is present and non-empty.
    pub fn push_opt(&mut self, name: &str, value: Option<&str>) {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.push(name, v);
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub urls: Option<serde_json::Value>,
    #[serde(default)]
    pub domains: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStarted {
    pub run_id: RunId,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub settings: Option<RunSettings>,
    #[serde(default)]
    pub total: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckStarted {
    pub run_id: RunId,
    pub url: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckFinished {
    pub run_id: RunId,
    pub url: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub http_code: Option<u16>,
    #[serde(default)]
    pub ttfb_ms: Option<f64>,
    #[serde(default)]
    pub ext_ip: Option<String>,
    #[serde(default)]
    pub md_name: Option<String>,
    #[serde(default)]
    pub png_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CheckFinished {
    pub fn is_success(&self) -> bool {
        self.result.as_deref() == Some("success")
    }

    /// Screenshot path relative to the artifacts base; an empty name means none.
    pub fn screenshot(&self) -> Option<&str> {
        self.png_name.as_deref().filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsCheckStarted {
    pub run_id: RunId,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsCheckFinished {
    pub run_id: RunId,
    pub domain: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ips: Vec<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub whois_log_path: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub raw_whois_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFinished {
    pub run_id: RunId,
    #[serde(default)]
    pub totals: Option<Totals>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// One push-stream message, discriminated by its `type` field.
///
/// Unknown types decode to `Unrecognized` instead of failing, so a stream
/// carrying another run kind's vocabulary is harmless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    RunStarted(RunStarted),
    CheckStarted(CheckStarted),
    CheckFinished(CheckFinished),
    RunFinished(RunFinished),
    DnsRunStarted(RunStarted),
    DnsCheckStarted(DnsCheckStarted),
    DnsCheckFinished(DnsCheckFinished),
    DnsRunFinished(RunFinished),
    #[serde(other)]
    Unrecognized,
}

impl StreamEvent {
    /// Decode a single `data:` payload.
    pub fn decode(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }

    /// The run kind whose vocabulary contains this event, if any.
    pub fn kind(&self) -> Option<RunKind> {
        match self {
            StreamEvent::RunStarted(_)
            | StreamEvent::CheckStarted(_)
            | StreamEvent::CheckFinished(_)
            | StreamEvent::RunFinished(_) => Some(RunKind::Generic),
            StreamEvent::DnsRunStarted(_)
            | StreamEvent::DnsCheckStarted(_)
            | StreamEvent::DnsCheckFinished(_)
            | StreamEvent::DnsRunFinished(_) => Some(RunKind::Dns),
            StreamEvent::Unrecognized => None,
        }
    }

    pub fn belongs_to(&self, kind: RunKind) -> bool {
        self.kind() == Some(kind)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            StreamEvent::RunStarted(_) => "run_started",
            StreamEvent::CheckStarted(_) => "check_started",
            StreamEvent::CheckFinished(_) => "check_finished",
            StreamEvent::RunFinished(_) => "run_finished",
            StreamEvent::DnsRunStarted(_) => "dns_run_started",
            StreamEvent::DnsCheckStarted(_) => "dns_check_started",
            StreamEvent::DnsCheckFinished(_) => "dns_check_finished",
            StreamEvent::DnsRunFinished(_) => "dns_run_finished",
            StreamEvent::Unrecognized => "unrecognized",
        }
    }

    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            StreamEvent::RunStarted(e) | StreamEvent::DnsRunStarted(e) => Some(&e.run_id),
            StreamEvent::CheckStarted(e) => Some(&e.run_id),
            StreamEvent::CheckFinished(e) => Some(&e.run_id),
            StreamEvent::DnsCheckStarted(e) => Some(&e.run_id),
            StreamEvent::DnsCheckFinished(e) => Some(&e.run_id),
            StreamEvent::RunFinished(e) | StreamEvent::DnsRunFinished(e) => Some(&e.run_id),
            StreamEvent::Unrecognized => None,
        }
    }

    /// Subject (URL or domain) for check-level events.
    pub fn subject(&self) -> Option<&str> {
        match self {
            StreamEvent::CheckStarted(e) => Some(&e.url),
            StreamEvent::CheckFinished(e) => Some(&e.url),
            StreamEvent::DnsCheckStarted(e) => Some(&e.domain),
            StreamEvent::DnsCheckFinished(e) => Some(&e.domain),
            _ => None,
        }
    }

    /// Run-level finish event; the only normal end of a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::RunFinished(_) | StreamEvent::DnsRunFinished(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_generic_finish_with_defaults() {
        let ev = StreamEvent::decode(
            r#"{"type":"check_finished","run_id":"r1","url":"https://a.test","result":"success","http_code":200,"ttfb_ms":42}"#,
        )
        .unwrap();
        match ev {
            StreamEvent::CheckFinished(ref f) => {
                assert!(f.is_success());
                assert_eq!(f.http_code, Some(200));
                assert_eq!(f.ttfb_ms, Some(42.0));
                assert_eq!(f.screenshot(), None);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ev.kind(), Some(RunKind::Generic));
        assert_eq!(ev.subject(), Some("https://a.test"));
    }

    #[test]
    fn unknown_type_is_unrecognized_not_an_error() {
        let ev = StreamEvent::decode(r#"{"type":"heartbeat","run_id":"r1"}"#).unwrap();
        assert_eq!(ev, StreamEvent::Unrecognized);
        assert_eq!(ev.kind(), None);
    }

    #[test]
    fn dns_events_do_not_belong_to_generic_vocabulary() {
        let ev = StreamEvent::decode(r#"{"type":"dns_check_started","run_id":"r1","domain":"a.test"}"#)
            .unwrap();
        assert!(ev.belongs_to(RunKind::Dns));
        assert!(!ev.belongs_to(RunKind::Generic));
    }

    #[test]
    fn missing_type_or_subject_fails_to_decode() {
        assert!(StreamEvent::decode(r#"{"run_id":"r1"}"#).is_err());
        assert!(StreamEvent::decode(r#"{"type":"check_started","run_id":"r1"}"#).is_err());
        assert!(StreamEvent::decode("not json").is_err());
    }

    #[test]
    fn empty_screenshot_name_means_absent() {
        let ev = StreamEvent::decode(
            r#"{"type":"check_finished","run_id":"r1","url":"u","result":"timeout","png_name":""}"#,
        )
        .unwrap();
        let StreamEvent::CheckFinished(f) = ev else {
            panic!("expected check_finished");
        };
        assert_eq!(f.screenshot(), None);
        assert!(!f.is_success());
    }

    #[test]
    fn terminal_events_carry_totals() {
        let ev = StreamEvent::decode(
            r#"{"type":"dns_run_finished","run_id":"r9","totals":{"ok":3,"err":1,"time_ms":2500}}"#,
        )
        .unwrap();
        assert!(ev.is_terminal());
        let StreamEvent::DnsRunFinished(f) = ev else {
            panic!("expected dns_run_finished");
        };
        let totals = f.totals.unwrap();
        assert_eq!(totals.elapsed_secs(), 2.5);
    }

    #[test]
    fn null_fields_decode_as_defaults() {
        let ev = StreamEvent::decode(
            r#"{"type":"dns_check_finished","run_id":"r1","domain":"a.test","ips":null,"owner":null}"#,
        )
        .unwrap();
        let StreamEvent::DnsCheckFinished(f) = ev else {
            panic!("expected dns_check_finished");
        };
        assert!(f.ips.is_empty());
        assert_eq!(f.owner, None);

        let ev = StreamEvent::decode(
            r#"{"type":"run_finished","run_id":"r1","totals":{"ok":2,"err":null,"time_ms":null}}"#,
        )
        .unwrap();
        assert!(ev.is_terminal());
        let StreamEvent::RunFinished(f) = ev else {
            panic!("expected run_finished");
        };
        assert_eq!(
            f.totals,
            Some(Totals {
                ok: 2,
                err: 0,
                time_ms: 0
            })
        );
    }
}
