//! Structured JSONL log contract for keypin tooling.
//!
//! Provides:
//! - [`LogEntry`]: canonical JSONL record with required + optional fields.
//! - [`LogEmitter`]: writes JSONL lines to a file or an in-memory buffer.
//! - [`validate_log_line`]: validates a single JSONL line against the schema.
//! - [`validate_log_file`]: validates an entire JSONL file.
//!
//! Evaluation and policy-transition records carry extra required fields so
//! that a log can be audited without the policy that produced it.

use std::io::Write;
use std::path::Path;

use keypin_core::{PinSource, Reason, TransitionKind, Verdict};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event name for one pin evaluation.
pub const EVENT_EVALUATION: &str = "pin_evaluation";

/// Event name for a store transition.
pub const EVENT_TRANSITION: &str = "policy_transition";

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Engine mode at the time of the record (`enforce`, `report_only`, `off`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    /// Leading Base64 characters of the first observed hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_source: Option<PinSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforced: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            session_id: None,
            mode: None,
            host: None,
            verdict: None,
            reason: None,
            policy_version: None,
            hash_prefix: None,
            pin_source: None,
            enforced: None,
            transition: None,
            previous_version: None,
            error: None,
        }
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Set the evaluation fields that the schema requires together.
    #[must_use]
    pub fn with_evaluation(
        mut self,
        host: impl Into<String>,
        verdict: Verdict,
        reason: Reason,
        policy_version: impl Into<String>,
    ) -> Self {
        self.host = Some(host.into());
        self.verdict = Some(verdict);
        self.reason = Some(reason);
        self.policy_version = Some(policy_version.into());
        self
    }

    #[must_use]
    pub fn with_hash_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.hash_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_pin_source(mut self, source: PinSource) -> Self {
        self.pin_source = Some(source);
        self
    }

    #[must_use]
    pub fn with_enforced(mut self, enforced: bool) -> Self {
        self.enforced = Some(enforced);
        self
    }

    /// Set the transition fields that the schema requires together.
    #[must_use]
    pub fn with_transition(
        mut self,
        transition: TransitionKind,
        policy_version: impl Into<String>,
    ) -> Self {
        self.transition = Some(transition);
        self.policy_version = Some(policy_version.into());
        self
    }

    #[must_use]
    pub fn with_previous_version(mut self, version: impl Into<String>) -> Self {
        self.previous_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// Writes structured JSONL log entries to a file or a buffer.
pub struct LogEmitter {
    writer: Box<dyn Write + Send>,
    seq: u64,
    session_id: String,
    run_id: String,
}

impl std::fmt::Debug for LogEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEmitter")
            .field("seq", &self.seq)
            .field("session_id", &self.session_id)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path, session_id: &str, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(
            Box::new(std::io::BufWriter::new(file)),
            session_id,
            run_id,
        ))
    }

    /// Create an emitter that discards output.
    #[must_use]
    pub fn to_sink(session_id: &str, run_id: &str) -> Self {
        Self::to_writer(Box::new(std::io::sink()), session_id, run_id)
    }

    #[must_use]
    pub fn to_writer(writer: Box<dyn Write + Send>, session_id: &str, run_id: &str) -> Self {
        Self {
            writer,
            seq: 0,
            session_id: session_id.to_string(),
            run_id: run_id.to_string(),
        }
    }

    /// Generate the next trace ID.
    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{}::{:03}", self.session_id, self.run_id, self.seq)
    }

    /// Emit a log entry with auto-generated trace_id and session_id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let trace_id = self.next_trace_id();
        let entry = LogEntry::new(&trace_id, level, event).with_session(&self.session_id);
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        Ok(entry)
    }

    /// Emit a fully-populated log entry.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.session_id.is_none() {
            entry.session_id = Some(self.session_id.clone());
        }
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

struct LineCheck<'a> {
    obj: &'a Map<String, Value>,
    line_number: usize,
    errors: Vec<LogValidationError>,
}

impl LineCheck<'_> {
    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(LogValidationError {
            line_number: self.line_number,
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn require(&mut self, field: &str, context: &str) {
        if !self.obj.contains_key(field) {
            self.fail(field, format!("{context} requires this field"));
        }
    }

    /// If present, `field` must deserialize as `T`.
    fn typed<T: serde::de::DeserializeOwned>(&mut self, field: &str) {
        if let Some(value) = self.obj.get(field)
            && let Err(err) = serde_json::from_value::<T>(value.clone())
        {
            self.fail(field, format!("invalid value {value}: {err}"));
        }
    }

    fn enumerated(&mut self, field: &str, allowed: &[&str]) {
        if let Some(value) = self.obj.get(field).and_then(Value::as_str)
            && !allowed.contains(&value)
        {
            self.fail(field, format!("invalid {field}: '{value}'"));
        }
    }
}

/// Validate a single JSONL line against the schema.
///
/// Returns the parsed entry if valid, or a list of validation errors.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Err(vec![LogValidationError {
                line_number,
                field: "<json>".to_string(),
                message: format!("invalid JSON: {e}"),
            }]);
        }
    };
    let Some(obj) = value.as_object() else {
        return Err(vec![LogValidationError {
            line_number,
            field: "<root>".to_string(),
            message: "expected JSON object".to_string(),
        }]);
    };

    let mut check = LineCheck {
        obj,
        line_number,
        errors: Vec::new(),
    };

    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            check.fail(field, "required field missing");
        }
    }

    check.enumerated("level", &["trace", "debug", "info", "warn", "error"]);
    check.enumerated("mode", &["enforce", "report_only", "off"]);
    check.typed::<Verdict>("verdict");
    check.typed::<Reason>("reason");
    check.typed::<PinSource>("pin_source");
    check.typed::<TransitionKind>("transition");

    // Evaluation records must be self-describing.
    match obj.get("event").and_then(Value::as_str) {
        Some(EVENT_EVALUATION) => {
            for field in ["host", "verdict", "reason", "policy_version"] {
                check.require(field, "pin_evaluation");
            }
        }
        Some(EVENT_TRANSITION) => {
            check.require("transition", "policy_transition");
            check.require("policy_version", "policy_transition");
            if obj.get("transition").and_then(Value::as_str) == Some("rejected") {
                check.require("error", "rejected policy_transition");
            }
        }
        _ => {}
    }

    // The hash prefix is a short Base64 fragment, never a full digest.
    if let Some(prefix) = obj.get("hash_prefix").and_then(Value::as_str)
        && (prefix.len() >= 44
            || !prefix
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=')))
    {
        check.fail("hash_prefix", format!("not a short Base64 prefix: '{prefix}'"));
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(Value::as_str)
        && !trace_id.contains("::")
    {
        check.fail(
            "trace_id",
            format!(
                "trace_id should follow <session_id>::<run_id>::<seq> format, got: '{trace_id}'"
            ),
        );
    }

    let mut errors = check.errors;
    if !errors.is_empty() {
        return Err(errors);
    }

    match serde_json::from_value::<LogEntry>(value) {
        Ok(entry) => Ok(entry),
        Err(e) => {
            errors.push(LogValidationError {
                line_number,
                field: "<deserialization>".to_string(),
                message: format!("failed to deserialize: {e}"),
            });
            Err(errors)
        }
    }
}

/// Validate an entire JSONL file.
///
/// Returns the non-empty line count and any validation errors found.
pub fn validate_log_file(path: &Path) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut all_errors = Vec::new();
    let mut line_count = 0;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_log_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }

    Ok((line_count, all_errors))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// RFC 3339 UTC timestamp with millisecond precision.
pub(crate) fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_serializes_required_fields() {
        let entry = LogEntry::new("kp::run-1::001", LogLevel::Info, "refresh_start");
        let json = entry.to_jsonl().unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["trace_id"], "kp::run-1::001");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "refresh_start");
        assert!(parsed.get("session_id").is_none());
        assert!(parsed.get("verdict").is_none());
    }

    #[test]
    fn evaluation_entry_roundtrips_through_validation() {
        let entry = LogEntry::new("kp::run-1::002", LogLevel::Warn, EVENT_EVALUATION)
            .with_mode("enforce")
            .with_evaluation("api.example.com", Verdict::PinMismatch, Reason::NoPinMatch, "7")
            .with_hash_prefix("AwMDAwMD")
            .with_pin_source(PinSource::Remote)
            .with_enforced(true);
        let line = entry.to_jsonl().unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["verdict"], "PIN_MISMATCH");
        assert_eq!(parsed["reason"], "NO_PIN_MATCH");
        assert_eq!(validate_log_line(&line, 1).unwrap(), entry);
    }

    #[test]
    fn emitter_sequences_trace_ids() {
        let mut emitter = LogEmitter::to_sink("kp", "run-9");
        let first = emitter.emit(LogLevel::Info, "start").unwrap();
        let second = emitter.emit(LogLevel::Info, "end").unwrap();
        assert_eq!(first.trace_id, "kp::run-9::001");
        assert_eq!(second.trace_id, "kp::run-9::002");
        assert_eq!(second.session_id.as_deref(), Some("kp"));
    }

    #[test]
    fn validation_rejects_missing_and_bad_fields() {
        let errs = validate_log_line(r#"{"timestamp":"t","level":"loud","event":"x"}"#, 3)
            .unwrap_err();
        assert!(errs.iter().any(|e| e.field == "trace_id"));
        assert!(errs.iter().any(|e| e.field == "level"));
        assert!(errs.iter().all(|e| e.line_number == 3));

        let errs = validate_log_line(
            r#"{"timestamp":"t","trace_id":"a::b::001","level":"info","event":"pin_evaluation","verdict":"MAYBE"}"#,
            1,
        )
        .unwrap_err();
        let fields: Vec<&str> = errs.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"verdict"));
        assert!(fields.contains(&"host"));
        assert!(fields.contains(&"reason"));
    }

    #[test]
    fn rejected_transition_needs_error() {
        let entry = LogEntry::new("kp::r::001", LogLevel::Warn, EVENT_TRANSITION)
            .with_transition(TransitionKind::Rejected, "7");
        let errs = validate_log_line(&entry.to_jsonl().unwrap(), 1).unwrap_err();
        assert_eq!(errs[0].field, "error");

        let fixed = entry.with_error("malformed policy document");
        assert!(validate_log_line(&fixed.to_jsonl().unwrap(), 1).is_ok());
    }

    #[test]
    fn full_hash_is_not_a_prefix() {
        let entry = LogEntry::new("kp::r::001", LogLevel::Info, "note")
            .with_hash_prefix("AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=");
        assert!(validate_log_line(&entry.to_jsonl().unwrap(), 1).is_err());
    }

    #[test]
    fn timestamps_are_calendar_correct() {
        assert_eq!(format_utc(0, 0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_utc(951_782_400, 5), "2000-02-29T00:00:00.005Z");
        assert_eq!(format_utc(1_700_000_000, 250), "2023-11-14T22:13:20.250Z");
    }
}
