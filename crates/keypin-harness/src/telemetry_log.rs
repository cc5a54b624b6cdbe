//! Telemetry sink that writes engine events as structured JSONL.

use std::sync::atomic::{AtomicU64, Ordering};

use keypin_core::{
    ConfigEvent, EvaluationEvent, PinningMode, TelemetryEvent, TelemetrySink, TransitionKind,
    Verdict,
};
use parking_lot::Mutex;
use tracing::warn;

use crate::structured_log::{EVENT_EVALUATION, EVENT_TRANSITION, LogEmitter, LogEntry, LogLevel};

/// Converts each [`TelemetryEvent`] into a [`LogEntry`] line.
///
/// Write failures are counted and otherwise swallowed so the engine never
/// sees them.
#[derive(Debug)]
pub struct JsonlTelemetrySink {
    emitter: Mutex<LogEmitter>,
    mode: PinningMode,
    write_failures: AtomicU64,
}

impl JsonlTelemetrySink {
    #[must_use]
    pub fn new(emitter: LogEmitter, mode: PinningMode) -> Self {
        Self {
            emitter: Mutex::new(emitter),
            mode,
            write_failures: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.emitter.lock().flush()
    }
}

impl TelemetrySink for JsonlTelemetrySink {
    fn emit(&self, event: &TelemetryEvent) {
        let entry = entry_for(event, self.mode);
        if let Err(err) = self.emitter.lock().emit_entry(entry) {
            let failures = self.write_failures.fetch_add(1, Ordering::Relaxed) + 1;
            // Only the first failure is worth a line; the counter keeps the rest.
            if failures == 1 {
                warn!(error = %err, "telemetry log write failed");
            }
        }
    }
}

/// Map an engine event onto the log schema. `trace_id` is left for the
/// emitter to assign.
#[must_use]
pub fn entry_for(event: &TelemetryEvent, mode: PinningMode) -> LogEntry {
    match event {
        TelemetryEvent::Evaluation(e) => evaluation_entry(e).with_mode(mode.as_str()),
        TelemetryEvent::ConfigTransition(e) => transition_entry(e).with_mode(mode.as_str()),
    }
}

fn evaluation_entry(event: &EvaluationEvent) -> LogEntry {
    let level = match (event.verdict, event.enforced) {
        (Verdict::PinMismatch, true) => LogLevel::Error,
        (Verdict::PinMismatch, false) => LogLevel::Warn,
        _ => LogLevel::Info,
    };
    let mut entry = LogEntry::new("", level, EVENT_EVALUATION)
        .with_evaluation(
            &event.host,
            event.verdict,
            event.reason,
            &event.policy_version,
        )
        .with_enforced(event.enforced);
    if let Some(prefix) = &event.observed_hash_prefix {
        entry = entry.with_hash_prefix(prefix);
    }
    if let Some(source) = event.pin_source {
        entry = entry.with_pin_source(source);
    }
    entry
}

fn transition_entry(event: &ConfigEvent) -> LogEntry {
    let level = match event.transition {
        TransitionKind::Applied => LogLevel::Info,
        TransitionKind::Rejected | TransitionKind::Reverted => LogLevel::Warn,
    };
    let mut entry = LogEntry::new("", level, EVENT_TRANSITION)
        .with_transition(event.transition, &event.active_version);
    if let Some(previous) = &event.previous_version {
        entry = entry.with_previous_version(previous);
    }
    if let Some(error) = &event.error {
        entry = entry.with_error(error);
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured_log::validate_log_line;
    use keypin_core::{PinSource, Reason};
    use std::io::Write;
    use std::sync::Arc;

    /// Shared in-memory writer so the test can read what the sink wrote.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn written_lines_satisfy_the_log_schema() {
        let buf = SharedBuf::default();
        let sink = JsonlTelemetrySink::new(
            LogEmitter::to_writer(Box::new(buf.clone()), "kp", "t1"),
            PinningMode::Enforce,
        );
        sink.emit(&TelemetryEvent::Evaluation(EvaluationEvent {
            host: "api.example.com".to_string(),
            verdict: Verdict::PinMismatch,
            reason: Reason::NoPinMatch,
            policy_version: "7".to_string(),
            observed_hash_prefix: Some("AwMDAwMD".to_string()),
            pin_source: Some(PinSource::Remote),
            enforced: true,
        }));
        sink.emit(&TelemetryEvent::ConfigTransition(ConfigEvent {
            transition: TransitionKind::Rejected,
            active_version: "7".to_string(),
            previous_version: None,
            error: Some("missing required field `hosts`".to_string()),
        }));
        sink.flush().unwrap();

        let text = String::from_utf8(buf.0.lock().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first = validate_log_line(lines[0], 1).unwrap();
        assert_eq!(first.level, LogLevel::Error);
        assert_eq!(first.trace_id, "kp::t1::001");
        assert_eq!(first.mode.as_deref(), Some("enforce"));
        let second = validate_log_line(lines[1], 2).unwrap();
        assert_eq!(second.transition, Some(TransitionKind::Rejected));
        assert_eq!(sink.write_failures(), 0);
    }

    #[test]
    fn report_only_mismatch_logs_as_warning() {
        let entry = entry_for(
            &TelemetryEvent::Evaluation(EvaluationEvent {
                host: "api.example.com".to_string(),
                verdict: Verdict::PinMismatch,
                reason: Reason::NoPinMatch,
                policy_version: "7".to_string(),
                observed_hash_prefix: None,
                pin_source: Some(PinSource::Remote),
                enforced: false,
            }),
            PinningMode::ReportOnly,
        );
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.mode.as_deref(), Some("report_only"));
    }
}
