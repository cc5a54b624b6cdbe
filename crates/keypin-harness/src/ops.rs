//! Operations behind the `keypin-harness` subcommands.
//!
//! Each function takes paths and plain values and returns a serializable
//! report, so the CLI stays a thin argument parser and the tests can call
//! the same code.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use keypin_core::hostname::normalize_hostname;
use keypin_core::{
    BuiltinPins, ConfigError, ConfigurationStore, EngineConfig, EvaluationRequest,
    EvaluationResult, NullSink, PinEvaluator, PinSource, Policy, PublicKeyHash, Reason,
    RetireGuard, RolloutRule, RolloutSeed, TelemetrySink, Verdict, bucket_of, is_selected,
    with_added_pin, with_retired_pin,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::HarnessError;
use crate::structured_log::{LogEmitter, LogValidationError, validate_log_file};
use crate::telemetry_log::JsonlTelemetrySink;

/// Session component of trace ids written by the harness.
pub const SESSION_ID: &str = "keypin-harness";

pub fn read_file(path: &Path) -> Result<Vec<u8>, HarnessError> {
    std::fs::read(path).map_err(HarnessError::io(path))
}

pub fn load_policy(path: &Path) -> Result<Policy, HarnessError> {
    Ok(Policy::parse(&read_file(path)?)?)
}

pub fn load_builtin(path: Option<&Path>) -> Result<BuiltinPins, HarnessError> {
    match path {
        Some(path) => Ok(BuiltinPins::from_json(&read_file(path)?)?),
        None => Ok(BuiltinPins::new()),
    }
}

pub fn parse_pin(value: &str) -> Result<PublicKeyHash, HarnessError> {
    PublicKeyHash::from_base64(value).map_err(|source| HarnessError::InvalidPin {
        value: value.to_string(),
        source,
    })
}

fn run_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("run-{millis}")
}

// ---------------------------------------------------------------------------
// evaluate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EvaluateOptions {
    pub policy: PathBuf,
    pub host: String,
    pub hashes: Vec<String>,
    pub client_version: String,
    pub client_id: String,
    pub builtin: Option<PathBuf>,
    /// JSONL telemetry destination.
    pub log: Option<PathBuf>,
    pub config: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    pub host: String,
    pub verdict: Verdict,
    pub reason: Reason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_pin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_source: Option<PinSource>,
    pub policy_version: String,
    pub enforced: bool,
    pub should_reject: bool,
}

impl From<&EvaluationResult> for EvaluationReport {
    fn from(result: &EvaluationResult) -> Self {
        Self {
            host: result.host.clone(),
            verdict: result.verdict,
            reason: result.reason,
            matched_pin: result.matched_pin.map(|pin| pin.to_base64()),
            pin_source: result.pin_source,
            policy_version: result.policy_version.to_string(),
            enforced: result.enforced,
            should_reject: result.should_reject(),
        }
    }
}

/// Load a policy into a fresh store and evaluate one connection against it.
pub fn evaluate(opts: &EvaluateOptions) -> Result<EvaluationReport, HarnessError> {
    let raw = read_file(&opts.policy)?;
    let observed = opts
        .hashes
        .iter()
        .map(|value| parse_pin(value))
        .collect::<Result<Vec<_>, _>>()?;
    let builtin = load_builtin(opts.builtin.as_deref())?;

    let jsonl = match &opts.log {
        Some(path) => {
            let emitter =
                LogEmitter::to_file(path, SESSION_ID, &run_id()).map_err(HarnessError::io(path))?;
            Some(Arc::new(JsonlTelemetrySink::new(emitter, opts.config.mode)))
        }
        None => None,
    };
    let sink: Arc<dyn TelemetrySink> = match &jsonl {
        Some(sink) => Arc::clone(sink) as Arc<dyn TelemetrySink>,
        None => Arc::new(NullSink),
    };

    let store = Arc::new(ConfigurationStore::new(Arc::clone(&sink)));
    store.refresh(&raw)?;
    let evaluator = PinEvaluator::new(store, Arc::new(builtin), sink, opts.config);
    let request = EvaluationRequest::new(&opts.host, &observed)
        .client_version(&opts.client_version)
        .client_id(&opts.client_id);
    let result = evaluator.evaluate(&request);
    debug!(
        host = %result.host,
        verdict = result.verdict.as_str(),
        reason = result.reason.as_str(),
        "one-shot evaluation"
    );

    if let (Some(sink), Some(path)) = (&jsonl, &opts.log) {
        sink.flush().map_err(HarnessError::io(path))?;
    }
    Ok(EvaluationReport::from(&result))
}

// ---------------------------------------------------------------------------
// rollout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloutReport {
    pub client_id: String,
    pub bucket: u8,
    pub percentage: u8,
    pub selected: bool,
}

pub fn rollout(client_id: &str, percentage: u8) -> Result<RolloutReport, HarnessError> {
    if percentage > 100 {
        return Err(HarnessError::InvalidArgument(format!(
            "percentage {percentage} outside 0..=100"
        )));
    }
    let rule = RolloutRule::new(percentage, RolloutSeed::default(), true);
    Ok(RolloutReport {
        client_id: client_id.to_string(),
        bucket: bucket_of(client_id),
        percentage,
        selected: is_selected(client_id, &rule),
    })
}

// ---------------------------------------------------------------------------
// rotation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOp {
    Add,
    Retire(RetireGuard),
}

/// Rotate one host's pins and return the next policy.
///
/// A serial-versioned policy gets its serial bumped so stores accept it.
pub fn rotate(
    policy: &Policy,
    host: &str,
    pin: &str,
    op: RotateOp,
) -> Result<Policy, HarnessError> {
    let host = normalize_hostname(host)?;
    let pin = parse_pin(pin)?;
    let (_, entry) = policy
        .hosts()
        .find(|(name, _)| *name == host)
        .ok_or_else(|| ConfigError::UnknownHost(host.clone()))?;

    let next_set = match op {
        RotateOp::Add => with_added_pin(&entry.pin_set, pin),
        RotateOp::Retire(guard) => with_retired_pin(&entry.pin_set, &pin, guard)?,
    };
    let next = policy.with_host_pin_set(next_set)?;
    let next = match policy.version().as_serial() {
        Some(serial) => next.with_serial_version(serial.saturating_add(1)),
        None => next,
    };
    info!(
        host = %host,
        from = %policy.version(),
        to = %next.version(),
        ?op,
        "rotated host pins"
    );
    Ok(next)
}

// ---------------------------------------------------------------------------
// misc
// ---------------------------------------------------------------------------

pub fn spki_hash(der: &Path) -> Result<PublicKeyHash, HarnessError> {
    Ok(PublicKeyHash::of_spki_der(&read_file(der)?))
}

pub fn validate_log(path: &Path) -> Result<(usize, Vec<LogValidationError>), HarnessError> {
    validate_log_file(path).map_err(HarnessError::io(path))
}
