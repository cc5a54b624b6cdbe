//! Per-connection pin evaluation.
//!
//! The evaluator holds no policy of its own. Each call takes one store
//! snapshot, runs the decision ladder against it and emits exactly one
//! telemetry event:
//!
//! 0. local kill switch, then malformed request
//! 1. global enable
//! 2. minimum client version
//! 3. global rollout
//! 3b. stale policy with builtin fallback for the host
//! 4-7. host lookup, host enable, host rollout
//! 8-9. exact hash match against the chosen pin set

use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::builtin::BuiltinPins;
use crate::config::EngineConfig;
use crate::error::PinViolation;
use crate::hostname::lookup_key;
use crate::metrics::EngineMetrics;
use crate::pin::{PinSet, PublicKeyHash};
use crate::policy::{FailureMode, PolicyVersion};
use crate::rollout::is_selected;
use crate::store::{ConfigurationStore, StoreSnapshot};
use crate::telemetry::{EvaluationEvent, TelemetryEvent, TelemetrySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// An observed key is in the pin set.
    PinMatch,
    /// Pinning applied and nothing matched. Terminal for the connection.
    PinMismatch,
    /// Host not subject to pinning; use standard trust.
    NotPinned,
    /// Pinning switched off for this client; use standard trust.
    Bypassed,
}

impl Verdict {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PinMatch => "PIN_MATCH",
            Self::PinMismatch => "PIN_MISMATCH",
            Self::NotPinned => "NOT_PINNED",
            Self::Bypassed => "BYPASSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    Matched,
    NoPinMatch,
    GlobalDisabled,
    VersionGated,
    RolloutExcluded,
    HostNotConfigured,
    HostRolloutExcluded,
    MalformedRequest,
    LocalOverride,
}

impl Reason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "MATCHED",
            Self::NoPinMatch => "NO_PIN_MATCH",
            Self::GlobalDisabled => "GLOBAL_DISABLED",
            Self::VersionGated => "VERSION_GATED",
            Self::RolloutExcluded => "ROLLOUT_EXCLUDED",
            Self::HostNotConfigured => "HOST_NOT_CONFIGURED",
            Self::HostRolloutExcluded => "HOST_ROLLOUT_EXCLUDED",
            Self::MalformedRequest => "MALFORMED_REQUEST",
            Self::LocalOverride => "LOCAL_OVERRIDE",
        }
    }
}

/// Where the pin set that decided a verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinSource {
    Remote,
    Builtin,
}

/// One connection's worth of input.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    pub hostname: &'a str,
    /// SPKI hashes of the presented chain, leaf first.
    pub observed: &'a [PublicKeyHash],
    pub client_version: &'a str,
    /// The stable identifier named by the policy's rollout seed.
    pub client_id: &'a str,
    pub now: SystemTime,
}

impl<'a> EvaluationRequest<'a> {
    #[must_use]
    pub fn new(hostname: &'a str, observed: &'a [PublicKeyHash]) -> Self {
        Self {
            hostname,
            observed,
            client_version: "",
            client_id: "",
            now: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn client_version(self, client_version: &'a str) -> Self {
        Self {
            client_version,
            ..self
        }
    }

    #[must_use]
    pub fn client_id(self, client_id: &'a str) -> Self {
        Self { client_id, ..self }
    }

    #[must_use]
    pub fn at(self, now: SystemTime) -> Self {
        Self { now, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    /// Canonical form of the requested hostname.
    pub host: String,
    pub verdict: Verdict,
    pub reason: Reason,
    pub matched_pin: Option<PublicKeyHash>,
    pub pin_source: Option<PinSource>,
    pub policy_version: PolicyVersion,
    /// Whether a pin check ran with enforcement on: engine in enforce mode
    /// and the policy failing closed.
    pub enforced: bool,
}

impl EvaluationResult {
    /// True only for an enforced mismatch. The caller must abort the
    /// connection.
    #[must_use]
    pub fn should_reject(&self) -> bool {
        self.verdict == Verdict::PinMismatch && self.enforced
    }

    /// Convert an enforced mismatch into a `PinViolation`.
    pub fn into_result(self) -> Result<Self, PinViolation> {
        if self.should_reject() {
            return Err(PinViolation {
                host: self.host,
                policy_version: self.policy_version.to_string(),
                reason: self.reason,
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    verdict: Verdict,
    reason: Reason,
    matched_pin: Option<PublicKeyHash>,
    pin_source: Option<PinSource>,
}

impl Outcome {
    const fn skip(verdict: Verdict, reason: Reason) -> Self {
        Self {
            verdict,
            reason,
            matched_pin: None,
            pin_source: None,
        }
    }

    fn check(set: &PinSet, source: PinSource, observed: &[PublicKeyHash]) -> Self {
        match set.first_match(observed) {
            Some(pin) => Self {
                verdict: Verdict::PinMatch,
                reason: Reason::Matched,
                matched_pin: Some(pin),
                pin_source: Some(source),
            },
            None => Self {
                verdict: Verdict::PinMismatch,
                reason: Reason::NoPinMatch,
                matched_pin: None,
                pin_source: Some(source),
            },
        }
    }
}

/// Stateless evaluator over an injected store.
pub struct PinEvaluator {
    store: Arc<ConfigurationStore>,
    builtin: Arc<BuiltinPins>,
    telemetry: Arc<dyn TelemetrySink>,
    config: EngineConfig,
}

impl std::fmt::Debug for PinEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinEvaluator")
            .field("config", &self.config)
            .field("builtin_hosts", &self.builtin.len())
            .finish_non_exhaustive()
    }
}

impl PinEvaluator {
    #[must_use]
    pub fn new(
        store: Arc<ConfigurationStore>,
        builtin: Arc<BuiltinPins>,
        telemetry: Arc<dyn TelemetrySink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            builtin,
            telemetry,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ConfigurationStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluate(&self, request: &EvaluationRequest<'_>) -> EvaluationResult {
        let snapshot = self.store.snapshot();
        let host = lookup_key(request.hostname.trim());
        let outcome = self.decide(&snapshot, &host, request);

        let policy = &snapshot.active;
        let enforced = matches!(outcome.verdict, Verdict::PinMatch | Verdict::PinMismatch)
            && self.config.mode.enforces()
            && policy.failure_mode() == FailureMode::FailClosed;
        let result = EvaluationResult {
            host: host.into_owned(),
            verdict: outcome.verdict,
            reason: outcome.reason,
            matched_pin: outcome.matched_pin,
            pin_source: outcome.pin_source,
            policy_version: policy.version().clone(),
            enforced,
        };

        let metrics = self.store.metrics();
        metrics.record_verdict(result.verdict, result.reason);
        if result.pin_source == Some(PinSource::Builtin) {
            EngineMetrics::inc(&metrics.builtin_fallbacks);
        }
        debug!(
            host = %result.host,
            verdict = result.verdict.as_str(),
            reason = result.reason.as_str(),
            policy_version = %result.policy_version,
            enforced = result.enforced,
            "pin evaluation"
        );
        self.telemetry
            .emit(&TelemetryEvent::Evaluation(EvaluationEvent {
                host: result.host.clone(),
                verdict: result.verdict,
                reason: result.reason,
                policy_version: result.policy_version.to_string(),
                observed_hash_prefix: request
                    .observed
                    .first()
                    .map(|hash| hash.prefix(self.config.hash_prefix_len)),
                pin_source: result.pin_source,
                enforced: result.enforced,
            }));
        result
    }

    fn decide(
        &self,
        snapshot: &StoreSnapshot,
        host: &str,
        request: &EvaluationRequest<'_>,
    ) -> Outcome {
        let policy = &snapshot.active;

        if !self.config.mode.evaluates() {
            return Outcome::skip(Verdict::Bypassed, Reason::LocalOverride);
        }
        if host.is_empty() || request.observed.is_empty() {
            let remote = policy.host(host).is_some_and(|h| h.enabled);
            let builtin = policy.fallback().covers(host) && self.builtin.get(host).is_some();
            let pinned = policy.is_enabled() && (remote || builtin);
            let verdict = if pinned {
                Verdict::PinMismatch
            } else {
                Verdict::NotPinned
            };
            return Outcome::skip(verdict, Reason::MalformedRequest);
        }

        if !policy.is_enabled() {
            return Outcome::skip(Verdict::Bypassed, Reason::GlobalDisabled);
        }
        if !policy.admits_client_version(request.client_version) {
            return Outcome::skip(Verdict::Bypassed, Reason::VersionGated);
        }
        if !is_selected(request.client_id, policy.global_rollout()) {
            return Outcome::skip(Verdict::Bypassed, Reason::RolloutExcluded);
        }

        let builtin = if policy.fallback().covers(host) {
            self.builtin.get(host)
        } else {
            None
        };
        if let Some(set) = builtin
            && self.is_stale(snapshot, request.now)
        {
            return Outcome::check(set, PinSource::Builtin, request.observed);
        }

        match policy.host(host) {
            Some(host_policy) if host_policy.enabled => {
                if !is_selected(request.client_id, &host_policy.rollout) {
                    return Outcome::skip(Verdict::NotPinned, Reason::HostRolloutExcluded);
                }
                Outcome::check(&host_policy.pin_set, PinSource::Remote, request.observed)
            }
            _ => match builtin {
                Some(set) => Outcome::check(set, PinSource::Builtin, request.observed),
                None => Outcome::skip(Verdict::NotPinned, Reason::HostNotConfigured),
            },
        }
    }

    fn is_stale(&self, snapshot: &StoreSnapshot, now: SystemTime) -> bool {
        self.config
            .max_policy_age
            .is_some_and(|max_age| snapshot.is_stale(now, max_age))
    }
}
