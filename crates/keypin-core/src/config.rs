//! Process-level engine configuration.
//!
//! The pinning mode is set via the `KEYPIN_MODE` environment variable:
//! - `enforce` (default): mismatches are reported and enforced.
//! - `report_only`: every verdict is computed and reported, but nothing is
//!   marked enforced. Useful while a new pin set is being shadow-tested.
//! - `off`: local kill switch. Every evaluation is `BYPASSED` before the
//!   remote policy is consulted.
//!
//! `KEYPIN_MAX_POLICY_AGE_SECS` bounds how old the active policy may get
//! before builtin-pin fallback applies. Unset or unparseable means no bound.
//!
//! Configuration is read once at start-up and handed to the evaluator; there
//! is no process-global cache.

use std::time::Duration;

/// Environment variable holding the pinning mode.
pub const MODE_ENV: &str = "KEYPIN_MODE";

/// Environment variable holding the staleness bound in seconds.
pub const MAX_AGE_ENV: &str = "KEYPIN_MAX_POLICY_AGE_SECS";

/// Base64 characters of the observed hash kept in telemetry.
pub const DEFAULT_HASH_PREFIX_LEN: usize = 8;

/// Engine-wide enforcement posture.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinningMode {
    /// Mismatches are enforced (subject to the policy's failure mode).
    #[default]
    Enforce,
    /// Mismatches are reported but never enforced.
    ReportOnly,
    /// No evaluation. Everything is bypassed.
    Off,
}

impl PinningMode {
    /// Parse from string (case-insensitive). Unknown values keep pinning on.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" | "on" | "strict" | "default" => Self::Enforce,
            "report_only" | "report-only" | "report" | "shadow" => Self::ReportOnly,
            "off" | "none" | "disabled" => Self::Off,
            _ => Self::Enforce,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enforce => "enforce",
            Self::ReportOnly => "report_only",
            Self::Off => "off",
        }
    }

    /// Returns true if mismatches may be enforced.
    #[must_use]
    pub const fn enforces(self) -> bool {
        matches!(self, Self::Enforce)
    }

    /// Returns true if evaluation runs at all.
    #[must_use]
    pub const fn evaluates(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Knobs the evaluator needs besides the policy itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub mode: PinningMode,
    /// Policies older than this trigger builtin fallback. `None` disables it.
    pub max_policy_age: Option<Duration>,
    pub hash_prefix_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: PinningMode::Enforce,
            max_policy_age: None,
            hash_prefix_len: DEFAULT_HASH_PREFIX_LEN,
        }
    }
}

impl EngineConfig {
    /// Read `KEYPIN_MODE` and `KEYPIN_MAX_POLICY_AGE_SECS` from the process
    /// environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = lookup(MODE_ENV)
            .map(|v| PinningMode::from_str_loose(&v))
            .unwrap_or_default();
        let max_policy_age = lookup(MAX_AGE_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        Self {
            mode,
            max_policy_age,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_mode(self, mode: PinningMode) -> Self {
        Self { mode, ..self }
    }

    #[must_use]
    pub fn with_max_policy_age(self, max_policy_age: Duration) -> Self {
        Self {
            max_policy_age: Some(max_policy_age),
            ..self
        }
    }
}
