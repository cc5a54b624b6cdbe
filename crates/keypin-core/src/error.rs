//! Error types for policy ingestion and pin enforcement.
//!
//! `ConfigError` never reaches evaluation callers: it is returned from
//! refresh, parse and rotation paths only. `PinViolation` is the one error an
//! application sees for a connection, and it is distinct from transport
//! failures on purpose.

use thiserror::Error;

use crate::evaluator::Reason;

/// Parse, schema, range or rotation failure for a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("policy document is {got} bytes, limit is {limit}")]
    TooLarge { got: usize, limit: usize },
    #[error("malformed policy document: {0}")]
    MalformedJson(String),
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("invalid hostname `{host}`: {reason}")]
    InvalidHostname { host: String, reason: &'static str },
    #[error("wildcard host `{0}` is not allowed")]
    WildcardHost(String),
    #[error("host `{0}` appears more than once after normalization")]
    DuplicateHost(String),
    #[error("invalid pin for `{host}`: {reason}")]
    InvalidPin { host: String, reason: String },
    #[error("pin set for `{host}` has {got} pins, at least {min} required")]
    InsufficientPins { host: String, got: usize, min: usize },
    #[error("`{field}` percentage {value} outside 0..=100")]
    PercentageOutOfRange { field: String, value: i64 },
    #[error("invalid version `{0}`")]
    InvalidVersion(String),
    #[error("unsupported {field} `{value}`")]
    UnsupportedValue { field: &'static str, value: String },
    #[error("policy version {offered} is older than applied version {highest}")]
    VersionRollback { offered: u64, highest: u64 },
    #[error("pin {pin} is not part of the pin set for `{host}`")]
    UnknownPin { host: String, pin: String },
    #[error("host `{0}` is not configured in the policy")]
    UnknownHost(String),
    #[error("no last-known-good policy retained")]
    NoLastKnownGood,
}

impl ConfigError {
    pub(crate) fn missing(path: impl Into<String>) -> Self {
        Self::MissingField(path.into())
    }
}

/// An enforced `PIN_MISMATCH`, surfaced to the host application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("public key pin mismatch for `{host}` under policy {policy_version} ({reason:?})")]
pub struct PinViolation {
    pub host: String,
    pub policy_version: String,
    pub reason: Reason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_render_field_context() {
        let err = ConfigError::PercentageOutOfRange {
            field: "hosts.api.example.com.rollout_percentage".to_string(),
            value: 140,
        };
        assert_eq!(
            err.to_string(),
            "`hosts.api.example.com.rollout_percentage` percentage 140 outside 0..=100"
        );
        assert_eq!(
            ConfigError::missing("enabled").to_string(),
            "missing required field `enabled`"
        );
    }

    #[test]
    fn pin_violation_names_host_and_policy() {
        let err = PinViolation {
            host: "api.example.com".to_string(),
            policy_version: "7".to_string(),
            reason: Reason::NoPinMatch,
        };
        let text = err.to_string();
        assert!(text.contains("api.example.com"));
        assert!(text.contains("policy 7"));
    }
}
