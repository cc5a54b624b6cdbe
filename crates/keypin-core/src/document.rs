//! Wire representation of the policy document.
//!
//! These types mirror the JSON exactly and carry no invariants. Every field
//! is optional at this layer so that missing required fields are reported by
//! path during conversion (`Policy::from_document`) rather than as an opaque
//! serde message. Fields that producers emit in two shapes (host lists and
//! backup pins) are untagged unions that collapse to one internal form at the
//! boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level policy document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<String>,
    /// Legacy producers send this as a comma-separated string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_hosts: Option<HostList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts: Option<BTreeMap<String, HostDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_strategy: Option<RolloutStrategyDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackDocument>,
}

/// Explicit policy version: an integer serial or an opaque digest string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionTag {
    Serial(u64),
    Digest(String),
}

/// Array of hostnames, or a legacy comma-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostList {
    List(Vec<String>),
    Legacy(String),
}

impl HostList {
    /// Split/trim into individual entries. Empty entries are dropped.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        match self {
            Self::List(hosts) => hosts
                .iter()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect(),
            Self::Legacy(joined) => joined
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pins: Option<PinsDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_percentage: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency: Option<String>,
}

/// A single Base64 pin or an array of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutStrategyDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_builtin_pins: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin_pin_hosts: Option<HostList>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_list_accepts_both_forms() {
        let array: HostList =
            serde_json::from_str(r#"["a.example.com", " b.example.com "]"#).unwrap();
        let legacy: HostList =
            serde_json::from_str(r#"" a.example.com,b.example.com ,, ""#).unwrap();
        assert_eq!(array.entries(), vec!["a.example.com", "b.example.com"]);
        assert_eq!(legacy.entries(), array.entries());
    }

    #[test]
    fn backup_accepts_one_or_many() {
        let pins: PinsDocument =
            serde_json::from_str(r#"{"primary":"p","backup":["b1","b2"]}"#).unwrap();
        assert_eq!(pins.backup.unwrap().into_vec(), vec!["b1", "b2"]);

        let pins: PinsDocument = serde_json::from_str(r#"{"primary":"p","backup":"b"}"#).unwrap();
        assert_eq!(pins.backup.unwrap().into_vec(), vec!["b"]);
    }

    #[test]
    fn version_tag_is_serial_or_digest() {
        let serial: VersionTag = serde_json::from_str("42").unwrap();
        let digest: VersionTag = serde_json::from_str(r#""sha256:abc""#).unwrap();
        assert_eq!(serial, VersionTag::Serial(42));
        assert_eq!(digest, VersionTag::Digest("sha256:abc".to_string()));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let doc: PolicyDocument =
            serde_json::from_str(r#"{"enabled":true,"hosts":{},"future_knob":3}"#).unwrap();
        assert_eq!(doc.enabled, Some(true));
    }
}
