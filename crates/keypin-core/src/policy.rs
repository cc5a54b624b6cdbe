//! Validated, immutable policy snapshots.
//!
//! A `Policy` is either fully valid or never constructed: `parse` runs every
//! schema, hostname, pin and range check before returning, and any failure
//! discards the whole blob. Builtin-pin fallback is not merged here; the
//! evaluator resolves it per call.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::document::{
    FallbackDocument, HostDocument, HostList, OneOrMany, PinsDocument, PolicyDocument,
    RolloutStrategyDocument, VersionTag,
};
use crate::error::ConfigError;
use crate::hostname::normalize_hostname;
use crate::pin::{PinSet, PublicKeyHash};
use crate::rollout::{RolloutRule, RolloutSeed};
use crate::version::ClientVersion;

/// Upper bound on an incoming policy blob, checked before parsing.
pub const MAX_POLICY_BYTES: usize = 1024 * 1024;

const DIGEST_PREFIX: &str = "sha256:";
const DIGEST_HEX_CHARS: usize = 16;
const ROLLOUT_METHOD: &str = "percentage";

/// Identity of a policy snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PolicyVersion {
    /// Author-assigned monotonic serial.
    Serial(u64),
    /// Content digest, used when the document carries no serial.
    Digest(String),
}

impl PolicyVersion {
    #[must_use]
    pub fn as_serial(&self) -> Option<u64> {
        match self {
            Self::Serial(serial) => Some(*serial),
            Self::Digest(_) => None,
        }
    }
}

impl fmt::Display for PolicyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(serial) => write!(f, "{serial}"),
            Self::Digest(digest) => f.write_str(digest),
        }
    }
}

/// What a mismatch means for the connection.
///
/// `FailClosed` is the production posture. `FailOpen` still reports
/// `PIN_MISMATCH` but marks it unenforced, for staging rollouts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    #[default]
    FailClosed,
    FailOpen,
}

impl FailureMode {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "fail_closed" => Some(Self::FailClosed),
            "fail_open" => Some(Self::FailOpen),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailClosed => "fail_closed",
            Self::FailOpen => "fail_open",
        }
    }
}

/// When the evaluator may use pins embedded in the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackRule {
    pub use_builtin_pins: bool,
    pub builtin_hosts: BTreeSet<String>,
}

impl FallbackRule {
    /// True when builtin pins apply to `host` (canonical form).
    #[must_use]
    pub fn covers(&self, host: &str) -> bool {
        self.use_builtin_pins && self.builtin_hosts.contains(host)
    }
}

/// Per-host pinning configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPolicy {
    pub enabled: bool,
    pub pin_set: PinSet,
    pub rollout: RolloutRule,
}

impl HostPolicy {
    fn from_document(
        host: &str,
        doc: HostDocument,
        seed: RolloutSeed,
        sticky: bool,
    ) -> Result<Self, ConfigError> {
        let field = |name: &str| format!("hosts.{host}.{name}");

        let enabled = doc
            .enabled
            .ok_or_else(|| ConfigError::missing(field("enabled")))?;
        let raw_percentage = doc
            .rollout_percentage
            .ok_or_else(|| ConfigError::missing(field("rollout_percentage")))?;
        let percentage = checked_percentage(&field("rollout_percentage"), raw_percentage)?;

        let pins = doc.pins.ok_or_else(|| ConfigError::missing(field("pins")))?;
        let pin_set = pin_set_from_document(host, pins, doc.bootstrap.unwrap_or(false))?;

        Ok(Self {
            enabled,
            pin_set,
            rollout: RolloutRule::new(percentage, seed, sticky),
        })
    }

    fn to_document(&self) -> HostDocument {
        let set = &self.pin_set;
        let backup = match set.backups() {
            [] => None,
            [single] => Some(OneOrMany::One(single.to_base64())),
            many => Some(OneOrMany::Many(
                many.iter().map(PublicKeyHash::to_base64).collect(),
            )),
        };
        HostDocument {
            enabled: Some(self.enabled),
            bootstrap: set.is_bootstrap().then_some(true),
            pins: Some(PinsDocument {
                primary: Some(set.primary().to_base64()),
                backup,
                emergency: set.emergency().map(PublicKeyHash::to_base64),
            }),
            rollout_percentage: Some(i64::from(self.rollout.percentage)),
        }
    }
}

/// The atomic configuration unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    version: PolicyVersion,
    enabled: bool,
    min_client_version: ClientVersion,
    failure_mode: FailureMode,
    target_hosts: Option<BTreeSet<String>>,
    hosts: HashMap<String, HostPolicy>,
    global_rollout: RolloutRule,
    fallback: FallbackRule,
}

impl Policy {
    /// The safe default before any policy has been validated: pin nothing.
    #[must_use]
    pub fn bootstrap() -> Self {
        Self {
            version: PolicyVersion::Serial(0),
            enabled: false,
            min_client_version: ClientVersion::ZERO,
            failure_mode: FailureMode::FailClosed,
            target_hosts: None,
            hosts: HashMap::new(),
            global_rollout: RolloutRule::full(),
            fallback: FallbackRule::default(),
        }
    }

    /// Parse and validate a raw policy blob.
    pub fn parse(raw: &[u8]) -> Result<Self, ConfigError> {
        if raw.len() > MAX_POLICY_BYTES {
            return Err(ConfigError::TooLarge {
                got: raw.len(),
                limit: MAX_POLICY_BYTES,
            });
        }
        let doc: PolicyDocument = serde_json::from_slice(raw)
            .map_err(|err| ConfigError::MalformedJson(err.to_string()))?;
        Self::from_document(doc)
    }

    /// Validate an already-deserialized document.
    pub fn from_document(doc: PolicyDocument) -> Result<Self, ConfigError> {
        let enabled = doc.enabled.ok_or_else(|| ConfigError::missing("enabled"))?;
        let host_docs = doc.hosts.ok_or_else(|| ConfigError::missing("hosts"))?;

        let min_client_version = match doc.min_app_version.as_deref() {
            Some(raw) => ClientVersion::parse(raw)
                .map_err(|_| ConfigError::InvalidVersion(raw.to_string()))?,
            None => ClientVersion::ZERO,
        };
        let failure_mode = match doc.failure_mode.as_deref() {
            Some(raw) => FailureMode::parse(raw).ok_or_else(|| ConfigError::UnsupportedValue {
                field: "failure_mode",
                value: raw.to_string(),
            })?,
            None => FailureMode::default(),
        };

        let strategy = doc.rollout_strategy.unwrap_or_default();
        if let Some(method) = strategy.method.as_deref()
            && method != ROLLOUT_METHOD
        {
            return Err(ConfigError::UnsupportedValue {
                field: "rollout_strategy.method",
                value: method.to_string(),
            });
        }
        let seed = match strategy.seed.as_deref() {
            Some(raw) => RolloutSeed::parse(raw).ok_or_else(|| ConfigError::UnsupportedValue {
                field: "rollout_strategy.seed",
                value: raw.to_string(),
            })?,
            None => RolloutSeed::default(),
        };
        let sticky = strategy.sticky.unwrap_or(true);
        let global_percentage = match strategy.percentage {
            Some(raw) => checked_percentage("rollout_strategy.percentage", raw)?,
            None => 100,
        };

        let mut hosts = HashMap::with_capacity(host_docs.len());
        for (raw_host, host_doc) in host_docs {
            let host = normalize_hostname(&raw_host)?;
            let host_policy = HostPolicy::from_document(&host, host_doc, seed, sticky)?;
            if hosts.insert(host.clone(), host_policy).is_some() {
                return Err(ConfigError::DuplicateHost(host));
            }
        }

        let target_hosts = doc
            .target_hosts
            .as_ref()
            .map(normalize_host_list)
            .transpose()?;

        let fallback = match doc.fallback {
            Some(fallback) => FallbackRule {
                use_builtin_pins: fallback.use_builtin_pins.unwrap_or(false),
                builtin_hosts: fallback
                    .builtin_pin_hosts
                    .as_ref()
                    .map(normalize_host_list)
                    .transpose()?
                    .unwrap_or_default(),
            },
            None => FallbackRule::default(),
        };

        let mut policy = Self {
            version: PolicyVersion::Serial(0),
            enabled,
            min_client_version,
            failure_mode,
            target_hosts,
            hosts,
            global_rollout: RolloutRule::new(global_percentage, seed, sticky),
            fallback,
        };
        policy.version = match doc.version {
            Some(VersionTag::Serial(serial)) => PolicyVersion::Serial(serial),
            Some(VersionTag::Digest(digest)) if digest.trim().is_empty() => {
                return Err(ConfigError::InvalidVersion(digest));
            }
            Some(VersionTag::Digest(digest)) => PolicyVersion::Digest(digest),
            None => PolicyVersion::Digest(policy.content_digest()?),
        };
        Ok(policy)
    }

    /// Canonical wire form: sorted hosts, array host lists, explicit defaults.
    #[must_use]
    pub fn to_document(&self) -> PolicyDocument {
        self.document(true)
    }

    /// Canonical pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_document())
    }

    fn document(&self, include_version: bool) -> PolicyDocument {
        let hosts: BTreeMap<String, HostDocument> = self
            .hosts
            .iter()
            .map(|(name, host)| (name.clone(), host.to_document()))
            .collect();
        let version = include_version.then(|| match &self.version {
            PolicyVersion::Serial(serial) => VersionTag::Serial(*serial),
            PolicyVersion::Digest(digest) => VersionTag::Digest(digest.clone()),
        });

        PolicyDocument {
            version,
            enabled: Some(self.enabled),
            min_app_version: Some(self.min_client_version.to_string()),
            failure_mode: Some(self.failure_mode.as_str().to_string()),
            target_hosts: self
                .target_hosts
                .as_ref()
                .map(|set| HostList::List(set.iter().cloned().collect())),
            hosts: Some(hosts),
            rollout_strategy: Some(RolloutStrategyDocument {
                method: Some(ROLLOUT_METHOD.to_string()),
                seed: Some(self.global_rollout.seed.as_str().to_string()),
                sticky: Some(self.global_rollout.sticky),
                percentage: Some(i64::from(self.global_rollout.percentage)),
            }),
            fallback: Some(FallbackDocument {
                use_builtin_pins: Some(self.fallback.use_builtin_pins),
                builtin_pin_hosts: Some(HostList::List(
                    self.fallback.builtin_hosts.iter().cloned().collect(),
                )),
            }),
        }
    }

    /// `sha256:` plus the first 16 hex digits over the canonical document
    /// without its version field.
    fn content_digest(&self) -> Result<String, ConfigError> {
        let canonical = serde_json::to_vec(&self.document(false))
            .map_err(|err| ConfigError::MalformedJson(err.to_string()))?;
        let digest = Sha256::digest(&canonical);
        let mut out = String::with_capacity(DIGEST_PREFIX.len() + DIGEST_HEX_CHARS);
        out.push_str(DIGEST_PREFIX);
        for byte in digest.iter().take(DIGEST_HEX_CHARS / 2) {
            let _ = write!(out, "{byte:02x}");
        }
        Ok(out)
    }

    /// New policy with `pin_set` replacing the pins of an existing host.
    ///
    /// A digest-versioned policy gets a fresh digest; a serial is kept and must
    /// be bumped by the author with [`Policy::with_serial_version`].
    pub fn with_host_pin_set(&self, pin_set: PinSet) -> Result<Self, ConfigError> {
        pin_set.validate()?;
        let mut next = self.clone();
        let host = next
            .hosts
            .get_mut(pin_set.host())
            .ok_or_else(|| ConfigError::UnknownHost(pin_set.host().to_string()))?;
        host.pin_set = pin_set;
        if let PolicyVersion::Digest(_) = next.version {
            next.version = PolicyVersion::Digest(next.content_digest()?);
        }
        Ok(next)
    }

    #[must_use]
    pub fn with_serial_version(&self, serial: u64) -> Self {
        Self {
            version: PolicyVersion::Serial(serial),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn version(&self) -> &PolicyVersion {
        &self.version
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn min_client_version(&self) -> &ClientVersion {
        &self.min_client_version
    }

    #[must_use]
    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    #[must_use]
    pub fn global_rollout(&self) -> &RolloutRule {
        &self.global_rollout
    }

    #[must_use]
    pub fn fallback(&self) -> &FallbackRule {
        &self.fallback
    }

    #[must_use]
    pub fn target_hosts(&self) -> Option<&BTreeSet<String>> {
        self.target_hosts.as_ref()
    }

    /// Host policy for a canonical hostname.
    ///
    /// A host left out of `target_hosts` (when present) is treated as absent.
    #[must_use]
    pub fn host(&self, host: &str) -> Option<&HostPolicy> {
        if let Some(targets) = &self.target_hosts
            && !targets.contains(host)
        {
            return None;
        }
        self.hosts.get(host)
    }

    pub fn hosts(&self) -> impl Iterator<Item = (&str, &HostPolicy)> {
        self.hosts.iter().map(|(name, host)| (name.as_str(), host))
    }

    #[must_use]
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Whether a client at `client_version` passes the minimum-version gate.
    ///
    /// With no minimum configured every client passes, including ones that
    /// report an unparseable version.
    #[must_use]
    pub fn admits_client_version(&self, client_version: &str) -> bool {
        if self.min_client_version == ClientVersion::ZERO {
            return true;
        }
        ClientVersion::parse(client_version).is_ok_and(|v| v >= self.min_client_version)
    }
}

/// Decode and validate the pins of one host. `host` must already be canonical.
pub(crate) fn pin_set_from_document(
    host: &str,
    pins: PinsDocument,
    bootstrap: bool,
) -> Result<PinSet, ConfigError> {
    let decode = |raw: &str| {
        PublicKeyHash::from_base64(raw).map_err(|err| ConfigError::InvalidPin {
            host: host.to_string(),
            reason: format!("`{raw}` {err}"),
        })
    };
    let primary_raw = pins
        .primary
        .as_deref()
        .ok_or_else(|| ConfigError::missing(format!("hosts.{host}.pins.primary")))?;
    let primary = decode(primary_raw)?;
    let backups = pins
        .backup
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .iter()
        .map(|raw| decode(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let emergency = pins.emergency.as_deref().map(decode).transpose()?;

    let pin_set = PinSet::from_parts(host.to_string(), primary, backups, emergency, bootstrap);
    pin_set.validate()?;
    Ok(pin_set)
}

fn checked_percentage(field: &str, value: i64) -> Result<u8, ConfigError> {
    u8::try_from(value)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or_else(|| ConfigError::PercentageOutOfRange {
            field: field.to_string(),
            value,
        })
}

fn normalize_host_list(list: &HostList) -> Result<BTreeSet<String>, ConfigError> {
    list.entries()
        .iter()
        .map(|host| normalize_hostname(host))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::PUBLIC_KEY_HASH_LEN;
    use serde_json::json;

    fn b64(byte: u8) -> String {
        PublicKeyHash::from_bytes([byte; PUBLIC_KEY_HASH_LEN]).to_base64()
    }

    fn sample() -> serde_json::Value {
        json!({
            "enabled": true,
            "min_app_version": "1.5.0",
            "hosts": {
                "api.example.com": {
                    "enabled": true,
                    "pins": { "primary": b64(1), "backup": b64(2) },
                    "rollout_percentage": 100
                }
            },
            "rollout_strategy": { "method": "percentage", "seed": "user_id", "sticky": true },
            "fallback": { "use_builtin_pins": false, "builtin_pin_hosts": [] }
        })
    }

    fn parse(value: &serde_json::Value) -> Result<Policy, ConfigError> {
        Policy::parse(value.to_string().as_bytes())
    }

    #[test]
    fn parses_reference_document() {
        let policy = parse(&sample()).unwrap();
        assert!(policy.is_enabled());
        assert_eq!(policy.min_client_version(), &ClientVersion::new(1, 5, 0));
        assert_eq!(policy.global_rollout().seed, RolloutSeed::UserId);
        assert_eq!(policy.global_rollout().percentage, 100);
        let host = policy.host("api.example.com").unwrap();
        assert_eq!(host.pin_set.active_pin_count(), 2);
        assert_eq!(host.rollout.seed, RolloutSeed::UserId);
        assert!(matches!(policy.version(), PolicyVersion::Digest(d) if d.starts_with("sha256:")));
    }

    #[test]
    fn kill_switch_document_is_minimal() {
        let policy = Policy::parse(br#"{"enabled": false, "hosts": {}}"#).unwrap();
        assert!(!policy.is_enabled());
        assert_eq!(policy.host_count(), 0);
    }

    #[test]
    fn missing_fields_are_reported_by_path() {
        let mut doc = sample();
        doc.as_object_mut().unwrap().remove("enabled");
        assert_eq!(parse(&doc), Err(ConfigError::missing("enabled")));

        let mut doc = sample();
        doc["hosts"]["api.example.com"]
            .as_object_mut()
            .unwrap()
            .remove("rollout_percentage");
        assert_eq!(
            parse(&doc),
            Err(ConfigError::missing("hosts.api.example.com.rollout_percentage"))
        );
    }

    #[test]
    fn out_of_range_percentages_rejected() {
        for bad in [-1_i64, 101, 1000] {
            let mut doc = sample();
            doc["hosts"]["api.example.com"]["rollout_percentage"] = json!(bad);
            assert!(matches!(
                parse(&doc),
                Err(ConfigError::PercentageOutOfRange { value, .. }) if value == bad
            ));
        }
        let mut doc = sample();
        doc["rollout_strategy"]["percentage"] = json!(250);
        assert!(matches!(
            parse(&doc),
            Err(ConfigError::PercentageOutOfRange { .. })
        ));
    }

    #[test]
    fn malformed_pins_rejected() {
        let mut doc = sample();
        doc["hosts"]["api.example.com"]["pins"]["backup"] = json!("%%%");
        assert!(matches!(parse(&doc), Err(ConfigError::InvalidPin { .. })));

        let mut doc = sample();
        doc["hosts"]["api.example.com"]["pins"]["primary"] = json!("AAAA");
        assert!(matches!(parse(&doc), Err(ConfigError::InvalidPin { .. })));
    }

    #[test]
    fn single_pin_requires_bootstrap_flag() {
        let mut doc = sample();
        doc["hosts"]["api.example.com"]["pins"]
            .as_object_mut()
            .unwrap()
            .remove("backup");
        assert!(matches!(
            parse(&doc),
            Err(ConfigError::InsufficientPins { got: 1, .. })
        ));

        doc["hosts"]["api.example.com"]["bootstrap"] = json!(true);
        assert!(parse(&doc).is_ok());
    }

    #[test]
    fn wildcard_and_duplicate_hosts_rejected() {
        let mut doc = sample();
        doc["hosts"]["*.example.com"] = doc["hosts"]["api.example.com"].clone();
        assert!(matches!(parse(&doc), Err(ConfigError::WildcardHost(_))));

        let mut doc = sample();
        doc["hosts"]["API.example.com"] = doc["hosts"]["api.example.com"].clone();
        assert!(matches!(parse(&doc), Err(ConfigError::DuplicateHost(_))));
    }

    #[test]
    fn unsupported_strategy_values_rejected() {
        let mut doc = sample();
        doc["rollout_strategy"]["method"] = json!("canary");
        assert!(matches!(
            parse(&doc),
            Err(ConfigError::UnsupportedValue { field: "rollout_strategy.method", .. })
        ));

        let mut doc = sample();
        doc["failure_mode"] = json!("sometimes");
        assert!(matches!(
            parse(&doc),
            Err(ConfigError::UnsupportedValue { field: "failure_mode", .. })
        ));
    }

    #[test]
    fn legacy_and_array_host_lists_agree() {
        let mut legacy = sample();
        legacy["target_hosts"] = json!("api.example.com, cdn.example.com");
        legacy["fallback"]["builtin_pin_hosts"] = json!("cdn.example.com");
        let mut array = sample();
        array["target_hosts"] = json!(["api.example.com", "cdn.example.com"]);
        array["fallback"]["builtin_pin_hosts"] = json!(["cdn.example.com"]);

        assert_eq!(parse(&legacy).unwrap(), parse(&array).unwrap());
    }

    #[test]
    fn target_hosts_hide_unlisted_hosts() {
        let mut doc = sample();
        doc["target_hosts"] = json!("cdn.example.com");
        let policy = parse(&doc).unwrap();
        assert!(policy.host("api.example.com").is_none());
        assert_eq!(policy.host_count(), 1);
    }

    #[test]
    fn canonical_serialization_reparses_identically() {
        let mut doc = sample();
        doc["target_hosts"] = json!("api.example.com");
        doc["hosts"]["api.example.com"]["pins"]["backup"] = json!([b64(2), b64(3)]);
        doc["hosts"]["api.example.com"]["pins"]["emergency"] = json!(b64(9));
        let first = parse(&doc).unwrap();
        let second = Policy::parse(first.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn digest_ignores_formatting_but_not_content() {
        let compact = Policy::parse(sample().to_string().as_bytes()).unwrap();
        let pretty =
            Policy::parse(serde_json::to_string_pretty(&sample()).unwrap().as_bytes()).unwrap();
        assert_eq!(compact.version(), pretty.version());

        let mut changed = sample();
        changed["min_app_version"] = json!("1.6.0");
        assert_ne!(parse(&changed).unwrap().version(), compact.version());
    }

    #[test]
    fn digest_is_sha256_hex_over_canonical_content() {
        let policy = parse(&sample()).unwrap();
        let PolicyVersion::Digest(digest) = policy.version() else {
            panic!("unversioned policy should carry a digest");
        };
        let hex = digest.strip_prefix(DIGEST_PREFIX).unwrap();
        assert_eq!(hex.len(), DIGEST_HEX_CHARS);
        assert!(hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        // SHA-256 of zero bytes; a digest over nothing would land here.
        assert_ne!(hex, "e3b0c44298fc1c14");
    }

    #[test]
    fn explicit_serial_version_is_kept() {
        let mut doc = sample();
        doc["version"] = json!(12);
        assert_eq!(parse(&doc).unwrap().version(), &PolicyVersion::Serial(12));

        doc["version"] = json!("  ");
        assert!(matches!(parse(&doc), Err(ConfigError::InvalidVersion(_))));
    }

    #[test]
    fn oversized_blob_rejected_before_parsing() {
        let blob = vec![b' '; MAX_POLICY_BYTES + 1];
        assert!(matches!(
            Policy::parse(&blob),
            Err(ConfigError::TooLarge { .. })
        ));
    }

    #[test]
    fn version_gate_respects_minimum() {
        let policy = parse(&sample()).unwrap();
        assert!(!policy.admits_client_version("1.4.0"));
        assert!(policy.admits_client_version("1.5.0"));
        assert!(policy.admits_client_version("2.0"));
        assert!(!policy.admits_client_version("garbage"));
        assert!(Policy::bootstrap().admits_client_version("garbage"));
    }

    #[test]
    fn replacing_host_pins_refreshes_digest() {
        let policy = parse(&sample()).unwrap();
        let set = PinSet::new("api.example.com", PublicKeyHash::from_bytes([4; 32]))
            .unwrap()
            .with_backup(PublicKeyHash::from_bytes([5; 32]));
        let next = policy.with_host_pin_set(set).unwrap();
        assert_ne!(next.version(), policy.version());
        assert!(
            next.host("api.example.com")
                .unwrap()
                .pin_set
                .contains(&PublicKeyHash::from_bytes([4; 32]))
        );

        let stranger = PinSet::new("other.example.com", PublicKeyHash::from_bytes([4; 32]))
            .unwrap()
            .with_backup(PublicKeyHash::from_bytes([5; 32]));
        assert!(matches!(
            policy.with_host_pin_set(stranger),
            Err(ConfigError::UnknownHost(_))
        ));
    }
}
