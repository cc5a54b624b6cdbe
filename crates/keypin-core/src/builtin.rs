//! Pins shipped inside the client.
//!
//! Used only when the active policy's fallback rule names the host, either
//! because the host has no usable remote entry or because the policy is
//! stale. Builtin sets must meet the full cardinality rule.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::document::PinsDocument;
use crate::error::ConfigError;
use crate::hostname::normalize_hostname;
use crate::pin::PinSet;
use crate::policy::pin_set_from_document;

/// On-disk form: `{"hosts": {"<hostname>": {"primary": .., "backup": ..}}}`.
#[derive(Debug, Deserialize)]
struct BuiltinDocument {
    hosts: BTreeMap<String, PinsDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltinPins {
    sets: HashMap<String, PinSet>,
}

impl BuiltinPins {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = PinSet>,
    {
        let mut pins = Self::new();
        for set in entries {
            if pins.sets.contains_key(set.host()) {
                return Err(ConfigError::DuplicateHost(set.host().to_string()));
            }
            pins.insert(set)?;
        }
        Ok(pins)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let doc: BuiltinDocument = serde_json::from_slice(raw)
            .map_err(|err| ConfigError::MalformedJson(err.to_string()))?;
        let mut pins = Self::new();
        for (raw_host, entry) in doc.hosts {
            let host = normalize_hostname(&raw_host)?;
            if pins.sets.contains_key(&host) {
                return Err(ConfigError::DuplicateHost(host));
            }
            let set = pin_set_from_document(&host, entry, false)?;
            pins.sets.insert(host, set);
        }
        Ok(pins)
    }

    /// Add or replace the set for its host.
    pub fn insert(&mut self, set: PinSet) -> Result<(), ConfigError> {
        if set.is_bootstrap() {
            return Err(ConfigError::InsufficientPins {
                host: set.host().to_string(),
                got: set.active_pin_count(),
                min: crate::pin::MIN_PINS,
            });
        }
        set.validate()?;
        self.sets.insert(set.host().to_string(), set);
        Ok(())
    }

    /// Builtin set for a canonical hostname.
    #[must_use]
    pub fn get(&self, host: &str) -> Option<&PinSet> {
        self.sets.get(host)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::PublicKeyHash;
    use serde_json::json;

    fn pin(byte: u8) -> PublicKeyHash {
        PublicKeyHash::from_bytes([byte; 32])
    }

    #[test]
    fn from_json_normalizes_hosts() {
        let raw = json!({
            "hosts": {
                "API.Example.com.": {
                    "primary": pin(1).to_base64(),
                    "backup": [pin(2).to_base64()]
                }
            }
        });
        let pins = BuiltinPins::from_json(raw.to_string().as_bytes()).unwrap();
        let set = pins.get("api.example.com").unwrap();
        assert!(set.contains(&pin(2)));
        assert_eq!(pins.len(), 1);
    }

    #[test]
    fn single_pin_builtin_rejected() {
        let raw = json!({ "hosts": { "api.example.com": { "primary": pin(1).to_base64() } } });
        assert!(matches!(
            BuiltinPins::from_json(raw.to_string().as_bytes()),
            Err(ConfigError::InsufficientPins { .. })
        ));

        let single = PinSet::new("api.example.com", pin(1)).unwrap().bootstrap(true);
        assert!(BuiltinPins::new().insert(single).is_err());
    }

    #[test]
    fn duplicate_entries_rejected() {
        let set = PinSet::new("api.example.com", pin(1)).unwrap().with_backup(pin(2));
        assert!(matches!(
            BuiltinPins::from_entries([set.clone(), set]),
            Err(ConfigError::DuplicateHost(_))
        ));
    }
}
