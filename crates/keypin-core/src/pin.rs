//! SPKI pin values and per-host pin sets.
//!
//! A pin is the SHA-256 digest of a DER-encoded SubjectPublicKeyInfo. Pins are
//! compared byte-exact; there is no prefix or fuzzy matching anywhere.

use std::collections::HashSet;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

use crate::error::ConfigError;
use crate::hostname::normalize_hostname;

/// Length of a SPKI SHA-256 digest in bytes.
pub const PUBLIC_KEY_HASH_LEN: usize = 32;

/// Minimum number of non-emergency pins in a published pin set.
pub const MIN_PINS: usize = 2;

/// HPKP-style prefix some producers put in front of the Base64 digest.
const SHA256_PREFIX: &str = "sha256/";

/// Failure to decode a Base64 pin.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashDecodeError {
    #[error("not valid Base64")]
    InvalidBase64,
    #[error("decoded to {got} bytes, expected 32")]
    WrongLength { got: usize },
}

/// SHA-256 digest of a SubjectPublicKeyInfo.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKeyHash([u8; PUBLIC_KEY_HASH_LEN]);

impl PublicKeyHash {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash a DER-encoded SubjectPublicKeyInfo.
    #[must_use]
    pub fn of_spki_der(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }

    /// Decode standard Base64 (optionally `sha256/`-prefixed).
    pub fn from_base64(encoded: &str) -> Result<Self, HashDecodeError> {
        let encoded = encoded.trim();
        let encoded = encoded.strip_prefix(SHA256_PREFIX).unwrap_or(encoded);
        let decoded = BASE64
            .decode(encoded)
            .map_err(|_| HashDecodeError::InvalidBase64)?;
        let bytes: [u8; PUBLIC_KEY_HASH_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| HashDecodeError::WrongLength { got: decoded.len() })?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_HASH_LEN] {
        &self.0
    }

    /// First `len` characters of the Base64 form, for telemetry.
    #[must_use]
    pub fn prefix(&self, len: usize) -> String {
        let mut encoded = self.to_base64();
        encoded.truncate(len);
        encoded
    }
}

impl fmt::Debug for PublicKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyHash({})", self.to_base64())
    }
}

impl fmt::Display for PublicKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// Accepted public-key hashes for one host.
///
/// Immutable once built. Rotation produces a new set (see `rotation`).
#[derive(Debug, Clone)]
pub struct PinSet {
    host: String,
    primary: PublicKeyHash,
    backups: Vec<PublicKeyHash>,
    emergency: Option<PublicKeyHash>,
    bootstrap: bool,
    members: HashSet<PublicKeyHash>,
}

impl PinSet {
    /// Start a pin set for `host` with its current (primary) pin.
    pub fn new(host: &str, primary: PublicKeyHash) -> Result<Self, ConfigError> {
        let host = normalize_hostname(host)?;
        Ok(Self::from_parts(host, primary, Vec::new(), None, false))
    }

    pub(crate) fn from_parts(
        host: String,
        primary: PublicKeyHash,
        backups: Vec<PublicKeyHash>,
        emergency: Option<PublicKeyHash>,
        bootstrap: bool,
    ) -> Self {
        let mut ordered: Vec<PublicKeyHash> = Vec::with_capacity(backups.len());
        for pin in backups {
            if pin != primary && !ordered.contains(&pin) {
                ordered.push(pin);
            }
        }
        let mut members: HashSet<PublicKeyHash> = ordered.iter().copied().collect();
        members.insert(primary);
        if let Some(pin) = emergency {
            members.insert(pin);
        }
        Self {
            host,
            primary,
            backups: ordered,
            emergency,
            bootstrap,
            members,
        }
    }

    /// Add a backup pin. Duplicates of existing pins are ignored.
    #[must_use]
    pub fn with_backup(self, pin: PublicKeyHash) -> Self {
        let mut backups = self.backups;
        backups.push(pin);
        Self::from_parts(self.host, self.primary, backups, self.emergency, self.bootstrap)
    }

    #[must_use]
    pub fn with_emergency(self, pin: PublicKeyHash) -> Self {
        Self::from_parts(self.host, self.primary, self.backups, Some(pin), self.bootstrap)
    }

    /// Flag the set as being in its single-pin bootstrap state.
    #[must_use]
    pub fn bootstrap(self, bootstrap: bool) -> Self {
        Self { bootstrap, ..self }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn primary(&self) -> &PublicKeyHash {
        &self.primary
    }

    #[must_use]
    pub fn backups(&self) -> &[PublicKeyHash] {
        &self.backups
    }

    #[must_use]
    pub fn emergency(&self) -> Option<&PublicKeyHash> {
        self.emergency.as_ref()
    }

    #[must_use]
    pub fn is_bootstrap(&self) -> bool {
        self.bootstrap
    }

    /// Primary plus backups; the emergency pin is not counted.
    #[must_use]
    pub fn active_pin_count(&self) -> usize {
        1 + self.backups.len()
    }

    /// Number of distinct pins, emergency included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Exact-match membership test.
    #[must_use]
    pub fn contains(&self, hash: &PublicKeyHash) -> bool {
        self.members.contains(hash)
    }

    /// First observed hash, in chain order, that this set accepts.
    #[must_use]
    pub fn first_match(&self, observed: &[PublicKeyHash]) -> Option<PublicKeyHash> {
        observed.iter().copied().find(|hash| self.contains(hash))
    }

    /// All distinct pins: primary, backups, then emergency.
    pub fn iter(&self) -> impl Iterator<Item = &PublicKeyHash> {
        std::iter::once(&self.primary)
            .chain(self.backups.iter())
            .chain(
                self.emergency
                    .iter()
                    .filter(|pin| **pin != self.primary && !self.backups.contains(pin)),
            )
    }

    /// Check the publish-time invariants.
    ///
    /// Cardinality is only enforced outside the bootstrap state.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let canonical = normalize_hostname(&self.host)?;
        if canonical != self.host {
            return Err(ConfigError::InvalidHostname {
                host: self.host.clone(),
                reason: "hostname is not in canonical form",
            });
        }
        if self.members.is_empty() {
            return Err(ConfigError::InsufficientPins {
                host: self.host.clone(),
                got: 0,
                min: MIN_PINS,
            });
        }
        if !self.bootstrap && self.active_pin_count() < MIN_PINS {
            return Err(ConfigError::InsufficientPins {
                host: self.host.clone(),
                got: self.active_pin_count(),
                min: MIN_PINS,
            });
        }
        Ok(())
    }
}

impl PartialEq for PinSet {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.primary == other.primary
            && self.backups == other.backups
            && self.emergency == other.emergency
            && self.bootstrap == other.bootstrap
    }
}

impl Eq for PinSet {}
