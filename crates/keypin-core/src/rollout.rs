//! Deterministic, sticky percentage rollout.
//!
//! `bucket = stable_hash(identifier) mod 100`, `selected = bucket < percentage`.
//! The hash is the first eight bytes (little-endian) of BLAKE3 over the
//! identifier, so buckets are identical across processes and platforms.
//! Raising a percentage only ever adds identifiers to the selected set.

use serde::{Deserialize, Serialize};

/// Number of rollout buckets.
pub const BUCKETS: u64 = 100;

/// Which stable identifier the host application feeds the selector.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutSeed {
    #[default]
    DeviceId,
    UserId,
    InstallId,
}

impl RolloutSeed {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "device_id" => Some(Self::DeviceId),
            "user_id" => Some(Self::UserId),
            "install_id" => Some(Self::InstallId),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeviceId => "device_id",
            Self::UserId => "user_id",
            Self::InstallId => "install_id",
        }
    }
}

/// Fraction of the client population a scope applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RolloutRule {
    pub percentage: u8,
    pub seed: RolloutSeed,
    /// Informational: stickiness comes from the identifier the caller passes.
    pub sticky: bool,
}

impl RolloutRule {
    #[must_use]
    pub const fn new(percentage: u8, seed: RolloutSeed, sticky: bool) -> Self {
        Self {
            percentage,
            seed,
            sticky,
        }
    }

    /// Everyone selected.
    #[must_use]
    pub const fn full() -> Self {
        Self::new(100, RolloutSeed::DeviceId, true)
    }

    /// Nobody selected.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, RolloutSeed::DeviceId, true)
    }
}

impl Default for RolloutRule {
    fn default() -> Self {
        Self::full()
    }
}

/// 64-bit fingerprint of an identifier.
#[must_use]
pub fn stable_hash(identifier: &str) -> u64 {
    let digest = blake3::hash(identifier.as_bytes());
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(word)
}

/// Rollout bucket in `0..100` for an identifier.
#[must_use]
pub fn bucket_of(identifier: &str) -> u8 {
    // BUCKETS fits in u8, so the remainder does too.
    (stable_hash(identifier) % BUCKETS) as u8
}

/// Whether `identifier` falls inside the rule's percentage.
#[must_use]
pub fn is_selected(identifier: &str, rule: &RolloutRule) -> bool {
    match rule.percentage {
        0 => false,
        p if u64::from(p) >= BUCKETS => true,
        p => bucket_of(identifier) < p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(percentage: u8) -> RolloutRule {
        RolloutRule::new(percentage, RolloutSeed::DeviceId, true)
    }

    #[test]
    fn edges_ignore_the_hash() {
        for id in ["", "a", "device-1", "\u{1F512}"] {
            assert!(!is_selected(id, &rule(0)));
            assert!(is_selected(id, &rule(100)));
        }
    }

    #[test]
    fn repeated_calls_agree() {
        let r = rule(37);
        let first = is_selected("device-42", &r);
        for _ in 0..1_000 {
            assert_eq!(is_selected("device-42", &r), first);
        }
        assert_eq!(stable_hash("device-42"), stable_hash("device-42"));
    }

    #[test]
    fn bucket_matches_selection_boundary() {
        let bucket = bucket_of("install-7");
        assert!(bucket < 100);
        assert!(!is_selected("install-7", &rule(bucket)));
        if bucket < 99 {
            assert!(is_selected("install-7", &rule(bucket + 1)));
        }
    }

    #[test]
    fn distribution_is_roughly_uniform() {
        let selected = (0..10_000)
            .filter(|i| is_selected(&format!("device-{i}"), &rule(25)))
            .count();
        assert!((2_000..3_000).contains(&selected), "selected {selected}");
    }

    #[test]
    fn seed_names_roundtrip() {
        for seed in [RolloutSeed::DeviceId, RolloutSeed::UserId, RolloutSeed::InstallId] {
            assert_eq!(RolloutSeed::parse(seed.as_str()), Some(seed));
        }
        assert_eq!(RolloutSeed::parse("session_id"), None);
    }
}
