//! Pure pin-set rotation helpers.
//!
//! A rotation is two publishes: add the next key as a backup, deploy it, then
//! retire the old key. Neither step mutates the input set.

use crate::error::ConfigError;
use crate::pin::{MIN_PINS, PinSet, PublicKeyHash};

/// What the caller vouches for when a retirement would leave fewer than
/// `MIN_PINS` active pins.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetireGuard {
    /// Refuse unless an emergency pin remains.
    #[default]
    Strict,
    /// The operator guarantees a fallback path (builtin pins, kill switch).
    FallbackGuaranteed,
}

/// Append `pin` as a backup. Already-present pins leave the set unchanged.
///
/// The bootstrap flag is cleared once the set reaches `MIN_PINS`.
#[must_use]
pub fn with_added_pin(set: &PinSet, pin: PublicKeyHash) -> PinSet {
    if set.contains(&pin) {
        return set.clone();
    }
    let next = set.clone().with_backup(pin);
    let bootstrap = next.is_bootstrap() && next.active_pin_count() < MIN_PINS;
    next.bootstrap(bootstrap)
}

/// Remove `pin` from the set.
///
/// Retiring the primary promotes the first backup. The result is marked
/// bootstrap when it falls below `MIN_PINS`, which is only allowed with an
/// emergency pin or `RetireGuard::FallbackGuaranteed`. A set with no active
/// pin left is always refused.
pub fn with_retired_pin(
    set: &PinSet,
    pin: &PublicKeyHash,
    guard: RetireGuard,
) -> Result<PinSet, ConfigError> {
    if !set.contains(pin) {
        return Err(ConfigError::UnknownPin {
            host: set.host().to_string(),
            pin: pin.to_base64(),
        });
    }

    let mut active: Vec<PublicKeyHash> = std::iter::once(set.primary())
        .chain(set.backups())
        .filter(|candidate| *candidate != pin)
        .copied()
        .collect();
    let emergency = set.emergency().filter(|e| *e != pin).copied();

    let remaining = active.len();
    let insufficient = || ConfigError::InsufficientPins {
        host: set.host().to_string(),
        got: remaining,
        min: MIN_PINS,
    };
    if active.is_empty() {
        return Err(insufficient());
    }
    if remaining < MIN_PINS && emergency.is_none() && guard != RetireGuard::FallbackGuaranteed {
        return Err(insufficient());
    }

    let primary = active.remove(0);
    Ok(PinSet::from_parts(
        set.host().to_string(),
        primary,
        active,
        emergency,
        remaining < MIN_PINS,
    ))
}
