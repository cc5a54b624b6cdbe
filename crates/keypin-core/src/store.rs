//! Active / last-known-good policy holder.
//!
//! The published state is an immutable `StoreSnapshot` behind an `ArcSwap`:
//! readers load it without locking and keep it for the whole evaluation.
//! Writers serialize on `refresh_lock`, finish all parse work, then publish
//! with a single pointer swap.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::metrics::EngineMetrics;
use crate::policy::Policy;
use crate::telemetry::{ConfigEvent, NullSink, TelemetryEvent, TelemetrySink, TransitionKind};

/// Everything the store publishes, swapped as one unit.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub active: Arc<Policy>,
    pub last_known_good: Option<Arc<Policy>>,
    pub last_refresh: Option<SystemTime>,
    /// Bumped on every applied refresh or revert.
    pub generation: u64,
    /// Highest serial version ever applied. Outlives digest-versioned
    /// policies and reverts, so older serials stay rejected.
    pub highest_serial: Option<u64>,
}

impl StoreSnapshot {
    fn initial() -> Self {
        Self {
            active: Arc::new(Policy::bootstrap()),
            last_known_good: None,
            last_refresh: None,
            generation: 0,
            highest_serial: None,
        }
    }

    /// `now - last_refresh > max_age`. Never refreshed counts as stale; a
    /// clock that went backwards does not.
    #[must_use]
    pub fn is_stale(&self, now: SystemTime, max_age: Duration) -> bool {
        match self.last_refresh {
            None => true,
            Some(at) => now
                .duration_since(at)
                .map(|age| age > max_age)
                .unwrap_or(false),
        }
    }
}

/// Holds the policy the evaluator reads.
pub struct ConfigurationStore {
    state: ArcSwap<StoreSnapshot>,
    refresh_lock: Mutex<()>,
    telemetry: Arc<dyn TelemetrySink>,
    metrics: EngineMetrics,
}

impl std::fmt::Debug for ConfigurationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationStore")
            .field("state", &self.snapshot())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}

impl ConfigurationStore {
    /// A store holding `Policy::bootstrap()`: pinning off until the first
    /// valid refresh.
    #[must_use]
    pub fn new(telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            state: ArcSwap::from_pointee(StoreSnapshot::initial()),
            refresh_lock: Mutex::new(()),
            telemetry,
            metrics: EngineMetrics::new(),
        }
    }

    /// The active policy.
    #[must_use]
    pub fn current(&self) -> Arc<Policy> {
        Arc::clone(&self.state.load().active)
    }

    /// The full published state, for callers that need a consistent view of
    /// policy and freshness together.
    #[must_use]
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.state.load_full()
    }

    #[must_use]
    pub fn last_known_good(&self) -> Option<Arc<Policy>> {
        self.state.load().last_known_good.clone()
    }

    #[must_use]
    pub fn last_refresh(&self) -> Option<SystemTime> {
        self.state.load().last_refresh
    }

    #[must_use]
    pub fn is_stale(&self, now: SystemTime, max_age: Duration) -> bool {
        self.snapshot().is_stale(now, max_age)
    }

    #[must_use]
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Callback for the host application's fetch layer.
    pub fn on_config_fetched(&self, raw: &[u8]) -> Result<(), ConfigError> {
        self.refresh(raw)
    }

    pub fn refresh(&self, raw: &[u8]) -> Result<(), ConfigError> {
        self.refresh_at(raw, SystemTime::now())
    }

    /// Parse, validate and swap in `raw`. On any error the store is left
    /// exactly as it was.
    pub fn refresh_at(&self, raw: &[u8], now: SystemTime) -> Result<(), ConfigError> {
        let _writer = self.refresh_lock.lock();
        let current = self.snapshot();

        let parsed = Policy::parse(raw).and_then(|policy| {
            check_rollback(&current, &policy)?;
            Ok(policy)
        });
        let policy = match parsed {
            Ok(policy) => policy,
            Err(err) => {
                EngineMetrics::inc(&self.metrics.refreshes_rejected);
                warn!(
                    active_version = %current.active.version(),
                    error = %err,
                    "policy refresh rejected"
                );
                self.emit_transition(TransitionKind::Rejected, &current.active, None, Some(&err));
                return Err(err);
            }
        };

        // Re-delivery of the active policy only renews freshness, so the
        // retained fallback is not overwritten with a copy of itself.
        let unchanged = *current.active == policy;
        let next = if unchanged {
            StoreSnapshot {
                last_refresh: Some(now),
                ..StoreSnapshot::clone(&current)
            }
        } else {
            let highest_serial = match (current.highest_serial, policy.version().as_serial()) {
                (Some(highest), Some(serial)) => Some(highest.max(serial)),
                (highest, serial) => highest.or(serial),
            };
            StoreSnapshot {
                active: Arc::new(policy),
                last_known_good: Some(Arc::clone(&current.active)),
                last_refresh: Some(now),
                generation: current.generation + 1,
                highest_serial,
            }
        };
        let next = Arc::new(next);
        self.state.store(Arc::clone(&next));

        EngineMetrics::inc(&self.metrics.refreshes_applied);
        info!(
            version = %next.active.version(),
            previous = %current.active.version(),
            enabled = next.active.is_enabled(),
            hosts = next.active.host_count(),
            unchanged,
            "policy refresh applied"
        );
        self.emit_transition(
            TransitionKind::Applied,
            &next.active,
            Some(&current.active),
            None,
        );
        Ok(())
    }

    /// Swap active and last-known-good. Operator action, so serial rollback
    /// protection does not apply.
    pub fn revert_to_last_known_good(&self) -> Result<(), ConfigError> {
        let _writer = self.refresh_lock.lock();
        let current = self.snapshot();
        let Some(previous) = current.last_known_good.clone() else {
            warn!("revert requested with no last-known-good policy");
            return Err(ConfigError::NoLastKnownGood);
        };

        let next = Arc::new(StoreSnapshot {
            active: previous,
            last_known_good: Some(Arc::clone(&current.active)),
            last_refresh: current.last_refresh,
            generation: current.generation + 1,
            highest_serial: current.highest_serial,
        });
        self.state.store(Arc::clone(&next));

        EngineMetrics::inc(&self.metrics.reverts);
        warn!(
            version = %next.active.version(),
            abandoned = %current.active.version(),
            "reverted to last-known-good policy"
        );
        self.emit_transition(
            TransitionKind::Reverted,
            &next.active,
            Some(&current.active),
            None,
        );
        Ok(())
    }

    fn emit_transition(
        &self,
        transition: TransitionKind,
        active: &Policy,
        previous: Option<&Policy>,
        error: Option<&ConfigError>,
    ) {
        self.telemetry
            .emit(&TelemetryEvent::ConfigTransition(ConfigEvent {
                transition,
                active_version: active.version().to_string(),
                previous_version: previous.map(|p| p.version().to_string()),
                error: error.map(ToString::to_string),
            }));
    }
}

/// Reject a serial below the highest one ever applied. Re-delivery of the
/// active policy is always accepted, including after a revert.
fn check_rollback(current: &StoreSnapshot, offered: &Policy) -> Result<(), ConfigError> {
    if *current.active == *offered {
        return Ok(());
    }
    if let (Some(highest), Some(offered)) = (current.highest_serial, offered.version().as_serial())
        && offered < highest
    {
        return Err(ConfigError::VersionRollback { offered, highest });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::CapturingSink;

    const KILL: &[u8] = br#"{"version": 1, "enabled": false, "hosts": {}}"#;
    const ON: &[u8] = br#"{"version": 2, "enabled": true, "hosts": {}}"#;

    fn store() -> (ConfigurationStore, Arc<CapturingSink>) {
        let sink = Arc::new(CapturingSink::new());
        (ConfigurationStore::new(sink.clone()), sink)
    }

    #[test]
    fn starts_disabled_and_stale() {
        let (store, _) = store();
        assert!(!store.current().is_enabled());
        assert!(store.last_known_good().is_none());
        assert!(store.is_stale(SystemTime::now(), Duration::from_secs(u64::MAX / 4)));
    }

    #[test]
    fn successful_refresh_rotates_last_known_good() {
        let (store, sink) = store();
        store.refresh(KILL).unwrap();
        store.refresh(ON).unwrap();
        assert!(store.current().is_enabled());
        assert_eq!(
            store.last_known_good().unwrap().version().as_serial(),
            Some(1)
        );
        assert_eq!(store.snapshot().generation, 2);
        assert_eq!(sink.transitions().len(), 2);
        assert_eq!(store.metrics().snapshot().refreshes_applied, 2);
    }

    #[test]
    fn failed_refresh_leaves_state_untouched() {
        let (store, sink) = store();
        store.refresh(ON).unwrap();
        let before = store.snapshot();
        let bad_inputs: [&[u8]; 4] = [b"{", b"[]", br#"{"enabled": true}"#, b""];
        for bad in bad_inputs {
            assert!(store.refresh(bad).is_err());
        }
        let after = store.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        let rejected = sink
            .transitions()
            .into_iter()
            .filter(|e| e.transition == TransitionKind::Rejected)
            .count();
        assert_eq!(rejected, 4);
    }

    #[test]
    fn older_serial_is_rejected() {
        let (store, _) = store();
        store.refresh(ON).unwrap();
        assert_eq!(
            store.refresh(KILL),
            Err(ConfigError::VersionRollback {
                offered: 1,
                highest: 2
            })
        );
        assert!(store.current().is_enabled());
    }

    #[test]
    fn unversioned_policy_does_not_reset_rollback_guard() {
        let (store, _) = store();
        store.refresh(br#"{"version": 6, "enabled": true, "hosts": {}}"#).unwrap();
        store.refresh(br#"{"enabled": true, "hosts": {}}"#).unwrap();
        assert_eq!(store.current().version().as_serial(), None);
        assert_eq!(store.snapshot().highest_serial, Some(6));

        assert_eq!(
            store.refresh(KILL),
            Err(ConfigError::VersionRollback {
                offered: 1,
                highest: 6
            })
        );
        assert!(store.current().is_enabled());

        store.refresh(br#"{"version": 7, "enabled": false, "hosts": {}}"#).unwrap();
        assert_eq!(store.snapshot().highest_serial, Some(7));
    }

    #[test]
    fn reverted_policy_can_be_redelivered() {
        let (store, _) = store();
        store.refresh(KILL).unwrap();
        store.refresh(ON).unwrap();
        store.revert_to_last_known_good().unwrap();
        assert_eq!(store.snapshot().highest_serial, Some(2));

        // The active policy again, not a rollback.
        store.refresh(KILL).unwrap();
        assert_eq!(store.current().version().as_serial(), Some(1));
        store.refresh(ON).unwrap();
        assert!(store.current().is_enabled());
    }

    #[test]
    fn held_snapshot_survives_later_swaps() {
        let (store, _) = store();
        store.refresh(KILL).unwrap();
        let held = store.snapshot();
        let held_policy = store.current();

        store.refresh(ON).unwrap();
        store.revert_to_last_known_good().unwrap();
        store.refresh(ON).unwrap();

        assert!(!held.active.is_enabled());
        assert!(!held_policy.is_enabled());
        assert_eq!(held.generation, 1);
        assert!(Arc::ptr_eq(&held.active, &held_policy));
        assert!(store.current().is_enabled());
        assert_eq!(store.snapshot().generation, 4);
    }

    #[test]
    fn identical_redelivery_only_renews_freshness() {
        let (store, _) = store();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        store.refresh_at(KILL, t0).unwrap();
        store.refresh_at(ON, t0).unwrap();
        let t1 = t0 + Duration::from_secs(60);
        store.refresh_at(ON, t1).unwrap();
        assert_eq!(store.last_refresh(), Some(t1));
        assert_eq!(
            store.last_known_good().unwrap().version().as_serial(),
            Some(1)
        );
    }

    #[test]
    fn revert_swaps_active_and_last_known_good() {
        let (store, sink) = store();
        assert_eq!(
            store.revert_to_last_known_good(),
            Err(ConfigError::NoLastKnownGood)
        );
        store.refresh(KILL).unwrap();
        store.refresh(ON).unwrap();
        store.revert_to_last_known_good().unwrap();
        assert!(!store.current().is_enabled());
        assert!(store.last_known_good().unwrap().is_enabled());
        assert_eq!(
            sink.transitions().last().unwrap().transition,
            TransitionKind::Reverted
        );
    }

    #[test]
    fn staleness_uses_last_refresh() {
        let (store, _) = store();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
        store.refresh_at(ON, t0).unwrap();
        let max_age = Duration::from_secs(300);
        assert!(!store.is_stale(t0 + Duration::from_secs(300), max_age));
        assert!(store.is_stale(t0 + Duration::from_secs(301), max_age));
        assert!(!store.is_stale(t0 - Duration::from_secs(5), max_age));
    }
}
