//! # keypin-core
//!
//! Client-side public-key pinning engine with remote control.
//!
//! A remotely delivered JSON policy says which hosts are pinned to which
//! SPKI hashes, for which client versions and for what share of the
//! population. The engine validates that policy wholesale, keeps it next to
//! the last known good one, and answers one question per TLS connection:
//! does any key in the presented chain match the pins for this host?
//!
//! Pieces:
//! - [`pin`]: `PublicKeyHash` and `PinSet`
//! - [`policy`]: parsing, validation and canonical serialization
//! - [`rollout`]: deterministic percentage selection
//! - [`store`]: atomic active / last-known-good holder
//! - [`evaluator`]: the per-connection decision
//! - [`rotation`]: pure add/retire helpers for pin sets
//! - [`telemetry`]: events and passive sinks
//!
//! The engine never performs the TLS handshake and never fetches the policy.
//! Transports hash the presented chain with [`PublicKeyHash::of_spki_der`]
//! and act on [`EvaluationResult::should_reject`].

pub mod builtin;
pub mod config;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod hostname;
pub mod metrics;
pub mod pin;
pub mod policy;
pub mod rollout;
pub mod rotation;
pub mod store;
pub mod telemetry;
pub mod version;

pub use builtin::BuiltinPins;
pub use config::{EngineConfig, PinningMode};
pub use error::{ConfigError, PinViolation};
pub use evaluator::{
    EvaluationRequest, EvaluationResult, PinEvaluator, PinSource, Reason, Verdict,
};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use pin::{MIN_PINS, PinSet, PublicKeyHash};
pub use policy::{FailureMode, FallbackRule, HostPolicy, Policy, PolicyVersion};
pub use rollout::{RolloutRule, RolloutSeed, bucket_of, is_selected};
pub use rotation::{RetireGuard, with_added_pin, with_retired_pin};
pub use store::{ConfigurationStore, StoreSnapshot};
pub use telemetry::{
    CapturingSink, ChannelSink, ConfigEvent, EvaluationEvent, NullSink, TelemetryEvent,
    TelemetrySink, TransitionKind,
};
pub use version::ClientVersion;
