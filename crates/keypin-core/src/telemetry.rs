//! Telemetry events and sinks.
//!
//! Sinks are passive: `emit` must not block, and a sink failure is never
//! visible to the evaluation or refresh that produced the event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::evaluator::{PinSource, Reason, Verdict};

/// One evaluation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationEvent {
    pub host: String,
    pub verdict: Verdict,
    pub reason: Reason,
    pub policy_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_hash_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_source: Option<PinSource>,
    pub enforced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Applied,
    Rejected,
    Reverted,
}

/// A store state change, or a refused one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEvent {
    pub transition: TransitionKind,
    /// Version active after the transition.
    pub active_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Evaluation(EvaluationEvent),
    ConfigTransition(ConfigEvent),
}

/// Destination for telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &TelemetryEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&self, _event: &TelemetryEvent) {}
}

/// Keeps every event in memory. Intended for tests and the harness.
#[derive(Debug, Default)]
pub struct CapturingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl CapturingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Remove and return everything captured so far.
    pub fn drain(&self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn evaluations(&self) -> Vec<EvaluationEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TelemetryEvent::Evaluation(e) => Some(e.clone()),
                TelemetryEvent::ConfigTransition(_) => None,
            })
            .collect()
    }

    pub fn transitions(&self) -> Vec<ConfigEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TelemetryEvent::ConfigTransition(e) => Some(e.clone()),
                TelemetryEvent::Evaluation(_) => None,
            })
            .collect()
    }
}

impl TelemetrySink for CapturingSink {
    fn emit(&self, event: &TelemetryEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Hands events to a consumer thread through a bounded channel.
///
/// When the channel is full or the receiver is gone the event is dropped and
/// counted; the caller never waits.
#[derive(Debug)]
pub struct ChannelSink {
    tx: SyncSender<TelemetryEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<TelemetryEvent>) {
        let (tx, rx) = sync_channel(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for ChannelSink {
    fn emit(&self, event: &TelemetryEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
