//! Operator tooling for keypin.
//!
//! This crate provides:
//! - Structured JSONL logs with a validated schema
//! - A telemetry sink that writes engine events into that log
//! - The operations behind the `keypin-harness` CLI: policy validation,
//!   one-shot evaluation, rollout inspection, pin rotation, SPKI hashing

pub mod error;
pub mod ops;
pub mod structured_log;
pub mod telemetry_log;

pub use error::HarnessError;
pub use structured_log::{LogEmitter, LogEntry, LogLevel, validate_log_file, validate_log_line};
pub use telemetry_log::JsonlTelemetrySink;
