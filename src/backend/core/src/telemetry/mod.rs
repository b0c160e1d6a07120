//! Telemetry: structured logging for the console core.
//!
//! Error and batch counters go through the `metrics` facade at their call
//! sites; the embedding process decides which recorder, if any, to install.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig, AUDIT_TARGET};
