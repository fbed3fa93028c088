//! Internal telemetry for the score engine.
//!
//! Metrics live in-process and are periodically written to the log by the
//! scheduler; there is no external metrics exporter.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
