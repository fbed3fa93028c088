//! Background loops for the score engine.
//!
//! - Reconciler (offline/live transitions, session setup and teardown)
//! - Persistence batcher (vote batches and score aggregation)
//! - Finalizer (waits for the processed recording after a session ends)
//! - Chat consumer (votes into the pending buffer)

pub mod batcher;
pub mod buffer;
pub mod config;
pub mod finalizer;
pub mod ingest;
pub mod reconciler;
pub mod scheduler;
pub mod shutdown;
pub mod tracker;

pub use batcher::{AggregationTask, FlushOutcome, PersistenceBatcher};
pub use config::WorkerConfig;
pub use finalizer::{FinalizeOutcome, Finalizer};
pub use ingest::{ChatConsumer, Ingested};
pub use reconciler::{Reconciler, Transition};
pub use scheduler::WorkerScheduler;
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use tracker::{Recorded, SessionTracker};
