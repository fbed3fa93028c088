//! Finalization retry loop.
//!
//! After a session ends the platform takes a while to publish a processed
//! recording. The loop polls for it on a fixed delay and writes it to the
//! session once, then exits. At most one loop runs per session ID.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use broadcast::BroadcastSource;
use docstore::SessionRepository;
use parking_lot::Mutex;
use score_core::{Error, Recording, Result, SessionPatch};
use telemetry::metrics;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::shutdown::ShutdownSignal;

/// How a finalization loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Finalized { recording_id: String, attempts: u32 },
    /// Shutdown fired before a ready recording appeared
    Interrupted { attempts: u32 },
}

#[derive(Clone)]
pub struct Finalizer {
    source: Arc<dyn BroadcastSource>,
    repo: SessionRepository,
    delay: Duration,
    max_attempts: Option<u32>,
    active: Arc<Mutex<HashSet<String>>>,
    shutdown: ShutdownSignal,
}

/// Removes the session from the active set when the loop exits, however it
/// exits.
struct ActiveGuard {
    active: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.session_id);
    }
}

impl Finalizer {
    pub fn new(
        source: Arc<dyn BroadcastSource>,
        repo: SessionRepository,
        delay: Duration,
        max_attempts: Option<u32>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            source,
            repo,
            delay,
            max_attempts,
            active: Arc::new(Mutex::new(HashSet::new())),
            shutdown,
        }
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.active.lock().contains(session_id)
    }

    /// Starts a loop for `session_id` unless one is already running.
    pub fn spawn(
        &self,
        session_id: &str,
        broadcaster_id: &str,
    ) -> Option<JoinHandle<Result<FinalizeOutcome>>> {
        if !self.active.lock().insert(session_id.to_string()) {
            debug!(session_id = %session_id, "Finalization already running");
            return None;
        }

        let guard = ActiveGuard {
            active: self.active.clone(),
            session_id: session_id.to_string(),
        };
        let finalizer = self.clone();
        let broadcaster_id = broadcaster_id.to_string();

        Some(tokio::spawn(async move {
            let result = finalizer.run(&guard.session_id, &broadcaster_id).await;
            match &result {
                Ok(FinalizeOutcome::Finalized { recording_id, attempts }) => info!(
                    session_id = %guard.session_id,
                    recording_id = %recording_id,
                    attempts = attempts,
                    "Session finalized"
                ),
                Ok(FinalizeOutcome::Interrupted { attempts }) => info!(
                    session_id = %guard.session_id,
                    attempts = attempts,
                    "Finalization interrupted by shutdown"
                ),
                Err(e) => warn!(session_id = %guard.session_id, error = %e, "Finalization gave up"),
            }
            drop(guard);
            result
        }))
    }

    async fn run(&self, session_id: &str, broadcaster_id: &str) -> Result<FinalizeOutcome> {
        let mut shutdown = self.shutdown.clone();
        let mut attempts = 0u32;

        loop {
            if shutdown.is_triggered() {
                return Ok(FinalizeOutcome::Interrupted { attempts });
            }

            attempts += 1;
            metrics().finalization_attempts.inc();

            if let Some(recording) = self.poll(session_id, broadcaster_id, attempts).await {
                let recording_id = recording.id.clone();
                match self
                    .repo
                    .save(session_id, &SessionPatch::finalized(recording))
                    .await
                {
                    Ok(()) => {
                        metrics().finalizations_completed.inc();
                        return Ok(FinalizeOutcome::Finalized {
                            recording_id,
                            attempts,
                        });
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Failed to save final recording");
                    }
                }
            }

            if self.max_attempts.is_some_and(|max| attempts >= max) {
                metrics().finalizations_incomplete.inc();
                return Err(Error::finalization_incomplete(session_id, attempts));
            }

            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = shutdown.triggered() => {
                    return Ok(FinalizeOutcome::Interrupted { attempts });
                }
            }
        }
    }

    /// One poll: the latest recording if it is ready and belongs to the
    /// session.
    async fn poll(&self, session_id: &str, broadcaster_id: &str, attempt: u32) -> Option<Recording> {
        match self.source.latest_recording(broadcaster_id).await {
            Ok(Some(recording)) if !recording.belongs_to(session_id) => {
                debug!(
                    session_id = %session_id,
                    recording_id = %recording.id,
                    attempt = attempt,
                    "Latest recording is from another stream"
                );
                None
            }
            Ok(Some(recording)) if recording.is_ready() => Some(recording),
            Ok(Some(_)) => {
                debug!(session_id = %session_id, attempt = attempt, "Recording still processing");
                None
            }
            Ok(None) => {
                debug!(session_id = %session_id, attempt = attempt, "No recording yet");
                None
            }
            Err(e) => {
                warn!(session_id = %session_id, attempt = attempt, error = %e, "Recording lookup failed");
                None
            }
        }
    }
}
