//! Persistence batcher and the aggregation tick that drives it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use docstore::SessionRepository;
use score_core::{aggregate, Result, SessionPatch};
use telemetry::metrics;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::shutdown::{shutdown_channel, ShutdownTrigger};
use crate::tracker::SessionTracker;

/// Result of one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing pending and scores already current
    Idle,
    /// The session closed or changed while the batch was in flight
    Abandoned,
    Flushed { persisted: usize },
}

/// Writes pending votes in one batch, then recomputes and saves the series.
#[derive(Clone)]
pub struct PersistenceBatcher {
    tracker: Arc<SessionTracker>,
    repo: SessionRepository,
}

impl PersistenceBatcher {
    pub fn new(tracker: Arc<SessionTracker>, repo: SessionRepository) -> Self {
        Self { tracker, repo }
    }

    /// Runs one flush. A failed batch write leaves the pending buffer intact
    /// so the same votes go out on the next call.
    pub async fn flush(&self) -> Result<FlushOutcome> {
        let Some(work) = self.tracker.take_work() else {
            return Ok(FlushOutcome::Idle);
        };

        let persisted = work.votes.len();
        if persisted > 0 {
            if let Err(e) = self.repo.write_votes(&work.session_id, &work.votes).await {
                metrics().batch_write_errors.inc();
                return Err(e);
            }
            metrics().batch_writes.inc();
            metrics().votes_persisted.inc_by(persisted as u64);
            debug!(session_id = %work.session_id, count = persisted, "Persisted vote batch");
        }

        let Some(input) = self.tracker.commit(&work) else {
            debug!(session_id = %work.session_id, "Session changed during flush");
            return Ok(FlushOutcome::Abandoned);
        };

        let series = aggregate(&input.session_id, input.started_at, &input.history)?;
        let uptime = (Utc::now() - input.started_at).max(chrono::Duration::zero());
        self.repo
            .save(&input.session_id, &SessionPatch::scores(series, uptime))
            .await?;

        metrics().aggregations.inc();
        self.tracker
            .scores_saved(input.generation, input.history.len());

        Ok(FlushOutcome::Flushed { persisted })
    }
}

/// The fine-grained tick that runs [`PersistenceBatcher::flush`] while a
/// session is live.
pub struct AggregationTask {
    trigger: ShutdownTrigger,
    handle: JoinHandle<()>,
}

impl AggregationTask {
    pub fn spawn(batcher: PersistenceBatcher, period: Duration) -> Self {
        let (trigger, mut signal) = shutdown_channel();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = batcher.flush().await {
                            warn!(error = %e, "Flush failed, retrying next tick");
                        }
                    }
                    _ = signal.triggered() => break,
                }
            }

            // Last flush so votes from the final tick land in this session.
            match batcher.flush().await {
                Ok(FlushOutcome::Flushed { persisted }) => {
                    info!(persisted = persisted, "Final flush completed");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Final flush failed"),
            }
        });

        Self { trigger, handle }
    }

    /// Stops the tick and waits for the final flush.
    pub async fn stop(self) {
        self.trigger.trigger();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Aggregation task panicked");
        }
    }
}
