//! Lifecycle reconciler.
//!
//! Each tick compares what the metadata source reports against the session
//! the tracker holds and performs the matching transition. Decisions are
//! re-derived from observable state every tick, so a failed tick is simply
//! retried by the next one.

use std::sync::Arc;
use std::time::Duration;

use broadcast::BroadcastSource;
use chrono::Utc;
use docstore::SessionRepository;
use score_core::{aggregate, Category, LiveStream, Result, Session, SessionPatch, VoteEvent};
use telemetry::{health, metrics};
use tracing::{debug, info, warn};

use crate::batcher::{AggregationTask, PersistenceBatcher};
use crate::finalizer::Finalizer;
use crate::tracker::{ClosedSession, SessionTracker};

/// A session that went offline whose closing writes have not all landed.
/// Retried at the start of every tick until they do.
#[derive(Debug)]
struct Ending {
    session: Session,
    history: Vec<VoteEvent>,
    unflushed: Vec<VoteEvent>,
    scores_stale: bool,
    marked_ended: bool,
    uptime: chrono::Duration,
}

impl Ending {
    fn new(closed: ClosedSession) -> Self {
        let uptime = closed.session.uptime(Utc::now());
        Self {
            session: closed.session,
            history: closed.history,
            unflushed: closed.unflushed,
            scores_stale: closed.scores_stale,
            marked_ended: false,
            uptime,
        }
    }

    /// Writes leftover votes, their scores, and the ended state. Steps that
    /// succeed are not repeated.
    async fn complete(&mut self, repo: &SessionRepository) -> Result<()> {
        let flushed = self.flush_remaining(repo).await;
        if !self.marked_ended {
            repo.save(&self.session.id, &SessionPatch::ended(self.uptime))
                .await?;
            self.marked_ended = true;
        }
        flushed
    }

    async fn flush_remaining(&mut self, repo: &SessionRepository) -> Result<()> {
        if !self.unflushed.is_empty() {
            if let Err(e) = repo.write_votes(&self.session.id, &self.unflushed).await {
                metrics().batch_write_errors.inc();
                return Err(e);
            }
            metrics().batch_writes.inc();
            metrics().votes_persisted.inc_by(self.unflushed.len() as u64);
            info!(session_id = %self.session.id, count = self.unflushed.len(), "Persisted votes left at session end");
            self.history.append(&mut self.unflushed);
            self.scores_stale = true;
        }

        if self.scores_stale {
            let series = aggregate(&self.session.id, self.session.started_at, &self.history)?;
            repo.save(&self.session.id, &SessionPatch::scores(series, self.uptime))
                .await?;
            metrics().aggregations.inc();
            self.scores_stale = false;
        }
        Ok(())
    }
}

/// What one reconciliation tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Metadata unavailable, adoption failed, or an ended session's writes
    /// are still failing; nothing changed
    Unknown,
    /// Offline and no session open
    Idle,
    Started { session_id: String },
    Continued { session_id: String },
    Ended { session_id: String },
    /// A different session went live while one was open
    Replaced { ended: String, started: String },
}

pub struct Reconciler {
    broadcaster_id: String,
    tracker: Arc<SessionTracker>,
    source: Arc<dyn BroadcastSource>,
    repo: SessionRepository,
    batcher: PersistenceBatcher,
    finalizer: Finalizer,
    aggregate_interval: Duration,
    aggregation: Option<AggregationTask>,
    ending: Option<Ending>,
}

impl Reconciler {
    pub fn new(
        broadcaster_id: impl Into<String>,
        tracker: Arc<SessionTracker>,
        source: Arc<dyn BroadcastSource>,
        repo: SessionRepository,
        finalizer: Finalizer,
        aggregate_interval: Duration,
    ) -> Self {
        let batcher = PersistenceBatcher::new(tracker.clone(), repo.clone());
        Self {
            broadcaster_id: broadcaster_id.into(),
            tracker,
            source,
            repo,
            batcher,
            finalizer,
            aggregate_interval,
            aggregation: None,
            ending: None,
        }
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    pub fn finalizer(&self) -> &Finalizer {
        &self.finalizer
    }

    /// Whether the aggregation tick is running.
    pub fn is_aggregating(&self) -> bool {
        self.aggregation.is_some()
    }

    /// Whether an ended session still has writes outstanding.
    pub fn is_ending(&self) -> bool {
        self.ending.is_some()
    }

    /// Runs one reconciliation pass.
    pub async fn tick(&mut self) -> Transition {
        if !self.finish_ending().await {
            return Transition::Unknown;
        }

        let live = match self.source.live_stream(&self.broadcaster_id).await {
            Ok(live) => {
                health().metadata.set_healthy();
                live
            }
            Err(e) => {
                health().metadata.set_unhealthy(e.to_string());
                warn!(error = %e, "Live status unavailable, skipping tick");
                return Transition::Unknown;
            }
        };

        match (self.tracker.session_id(), live) {
            (None, None) => Transition::Idle,
            (None, Some(live)) => match self.adopt(&live).await {
                Ok(()) => Transition::Started { session_id: live.id },
                Err(e) => {
                    warn!(session_id = %live.id, error = %e, "Failed to adopt session");
                    Transition::Unknown
                }
            },
            (Some(current), Some(live)) if current == live.id => {
                self.refresh(&live).await;
                Transition::Continued { session_id: current }
            }
            (Some(current), Some(live)) => {
                info!(ended = %current, started = %live.id, "New session detected");
                if !self.end_session().await {
                    return Transition::Ended { session_id: current };
                }
                match self.adopt(&live).await {
                    Ok(()) => Transition::Replaced {
                        ended: current,
                        started: live.id,
                    },
                    Err(e) => {
                        warn!(session_id = %live.id, error = %e, "Failed to adopt session");
                        Transition::Ended { session_id: current }
                    }
                }
            }
            (Some(current), None) => {
                self.end_session().await;
                Transition::Ended { session_id: current }
            }
        }
    }

    /// Stops the aggregation tick without ending the session. The session
    /// stays live in the store and is resumed on the next start.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.aggregation.take() {
            task.stop().await;
        }
        if !self.finish_ending().await {
            if let Some(ending) = &self.ending {
                warn!(
                    session_id = %ending.session.id,
                    unflushed = ending.unflushed.len(),
                    "Session end still unpersisted at shutdown"
                );
            }
        }
    }

    /// Offline → live. Nothing is tracked unless the session document was
    /// written.
    async fn adopt(&mut self, live: &LiveStream) -> Result<()> {
        let prior = self.repo.load_session(&live.id).await?;
        let history = self.repo.load_votes(&live.id).await?;

        let mut session = Session::from_live(live);
        if let Some(prior) = prior {
            info!(session_id = %live.id, votes = history.len(), "Resuming session");
            session.started_at = prior.started_at;
            session.categories = prior.categories;
            session.recording = prior.recording;
        }

        if let Some(category) = self.resolve_category(&session, &live.category_id).await {
            session.add_category(category);
        }

        match self.source.latest_recording(&self.broadcaster_id).await {
            Ok(Some(recording)) if recording.belongs_to(&session.id) => {
                session.recording = Some(recording);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Recording lookup failed during adoption"),
        }

        self.repo.save(&session.id, &SessionPatch::adopt(&session)).await?;

        info!(
            session_id = %session.id,
            title = %session.title,
            started_at = %session.started_at,
            "Session started"
        );
        metrics().sessions_started.inc();

        self.tracker.open(session, history);
        self.aggregation = Some(AggregationTask::spawn(
            self.batcher.clone(),
            self.aggregate_interval,
        ));
        Ok(())
    }

    /// Live → live, same session: append a new category and pick up a newer
    /// recording.
    async fn refresh(&mut self, live: &LiveStream) {
        let Some(session) = self.tracker.current() else {
            return;
        };

        if let Some(category) = self.resolve_category(&session, &live.category_id).await {
            let mut categories = session.categories.clone();
            categories.push(category.clone());
            match self
                .repo
                .save(&session.id, &SessionPatch::categories(categories))
                .await
            {
                Ok(()) => {
                    info!(session_id = %session.id, category = %category.name, "Category added");
                    self.tracker
                        .update_session(&session.id, |s| s.add_category(category));
                }
                Err(e) => warn!(session_id = %session.id, error = %e, "Failed to save categories"),
            }
        }

        let recording = match self.source.latest_recording(&self.broadcaster_id).await {
            Ok(Some(recording)) => recording,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Recording lookup failed");
                return;
            }
        };
        let known = session.recording.as_ref().map(|r| r.id.as_str());
        if known == Some(recording.id.as_str()) || !recording.belongs_to(&session.id) {
            return;
        }

        match self
            .repo
            .save(&session.id, &SessionPatch::recording(recording.clone()))
            .await
        {
            Ok(()) => {
                info!(session_id = %session.id, recording_id = %recording.id, "New recording found");
                self.tracker
                    .update_session(&session.id, |s| s.recording = Some(recording));
            }
            Err(e) => warn!(session_id = %session.id, error = %e, "Failed to save recording"),
        }
    }

    /// Category to append for `category_id`, if it is new and resolvable.
    async fn resolve_category(&self, session: &Session, category_id: &str) -> Option<Category> {
        if category_id.is_empty() || session.has_category(category_id) {
            return None;
        }
        match self.source.category(category_id).await {
            Ok(category) => category,
            Err(e) => {
                warn!(category_id = %category_id, error = %e, "Category lookup failed");
                None
            }
        }
    }

    /// Live → offline for the tracked session. Returns whether every
    /// closing write landed; the rest are retried by later ticks.
    async fn end_session(&mut self) -> bool {
        if let Some(task) = self.aggregation.take() {
            task.stop().await;
        }
        let Some(closed) = self.tracker.close() else {
            return true;
        };

        let ending = Ending::new(closed);
        info!(
            session_id = %ending.session.id,
            uptime_minutes = ending.uptime.num_minutes(),
            "Session ended"
        );
        metrics().sessions_ended.inc();
        self.ending = Some(ending);
        self.finish_ending().await
    }

    /// Retries the outstanding writes of an ended session, then hands it to
    /// the finalizer. Returns false while writes are still failing.
    async fn finish_ending(&mut self) -> bool {
        let Some(ending) = self.ending.as_mut() else {
            return true;
        };
        if let Err(e) = ending.complete(&self.repo).await {
            warn!(
                session_id = %ending.session.id,
                unflushed = ending.unflushed.len(),
                error = %e,
                "Failed to persist session end, retrying next tick"
            );
            return false;
        }

        let Some(ending) = self.ending.take() else {
            return true;
        };
        if self
            .finalizer
            .spawn(&ending.session.id, &ending.session.broadcaster_id)
            .is_none()
        {
            debug!(session_id = %ending.session.id, "Finalizer already running");
        }
        true
    }
}
