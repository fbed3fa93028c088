//! Single owner of the open session and its pending votes.
//!
//! Chat ingestion, the batcher, and the reconciler all go through one mutex
//! here, held only for in-memory work and never across I/O.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use score_core::{ChatMessage, Polarity, Session, VoteEvent};
use telemetry::metrics;

use crate::buffer::PendingBuffer;

/// Result of offering a vote to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Accepted,
    /// Same message ID already seen in this session
    Duplicate,
    /// No session open; the vote is dropped
    NoSession,
}

/// Work for one flush: the pending votes at snapshot time.
#[derive(Debug, Clone)]
pub struct FlushWork {
    pub session_id: String,
    pub generation: u64,
    pub votes: Vec<VoteEvent>,
}

/// Everything the aggregator needs for one pass.
#[derive(Debug, Clone)]
pub struct AggregateInput {
    pub session_id: String,
    pub generation: u64,
    pub started_at: DateTime<Utc>,
    pub history: Vec<VoteEvent>,
}

/// A session removed from tracking, with whatever had not reached the store.
#[derive(Debug, Clone)]
pub struct ClosedSession {
    pub session: Session,
    /// Votes already persisted
    pub history: Vec<VoteEvent>,
    /// Votes still pending at close
    pub unflushed: Vec<VoteEvent>,
    /// Persisted scores do not cover `history`
    pub scores_stale: bool,
}

#[derive(Debug)]
struct Tracked {
    session: Session,
    generation: u64,
    history: Vec<VoteEvent>,
    pending: PendingBuffer,
    seen: HashSet<String>,
    scores_stale: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    open: Option<Tracked>,
    generations: u64,
}

/// Shared session state.
#[derive(Debug, Default)]
pub struct SessionTracker {
    state: Mutex<TrackerState>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `session` with its already persisted votes. Returns the
    /// generation tag that identifies this adoption.
    pub fn open(&self, session: Session, history: Vec<VoteEvent>) -> u64 {
        let mut state = self.state.lock();
        debug_assert!(state.open.is_none(), "session opened while another is tracked");

        state.generations += 1;
        let generation = state.generations;
        let seen = history.iter().map(|v| v.id.clone()).collect();
        let scores_stale = !history.is_empty();

        state.open = Some(Tracked {
            session,
            generation,
            history,
            pending: PendingBuffer::new(),
            seen,
            scores_stale,
        });
        metrics().pending_votes.set(0);
        generation
    }

    /// Stops tracking and hands back the session with its unpersisted state.
    pub fn close(&self) -> Option<ClosedSession> {
        let mut tracked = self.state.lock().open.take()?;
        let unflushed = tracked.pending.take_all();
        metrics().pending_votes.set(0);
        Some(ClosedSession {
            session: tracked.session,
            history: tracked.history,
            unflushed,
            scores_stale: tracked.scores_stale,
        })
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open.is_some()
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.lock().open.as_ref().map(|t| t.session.id.clone())
    }

    /// Copy of the tracked session's metadata.
    pub fn current(&self) -> Option<Session> {
        self.state.lock().open.as_ref().map(|t| t.session.clone())
    }

    /// Applies `f` to the tracked session if it is still `session_id`.
    pub fn update_session<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut state = self.state.lock();
        let tracked = state.open.as_mut().filter(|t| t.session.id == session_id)?;
        Some(f(&mut tracked.session))
    }

    /// Buffers a vote for the open session.
    pub fn record(&self, message: &ChatMessage, polarity: Polarity) -> Recorded {
        let mut state = self.state.lock();
        let Some(tracked) = state.open.as_mut() else {
            return Recorded::NoSession;
        };
        if !tracked.seen.insert(message.message_id.clone()) {
            return Recorded::Duplicate;
        }

        tracked
            .pending
            .push(VoteEvent::from_message(message, &tracked.session.id, polarity));
        metrics().pending_votes.set(tracked.pending.len() as u64);
        Recorded::Accepted
    }

    pub fn pending_len(&self) -> usize {
        self.state
            .lock()
            .open
            .as_ref()
            .map_or(0, |t| t.pending.len())
    }

    /// How long the oldest pending vote has waited for a flush.
    pub fn pending_age(&self) -> Option<Duration> {
        self.state.lock().open.as_ref().and_then(|t| t.pending.age())
    }

    pub fn history_len(&self) -> usize {
        self.state
            .lock()
            .open
            .as_ref()
            .map_or(0, |t| t.history.len())
    }

    /// Snapshot of pending votes, or `None` when there is nothing to flush
    /// and the persisted scores are current.
    pub fn take_work(&self) -> Option<FlushWork> {
        let state = self.state.lock();
        let tracked = state.open.as_ref()?;
        if tracked.pending.is_empty() && !tracked.scores_stale {
            return None;
        }
        Some(FlushWork {
            session_id: tracked.session.id.clone(),
            generation: tracked.generation,
            votes: tracked.pending.snapshot(),
        })
    }

    /// Moves the votes covered by `work` from pending into history once they
    /// are durable, marking scores stale. Returns the aggregation input, or
    /// `None` if the session changed in the meantime.
    pub fn commit(&self, work: &FlushWork) -> Option<AggregateInput> {
        let mut state = self.state.lock();
        let tracked = state
            .open
            .as_mut()
            .filter(|t| t.generation == work.generation)?;

        let drained = tracked.pending.drain_front(work.votes.len());
        if !drained.is_empty() {
            tracked.history.extend(drained);
            tracked.scores_stale = true;
        }
        metrics().pending_votes.set(tracked.pending.len() as u64);

        Some(AggregateInput {
            session_id: tracked.session.id.clone(),
            generation: tracked.generation,
            started_at: tracked.session.started_at,
            history: tracked.history.clone(),
        })
    }

    /// Marks the scores of `generation` as persisted.
    ///
    /// Only clears the flag when no newer votes were committed in between.
    pub fn scores_saved(&self, generation: u64, history_len: usize) {
        let mut state = self.state.lock();
        if let Some(tracked) = state
            .open
            .as_mut()
            .filter(|t| t.generation == generation && t.history.len() == history_len)
        {
            tracked.scores_stale = false;
        }
    }
}
