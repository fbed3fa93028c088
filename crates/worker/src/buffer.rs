//! Pending vote buffer.

use std::time::{Duration, Instant};

use score_core::VoteEvent;

/// Votes extracted since the last successful flush.
///
/// Flushing is two-phase: [`snapshot`](Self::snapshot) copies what is
/// pending, and only after the copy is durably written does
/// [`drain_front`](Self::drain_front) remove exactly those votes. Votes pushed
/// in between stay for the next flush.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    events: Vec<VoteEvent>,
    oldest: Option<Instant>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: VoteEvent) {
        if self.events.is_empty() {
            self.oldest = Some(Instant::now());
        }
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// How long the oldest pending vote has waited.
    pub fn age(&self) -> Option<Duration> {
        self.oldest.map(|t| t.elapsed())
    }

    /// Copy of everything pending, in arrival order.
    pub fn snapshot(&self) -> Vec<VoteEvent> {
        self.events.clone()
    }

    /// Removes the first `n` votes (those covered by an earlier snapshot).
    pub fn drain_front(&mut self, n: usize) -> Vec<VoteEvent> {
        let n = n.min(self.events.len());
        let drained: Vec<_> = self.events.drain(..n).collect();
        self.oldest = if self.events.is_empty() {
            None
        } else {
            Some(Instant::now())
        };
        drained
    }

    /// Removes and returns everything pending.
    pub fn take_all(&mut self) -> Vec<VoteEvent> {
        self.oldest = None;
        std::mem::take(&mut self.events)
    }
}
