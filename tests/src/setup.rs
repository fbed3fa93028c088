//! Common test setup functions.

use std::sync::Arc;
use std::time::Duration;

use docstore::SessionRepository;
use score_core::{ChatMessage, Extractor, Session};
use worker::{
    shutdown_channel, ChatConsumer, Finalizer, Ingested, PersistenceBatcher, Reconciler,
    SessionTracker, ShutdownTrigger,
};

use crate::fixtures::BROADCASTER_ID;
use crate::mocks::{FlakyStore, MockBroadcastSource};

/// Aggregation tick long enough that tests drive flushes by hand.
const MANUAL_TICK: Duration = Duration::from_secs(3600);

/// Wired engine over mocks.
///
/// Ticks are driven explicitly: `reconciler.tick()` for lifecycle and
/// `batcher.flush()` for persistence, so scenarios are deterministic.
pub struct TestContext {
    pub source: Arc<MockBroadcastSource>,
    pub store: Arc<FlakyStore>,
    pub repo: SessionRepository,
    pub tracker: Arc<SessionTracker>,
    pub batcher: PersistenceBatcher,
    pub reconciler: Reconciler,
    pub consumer: ChatConsumer,
    pub shutdown: ShutdownTrigger,
}

impl TestContext {
    /// Context whose finalizer retries every `finalize_delay`, up to
    /// `max_attempts` (`None` for unbounded).
    pub fn new(finalize_delay: Duration, max_attempts: Option<u32>) -> Self {
        let source = MockBroadcastSource::new();
        let store = FlakyStore::new();
        let repo = SessionRepository::new(store.clone(), "messages");
        let tracker = Arc::new(SessionTracker::new());
        let (shutdown, signal) = shutdown_channel();

        let finalizer = Finalizer::new(
            source.clone(),
            repo.clone(),
            finalize_delay,
            max_attempts,
            signal,
        );
        let reconciler = Reconciler::new(
            BROADCASTER_ID,
            tracker.clone(),
            source.clone(),
            repo.clone(),
            finalizer,
            MANUAL_TICK,
        );
        let batcher = PersistenceBatcher::new(tracker.clone(), repo.clone());
        let consumer = ChatConsumer::new(tracker.clone(), Extractor::default());

        Self {
            source,
            store,
            repo,
            tracker,
            batcher,
            reconciler,
            consumer,
            shutdown,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(Duration::from_millis(5), Some(50))
    }

    /// Feeds chat messages through the consumer.
    pub fn chat(&self, messages: &[ChatMessage]) -> Vec<Ingested> {
        messages.iter().map(|m| self.consumer.handle(m)).collect()
    }

    /// Session document as the repository reads it back.
    pub async fn stored_session(&self, session_id: &str) -> Option<Session> {
        self.repo
            .load_session(session_id)
            .await
            .expect("session document should decode")
    }

    /// Waits until no finalization loop runs for `session_id`.
    pub async fn wait_for_finalizer(&self, session_id: &str) {
        for _ in 0..400 {
            if !self.reconciler.finalizer().is_running(session_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("finalizer for {} did not finish", session_id);
    }
}
