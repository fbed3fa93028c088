//! Worker scheduler for the engine's loops.

use std::sync::Arc;

use broadcast::{BroadcastSource, ChatReceiver};
use docstore::SessionRepository;
use score_core::Extractor;
use telemetry::{health, metrics};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::finalizer::Finalizer;
use crate::ingest::ChatConsumer;
use crate::reconciler::Reconciler;
use crate::shutdown::ShutdownSignal;
use crate::tracker::SessionTracker;

/// Owns the shared pieces and spawns the long-running loops.
pub struct WorkerScheduler {
    config: WorkerConfig,
    broadcaster_id: String,
    source: Arc<dyn BroadcastSource>,
    repo: SessionRepository,
    extractor: Extractor,
    tracker: Arc<SessionTracker>,
}

impl WorkerScheduler {
    pub fn new(
        config: WorkerConfig,
        broadcaster_id: impl Into<String>,
        source: Arc<dyn BroadcastSource>,
        repo: SessionRepository,
        extractor: Extractor,
    ) -> Self {
        Self {
            config,
            broadcaster_id: broadcaster_id.into(),
            source,
            repo,
            extractor,
            tracker: Arc::new(SessionTracker::new()),
        }
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    /// Starts the reconciliation loop, the chat consumer, and the metrics
    /// logger. Every loop exits once `shutdown` fires.
    pub fn start(self, chat_rx: ChatReceiver, shutdown: ShutdownSignal) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let finalizer = Finalizer::new(
            self.source.clone(),
            self.repo.clone(),
            self.config.finalize_delay(),
            self.config.finalize_max_attempts(),
            shutdown.clone(),
        );
        let reconciler = Reconciler::new(
            self.broadcaster_id.clone(),
            self.tracker.clone(),
            self.source.clone(),
            self.repo.clone(),
            finalizer,
            self.config.aggregate_interval(),
        );

        let config = self.config.clone();
        let signal = shutdown.clone();
        handles.push(tokio::spawn(async move {
            run_reconciler(reconciler, config, signal).await;
        }));

        let consumer = ChatConsumer::new(self.tracker.clone(), self.extractor.clone());
        let signal = shutdown.clone();
        handles.push(tokio::spawn(async move {
            consumer.run(chat_rx, signal).await;
        }));

        let config = self.config.clone();
        let tracker = self.tracker.clone();
        handles.push(tokio::spawn(async move {
            run_metrics_log(config, tracker, shutdown).await;
        }));

        info!(broadcaster_id = %self.broadcaster_id, "Background workers started");
        handles
    }
}

async fn run_reconciler(mut reconciler: Reconciler, config: WorkerConfig, mut shutdown: ShutdownSignal) {
    let mut ticker = interval(config.reconcile_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let transition = reconciler.tick().await;
                debug!(?transition, "Reconcile tick");
            }
            _ = shutdown.triggered() => break,
        }
    }

    reconciler.shutdown().await;
    info!("Reconciler stopped");
}

async fn run_metrics_log(
    config: WorkerConfig,
    tracker: Arc<SessionTracker>,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = interval(config.metrics_log_interval());
    // The first tick fires immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = metrics().snapshot();
                let report = health().report();
                let oldest_pending_ms = tracker
                    .pending_age()
                    .map_or(0, |age| age.as_millis() as u64);
                info!(
                    chat_messages = snapshot.chat_messages_received,
                    votes_extracted = snapshot.votes_extracted,
                    votes_discarded = snapshot.votes_discarded,
                    votes_persisted = snapshot.votes_persisted,
                    batch_write_errors = snapshot.batch_write_errors,
                    metadata_errors = snapshot.metadata_errors,
                    pending_votes = snapshot.pending_votes,
                    oldest_pending_ms = oldest_pending_ms,
                    store_latency_mean_ms = snapshot.store_latency_mean_ms,
                    status = ?report.status,
                    "Metrics"
                );
            }
            _ = shutdown.triggered() => break,
        }
    }
}
