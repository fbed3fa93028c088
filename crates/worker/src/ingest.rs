//! Chat consumer: turns inbound chat messages into buffered votes.

use std::sync::Arc;

use broadcast::ChatReceiver;
use score_core::{ChatMessage, Extractor};
use telemetry::metrics;
use tracing::{debug, info};

use crate::shutdown::ShutdownSignal;
use crate::tracker::{Recorded, SessionTracker};

/// What happened to one chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// No vote marker in the text
    NotAVote,
    Vote(Recorded),
}

pub struct ChatConsumer {
    tracker: Arc<SessionTracker>,
    extractor: Extractor,
}

impl ChatConsumer {
    pub fn new(tracker: Arc<SessionTracker>, extractor: Extractor) -> Self {
        Self { tracker, extractor }
    }

    pub fn handle(&self, message: &ChatMessage) -> Ingested {
        metrics().chat_messages_received.inc();

        let Some(polarity) = self.extractor.classify(&message.text) else {
            return Ingested::NotAVote;
        };

        let recorded = self.tracker.record(message, polarity);
        match recorded {
            Recorded::Accepted => {
                metrics().votes_extracted.inc();
            }
            Recorded::NoSession => {
                metrics().votes_discarded.inc();
                debug!(message_id = %message.message_id, "Discarding vote outside a live session");
            }
            Recorded::Duplicate => {
                debug!(message_id = %message.message_id, "Ignoring duplicate vote");
            }
        }
        Ingested::Vote(recorded)
    }

    /// Drains `rx` until the channel closes or shutdown fires.
    pub async fn run(&self, mut rx: ChatReceiver, mut shutdown: ShutdownSignal) {
        info!("Chat consumer started");
        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => {
                        self.handle(&message);
                    }
                    None => {
                        info!("Chat channel closed");
                        break;
                    }
                },
                _ = shutdown.triggered() => break,
            }
        }
        info!("Chat consumer stopped");
    }
}
