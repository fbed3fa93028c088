//! Typed session persistence on top of a [`DocumentStore`].

use std::sync::Arc;
use std::time::Instant;

use score_core::{Error, Result, Session, SessionPatch, StoreErrorCode, VoteEvent, SENT_AT_FIELD};
use serde_json::Value;
use telemetry::{health, metrics};
use tracing::debug;

use crate::document::{BatchWrite, Document, DocumentStore};

/// Reads and writes sessions and their votes.
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn DocumentStore>,
    votes_subpath: String,
}

impl SessionRepository {
    pub fn new(store: Arc<dyn DocumentStore>, votes_subpath: impl Into<String>) -> Self {
        Self {
            store,
            votes_subpath: votes_subpath.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Loads the persisted session document, if any.
    pub async fn load_session(&self, session_id: &str) -> Result<Option<Session>> {
        let fields = observe(self.store.get(session_id).await)?;
        let Some(mut fields) = fields else {
            return Ok(None);
        };

        // Documents created only by vote batches have no metadata yet.
        if !fields.contains_key("started_at") {
            return Ok(None);
        }
        fields
            .entry("id".to_string())
            .or_insert_with(|| Value::String(session_id.to_string()));

        serde_json::from_value(Value::Object(fields))
            .map(Some)
            .map_err(|e| corrupt(session_id, e))
    }

    /// Loads every persisted vote of a session ordered by send time.
    pub async fn load_votes(&self, session_id: &str) -> Result<Vec<VoteEvent>> {
        let records = observe(
            self.store
                .query(session_id, &self.votes_subpath, SENT_AT_FIELD)
                .await,
        )?;

        records
            .into_iter()
            .map(|record| {
                serde_json::from_value(Value::Object(record)).map_err(|e| corrupt(session_id, e))
            })
            .collect()
    }

    /// Merges a partial update into the session document.
    pub async fn save(&self, session_id: &str, patch: &SessionPatch) -> Result<()> {
        let fields = to_document(patch)?;
        let start = Instant::now();
        observe(self.store.set_merge(session_id, fields).await)?;
        metrics()
            .store_latency_ms
            .observe(start.elapsed().as_millis() as u64);
        debug!(session_id = %session_id, "Saved session fields");
        Ok(())
    }

    /// Writes votes as one batch keyed by vote ID.
    pub async fn write_votes(&self, session_id: &str, votes: &[VoteEvent]) -> Result<()> {
        let writes = votes
            .iter()
            .map(|vote| {
                Ok(BatchWrite {
                    doc_id: session_id.to_string(),
                    subpath: self.votes_subpath.clone(),
                    id: vote.id.clone(),
                    record: to_document(vote)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let start = Instant::now();
        observe(self.store.batch_write(writes).await)?;
        metrics()
            .store_latency_ms
            .observe(start.elapsed().as_millis() as u64);
        Ok(())
    }
}

fn to_document<T: serde::Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::internal(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

fn corrupt(session_id: &str, e: serde_json::Error) -> Error {
    Error::store(
        StoreErrorCode::Corrupt,
        format!("session {}: {}", session_id, e),
    )
}

/// Records store health from the outcome of a store call.
fn observe<T>(result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => health().store.set_healthy(),
        Err(e) => health().store.set_unhealthy(e.to_string()),
    }
    result
}
