//! In-memory document store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use score_core::Result;

use crate::document::{BatchWrite, Document, DocumentStore, StoredDocument};

/// Process-local store. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, StoredDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a subcollection.
    pub fn record_count(&self, doc_id: &str, subpath: &str) -> usize {
        self.docs
            .lock()
            .get(doc_id)
            .and_then(|d| d.subcollections.get(subpath))
            .map_or(0, |records| records.len())
    }

    /// Full stored form of a document.
    pub fn snapshot(&self, doc_id: &str) -> Option<StoredDocument> {
        self.docs.lock().get(doc_id).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, doc_id: &str) -> Result<Option<Document>> {
        Ok(self.docs.lock().get(doc_id).map(|d| d.fields.clone()))
    }

    async fn set_merge(&self, doc_id: &str, fields: Document) -> Result<()> {
        self.docs
            .lock()
            .entry(doc_id.to_string())
            .or_default()
            .merge(fields);
        Ok(())
    }

    async fn batch_write(&self, writes: Vec<BatchWrite>) -> Result<()> {
        // One lock for the whole batch keeps it all-or-nothing for readers.
        let mut docs = self.docs.lock();
        for write in writes {
            docs.entry(write.doc_id)
                .or_default()
                .put(&write.subpath, &write.id, write.record);
        }
        Ok(())
    }

    async fn query(&self, doc_id: &str, subpath: &str, order_by: &str) -> Result<Vec<Document>> {
        Ok(self
            .docs
            .lock()
            .get(doc_id)
            .map(|d| d.ordered(subpath, order_by))
            .unwrap_or_default())
    }
}
