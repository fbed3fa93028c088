//! Document store capability.
//!
//! Documents live in one top-level collection and are addressed by ID. Each
//! document may own named subcollections of records addressed by record ID.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use score_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field map of a document or record.
pub type Document = serde_json::Map<String, Value>;

/// One record written by [`DocumentStore::batch_write`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchWrite {
    /// Parent document ID
    pub doc_id: String,
    /// Subcollection name
    pub subpath: String,
    /// Record ID; writing an existing ID replaces the record
    pub id: String,
    pub record: Document,
}

/// Storage operations the engine depends on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a document's top-level fields.
    async fn get(&self, doc_id: &str) -> Result<Option<Document>>;

    /// Upserts a document: provided fields overwrite, others are kept.
    async fn set_merge(&self, doc_id: &str, fields: Document) -> Result<()>;

    /// Writes all records or none of them.
    async fn batch_write(&self, writes: Vec<BatchWrite>) -> Result<()>;

    /// Lists a subcollection ordered by `order_by` ascending.
    async fn query(&self, doc_id: &str, subpath: &str, order_by: &str) -> Result<Vec<Document>>;
}

/// Stored form of a document with its subcollections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub fields: Document,
    #[serde(default)]
    pub subcollections: BTreeMap<String, BTreeMap<String, Document>>,
}

impl StoredDocument {
    pub fn merge(&mut self, fields: Document) {
        for (key, value) in fields {
            self.fields.insert(key, value);
        }
    }

    pub fn put(&mut self, subpath: &str, id: &str, record: Document) {
        self.subcollections
            .entry(subpath.to_string())
            .or_default()
            .insert(id.to_string(), record);
    }

    /// Subcollection records sorted by `order_by`. Ties keep ID order.
    pub fn ordered(&self, subpath: &str, order_by: &str) -> Vec<Document> {
        let mut records: Vec<Document> = self
            .subcollections
            .get(subpath)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| compare_values(a.get(order_by), b.get(order_by)));
        records
    }
}

/// Orders missing < numbers < strings; numbers numerically, strings lexically.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(_) => 3,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
