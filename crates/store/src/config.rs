//! Store configuration.

use std::path::PathBuf;
use std::sync::Arc;

use score_core::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::document::DocumentStore;
use crate::file::FileStore;
use crate::memory::MemoryStore;

/// Store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    File,
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_kind")]
    pub kind: StoreKind,
    /// Root directory for the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Collection holding one document per session
    #[serde(default = "default_sessions_collection")]
    pub sessions_collection: String,
    /// Subcollection holding a session's votes
    #[serde(default = "default_votes_subpath")]
    pub votes_subpath: String,
}

fn default_kind() -> StoreKind {
    StoreKind::File
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_sessions_collection() -> String {
    "streams".to_string()
}

fn default_votes_subpath() -> String {
    "messages".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            data_dir: default_data_dir(),
            sessions_collection: default_sessions_collection(),
            votes_subpath: default_votes_subpath(),
        }
    }
}

impl StoreConfig {
    /// Opens the configured backend.
    pub async fn open(&self) -> Result<Arc<dyn DocumentStore>> {
        let store: Arc<dyn DocumentStore> = match self.kind {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::File => Arc::new(
                FileStore::open(self.data_dir.join(&self.sessions_collection)).await?,
            ),
        };

        info!(
            kind = ?self.kind,
            collection = %self.sessions_collection,
            "Opened document store"
        );
        Ok(store)
    }
}
