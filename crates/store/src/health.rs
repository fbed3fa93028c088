//! Store health checks.

use crate::document::DocumentStore;
use tracing::{debug, error};

/// Document ID used for the startup probe; it is only ever read.
const PROBE_DOC_ID: &str = "health-probe";

/// Check that the store answers reads.
pub async fn check_connection(store: &dyn DocumentStore) -> bool {
    match store.get(PROBE_DOC_ID).await {
        Ok(_) => {
            debug!("Document store healthy");
            true
        }
        Err(e) => {
            error!("Document store health check failed: {}", e);
            false
        }
    }
}
