//! Broadcast metadata source.

use async_trait::async_trait;
use score_core::{Category, LiveStream, Recording, Result};

/// Read-only view of a broadcaster's live status and recordings.
///
/// Every lookup may legitimately find nothing; `Ok(None)` is not an error.
#[async_trait]
pub trait BroadcastSource: Send + Sync {
    /// The broadcaster's current live broadcast, if live.
    async fn live_stream(&self, broadcaster_id: &str) -> Result<Option<LiveStream>>;

    /// The broadcaster's most recent recording.
    async fn latest_recording(&self, broadcaster_id: &str) -> Result<Option<Recording>>;

    /// Resolves a category ID to its display data.
    async fn category(&self, category_id: &str) -> Result<Option<Category>>;
}
