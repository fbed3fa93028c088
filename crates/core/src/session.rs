//! Broadcast session types.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::aggregate::{IntervalBucket, ScoreSeries, ScoreSummary};

/// Preview URL served while a recording is still being processed.
const PLACEHOLDER_PREVIEW_PATTERN: &str = r"/404_processing_%\{width\}x%\{height\}\.png$";

static PLACEHOLDER_PREVIEW_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(PLACEHOLDER_PREVIEW_PATTERN).expect("invalid placeholder preview pattern")
});

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Live,
    Ended,
}

/// Activity/category a broadcast was in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub box_art_url: String,
}

/// Recording (VOD) of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    /// ID of the live stream the recording was made from, when known
    pub stream_id: Option<String>,
    pub user_id: String,
    pub user_name: String,
    pub title: String,
    pub created_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
    pub thumbnail_url: String,
    pub duration: String,
}

impl Recording {
    /// Whether the preview is present and not the processing placeholder.
    pub fn is_ready(&self) -> bool {
        !self.thumbnail_url.is_empty() && !PLACEHOLDER_PREVIEW_REGEX.is_match(&self.thumbnail_url)
    }

    /// Whether this recording may belong to `session_id`. Recordings without
    /// a stream reference are accepted.
    pub fn belongs_to(&self, session_id: &str) -> bool {
        self.stream_id
            .as_deref()
            .map_or(true, |id| id.is_empty() || id == session_id)
    }
}

/// A broadcast currently reported live by the metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStream {
    /// Source-provided session ID
    pub id: String,
    pub broadcaster_id: String,
    pub broadcaster_name: String,
    /// Empty when the broadcaster has no category set
    pub category_id: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub thumbnail_url: String,
}

/// Persisted view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub broadcaster_id: String,
    #[serde(default)]
    pub broadcaster_name: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub recording: Option<Recording>,
    #[serde(default)]
    pub uptime_minutes: Option<i64>,
    #[serde(default)]
    pub summary: ScoreSummary,
    #[serde(default)]
    pub series: Vec<IntervalBucket>,
}

impl Session {
    /// Creates a pending session from a live record.
    pub fn from_live(live: &LiveStream) -> Self {
        Self {
            id: live.id.clone(),
            state: SessionState::Pending,
            started_at: live.started_at,
            title: live.title.clone(),
            broadcaster_id: live.broadcaster_id.clone(),
            broadcaster_name: live.broadcaster_name.clone(),
            thumbnail_url: live.thumbnail_url.clone(),
            categories: Vec::new(),
            recording: None,
            uptime_minutes: None,
            summary: ScoreSummary::default(),
            series: Vec::new(),
        }
    }

    /// Appends a category unless one with the same ID is already recorded.
    /// Returns whether the list changed.
    pub fn add_category(&mut self, category: Category) -> bool {
        if self.has_category(&category.id) {
            return false;
        }
        self.categories.push(category);
        true
    }

    pub fn has_category(&self, category_id: &str) -> bool {
        self.categories.iter().any(|c| c.id == category_id)
    }

    /// Elapsed time since start, never negative.
    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).max(Duration::zero())
    }
}

/// Partial update of a session document. Unset fields are left untouched by
/// a merge write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SessionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcaster_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcaster_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording: Option<Recording>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScoreSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<Vec<IntervalBucket>>,
}

impl SessionPatch {
    /// Full metadata written when a session is adopted.
    pub fn adopt(session: &Session) -> Self {
        Self {
            id: Some(session.id.clone()),
            state: Some(SessionState::Live),
            started_at: Some(session.started_at),
            title: Some(session.title.clone()),
            broadcaster_id: Some(session.broadcaster_id.clone()),
            broadcaster_name: Some(session.broadcaster_name.clone()),
            thumbnail_url: Some(session.thumbnail_url.clone()),
            categories: Some(session.categories.clone()),
            recording: session.recording.clone(),
            ..Default::default()
        }
    }

    pub fn categories(categories: Vec<Category>) -> Self {
        Self {
            categories: Some(categories),
            ..Default::default()
        }
    }

    pub fn recording(recording: Recording) -> Self {
        Self {
            recording: Some(recording),
            ..Default::default()
        }
    }

    /// Aggregation output plus the current uptime.
    pub fn scores(series: ScoreSeries, uptime: Duration) -> Self {
        Self {
            uptime_minutes: Some(uptime.num_minutes()),
            summary: Some(series.summary),
            series: Some(series.buckets),
            ..Default::default()
        }
    }

    pub fn ended(uptime: Duration) -> Self {
        Self {
            state: Some(SessionState::Ended),
            uptime_minutes: Some(uptime.num_minutes()),
            ..Default::default()
        }
    }

    /// Final write of the finalization loop. Only the recording is written;
    /// the session may have gone live again by the time it lands.
    pub fn finalized(recording: Recording) -> Self {
        Self::recording(recording)
    }
}
