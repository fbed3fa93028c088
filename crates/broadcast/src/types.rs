//! Wire types of the Helix-style REST API.

use chrono::{DateTime, Utc};
use score_core::{Category, LiveStream, Recording};
use serde::Deserialize;

/// A page of results. Only the first element is ever used.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn first(self) -> Option<T> {
        self.data.into_iter().next()
    }
}

/// `GET streams` record.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRecord {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub title: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub thumbnail_url: String,
}

impl From<StreamRecord> for LiveStream {
    fn from(r: StreamRecord) -> Self {
        Self {
            id: r.id,
            broadcaster_id: r.user_id,
            broadcaster_name: r.user_name,
            category_id: r.game_id,
            title: r.title,
            started_at: r.started_at,
            thumbnail_url: r.thumbnail_url,
        }
    }
}

/// `GET videos` record.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoRecord {
    pub id: String,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub duration: String,
}

impl From<VideoRecord> for Recording {
    fn from(r: VideoRecord) -> Self {
        Self {
            id: r.id,
            stream_id: r.stream_id,
            user_id: r.user_id,
            user_name: r.user_name,
            title: r.title,
            created_at: r.created_at,
            published_at: r.published_at,
            url: r.url,
            thumbnail_url: r.thumbnail_url,
            duration: r.duration,
        }
    }
}

/// `GET games` record.
#[derive(Debug, Clone, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub box_art_url: String,
}

impl From<GameRecord> for Category {
    fn from(r: GameRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            box_art_url: r.box_art_url,
        }
    }
}
