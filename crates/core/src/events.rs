//! Chat input and vote event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Score contributed by a single vote.
pub const VOTE_WEIGHT: i64 = 2;

/// Field votes are ordered by when queried from the store.
pub const SENT_AT_FIELD: &str = "sent_at";

/// A raw chat message as delivered by the chat source.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChatMessage {
    /// Sender identity (login or display name)
    #[validate(length(max = 128))]
    pub identity: String,
    /// Message body
    pub text: String,
    /// Platform send time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub sent_at: DateTime<Utc>,
    /// Platform-unique message ID
    #[validate(length(min = 1, max = 128))]
    pub message_id: String,
}

/// Direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive)
    }

    /// Signed score change for one vote of this polarity.
    pub fn delta(&self) -> i64 {
        match self {
            Self::Positive => VOTE_WEIGHT,
            Self::Negative => -VOTE_WEIGHT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

/// One vote extracted from a chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEvent {
    /// Unique event ID (the chat message ID)
    pub id: String,
    /// Session the vote was cast in
    pub session_id: String,
    /// Sender identity
    pub author: String,
    /// Originating text, kept for audit
    pub text: String,
    pub polarity: Polarity,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub sent_at: DateTime<Utc>,
}

impl VoteEvent {
    /// Builds a vote from a chat message already classified by the extractor.
    pub fn from_message(message: &ChatMessage, session_id: &str, polarity: Polarity) -> Self {
        Self {
            id: message.message_id.clone(),
            session_id: session_id.to_string(),
            author: message.identity.clone(),
            text: message.text.clone(),
            polarity,
            sent_at: message.sent_at,
        }
    }

    pub fn delta(&self) -> i64 {
        self.polarity.delta()
    }
}
