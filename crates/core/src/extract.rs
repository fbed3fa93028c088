//! Vote extraction from chat text.
//!
//! A message is a vote when one of its whitespace-delimited tokens is a
//! marker. Markers embedded in a longer word (`rabbit+2food`) do not count.
//! When a message carries markers of both polarities, the first marker in a
//! left-to-right scan decides.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::events::{ChatMessage, Polarity, VoteEvent};

/// Literal positive marker, always recognised.
pub const PLUS_TWO: &str = "+2";

/// Literal negative marker, always recognised.
pub const MINUS_TWO: &str = "-2";

/// Extra marker tokens (platform emotes).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExtractorConfig {
    #[serde(default = "default_positive_tokens")]
    #[validate(custom(function = "validate_tokens"))]
    pub positive_tokens: Vec<String>,
    #[serde(default = "default_negative_tokens")]
    #[validate(custom(function = "validate_tokens"))]
    pub negative_tokens: Vec<String>,
}

fn default_positive_tokens() -> Vec<String> {
    vec!["jermaPlus2".to_string()]
}

fn default_negative_tokens() -> Vec<String> {
    vec!["jermaMinus2".to_string()]
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            positive_tokens: default_positive_tokens(),
            negative_tokens: default_negative_tokens(),
        }
    }
}

fn validate_tokens(tokens: &[String]) -> Result<(), ValidationError> {
    if tokens
        .iter()
        .any(|t| t.is_empty() || t.chars().any(char::is_whitespace))
    {
        return Err(ValidationError::new("marker_token"));
    }
    Ok(())
}

/// Classifies chat text into votes.
#[derive(Debug, Clone)]
pub struct Extractor {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&ExtractorConfig::default())
    }
}

impl Extractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        let mut positive = vec![PLUS_TWO.to_string()];
        positive.extend(config.positive_tokens.iter().cloned());

        let mut negative = vec![MINUS_TWO.to_string()];
        negative.extend(config.negative_tokens.iter().cloned());

        Self { positive, negative }
    }

    /// Returns the polarity of the first marker token in `text`, if any.
    pub fn classify(&self, text: &str) -> Option<Polarity> {
        text.split_whitespace().find_map(|token| {
            if self.positive.iter().any(|m| m == token) {
                Some(Polarity::Positive)
            } else if self.negative.iter().any(|m| m == token) {
                Some(Polarity::Negative)
            } else {
                None
            }
        })
    }

    /// Turns a chat message into a vote for `session_id`, or `None` when the
    /// message carries no marker.
    pub fn extract(&self, message: &ChatMessage, session_id: &str) -> Option<VoteEvent> {
        self.classify(&message.text)
            .map(|polarity| VoteEvent::from_message(message, session_id, polarity))
    }
}
