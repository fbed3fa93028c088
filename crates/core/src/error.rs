//! Unified error types for the score engine.
//!
//! Error codes:
//! - SOURCE_001-002: Broadcast metadata source errors
//! - STORE_001-003: Document store errors
//! - FINAL_001: Finalization errors

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Metadata source error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorCode {
    /// SOURCE_001: Request to the metadata source failed
    RequestFailed,
    /// SOURCE_002: Response could not be decoded
    InvalidResponse,
}

impl SourceErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RequestFailed => "SOURCE_001",
            Self::InvalidResponse => "SOURCE_002",
        }
    }
}

/// Document store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// STORE_001: Write (set or batch) failed
    WriteFailed,
    /// STORE_002: Read (get or query) failed
    ReadFailed,
    /// STORE_003: Stored document has an unexpected shape
    Corrupt,
}

impl StoreErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WriteFailed => "STORE_001",
            Self::ReadFailed => "STORE_002",
            Self::Corrupt => "STORE_003",
        }
    }
}

/// Unified error type for the score engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Metadata source error with code.
    #[error("[{code}] {message}")]
    Source { code: &'static str, message: String },

    /// Store error with code.
    #[error("[{code}] {message}")]
    Store { code: &'static str, message: String },

    /// FINAL_001: the recording never became usable within the retry budget.
    #[error("[FINAL_001] finalization incomplete for session {session_id} after {attempts} attempts")]
    FinalizationIncomplete { session_id: String, attempts: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a metadata source error.
    pub fn source(code: SourceErrorCode, msg: impl Into<String>) -> Self {
        Self::Source {
            code: code.code(),
            message: msg.into(),
        }
    }

    /// Create a store error.
    pub fn store(code: StoreErrorCode, msg: impl Into<String>) -> Self {
        Self::Store {
            code: code.code(),
            message: msg.into(),
        }
    }

    pub fn finalization_incomplete(session_id: impl Into<String>, attempts: u32) -> Self {
        Self::FinalizationIncomplete {
            session_id: session_id.into(),
            attempts,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the operation that produced this error should simply be retried
    /// on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Source { .. } | Self::Store { .. } | Self::FinalizationIncomplete { .. }
        )
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Source { code, .. } => Some(*code),
            Self::Store { code, .. } => Some(*code),
            Self::FinalizationIncomplete { .. } => Some("FINAL_001"),
            _ => None,
        }
    }
}
