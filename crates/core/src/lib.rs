//! Core types, vote extraction, and score aggregation for the score engine.

pub mod aggregate;
pub mod error;
pub mod events;
pub mod extract;
pub mod session;

pub use aggregate::*;
pub use error::{Error, Result, SourceErrorCode, StoreErrorCode};
pub use events::*;
pub use extract::*;
pub use session::*;
