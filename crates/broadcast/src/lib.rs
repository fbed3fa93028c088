//! Broadcast metadata source and chat input for the score engine.

pub mod chat;
pub mod client;
pub mod config;
pub mod source;
pub mod types;

pub use chat::*;
pub use client::HelixClient;
pub use config::*;
pub use source::*;
