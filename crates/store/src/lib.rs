//! Document store capability and session repository for the score engine.

pub mod config;
pub mod document;
pub mod file;
pub mod health;
pub mod memory;
pub mod repository;

pub use config::*;
pub use document::*;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use repository::SessionRepository;
