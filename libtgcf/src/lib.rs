//! TGCF random archive reposting
//!
//! This library provides the state and scheduling behind TGCF's live-mode
//! random reposter: per-source background tasks that pick historical messages
//! from a source chat and repost them to its destinations, bounded by daily
//! limits and a deduplicating history.

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod plugins;
pub mod random;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{Config, SourceConfig};
pub use db::Database;
pub use error::{Result, TgcfError};
pub use types::{Media, MediaKind, Message, MessageKind, OutboundContent};
