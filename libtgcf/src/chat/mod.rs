//! Chat platform abstraction
//!
//! The random reposter needs two things from a chat platform: read a window of
//! a source chat's history and send content to a destination chat.
//!
//! # Examples
//!
//! ```no_run
//! use libtgcf::chat::{ChatClient, mock::MockChatClient};
//! use libtgcf::{Message, OutboundContent};
//!
//! # async fn example() -> libtgcf::Result<()> {
//! let client = MockChatClient::new()
//!     .with_history(-1001, vec![Message::text(-1001, 1, "from the archive")]);
//!
//! let recent = client.fetch_history(-1001, 50).await?;
//! let content = OutboundContent::from(&recent[0]);
//! client.send(-2001, &content).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Message, OutboundContent};

pub mod archive;
pub mod telegram;

// Available outside tests so integration tests and dry runs can use it
pub mod mock;

/// Chat platform client shared by all scheduler tasks
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Lowercase platform identifier, e.g. "telegram"
    fn name(&self) -> &str;

    /// Up to `limit` of the most recent messages of `chat`, newest first
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Fetch` (retryable) when the history cannot be read
    /// and `ChatError::UnknownChat` when the chat is not known to the client.
    async fn fetch_history(&self, chat: i64, limit: u32) -> Result<Vec<Message>>;

    /// Deliver `content` to `chat`
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Send`, `ChatError::Network` or
    /// `ChatError::RateLimit` when delivery fails.
    async fn send(&self, chat: i64, content: &OutboundContent) -> Result<()>;
}
