//! Message transform plugins
//!
//! Plugins run in configuration order on every outgoing message. A plugin may
//! rewrite the content or drop the message entirely; a dropped message is not
//! sent anywhere.
//!
//! ```toml
//! [[plugins]]
//! kind = "filter"
//! blacklist = ["casino"]
//!
//! [[plugins]]
//! kind = "replace"
//! text = { "t.me/old" = "t.me/new" }
//! ```

pub mod caption;
pub mod filter;
pub mod replace;

pub use caption::CaptionPlugin;
pub use filter::FilterPlugin;
pub use replace::ReplacePlugin;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Message, OutboundContent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Plugin {
    Filter(FilterPlugin),
    Replace(ReplacePlugin),
    Caption(CaptionPlugin),
}

impl Plugin {
    pub fn name(&self) -> &'static str {
        match self {
            Plugin::Filter(_) => "filter",
            Plugin::Replace(_) => "replace",
            Plugin::Caption(_) => "caption",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Plugin::Filter(plugin) => plugin.validate(),
            Plugin::Replace(plugin) => plugin.validate(),
            Plugin::Caption(_) => Ok(()),
        }
    }

    /// Transform `content`; `None` drops the message
    fn apply(&self, message: &Message, content: OutboundContent) -> Option<OutboundContent> {
        match self {
            Plugin::Filter(plugin) => plugin.apply(message, content),
            Plugin::Replace(plugin) => Some(plugin.apply(content)),
            Plugin::Caption(plugin) => Some(plugin.apply(content)),
        }
    }
}

/// Ordered plugin list applied as one step
#[derive(Debug, Clone, Default)]
pub struct PluginChain {
    plugins: Vec<Plugin>,
}

impl PluginChain {
    pub fn new(plugins: Vec<Plugin>) -> Self {
        Self { plugins }
    }

    /// Run every plugin on `message`
    ///
    /// Returns the content to send, or an empty list when a plugin dropped the
    /// message or nothing sendable is left.
    pub fn apply(&self, message: &Message) -> Vec<OutboundContent> {
        let mut content = OutboundContent::from(message);

        for plugin in &self.plugins {
            match plugin.apply(message, content) {
                Some(next) => content = next,
                None => {
                    tracing::debug!(
                        message_id = message.id,
                        plugin = plugin.name(),
                        "message dropped by plugin"
                    );
                    return Vec::new();
                }
            }
        }

        if content.is_empty() {
            return Vec::new();
        }

        vec![content]
    }
}
