//! Keyword filter

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::types::{Message, OutboundContent};

/// Drop messages by keyword
///
/// A message containing any blacklisted word is dropped. With a non-empty
/// whitelist, a message must contain at least one whitelisted word.
/// Messages without text pass only when `allow_media_only` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPlugin {
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_allow_media_only")]
    pub allow_media_only: bool,
}

impl Default for FilterPlugin {
    fn default() -> Self {
        Self {
            blacklist: Vec::new(),
            whitelist: Vec::new(),
            case_sensitive: false,
            allow_media_only: default_allow_media_only(),
        }
    }
}

fn default_allow_media_only() -> bool {
    true
}

impl FilterPlugin {
    pub fn validate(&self) -> Result<()> {
        let blank = self
            .blacklist
            .iter()
            .chain(self.whitelist.iter())
            .any(|word| word.trim().is_empty());

        if blank {
            return Err(ConfigError::Invalid(
                "filter plugin keywords must not be blank".to_string(),
            )
            .into());
        }

        Ok(())
    }

    pub fn apply(&self, _message: &Message, content: OutboundContent) -> Option<OutboundContent> {
        let haystack = match content.text.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(text) => self.normalize(text),
            None => return self.allow_media_only.then_some(content),
        };

        if self.blacklist.iter().any(|w| haystack.contains(&self.normalize(w))) {
            return None;
        }

        if !self.whitelist.is_empty()
            && !self.whitelist.iter().any(|w| haystack.contains(&self.normalize(w)))
        {
            return None;
        }

        Some(content)
    }

    fn normalize(&self, text: &str) -> String {
        if self.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        }
    }
}
