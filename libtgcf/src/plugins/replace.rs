//! Literal text substitution

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ConfigError, Result};
use crate::types::OutboundContent;

/// Replace every occurrence of each key with its value
///
/// Substitutions run in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacePlugin {
    #[serde(default)]
    pub text: BTreeMap<String, String>,
}

impl ReplacePlugin {
    pub fn validate(&self) -> Result<()> {
        if self.text.keys().any(|from| from.is_empty()) {
            return Err(
                ConfigError::Invalid("replace plugin keys must not be empty".to_string()).into(),
            );
        }
        Ok(())
    }

    pub fn apply(&self, mut content: OutboundContent) -> OutboundContent {
        if let Some(text) = content.text.take() {
            let replaced = self
                .text
                .iter()
                .fold(text, |acc, (from, to)| acc.replace(from.as_str(), to));

            content.text = Some(replaced).filter(|t| !t.trim().is_empty());
        }
        content
    }
}
