//! Header and footer lines

use serde::{Deserialize, Serialize};

use crate::types::OutboundContent;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionPlugin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl CaptionPlugin {
    pub fn apply(&self, mut content: OutboundContent) -> OutboundContent {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if let Some(header) = self.header.as_deref() {
            parts.push(header);
        }
        if let Some(text) = content.text.as_deref() {
            parts.push(text);
        }
        if let Some(footer) = self.footer.as_deref() {
            parts.push(footer);
        }

        if !parts.is_empty() {
            content.text = Some(parts.join("\n\n"));
        }
        content
    }
}
