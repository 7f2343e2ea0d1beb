//! Core types for TGCF

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A message read from a source chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub media: Option<Media>,
    pub date: Option<DateTime<Utc>>,
}

impl Message {
    /// A regular text message
    pub fn text(chat_id: i64, id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            chat_id,
            kind: MessageKind::Regular,
            text: Some(text.into()),
            media: None,
            date: None,
        }
    }

    /// A service event (join, leave, pin, ...)
    pub fn service(chat_id: i64, id: i64) -> Self {
        Self {
            id,
            chat_id,
            kind: MessageKind::Service,
            text: None,
            media: None,
            date: None,
        }
    }

    pub fn with_media(mut self, media: Media) -> Self {
        self.media = Some(media);
        self
    }

    pub fn is_service(&self) -> bool {
        self.kind == MessageKind::Service
    }

    /// Non-empty text, if any
    pub fn text_content(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Whether anything in this message can be reposted
    pub fn has_content(&self) -> bool {
        self.text_content().is_some() || self.media.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Regular,
    Service,
}

/// Attached media. `file` is a local path or a platform file id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    pub file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Animation,
    Document,
}

/// What actually gets sent to a destination after plugins ran
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutboundContent {
    pub text: Option<String>,
    pub media: Option<Media>,
}

impl From<&Message> for OutboundContent {
    fn from(message: &Message) -> Self {
        Self {
            text: message.text_content().map(str::to_string),
            media: message.media.clone(),
        }
    }
}

impl OutboundContent {
    /// Append `marker` to the text; media-only content gets the marker as text
    pub fn append_marker(&mut self, marker: &str) {
        match self.text.as_mut() {
            Some(text) => text.push_str(marker),
            None => self.text = Some(marker.trim_start().to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_none() && self.text.as_deref().map_or(true, |t| t.trim().is_empty())
    }
}

/// Per-source daily counter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u32,
}

/// Lifetime bookkeeping for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RandomState {
    pub last_posted_at: Option<i64>,
    pub total_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_content() {
        assert!(Message::text(1, 1, "hello").has_content());
        assert!(!Message::text(1, 2, "   ").has_content());
        assert!(!Message::service(1, 3).has_content());

        let photo = Message::service(1, 4).with_media(Media {
            kind: MediaKind::Photo,
            file: "photos/1.jpg".to_string(),
        });
        assert!(photo.has_content());
    }

    #[test]
    fn test_append_marker_to_text() {
        let mut content = OutboundContent::from(&Message::text(1, 1, "hello"));
        content.append_marker("\n\nmark");
        assert_eq!(content.text.as_deref(), Some("hello\n\nmark"));
    }

    #[test]
    fn test_append_marker_to_media_only() {
        let mut content = OutboundContent {
            text: None,
            media: Some(Media {
                kind: MediaKind::Video,
                file: "v.mp4".to_string(),
            }),
        };
        content.append_marker("\n\nmark");
        assert_eq!(content.text.as_deref(), Some("mark"));
    }

    #[test]
    fn test_outbound_drops_blank_text() {
        let content = OutboundContent::from(&Message::text(1, 1, "  "));
        assert!(content.text.is_none());
        assert!(content.is_empty());
    }
}
