//! Telegram Desktop history exports
//!
//! The Bot API cannot read a chat's past messages, so source history comes
//! from a "Export chat history" JSON dump (`result.json`). Exported media
//! paths are relative to the export directory.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{ChatError, Result};
use crate::types::{Media, MediaKind, Message, MessageKind};

/// Placeholder Telegram Desktop writes for media left out of the export
const NOT_INCLUDED_PREFIX: &str = "(File not included";

#[derive(Debug, Deserialize)]
struct ExportFile {
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    id: i64,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    date_unixtime: Option<String>,
    #[serde(default)]
    text: ExportText,
    #[serde(default)]
    photo: Option<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    media_type: Option<String>,
}

/// `text` is a plain string, or a list mixing strings and formatted entities
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExportText {
    Plain(String),
    Parts(Vec<TextPart>),
}

impl Default for ExportText {
    fn default() -> Self {
        ExportText::Plain(String::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextPart {
    Plain(String),
    Entity { text: String },
}

impl ExportText {
    fn flatten(self) -> String {
        match self {
            ExportText::Plain(text) => text,
            ExportText::Parts(parts) => parts
                .into_iter()
                .map(|part| match part {
                    TextPart::Plain(text) | TextPart::Entity { text } => text,
                })
                .collect(),
        }
    }
}

/// One source chat's export on disk
#[derive(Debug, Clone)]
pub struct ChatArchive {
    path: PathBuf,
}

impl ChatArchive {
    /// `path` is the export's `result.json`, or the directory holding it
    pub fn new(path: impl AsRef<Path>) -> Self {
        let expanded = shellexpand::tilde(&path.as_ref().to_string_lossy()).to_string();
        let mut path = PathBuf::from(expanded);
        if path.is_dir() {
            path.push("result.json");
        }
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the newest `limit` messages, newest first, attributed to `chat_id`
    ///
    /// The file is read on every call so a refreshed export is picked up
    /// without restarting.
    pub async fn read_recent(&self, chat_id: i64, limit: u32) -> Result<Vec<Message>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ChatError::Fetch(format!("cannot read export {}: {}", self.path.display(), e))
        })?;

        let mut messages = self.parse(chat_id, &content)?;
        messages.sort_by_key(|m| m.id);

        let skip = messages.len().saturating_sub(limit as usize);
        let mut recent = messages.split_off(skip);
        recent.reverse();
        Ok(recent)
    }

    fn parse(&self, chat_id: i64, content: &str) -> Result<Vec<Message>> {
        let export: ExportFile = serde_json::from_str(content).map_err(|e| {
            ChatError::Fetch(format!("invalid export {}: {}", self.path.display(), e))
        })?;

        let base = self.path.parent().unwrap_or_else(|| Path::new("."));

        Ok(export
            .messages
            .into_iter()
            .map(|raw| convert(chat_id, base, raw))
            .collect())
    }
}

fn convert(chat_id: i64, base: &Path, raw: ExportMessage) -> Message {
    let kind = if raw.kind == "service" {
        MessageKind::Service
    } else {
        MessageKind::Regular
    };

    let text = Some(raw.text.flatten()).filter(|t| !t.trim().is_empty());
    let media = export_media(base, raw.photo, raw.file, raw.media_type.as_deref());
    let date = parse_date(raw.date_unixtime.as_deref(), raw.date.as_deref());

    Message {
        id: raw.id,
        chat_id,
        kind,
        text,
        media,
        date,
    }
}

fn export_media(
    base: &Path,
    photo: Option<String>,
    file: Option<String>,
    media_type: Option<&str>,
) -> Option<Media> {
    let resolve = |relative: String| -> Option<String> {
        if relative.starts_with(NOT_INCLUDED_PREFIX) {
            return None;
        }
        Some(base.join(relative).to_string_lossy().to_string())
    };

    if let Some(file) = photo.and_then(resolve) {
        return Some(Media {
            kind: MediaKind::Photo,
            file,
        });
    }

    let file = file.and_then(resolve)?;
    let kind = match media_type {
        Some("video_file") | Some("video_message") => MediaKind::Video,
        Some("animation") => MediaKind::Animation,
        _ => MediaKind::Document,
    };

    Some(Media { kind, file })
}

fn parse_date(unixtime: Option<&str>, date: Option<&str>) -> Option<DateTime<Utc>> {
    if let Some(ts) = unixtime.and_then(|s| s.parse::<i64>().ok()) {
        return DateTime::from_timestamp(ts, 0);
    }

    date.and_then(|d| NaiveDateTime::parse_from_str(d, "%Y-%m-%dT%H:%M:%S").ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EXPORT: &str = r#"{
  "name": "Archive",
  "type": "public_channel",
  "id": 1234567,
  "messages": [
    {
      "id": 3,
      "type": "message",
      "date": "2023-05-02T10:00:00",
      "date_unixtime": "1683021600",
      "text": ["Visit ", {"type": "link", "text": "https://example.org"}, " today"]
    },
    {
      "id": 1,
      "type": "service",
      "date": "2023-05-01T09:00:00",
      "action": "create_channel",
      "text": ""
    },
    {
      "id": 2,
      "type": "message",
      "date": "2023-05-01T12:00:00",
      "photo": "photos/photo_2.jpg",
      "text": ""
    },
    {
      "id": 4,
      "type": "message",
      "date": "2023-05-03T08:30:00",
      "file": "video_files/clip.mp4",
      "media_type": "video_file",
      "text": "clip"
    },
    {
      "id": 5,
      "type": "message",
      "date": "2023-05-04T08:30:00",
      "file": "(File not included. Change data exporting settings to download.)",
      "media_type": "animation",
      "text": ""
    }
  ]
}"#;

    fn write_export(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("result.json");
        std::fs::write(&path, EXPORT).unwrap();
        path
    }

    #[tokio::test]
    async fn test_reads_newest_first() {
        let dir = TempDir::new().unwrap();
        let archive = ChatArchive::new(write_export(&dir));

        let messages = archive.read_recent(-1001234567, 10).await.unwrap();
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();

        assert_eq!(ids, vec![5, 4, 3, 2, 1]);
        assert!(messages.iter().all(|m| m.chat_id == -1001234567));
    }

    #[tokio::test]
    async fn test_limit_keeps_most_recent() {
        let dir = TempDir::new().unwrap();
        let archive = ChatArchive::new(write_export(&dir));

        let messages = archive.read_recent(-1, 2).await.unwrap();
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![5, 4]);
    }

    #[tokio::test]
    async fn test_message_conversion() {
        let dir = TempDir::new().unwrap();
        let archive = ChatArchive::new(dir.path());
        write_export(&dir);

        let messages = archive.read_recent(-1, 10).await.unwrap();
        let by_id = |id: i64| messages.iter().find(|m| m.id == id).unwrap();

        let linked = by_id(3);
        assert_eq!(linked.text.as_deref(), Some("Visit https://example.org today"));
        assert_eq!(linked.date.unwrap().timestamp(), 1_683_021_600);

        assert!(by_id(1).is_service());
        assert!(!by_id(1).has_content());

        let photo = by_id(2).media.as_ref().unwrap();
        assert_eq!(photo.kind, MediaKind::Photo);
        assert_eq!(
            photo.file,
            dir.path().join("photos/photo_2.jpg").to_string_lossy()
        );
        assert_eq!(by_id(2).text, None);

        assert_eq!(by_id(4).media.as_ref().unwrap().kind, MediaKind::Video);

        // Media left out of the export leaves nothing to repost
        assert!(!by_id(5).has_content());
    }

    #[tokio::test]
    async fn test_missing_export_is_fetch_error() {
        let dir = TempDir::new().unwrap();
        let archive = ChatArchive::new(dir.path().join("absent.json"));

        let error = archive.read_recent(-1, 10).await.unwrap_err();
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_export_is_fetch_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("result.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = ChatArchive::new(&path).read_recent(-1, 10).await;
        assert!(matches!(
            result,
            Err(crate::error::TgcfError::Chat(ChatError::Fetch(_)))
        ));
    }

    #[test]
    fn test_parse_date_falls_back_to_local_format() {
        let date = parse_date(None, Some("2023-05-01T12:00:00")).unwrap();
        assert_eq!(date.to_rfc3339(), "2023-05-01T12:00:00+00:00");
        assert!(parse_date(None, None).is_none());
    }
}
