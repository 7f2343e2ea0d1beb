//! Telegram client
//!
//! Sends through the Bot API with teloxide. History is read from the Telegram
//! Desktop export configured for each source under `[[telegram.archives]]`.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile};
use teloxide::RequestError;

use crate::chat::archive::ChatArchive;
use crate::chat::ChatClient;
use crate::config::TelegramConfig;
use crate::error::{ChatError, ConfigError, Result};
use crate::types::{MediaKind, Message, OutboundContent};

pub struct TelegramClient {
    bot: Bot,
    archives: HashMap<i64, ChatArchive>,
}

impl TelegramClient {
    pub fn new(bot: Bot, archives: HashMap<i64, ChatArchive>) -> Self {
        Self { bot, archives }
    }

    /// Build a client from `[telegram]`; a bot token is required
    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        let token = config
            .bot_token
            .as_ref()
            .map(|t| t.expose_secret().trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingField("telegram.bot_token".to_string()))?;

        let archives = config
            .archives
            .iter()
            .map(|a| (a.source, ChatArchive::new(&a.path)))
            .collect();

        Ok(Self::new(Bot::new(token), archives))
    }

    pub fn has_archive(&self, source: i64) -> bool {
        self.archives.contains_key(&source)
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn fetch_history(&self, chat: i64, limit: u32) -> Result<Vec<Message>> {
        let archive = self
            .archives
            .get(&chat)
            .ok_or(ChatError::UnknownChat(chat))?;

        let messages = archive.read_recent(chat, limit).await?;
        tracing::debug!(
            chat,
            fetched = messages.len(),
            path = %archive.path().display(),
            "read archive"
        );
        Ok(messages)
    }

    async fn send(&self, chat: i64, content: &OutboundContent) -> Result<()> {
        let chat_id = ChatId(chat);
        let caption = content.text.clone();

        let result = match &content.media {
            None => {
                let text = caption.unwrap_or_default();
                self.bot.send_message(chat_id, text).await.map(|_| ())
            }
            Some(media) => {
                let file = InputFile::file(&media.file);
                match (media.kind, caption) {
                    (MediaKind::Photo, Some(c)) => {
                        self.bot.send_photo(chat_id, file).caption(c).await.map(|_| ())
                    }
                    (MediaKind::Photo, None) => self.bot.send_photo(chat_id, file).await.map(|_| ()),
                    (MediaKind::Video, Some(c)) => {
                        self.bot.send_video(chat_id, file).caption(c).await.map(|_| ())
                    }
                    (MediaKind::Video, None) => self.bot.send_video(chat_id, file).await.map(|_| ()),
                    (MediaKind::Animation, Some(c)) => self
                        .bot
                        .send_animation(chat_id, file)
                        .caption(c)
                        .await
                        .map(|_| ()),
                    (MediaKind::Animation, None) => {
                        self.bot.send_animation(chat_id, file).await.map(|_| ())
                    }
                    (MediaKind::Document, Some(c)) => self
                        .bot
                        .send_document(chat_id, file)
                        .caption(c)
                        .await
                        .map(|_| ()),
                    (MediaKind::Document, None) => {
                        self.bot.send_document(chat_id, file).await.map(|_| ())
                    }
                }
            }
        };

        result.map_err(|e| map_request_error(chat, e).into())
    }
}

fn map_request_error(chat: i64, error: RequestError) -> ChatError {
    match error {
        RequestError::RetryAfter(wait) => {
            ChatError::RateLimit(format!("chat {}: retry after {:?}", chat, wait))
        }
        RequestError::Network(e) => ChatError::Network(format!("chat {}: {}", chat, e)),
        RequestError::Io(e) => ChatError::Network(format!("chat {}: {}", chat, e)),
        other => ChatError::Send(format!("chat {}: {}", chat, other)),
    }
}
