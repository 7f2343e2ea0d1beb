//! Candidate pool for a cycle

use std::sync::Arc;

use crate::chat::ChatClient;
use crate::error::Result;
use crate::types::Message;

/// Pulls recent history of a source and keeps only repostable messages
#[derive(Clone)]
pub struct PoolFetcher {
    client: Arc<dyn ChatClient>,
    max_text_length: Option<usize>,
}

impl PoolFetcher {
    pub fn new(client: Arc<dyn ChatClient>, max_text_length: Option<usize>) -> Self {
        Self {
            client,
            max_text_length,
        }
    }

    /// Up to `window` recent messages of `source`, newest first
    ///
    /// Queries the client on every call. Service messages, messages with
    /// neither text nor media, and texts over `max_text_length` characters
    /// are dropped.
    pub async fn fetch_pool(&self, source: i64, window: u32) -> Result<Vec<Message>> {
        let history = self.client.fetch_history(source, window).await?;
        let fetched = history.len();

        let pool: Vec<Message> = history
            .into_iter()
            .filter(|m| !m.is_service() && m.has_content())
            .filter(|m| self.fits_length(m))
            .collect();

        tracing::debug!(source, fetched, eligible = pool.len(), "fetched message pool");
        Ok(pool)
    }

    fn fits_length(&self, message: &Message) -> bool {
        match (self.max_text_length, message.text_content()) {
            (Some(max), Some(text)) => text.chars().count() <= max,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::mock::MockChatClient;
    use crate::types::{Media, MediaKind};

    fn history() -> Vec<Message> {
        vec![
            Message::text(-1, 1, "short"),
            Message::service(-1, 2),
            Message::text(-1, 3, "   "),
            Message::text(-1, 4, "a much longer message body"),
            Message::service(-1, 5).with_media(Media {
                kind: MediaKind::Photo,
                file: "p.jpg".to_string(),
            }),
            Message {
                kind: crate::types::MessageKind::Regular,
                ..Message::service(-1, 6).with_media(Media {
                    kind: MediaKind::Document,
                    file: "d.pdf".to_string(),
                })
            },
        ]
    }

    #[tokio::test]
    async fn test_drops_service_and_empty_messages() {
        let client = MockChatClient::new().with_history(-1, history());
        let fetcher = PoolFetcher::new(Arc::new(client), None);

        let pool = fetcher.fetch_pool(-1, 100).await.unwrap();
        let ids: Vec<i64> = pool.iter().map(|m| m.id).collect();

        assert_eq!(ids, vec![6, 4, 1]);
    }

    #[tokio::test]
    async fn test_max_text_length() {
        let client = MockChatClient::new().with_history(-1, history());
        let fetcher = PoolFetcher::new(Arc::new(client), Some(10));

        let pool = fetcher.fetch_pool(-1, 100).await.unwrap();
        let ids: Vec<i64> = pool.iter().map(|m| m.id).collect();

        // Media without text is never too long
        assert_eq!(ids, vec![6, 1]);
    }

    #[tokio::test]
    async fn test_requeries_every_call() {
        let client = MockChatClient::new().with_history(-1, history());
        let fetcher = PoolFetcher::new(Arc::new(client.clone()), None);

        fetcher.fetch_pool(-1, 10).await.unwrap();
        fetcher.fetch_pool(-1, 10).await.unwrap();
        assert_eq!(client.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_window_limits_fetch() {
        let client = MockChatClient::new().with_history(-1, history());
        let fetcher = PoolFetcher::new(Arc::new(client), None);

        // Newest two are 6 and 5; 5 is a service message
        let pool = fetcher.fetch_pool(-1, 2).await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id, 6);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let client = MockChatClient::new().with_history(-1, history());
        client.set_fetch_failing(true);
        let fetcher = PoolFetcher::new(Arc::new(client), None);

        let error = fetcher.fetch_pool(-1, 10).await.unwrap_err();
        assert!(error.is_retryable());
    }
}
