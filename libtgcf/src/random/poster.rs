//! Sending a selected batch
//!
//! Every message goes through the plugin chain, gets the random marker and
//! is sent to all destinations of its source concurrently. A message counts
//! as posted once any destination accepted it; only then is it written to the
//! history, the daily counter and the lifetime totals, in one transaction.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chat::ChatClient;
use crate::config::SourceConfig;
use crate::error::Result;
use crate::plugins::PluginChain;
use crate::store::{self, CounterStore, HistoryStore, StateStore};
use crate::types::{Message, OutboundContent};

/// What happened to one message of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PostOutcome {
    /// Accepted by at least one destination
    Sent {
        delivered: Vec<i64>,
        failed: Vec<i64>,
    },
    /// Dropped by the plugin chain
    Filtered,
    /// No destination accepted it
    Failed { failed: Vec<i64> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageReport {
    pub message_id: i64,
    #[serde(flatten)]
    pub outcome: PostOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub source: i64,
    pub messages: Vec<MessageReport>,
}

impl BatchReport {
    pub fn sent(&self) -> usize {
        self.count(|o| matches!(o, PostOutcome::Sent { .. }))
    }

    pub fn filtered(&self) -> usize {
        self.count(|o| matches!(o, PostOutcome::Filtered))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PostOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&PostOutcome) -> bool) -> usize {
        self.messages.iter().filter(|m| predicate(&m.outcome)).count()
    }
}

#[derive(Clone)]
pub struct BatchPoster {
    client: Arc<dyn ChatClient>,
    plugins: Arc<PluginChain>,
    marker: String,
    history: HistoryStore,
    counter: CounterStore,
    state: StateStore,
}

impl BatchPoster {
    pub fn new(
        client: Arc<dyn ChatClient>,
        plugins: Arc<PluginChain>,
        marker: impl Into<String>,
        history: HistoryStore,
        counter: CounterStore,
        state: StateStore,
    ) -> Self {
        Self {
            client,
            plugins,
            marker: marker.into(),
            history,
            counter,
            state,
        }
    }

    /// Post `batch` in order to the destinations of `source`
    ///
    /// Send failures are reported per destination and never abort the batch.
    /// A storage error while recording a sent message stops the batch and is
    /// returned.
    pub async fn post_batch(&self, source: &SourceConfig, batch: &[Message]) -> Result<BatchReport> {
        let mut report = BatchReport {
            source: source.source,
            messages: Vec::with_capacity(batch.len()),
        };

        for message in batch {
            let outcome = self.post_message(source, message).await?;
            report.messages.push(MessageReport {
                message_id: message.id,
                outcome,
            });
        }

        info!(
            source = source.source,
            sent = report.sent(),
            filtered = report.filtered(),
            failed = report.failed(),
            "random batch posted"
        );

        Ok(report)
    }

    async fn post_message(&self, source: &SourceConfig, message: &Message) -> Result<PostOutcome> {
        let contents = self.plugins.apply(message);
        if contents.is_empty() {
            debug!(source = source.source, message_id = message.id, "message filtered");
            return Ok(PostOutcome::Filtered);
        }

        let contents: Vec<OutboundContent> = contents
            .into_iter()
            .map(|mut content| {
                content.append_marker(&self.marker);
                content
            })
            .collect();

        let sends = source.destinations.iter().map(|&dest| {
            let contents = &contents;
            async move {
                for content in contents {
                    if let Err(e) = self.client.send(dest, content).await {
                        warn!(
                            source = source.source,
                            dest,
                            message_id = message.id,
                            error = %e,
                            "failed to send random message"
                        );
                        return (dest, false);
                    }
                }
                (dest, true)
            }
        });

        let (delivered, failed): (Vec<_>, Vec<_>) =
            join_all(sends).await.into_iter().partition(|(_, ok)| *ok);
        let delivered: Vec<i64> = delivered.into_iter().map(|(dest, _)| dest).collect();
        let failed: Vec<i64> = failed.into_iter().map(|(dest, _)| dest).collect();

        if delivered.is_empty() {
            warn!(
                source = source.source,
                message_id = message.id,
                "no destination accepted the message, leaving it eligible"
            );
            return Ok(PostOutcome::Failed { failed });
        }

        let count = store::record_sent(
            &self.history,
            &self.counter,
            &self.state,
            source.source,
            message.id,
            chrono::Utc::now().timestamp(),
        )
        .await?;

        debug!(
            source = source.source,
            message_id = message.id,
            count,
            destinations = delivered.len(),
            "random message sent"
        );

        Ok(PostOutcome::Sent { delivered, failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::mock::MockChatClient;
    use crate::config::LiveConfig;
    use crate::db::Database;
    use crate::plugins::{FilterPlugin, Plugin};
    use crate::types::{Media, MediaKind};

    const MARKER: &str = "\n\n#random";

    struct Fixture {
        client: MockChatClient,
        poster: BatchPoster,
        history: HistoryStore,
        counter: CounterStore,
        state: StateStore,
    }

    async fn fixture(client: MockChatClient, plugins: Vec<Plugin>) -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let history = HistoryStore::new(db.clone(), 100);
        let counter = CounterStore::new(db.clone());
        let state = StateStore::new(db);
        let poster = BatchPoster::new(
            Arc::new(client.clone()),
            Arc::new(PluginChain::new(plugins)),
            MARKER,
            history.clone(),
            counter.clone(),
            state.clone(),
        );
        Fixture {
            client,
            poster,
            history,
            counter,
            state,
        }
    }

    fn source(dests: Vec<i64>) -> SourceConfig {
        SourceConfig::new(-1, dests, &LiveConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_sends_to_every_destination_with_marker() {
        let f = fixture(MockChatClient::new(), vec![]).await;

        let report = f
            .poster
            .post_batch(&source(vec![-10, -20]), &[Message::text(-1, 5, "hello")])
            .await
            .unwrap();

        assert_eq!(report.sent(), 1);
        for dest in [-10, -20] {
            let sent = f.client.sent_to(dest);
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].text.as_deref(), Some("hello\n\n#random"));
        }

        assert!(f.history.has_posted(-1, 5).await.unwrap());
        assert_eq!(f.counter.get_count(-1).await.unwrap().count, 1);
        assert_eq!(f.state.get(-1).await.unwrap().total_sent, 1);
    }

    #[tokio::test]
    async fn test_media_only_message_gets_marker_caption() {
        let f = fixture(MockChatClient::new(), vec![]).await;
        let photo = Message::service(-1, 9).with_media(Media {
            kind: MediaKind::Photo,
            file: "p.jpg".to_string(),
        });
        let photo = Message {
            kind: crate::types::MessageKind::Regular,
            ..photo
        };

        f.poster.post_batch(&source(vec![-10]), &[photo]).await.unwrap();

        let sent = f.client.sent_to(-10);
        assert_eq!(sent[0].text.as_deref(), Some("#random"));
        assert!(sent[0].media.is_some());
    }

    #[tokio::test]
    async fn test_partial_destination_failure_still_records() {
        let client = MockChatClient::new().fail_sends_containing(-20, "second");
        let f = fixture(client, vec![]).await;

        let batch = vec![
            Message::text(-1, 1, "first"),
            Message::text(-1, 2, "second"),
            Message::text(-1, 3, "third"),
            Message::text(-1, 4, "fourth"),
        ];
        let report = f.poster.post_batch(&source(vec![-10, -20]), &batch).await.unwrap();

        assert_eq!(report.sent(), 4);
        assert_eq!(
            report.messages[1].outcome,
            PostOutcome::Sent {
                delivered: vec![-10],
                failed: vec![-20]
            }
        );
        assert!(f.history.has_posted(-1, 2).await.unwrap());
        assert_eq!(f.counter.get_count(-1).await.unwrap().count, 4);
    }

    #[tokio::test]
    async fn test_all_destinations_failing_leaves_message_eligible() {
        let client = MockChatClient::new().fail_destination(-10).fail_destination(-20);
        let f = fixture(client, vec![]).await;

        let report = f
            .poster
            .post_batch(&source(vec![-10, -20]), &[Message::text(-1, 1, "x")])
            .await
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert!(!f.history.has_posted(-1, 1).await.unwrap());
        assert_eq!(f.counter.get_count(-1).await.unwrap().count, 0);
        assert_eq!(f.state.get(-1).await.unwrap().total_sent, 0);
    }

    #[tokio::test]
    async fn test_storage_error_leaves_message_unposted() {
        let db = Database::in_memory().await.unwrap();
        sqlx::query(
            r#"
            CREATE TRIGGER reject_counter BEFORE INSERT ON random_counters
            BEGIN
                SELECT RAISE(ABORT, 'counter unavailable');
            END
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        let client = MockChatClient::new();
        let history = HistoryStore::new(db.clone(), 100);
        let counter = CounterStore::new(db.clone());
        let state = StateStore::new(db);
        let poster = BatchPoster::new(
            Arc::new(client.clone()),
            Arc::new(PluginChain::default()),
            MARKER,
            history.clone(),
            counter.clone(),
            state.clone(),
        );

        let result = poster
            .post_batch(&source(vec![-10]), &[Message::text(-1, 1, "x")])
            .await;

        assert!(result.is_err());
        assert_eq!(client.sent_to(-10).len(), 1);
        assert!(!history.has_posted(-1, 1).await.unwrap());
        assert_eq!(counter.get_count(-1).await.unwrap().count, 0);
        assert_eq!(state.get(-1).await.unwrap().total_sent, 0);
    }

    #[tokio::test]
    async fn test_filtered_message_not_recorded_or_counted() {
        let plugins = vec![Plugin::Filter(FilterPlugin {
            blacklist: vec!["spam".to_string()],
            ..FilterPlugin::default()
        })];
        let f = fixture(MockChatClient::new(), plugins).await;

        let batch = vec![Message::text(-1, 1, "spam offer"), Message::text(-1, 2, "news")];
        let report = f.poster.post_batch(&source(vec![-10]), &batch).await.unwrap();

        assert_eq!(report.filtered(), 1);
        assert_eq!(report.sent(), 1);
        assert!(!f.history.has_posted(-1, 1).await.unwrap());
        assert_eq!(f.counter.get_count(-1).await.unwrap().count, 1);
        assert_eq!(f.client.sent().len(), 1);
    }

    #[test]
    fn test_report_serializes_outcomes() {
        let report = BatchReport {
            source: -1,
            messages: vec![MessageReport {
                message_id: 3,
                outcome: PostOutcome::Filtered,
            }],
        };

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"message_id\":3"));
        assert!(json.contains("\"outcome\":\"filtered\""));
    }
}
