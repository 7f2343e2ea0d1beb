//! Scripted chat client for tests
//!
//! Holds a fixed history per source, records every send, and can be told to
//! fail fetches or sends to particular destinations. Clones share state, so a
//! test can keep a handle after passing the client to a scheduler.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::chat::ChatClient;
use crate::error::{ChatError, Result};
use crate::types::{Message, OutboundContent};

#[derive(Default)]
struct MockState {
    histories: HashMap<i64, Vec<Message>>,
    failing_destinations: HashSet<i64>,
    failing_sends: Vec<(i64, String)>,
    fetch_fails: bool,
    fetch_calls: usize,
    sent: Vec<(i64, OutboundContent)>,
}

#[derive(Clone, Default)]
pub struct MockChatClient {
    state: Arc<Mutex<MockState>>,
    send_delay: Duration,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the history of `source`; order does not matter
    pub fn with_history(self, source: i64, messages: Vec<Message>) -> Self {
        self.lock().histories.insert(source, messages);
        self
    }

    /// Every send to `destination` fails
    pub fn fail_destination(self, destination: i64) -> Self {
        self.lock().failing_destinations.insert(destination);
        self
    }

    /// Sends to `destination` fail when the text contains `fragment`
    pub fn fail_sends_containing(self, destination: i64, fragment: &str) -> Self {
        self.lock()
            .failing_sends
            .push((destination, fragment.to_string()));
        self
    }

    /// Every send takes `delay` before completing
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Toggle fetch failures; takes effect on the next fetch
    pub fn set_fetch_failing(&self, failing: bool) {
        self.lock().fetch_fails = failing;
    }

    /// Every successful send so far, in order
    pub fn sent(&self) -> Vec<(i64, OutboundContent)> {
        self.lock().sent.clone()
    }

    pub fn sent_to(&self, destination: i64) -> Vec<OutboundContent> {
        self.lock()
            .sent
            .iter()
            .filter(|(dest, _)| *dest == destination)
            .map(|(_, content)| content.clone())
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetch_calls
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_history(&self, chat: i64, limit: u32) -> Result<Vec<Message>> {
        let mut state = self.lock();
        state.fetch_calls += 1;

        if state.fetch_fails {
            return Err(ChatError::Fetch(format!("mock fetch failure for chat {}", chat)).into());
        }

        let mut messages = state
            .histories
            .get(&chat)
            .cloned()
            .ok_or(ChatError::UnknownChat(chat))?;

        messages.sort_by(|a, b| b.id.cmp(&a.id));
        messages.truncate(limit as usize);
        Ok(messages)
    }

    async fn send(&self, chat: i64, content: &OutboundContent) -> Result<()> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }

        let mut state = self.lock();

        if state.failing_destinations.contains(&chat) {
            return Err(ChatError::Send(format!("mock destination {} rejects sends", chat)).into());
        }

        let text = content.text.as_deref().unwrap_or_default();
        let scripted_failure = state
            .failing_sends
            .iter()
            .any(|(dest, fragment)| *dest == chat && text.contains(fragment.as_str()));
        if scripted_failure {
            return Err(ChatError::Send(format!("mock send to {} failed", chat)).into());
        }

        state.sent.push((chat, content.clone()));
        Ok(())
    }
}
