//! Per-source scheduling loop
//!
//! Each enabled source runs one [`SourceScheduler`] task:
//!
//! ```text
//! Idle -> Fetching -> Selecting -> Posting -> Waiting -> Fetching -> ...
//!                          \______________________/
//!                     (empty batch or daily limit)
//! ```
//!
//! Any state moves to `Stopped` once the cancellation token fires. The token
//! is checked before every transition and raced against the wait between
//! batches; a batch that started posting always finishes.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::config::SourceConfig;
use crate::events::{Event, EventBus};
use crate::random::fetcher::PoolFetcher;
use crate::random::poster::{BatchPoster, BatchReport};
use crate::random::selector;
use crate::store::{CounterStore, HistoryStore};
use crate::types::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Fetching,
    Selecting,
    Posting,
    Waiting,
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Fetching => "fetching",
            SchedulerState::Selecting => "selecting",
            SchedulerState::Posting => "posting",
            SchedulerState::Waiting => "waiting",
            SchedulerState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Result of one pass through the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Posted(BatchReport),
    /// The daily limit left no room for another message
    LimitReached { count: u32, limit: u32 },
    /// Nothing unposted in the pool
    NothingNew,
    /// A storage error aborted the cycle
    Failed(String),
    /// Cancelled before the cycle finished
    Cancelled,
}

pub struct SourceScheduler {
    config: SourceConfig,
    fetcher: PoolFetcher,
    poster: BatchPoster,
    history: HistoryStore,
    counter: CounterStore,
    events: EventBus,
    rng: StdRng,
    state: SchedulerState,
}

impl SourceScheduler {
    pub fn new(
        config: SourceConfig,
        fetcher: PoolFetcher,
        poster: BatchPoster,
        history: HistoryStore,
        counter: CounterStore,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            fetcher,
            poster,
            history,
            counter,
            events,
            rng: StdRng::from_entropy(),
            state: SchedulerState::Idle,
        }
    }

    /// Use a fixed random source, for reproducible selection
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn source(&self) -> i64 {
        self.config.source
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Loop until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        let source = self.config.source;
        info!(
            source,
            delay = %humantime::format_duration(self.config.delay),
            batch_size = self.config.batch_size,
            daily_limit = self.config.daily_limit,
            destinations = self.config.destinations.len(),
            "random scheduler started"
        );

        loop {
            if let CycleOutcome::Cancelled = self.run_cycle(&cancel).await {
                break;
            }

            if !self.wait(&cancel).await {
                break;
            }
        }

        self.stop();
        info!(source, "random scheduler stopped");
    }

    /// Run one cycle without the trailing wait; ends in `Waiting`
    ///
    /// On `Cancelled` the state is left where the cycle stopped; call
    /// [`stop`](Self::stop) to move it to `Stopped`.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> CycleOutcome {
        let span = tracing::info_span!(
            "random_cycle",
            source = self.config.source,
            cycle = %uuid::Uuid::new_v4()
        );
        self.cycle(cancel).instrument(span).await
    }

    /// Move to `Stopped` and announce it
    pub fn stop(&mut self) {
        if self.state != SchedulerState::Stopped {
            self.transition(SchedulerState::Stopped);
            self.events.emit(Event::Stopped {
                source: self.config.source,
            });
        }
    }

    async fn cycle(&mut self, cancel: &CancellationToken) -> CycleOutcome {
        let source = self.config.source;

        if cancel.is_cancelled() {
            return CycleOutcome::Cancelled;
        }
        self.transition(SchedulerState::Fetching);

        let pool = match self
            .fetcher
            .fetch_pool(source, self.config.fetch_window)
            .await
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!(source, error = %e, "failed to fetch message pool, treating as empty");
                Vec::new()
            }
        };

        if cancel.is_cancelled() {
            return CycleOutcome::Cancelled;
        }
        self.transition(SchedulerState::Selecting);

        let batch = match self.select(&pool).await {
            Ok(Selection::Batch(batch)) => batch,
            Ok(Selection::LimitReached { count, limit }) => {
                info!(source, count, limit, "daily random limit reached");
                self.events.emit(Event::LimitReached { source, count, limit });
                return self.finish(CycleOutcome::LimitReached { count, limit });
            }
            Ok(Selection::Empty) => {
                debug!(source, pool = pool.len(), "no unposted messages available");
                self.events.emit(Event::NothingNew { source });
                return self.finish(CycleOutcome::NothingNew);
            }
            Err(e) => return self.fail(e),
        };

        if cancel.is_cancelled() {
            return CycleOutcome::Cancelled;
        }
        self.transition(SchedulerState::Posting);

        match self.poster.post_batch(&self.config, &batch).await {
            Ok(report) => {
                self.events.emit(Event::BatchPosted {
                    source,
                    sent: report.sent(),
                    filtered: report.filtered(),
                    failed: report.failed(),
                });
                self.finish(CycleOutcome::Posted(report))
            }
            Err(e) => self.fail(e),
        }
    }

    async fn select(&mut self, pool: &[Message]) -> crate::Result<Selection> {
        let source = self.config.source;
        let limit = self.config.daily_limit;
        let batch_size = self.config.batch_size;

        // Clamp to what is left of today's quota
        let requested = match self.counter.remaining(source, limit).await? {
            Some(0) => {
                let count = self.counter.get_count(source).await?.count;
                return Ok(Selection::LimitReached { count, limit });
            }
            Some(remaining) => batch_size.min(remaining),
            None => batch_size,
        };

        let posted = self.history.posted_ids(source).await?;
        let batch = selector::select(pool, &posted, requested as usize, &mut self.rng);
        if batch.is_empty() {
            return Ok(Selection::Empty);
        }

        if self
            .counter
            .would_exceed(source, batch.len() as u32, limit)
            .await?
        {
            let count = self.counter.get_count(source).await?.count;
            return Ok(Selection::LimitReached { count, limit });
        }

        debug!(source, selected = batch.len(), pool = pool.len(), "selected random batch");
        Ok(Selection::Batch(batch))
    }

    /// Wait out the delay; false when cancelled first
    async fn wait(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.delay) => true,
        }
    }

    fn fail(&mut self, error: crate::TgcfError) -> CycleOutcome {
        let source = self.config.source;
        warn!(source, error = %error, "random cycle aborted");
        self.events.emit(Event::CycleFailed {
            source,
            error: error.to_string(),
        });
        self.finish(CycleOutcome::Failed(error.to_string()))
    }

    fn finish(&mut self, outcome: CycleOutcome) -> CycleOutcome {
        self.transition(SchedulerState::Waiting);
        outcome
    }

    fn transition(&mut self, next: SchedulerState) {
        debug!(source = self.config.source, from = %self.state, to = %next, "scheduler transition");
        self.state = next;
        self.events.emit(Event::StateChanged {
            source: self.config.source,
            state: next,
        });
    }
}

enum Selection {
    Batch(Vec<Message>),
    LimitReached { count: u32, limit: u32 },
    Empty,
}
