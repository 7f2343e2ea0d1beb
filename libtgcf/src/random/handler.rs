//! Lifecycle of the random scheduler tasks
//!
//! `RandomHandler` is the entry point live mode uses: it turns the
//! configuration into one [`SourceScheduler`] per active source, spawns them
//! on the tokio runtime and stops them together through a shared
//! `CancellationToken`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libtgcf::chat::mock::MockChatClient;
//! use libtgcf::random::RandomHandler;
//! use libtgcf::{Config, Database};
//!
//! # async fn example() -> libtgcf::Result<()> {
//! let config = Config::load()?;
//! let db = Database::new(&config.database.path).await?;
//!
//! let mut handler = RandomHandler::new(config, db, Arc::new(MockChatClient::new()));
//! handler.start()?;
//!
//! // ... live mode runs ...
//!
//! handler.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::fetcher::PoolFetcher;
use super::poster::BatchPoster;
use super::scheduler::{CycleOutcome, SourceScheduler};
use super::SourceStatus;
use crate::chat::ChatClient;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::events::EventBus;
use crate::plugins::PluginChain;
use crate::store::{CounterStore, HistoryStore, StateStore};

pub struct RandomHandler {
    config: Config,
    db: Database,
    client: Arc<dyn ChatClient>,
    events: EventBus,
    cancel: CancellationToken,
    tasks: Vec<(i64, JoinHandle<()>)>,
}

impl RandomHandler {
    pub fn new(config: Config, db: Database, client: Arc<dyn ChatClient>) -> Self {
        Self {
            config,
            db,
            client,
            events: EventBus::default(),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Publish scheduler events on `events` instead of a private bus
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|(_, task)| !task.is_finished())
    }

    /// Sources with a running task
    pub fn running_sources(&self) -> Vec<i64> {
        self.tasks
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(source, _)| *source)
            .collect()
    }

    /// Spawn one task per active source; returns how many were started
    ///
    /// Does nothing when random posting is disabled or tasks already run.
    pub fn start(&mut self) -> Result<usize> {
        if self.is_running() {
            warn!("random schedulers already running");
            return Ok(0);
        }
        self.tasks.clear();

        if !self.config.live.random_enabled {
            info!("random posting disabled");
            return Ok(0);
        }

        let schedulers = self.build_schedulers()?;
        if schedulers.is_empty() {
            warn!("random posting enabled but no active source has destinations");
            return Ok(0);
        }

        self.cancel = CancellationToken::new();
        for scheduler in schedulers {
            let source = scheduler.source();
            let task = tokio::spawn(scheduler.run(self.cancel.clone()));
            self.tasks.push((source, task));
        }

        info!(sources = self.tasks.len(), "random posting started");
        Ok(self.tasks.len())
    }

    /// Cancel every task and wait for in-flight cycles to finish
    pub async fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        self.cancel.cancel();
        for (source, task) in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(source, error = %e, "random scheduler task failed");
            }
        }
        self.cancel = CancellationToken::new();

        info!("random posting stopped");
    }

    /// Stop, swap in `config`, and start again
    ///
    /// An invalid configuration is rejected before anything is stopped.
    pub async fn restart(&mut self, config: Config) -> Result<usize> {
        config.validate()?;
        config.source_configs()?;

        self.stop().await;
        self.config = config;
        self.start()
    }

    /// One cycle per active source, in order, without waiting between them
    ///
    /// Ignores `random_enabled`; used by `--once` and tests.
    pub async fn run_once(&self) -> Result<Vec<(i64, CycleOutcome)>> {
        let mut outcomes = Vec::new();

        for mut scheduler in self.build_schedulers()? {
            let outcome = scheduler.run_cycle(&self.cancel).await;
            scheduler.stop();
            outcomes.push((scheduler.source(), outcome));
        }

        Ok(outcomes)
    }

    pub async fn reset_daily_counters(&self) -> Result<usize> {
        super::reset_daily_counters(&self.db).await
    }

    pub async fn status(&self) -> Result<Vec<SourceStatus>> {
        super::status(&self.config, &self.db).await
    }

    fn build_schedulers(&self) -> Result<Vec<SourceScheduler>> {
        let plugins = Arc::new(PluginChain::new(self.config.plugins.clone()));
        let live = &self.config.live;

        let history = HistoryStore::new(self.db.clone(), live.random_history_capacity);
        let counter = CounterStore::new(self.db.clone());
        let state = StateStore::new(self.db.clone());

        let poster = BatchPoster::new(
            self.client.clone(),
            plugins,
            live.random_marker.clone(),
            history.clone(),
            counter.clone(),
            state,
        );

        Ok(self
            .config
            .source_configs()?
            .into_iter()
            .map(|source| {
                let fetcher = PoolFetcher::new(self.client.clone(), source.max_text_length);
                SourceScheduler::new(
                    source,
                    fetcher,
                    poster.clone(),
                    history.clone(),
                    counter.clone(),
                    self.events.clone(),
                )
            })
            .collect())
    }
}

impl Drop for RandomHandler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
