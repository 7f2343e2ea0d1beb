//! Random archive reposting
//!
//! Live mode can repost random historical messages of a source chat to its
//! destinations. Each active source gets its own [`SourceScheduler`] task,
//! owned by a [`RandomHandler`]:
//!
//! - [`PoolFetcher`] reads a window of recent history
//! - [`selector::select`] picks unposted messages without replacement
//! - [`BatchPoster`] sends them and records the result
//!
//! Scheduling state lives in the database (see [`crate::store`]) and survives
//! restarts.

pub mod fetcher;
pub mod handler;
pub mod poster;
pub mod scheduler;
pub mod selector;

pub use fetcher::PoolFetcher;
pub use handler::RandomHandler;
pub use poster::{BatchPoster, BatchReport, MessageReport, PostOutcome};
pub use scheduler::{CycleOutcome, SchedulerState, SourceScheduler};

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::store::{CounterStore, HistoryStore, StateStore};

/// Persisted scheduling state of one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub source: i64,
    pub date: NaiveDate,
    pub count: u32,
    /// 0 means unlimited
    pub limit: u32,
    pub remaining: Option<u32>,
    pub history_len: usize,
    pub history_capacity: usize,
    pub total_sent: u64,
    pub last_posted_at: Option<i64>,
    pub destinations: Vec<i64>,
}

/// Status of every configured random source
pub async fn status(config: &Config, db: &Database) -> Result<Vec<SourceStatus>> {
    let capacity = config.live.random_history_capacity;
    let history = HistoryStore::new(db.clone(), capacity);
    let counter = CounterStore::new(db.clone());
    let state = StateStore::new(db.clone());

    let mut statuses = Vec::new();
    for source in config.source_configs()? {
        let today = counter.get_count(source.source).await?;
        let totals = state.get(source.source).await?;

        statuses.push(SourceStatus {
            source: source.source,
            date: today.date,
            count: today.count,
            limit: source.daily_limit,
            remaining: counter.remaining(source.source, source.daily_limit).await?,
            history_len: history.len(source.source).await?,
            history_capacity: capacity,
            total_sent: totals.total_sent,
            last_posted_at: totals.last_posted_at,
            destinations: source.destinations,
        });
    }

    Ok(statuses)
}

/// Reset today's counter of every source; returns how many were reset
pub async fn reset_daily_counters(db: &Database) -> Result<usize> {
    let reset = CounterStore::new(db.clone()).reset_all().await?;
    tracing::info!(reset, "reset daily random counters");
    Ok(reset)
}
