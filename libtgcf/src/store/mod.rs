//! Persistent scheduling state
//!
//! Three stores share the state database, each keyed by source chat id:
//!
//! - [`HistoryStore`]: bounded set of message ids already reposted
//! - [`CounterStore`]: per-day repost counter
//! - [`StateStore`]: lifetime totals
//!
//! Every mutation is a single SQL statement or a single transaction, so
//! scheduler tasks (and separate processes sharing the database file) never
//! lose updates. There is no in-process locking. [`record_sent`] writes all
//! three stores for one reposted message in a single transaction.

pub mod counter;
pub mod history;
pub mod state;

pub use counter::CounterStore;
pub use history::HistoryStore;
pub use state::StateStore;

use chrono::{NaiveDate, Utc};

use crate::error::{DbError, Result};

/// Day boundaries are UTC
pub fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

const DAY_FORMAT: &str = "%Y-%m-%d";

fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DAY_FORMAT).map_err(|e| {
        DbError::Corrupt(format!("invalid counter day '{}': {}", value, e)).into()
    })
}

/// Mark `message_id` as reposted at `posted_at` (unix seconds)
///
/// The history entry, today's count and the lifetime totals commit together;
/// on error none of them changed. Returns the new daily count.
pub async fn record_sent(
    history: &HistoryStore,
    counter: &CounterStore,
    state: &StateStore,
    source: i64,
    message_id: i64,
    posted_at: i64,
) -> Result<u32> {
    let mut tx = history.db().pool().begin().await.map_err(DbError::SqlxError)?;

    history.record_in(&mut tx, source, message_id, posted_at).await?;
    let count = counter.increment_in(&mut tx, source, 1, utc_today()).await?;
    state.bump_in(&mut tx, source, posted_at).await?;

    tx.commit().await.map_err(DbError::SqlxError)?;
    Ok(count)
}
