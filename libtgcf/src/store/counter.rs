//! Daily repost counters
//!
//! One row per source holding `(day, count)`. A row whose day is not today
//! reads as zero; the first increment of a new day overwrites it. Reads never
//! write, so checking a limit has no side effect.
//!
//! Each operation has an `_on` variant taking the current date explicitly.

use chrono::NaiveDate;
use sqlx::SqliteConnection;

use super::{format_day, parse_day, utc_today};
use crate::db::Database;
use crate::error::{DbError, Result};
use crate::types::DailyCount;

#[derive(Clone)]
pub struct CounterStore {
    db: Database,
}

impl CounterStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get_count(&self, source: i64) -> Result<DailyCount> {
        self.get_count_on(source, utc_today()).await
    }

    /// Count for `today`; a stale or missing row reads as `(today, 0)`
    pub async fn get_count_on(&self, source: i64, today: NaiveDate) -> Result<DailyCount> {
        let row = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT day, count FROM random_counters
            WHERE source_id = ?
            "#,
        )
        .bind(source)
        .fetch_optional(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        let count = match row {
            Some((day, count)) if parse_day(&day)? == today => to_count(count)?,
            _ => 0,
        };

        Ok(DailyCount { date: today, count })
    }

    pub async fn increment(&self, source: i64, by: u32) -> Result<u32> {
        self.increment_on(source, by, utc_today()).await
    }

    /// Add `by` to today's count and return the new count
    ///
    /// A single upsert: a row from an earlier day restarts from zero.
    pub async fn increment_on(&self, source: i64, by: u32, today: NaiveDate) -> Result<u32> {
        let mut conn = self.db.pool().acquire().await.map_err(DbError::SqlxError)?;
        self.increment_in(&mut conn, source, by, today).await
    }

    pub(crate) async fn increment_in(
        &self,
        conn: &mut SqliteConnection,
        source: i64,
        by: u32,
        today: NaiveDate,
    ) -> Result<u32> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO random_counters (source_id, day, count)
            VALUES (?, ?, ?)
            ON CONFLICT(source_id) DO UPDATE SET
                count = CASE
                    WHEN random_counters.day = excluded.day
                        THEN random_counters.count + excluded.count
                    ELSE excluded.count
                END,
                day = excluded.day
            RETURNING count
            "#,
        )
        .bind(source)
        .bind(format_day(today))
        .bind(i64::from(by))
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        to_count(count)
    }

    pub async fn reset(&self, source: i64) -> Result<()> {
        self.reset_on(source, utc_today()).await
    }

    /// Force `(today, 0)` for `source`
    pub async fn reset_on(&self, source: i64, today: NaiveDate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO random_counters (source_id, day, count)
            VALUES (?, ?, 0)
            ON CONFLICT(source_id) DO UPDATE SET day = excluded.day, count = 0
            "#,
        )
        .bind(source)
        .bind(format_day(today))
        .execute(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn reset_all(&self) -> Result<usize> {
        self.reset_all_on(utc_today()).await
    }

    /// Reset every known source; returns how many counters were reset
    pub async fn reset_all_on(&self, today: NaiveDate) -> Result<usize> {
        let result = sqlx::query("UPDATE random_counters SET day = ?, count = 0")
            .bind(format_day(today))
            .execute(self.db.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() as usize)
    }

    pub async fn would_exceed(&self, source: i64, by: u32, limit: u32) -> Result<bool> {
        self.would_exceed_on(source, by, limit, utc_today()).await
    }

    /// True when `limit` is nonzero and posting `by` more would pass it
    pub async fn would_exceed_on(
        &self,
        source: i64,
        by: u32,
        limit: u32,
        today: NaiveDate,
    ) -> Result<bool> {
        if limit == 0 {
            return Ok(false);
        }

        let current = self.get_count_on(source, today).await?;
        Ok(u64::from(current.count) + u64::from(by) > u64::from(limit))
    }

    pub async fn remaining(&self, source: i64, limit: u32) -> Result<Option<u32>> {
        self.remaining_on(source, limit, utc_today()).await
    }

    /// Messages still allowed today, `None` when unlimited
    pub async fn remaining_on(
        &self,
        source: i64,
        limit: u32,
        today: NaiveDate,
    ) -> Result<Option<u32>> {
        if limit == 0 {
            return Ok(None);
        }

        let current = self.get_count_on(source, today).await?;
        Ok(Some(limit.saturating_sub(current.count)))
    }
}

fn to_count(value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| DbError::Corrupt(format!("counter value {} out of range", value)).into())
}
