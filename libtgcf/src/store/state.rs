//! Lifetime totals per source

use sqlx::SqliteConnection;

use crate::db::Database;
use crate::error::{DbError, Result};
use crate::types::RandomState;

#[derive(Clone)]
pub struct StateStore {
    db: Database,
}

impl StateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Note one successful repost at `posted_at` (unix seconds)
    pub async fn bump(&self, source: i64, posted_at: i64) -> Result<()> {
        let mut conn = self.db.pool().acquire().await.map_err(DbError::SqlxError)?;
        self.bump_in(&mut conn, source, posted_at).await
    }

    pub(crate) async fn bump_in(
        &self,
        conn: &mut SqliteConnection,
        source: i64,
        posted_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO random_state (source_id, last_posted_at, total_sent)
            VALUES (?, ?, 1)
            ON CONFLICT(source_id) DO UPDATE SET
                last_posted_at = excluded.last_posted_at,
                total_sent = random_state.total_sent + 1
            "#,
        )
        .bind(source)
        .bind(posted_at)
        .execute(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get(&self, source: i64) -> Result<RandomState> {
        let row = sqlx::query_as::<_, (Option<i64>, i64)>(
            "SELECT last_posted_at, total_sent FROM random_state WHERE source_id = ?",
        )
        .bind(source)
        .fetch_optional(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(match row {
            Some((last_posted_at, total_sent)) => RandomState {
                last_posted_at,
                total_sent: total_sent.max(0) as u64,
            },
            None => RandomState::default(),
        })
    }

    /// Drop the totals for `source`
    pub async fn forget(&self, source: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM random_state WHERE source_id = ?")
            .bind(source)
            .execute(self.db.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}
