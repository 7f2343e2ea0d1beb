//! Bounded history of reposted message ids
//!
//! Once a source holds more than `capacity` ids the oldest quarter is dropped
//! in one go, so very old messages eventually become eligible again.

use sqlx::SqliteConnection;
use std::collections::HashSet;

use crate::db::Database;
use crate::error::{DbError, Result};

#[derive(Clone)]
pub struct HistoryStore {
    db: Database,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(db: Database, capacity: usize) -> Self {
        Self { db, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `message_id` is currently recorded for `source`
    pub async fn has_posted(&self, source: i64, message_id: i64) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT 1 FROM random_history
            WHERE source_id = ? AND message_id = ?
            "#,
        )
        .bind(source)
        .bind(message_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.is_some())
    }

    /// Record a reposted message id
    ///
    /// Idempotent: an id that is already present keeps its original position.
    /// The insert and any pruning commit together or not at all.
    pub async fn record(&self, source: i64, message_id: i64) -> Result<()> {
        let mut tx = self.db.pool().begin().await.map_err(DbError::SqlxError)?;
        self.record_in(&mut tx, source, message_id, chrono::Utc::now().timestamp())
            .await?;
        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Insert and prune on `conn`; the caller owns the transaction
    pub(crate) async fn record_in(
        &self,
        conn: &mut SqliteConnection,
        source: i64,
        message_id: i64,
        posted_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO random_history (source_id, message_id, posted_at)
            VALUES (?, ?, ?)
            ON CONFLICT(source_id, message_id) DO NOTHING
            "#,
        )
        .bind(source)
        .bind(message_id)
        .bind(posted_at)
        .execute(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        let (len,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM random_history WHERE source_id = ?",
        )
        .bind(source)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        let len = len as usize;
        if len > self.capacity {
            // A lowered capacity can leave more than a quarter to drop
            let prune = (len - self.capacity).max(self.capacity / 4);

            sqlx::query(
                r#"
                DELETE FROM random_history
                WHERE seq IN (
                    SELECT seq FROM random_history
                    WHERE source_id = ?
                    ORDER BY seq ASC
                    LIMIT ?
                )
                "#,
            )
            .bind(source)
            .bind(prune as i64)
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;

            tracing::debug!(source, pruned = prune, "pruned random history");
        }

        Ok(())
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    /// All ids currently recorded for `source`
    pub async fn posted_ids(&self, source: i64) -> Result<HashSet<i64>> {
        let rows = sqlx::query_as::<_, (i64,)>(
            "SELECT message_id FROM random_history WHERE source_id = ?",
        )
        .bind(source)
        .fetch_all(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Recorded ids, oldest first
    pub async fn posted_ids_ordered(&self, source: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query_as::<_, (i64,)>(
            "SELECT message_id FROM random_history WHERE source_id = ? ORDER BY seq ASC",
        )
        .bind(source)
        .fetch_all(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn len(&self, source: i64) -> Result<usize> {
        let (len,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM random_history WHERE source_id = ?",
        )
        .bind(source)
        .fetch_one(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(len as usize)
    }

    /// Forget every recorded id for `source`; returns how many were removed
    pub async fn clear(&self, source: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM random_history WHERE source_id = ?")
            .bind(source)
            .execute(self.db.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store(capacity: usize) -> HistoryStore {
        HistoryStore::new(Database::in_memory().await.unwrap(), capacity)
    }

    #[tokio::test]
    async fn test_record_then_has_posted() {
        let history = store(100).await;

        assert!(!history.has_posted(-1, 42).await.unwrap());
        history.record(-1, 42).await.unwrap();
        assert!(history.has_posted(-1, 42).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let history = store(100).await;

        history.record(-1, 7).await.unwrap();
        history.record(-1, 8).await.unwrap();
        let once = history.posted_ids_ordered(-1).await.unwrap();

        history.record(-1, 7).await.unwrap();
        let twice = history.posted_ids_ordered(-1).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(history.len(-1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sources_are_independent() {
        let history = store(100).await;

        history.record(-1, 5).await.unwrap();
        assert!(!history.has_posted(-2, 5).await.unwrap());
        assert_eq!(history.len(-2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_drops_oldest_quarter() {
        let history = store(8).await;

        for id in 1..=8 {
            history.record(-1, id).await.unwrap();
        }
        assert_eq!(history.len(-1).await.unwrap(), 8);

        // The ninth insert exceeds capacity and drops the two oldest
        history.record(-1, 9).await.unwrap();
        assert_eq!(
            history.posted_ids_ordered(-1).await.unwrap(),
            vec![3, 4, 5, 6, 7, 8, 9]
        );
        assert!(!history.has_posted(-1, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_never_exceeds_capacity_and_keeps_newest() {
        let capacity = 12;
        let history = store(capacity).await;

        for id in 1..=100i64 {
            history.record(-1, id).await.unwrap();

            let kept = history.posted_ids_ordered(-1).await.unwrap();
            assert!(kept.len() <= capacity, "kept {} ids", kept.len());

            // What survives is always the newest contiguous run ending at `id`
            let oldest = id - kept.len() as i64 + 1;
            let expected: Vec<i64> = (oldest..=id).collect();
            assert_eq!(kept, expected);
        }
    }

    #[tokio::test]
    async fn test_lowered_capacity_prunes_down() {
        let db = Database::in_memory().await.unwrap();
        let wide = HistoryStore::new(db.clone(), 100);
        for id in 1..=40 {
            wide.record(-1, id).await.unwrap();
        }

        let narrow = HistoryStore::new(db, 10);
        narrow.record(-1, 41).await.unwrap();
        assert_eq!(narrow.len(-1).await.unwrap(), 10);
        assert!(narrow.has_posted(-1, 41).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear() {
        let history = store(100).await;
        history.record(-1, 1).await.unwrap();
        history.record(-1, 2).await.unwrap();
        history.record(-2, 1).await.unwrap();

        assert_eq!(history.clear(-1).await.unwrap(), 2);
        assert_eq!(history.len(-1).await.unwrap(), 0);
        assert_eq!(history.len(-2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shared_file_between_handles() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.db").to_string_lossy().to_string();

        let a = HistoryStore::new(Database::new(&path).await.unwrap(), 1000);
        let b = HistoryStore::new(Database::new(&path).await.unwrap(), 1000);

        // Overlapping ids from both handles, interleaved
        for id in 0..50 {
            a.record(-1, id).await.unwrap();
            b.record(-1, id + 25).await.unwrap();
        }

        assert_eq!(a.len(-1).await.unwrap(), 75);
        assert_eq!(b.posted_ids(-1).await.unwrap().len(), 75);
        assert!(b.has_posted(-1, 0).await.unwrap());
        assert!(a.has_posted(-1, 74).await.unwrap());
    }
}
