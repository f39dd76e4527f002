// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use sqlx::{any::AnyRow, Row};

use super::{from_db_block, to_db_block, DbError, ScannerDb};

/// Persisted cursor of one scanner.
///
/// `confirmed_block_cursor <= last_processed_block <= current_processing_block` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub scanner_id: String,
    /// Target block of the run in progress, or of the last run if none is in progress.
    pub current_processing_block: u64,
    /// Last block whose whole range was scanned without failures.
    pub last_processed_block: u64,
    /// `last_processed_block - confirmation_delay`, floored at zero.
    pub confirmed_block_cursor: u64,
    pub confirmation_delay: u64,
}

impl Checkpoint {
    fn from_row(row: &AnyRow) -> Result<Self, DbError> {
        Ok(Self {
            scanner_id: row.try_get("scanner_id")?,
            current_processing_block: from_db_block(row.try_get("current_processing_block")?)?,
            last_processed_block: from_db_block(row.try_get("last_processed_block")?)?,
            confirmed_block_cursor: from_db_block(row.try_get("confirmed_block_cursor")?)?,
            confirmation_delay: from_db_block(row.try_get("confirmation_delay")?)?,
        })
    }
}

impl Checkpoint {
    /// The checkpoint after a successful run up to `block`.
    ///
    /// Neither cursor may move backwards. Raising `confirmation_delay` between runs keeps the
    /// previous confirmed cursor instead of lowering it.
    pub(crate) fn advanced(
        existing: Option<&Checkpoint>,
        scanner_id: &str,
        block: u64,
        confirmation_delay: u64,
    ) -> Result<Self, DbError> {
        let confirmed = block.saturating_sub(confirmation_delay);
        let Some(existing) = existing else {
            return Ok(Self {
                scanner_id: scanner_id.to_string(),
                current_processing_block: block,
                last_processed_block: block,
                confirmed_block_cursor: confirmed,
                confirmation_delay,
            });
        };

        if block < existing.last_processed_block {
            return Err(DbError::CheckpointRegression {
                scanner_id: scanner_id.to_string(),
                current: existing.last_processed_block,
                attempted: block,
            });
        }

        Ok(Self {
            scanner_id: scanner_id.to_string(),
            current_processing_block: existing.current_processing_block.max(block),
            last_processed_block: block,
            confirmed_block_cursor: confirmed.max(existing.confirmed_block_cursor),
            confirmation_delay,
        })
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get_checkpoint(&self, scanner_id: &str) -> Result<Option<Checkpoint>, DbError>;

    /// Record `block` as the last successfully processed block of `scanner_id`.
    ///
    /// Rejects with [DbError::CheckpointRegression] if `block` is below the stored value.
    async fn set_checkpoint(
        &self,
        scanner_id: &str,
        block: u64,
        confirmation_delay: u64,
    ) -> Result<Checkpoint, DbError>;

    /// Record the target of a run that is starting. Only updates an existing row and
    /// never moves the processed or confirmed cursors.
    async fn mark_processing(&self, scanner_id: &str, block: u64) -> Result<(), DbError>;
}

const SELECT_CHECKPOINT: &str = "SELECT scanner_id, current_processing_block, last_processed_block, \
     confirmed_block_cursor, confirmation_delay FROM scanner_checkpoints WHERE scanner_id = $1";

#[async_trait]
impl CheckpointStore for ScannerDb {
    async fn get_checkpoint(&self, scanner_id: &str) -> Result<Option<Checkpoint>, DbError> {
        let row = sqlx::query(SELECT_CHECKPOINT).bind(scanner_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Checkpoint::from_row).transpose()
    }

    async fn set_checkpoint(
        &self,
        scanner_id: &str,
        block: u64,
        confirmation_delay: u64,
    ) -> Result<Checkpoint, DbError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(SELECT_CHECKPOINT)
            .bind(scanner_id)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(Checkpoint::from_row)
            .transpose()?;

        let checkpoint =
            Checkpoint::advanced(existing.as_ref(), scanner_id, block, confirmation_delay)?;

        sqlx::query(
            "INSERT INTO scanner_checkpoints
             (scanner_id, current_processing_block, last_processed_block, confirmed_block_cursor, confirmation_delay, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (scanner_id) DO UPDATE SET
             current_processing_block = EXCLUDED.current_processing_block,
             last_processed_block = EXCLUDED.last_processed_block,
             confirmed_block_cursor = EXCLUDED.confirmed_block_cursor,
             confirmation_delay = EXCLUDED.confirmation_delay,
             updated_at = EXCLUDED.updated_at",
        )
        .bind(scanner_id)
        .bind(to_db_block(checkpoint.current_processing_block)?)
        .bind(to_db_block(checkpoint.last_processed_block)?)
        .bind(to_db_block(checkpoint.confirmed_block_cursor)?)
        .bind(to_db_block(confirmation_delay)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(checkpoint)
    }

    async fn mark_processing(&self, scanner_id: &str, block: u64) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE scanner_checkpoints SET current_processing_block = $2, updated_at = $3
             WHERE scanner_id = $1 AND current_processing_block < $2",
        )
        .bind(scanner_id)
        .bind(to_db_block(block)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestDb;

    #[tokio::test]
    async fn set_get_checkpoint() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db;

        assert_eq!(db.get_checkpoint("snapshots").await.unwrap(), None);

        let written = db.set_checkpoint("snapshots", 138, 12).await.unwrap();
        let read = db.get_checkpoint("snapshots").await.unwrap().unwrap();
        assert_eq!(written, read);
        assert_eq!(read.last_processed_block, 138);
        assert_eq!(read.confirmed_block_cursor, 126);
        assert_eq!(read.current_processing_block, 138);

        db.set_checkpoint("snapshots", 200, 12).await.unwrap();
        let read = db.get_checkpoint("snapshots").await.unwrap().unwrap();
        assert_eq!(read.last_processed_block, 200);
        assert_eq!(read.confirmed_block_cursor, 188);

        // Other scanners are independent.
        assert_eq!(db.get_checkpoint("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn confirmed_cursor_floors_at_zero() {
        let test_db = TestDb::new().await.unwrap();
        let checkpoint = test_db.db.set_checkpoint("snapshots", 5, 12).await.unwrap();
        assert_eq!(checkpoint.confirmed_block_cursor, 0);
    }

    #[tokio::test]
    async fn rejects_regression() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db;

        db.set_checkpoint("snapshots", 138, 12).await.unwrap();
        let err = db.set_checkpoint("snapshots", 100, 12).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::CheckpointRegression { current: 138, attempted: 100, .. }
        ));
        assert_eq!(db.get_checkpoint("snapshots").await.unwrap().unwrap().last_processed_block, 138);

        // Re-setting the same block is allowed.
        db.set_checkpoint("snapshots", 138, 12).await.unwrap();
    }

    #[tokio::test]
    async fn raising_delay_keeps_confirmed_cursor() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db;

        let before = db.set_checkpoint("snapshots", 140, 12).await.unwrap();
        assert_eq!(before.confirmed_block_cursor, 128);

        let after = db.set_checkpoint("snapshots", 141, 20).await.unwrap();
        assert_eq!(after.last_processed_block, 141);
        assert_eq!(after.confirmation_delay, 20);
        assert_eq!(after.confirmed_block_cursor, 128);
        assert_eq!(db.get_checkpoint("snapshots").await.unwrap().unwrap(), after);

        // Once the new delay catches up the cursor moves again.
        let later = db.set_checkpoint("snapshots", 160, 20).await.unwrap();
        assert_eq!(later.confirmed_block_cursor, 140);
    }

    #[tokio::test]
    async fn mark_processing_only_moves_current_block() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db;

        // No row yet, nothing to update.
        db.mark_processing("snapshots", 50).await.unwrap();
        assert_eq!(db.get_checkpoint("snapshots").await.unwrap(), None);

        db.set_checkpoint("snapshots", 100, 12).await.unwrap();
        db.mark_processing("snapshots", 138).await.unwrap();
        let read = db.get_checkpoint("snapshots").await.unwrap().unwrap();
        assert_eq!(read.current_processing_block, 138);
        assert_eq!(read.last_processed_block, 100);
        assert_eq!(read.confirmed_block_cursor, 88);

        // Never moves backwards.
        db.mark_processing("snapshots", 120).await.unwrap();
        let read = db.get_checkpoint("snapshots").await.unwrap().unwrap();
        assert_eq!(read.current_processing_block, 138);

        // A later successful run keeps the larger processing block.
        db.set_checkpoint("snapshots", 130, 12).await.unwrap();
        let read = db.get_checkpoint("snapshots").await.unwrap().unwrap();
        assert_eq!(read.current_processing_block, 138);
        assert_eq!(read.last_processed_block, 130);
    }
}
