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

mod checkpoint;
mod snapshots;

use std::{str::FromStr, sync::Arc};

use alloy::primitives::U256;
use sqlx::{any::AnyPoolOptions, AnyPool};
use thiserror::Error;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use snapshots::{BalanceSnapshot, SnapshotStore, YieldRecord};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQL error {0:?}")]
    SqlErr(#[from] sqlx::Error),

    #[error("SQL Migration error {0:?}")]
    MigrateErr(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid block number: {0}")]
    BadBlockNumb(String),

    #[error("Invalid stored value: {0}")]
    BadValue(String),

    #[error("Checkpoint regression for {scanner_id}: current {current}, attempted {attempted}")]
    CheckpointRegression { scanner_id: String, current: u64, attempted: u64 },
}

/// SQL backed store for the scanner checkpoint and the snapshot tables.
///
/// Works against either SQLite or PostgreSQL through the `Any` driver.
pub struct ScannerDb {
    pool: AnyPool,
}

pub type DbObj = Arc<ScannerDb>;

impl ScannerDb {
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(5).connect(database_url).await?;

        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

/// Zero-padded decimal so lexical order matches numeric order.
pub(crate) fn pad_u256(value: U256) -> String {
    format!("{:0>78}", value)
}

pub(crate) fn unpad_u256(s: &str) -> Result<U256, DbError> {
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str(trimmed).map_err(|e| DbError::BadValue(format!("invalid U256 {s}: {e}")))
}

pub(crate) fn to_db_block(block: u64) -> Result<i64, DbError> {
    i64::try_from(block).map_err(|_| DbError::BadBlockNumb(block.to_string()))
}

pub(crate) fn from_db_block(value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| DbError::BadBlockNumb(value.to_string()))
}
