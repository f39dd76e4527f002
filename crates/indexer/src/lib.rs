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

//! Block-cursor scanner that writes daily balance and yield snapshots for every holder of
//! the pool share token.

use alloy::primitives::Address;
use liquid_staking_rewards::ChainReadError;
use thiserror::Error;

pub mod config;
pub mod db;
pub mod scanner;
pub mod test_utils;

pub use config::ScannerConfig;
pub use db::{DbError, DbObj, ScannerDb};
pub use scanner::{BlockRangeScanner, ScanResult, ScannerState};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbError),

    #[error("Chain read error: {0}")]
    ChainReadError(#[from] ChainReadError),

    #[error("Snapshot failed for {} addresses", .0.len())]
    AddressesFailed(Vec<Address>),

    #[error("Error: {0}")]
    Error(#[from] anyhow::Error),

    #[error("Maximum retries reached")]
    MaxRetries,
}

impl ServiceError {
    /// Whether retrying the same run can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ServiceError::ChainReadError(_) | ServiceError::AddressesFailed(_) => true,
            ServiceError::DatabaseError(DbError::SqlErr(_)) => true,
            ServiceError::DatabaseError(_) | ServiceError::Error(_) | ServiceError::MaxRetries => {
                false
            }
        }
    }
}
