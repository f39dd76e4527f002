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

use std::str::FromStr;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{any::AnyRow, Row};

use super::{from_db_block, pad_u256, to_db_block, unpad_u256, DbError, ScannerDb};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Share-token balance of one address on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub address: Address,
    pub date: NaiveDate,
    /// Block the balance was read at.
    pub block_number: u64,
    pub balance: U256,
    /// Consecutive days, ending at `date`, with a non-zero balance.
    pub continuous_holding_days: u64,
}

/// Yield accrued by one address on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YieldRecord {
    pub address: Address,
    pub date: NaiveDate,
    pub block_number: u64,
    pub share_balance: U256,
    /// `share_balance` converted at the pool ratio at `block_number`.
    pub underlying_value: U256,
    /// Contract exchange rate at `block_number`, 1e18 scaled.
    pub exchange_rate: U256,
    pub daily_yield: U256,
}

/// Address registry plus idempotent per-day snapshot rows keyed by (address, date).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn list_all_user_addresses(&self) -> Result<Vec<Address>, DbError>;

    /// Register addresses, ignoring ones already known. Returns how many were new.
    async fn add_user_addresses(&self, addresses: &[Address], block: u64)
        -> Result<u64, DbError>;

    async fn get_balance_snapshot(
        &self,
        address: Address,
        date: NaiveDate,
    ) -> Result<Option<BalanceSnapshot>, DbError>;

    async fn get_balance_snapshots_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<BalanceSnapshot>, DbError>;

    /// Insert the snapshot unless a row for (address, date) exists. Returns whether it was inserted.
    async fn upsert_balance_snapshot(&self, snapshot: &BalanceSnapshot) -> Result<bool, DbError>;

    async fn get_yield_record(
        &self,
        address: Address,
        date: NaiveDate,
    ) -> Result<Option<YieldRecord>, DbError>;

    /// Insert the record unless a row for (address, date) exists. Returns whether it was inserted.
    async fn upsert_yield_record(&self, record: &YieldRecord) -> Result<bool, DbError>;
}

fn parse_address(s: &str) -> Result<Address, DbError> {
    Address::from_str(s).map_err(|e| DbError::BadValue(format!("invalid address {s}: {e}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| DbError::BadValue(format!("invalid date {s}: {e}")))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

impl BalanceSnapshot {
    fn from_row(row: &AnyRow) -> Result<Self, DbError> {
        Ok(Self {
            address: parse_address(&row.try_get::<String, _>("address")?)?,
            date: parse_date(&row.try_get::<String, _>("snapshot_date")?)?,
            block_number: from_db_block(row.try_get("block_number")?)?,
            balance: unpad_u256(&row.try_get::<String, _>("balance")?)?,
            continuous_holding_days: from_db_block(row.try_get("continuous_holding_days")?)?,
        })
    }
}

impl YieldRecord {
    fn from_row(row: &AnyRow) -> Result<Self, DbError> {
        Ok(Self {
            address: parse_address(&row.try_get::<String, _>("address")?)?,
            date: parse_date(&row.try_get::<String, _>("record_date")?)?,
            block_number: from_db_block(row.try_get("block_number")?)?,
            share_balance: unpad_u256(&row.try_get::<String, _>("share_balance")?)?,
            underlying_value: unpad_u256(&row.try_get::<String, _>("underlying_value")?)?,
            exchange_rate: unpad_u256(&row.try_get::<String, _>("exchange_rate")?)?,
            daily_yield: unpad_u256(&row.try_get::<String, _>("daily_yield")?)?,
        })
    }
}

#[async_trait]
impl SnapshotStore for ScannerDb {
    async fn list_all_user_addresses(&self) -> Result<Vec<Address>, DbError> {
        let rows = sqlx::query("SELECT address FROM user_addresses ORDER BY address")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| parse_address(&row.try_get::<String, _>("address")?)).collect()
    }

    async fn add_user_addresses(
        &self,
        addresses: &[Address],
        block: u64,
    ) -> Result<u64, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut added = 0;
        for address in addresses {
            let res = sqlx::query(
                "INSERT INTO user_addresses (address, first_seen_block) VALUES ($1, $2)
                 ON CONFLICT (address) DO NOTHING",
            )
            .bind(format!("{:#x}", address))
            .bind(to_db_block(block)?)
            .execute(&mut *tx)
            .await?;
            added += res.rows_affected();
        }
        tx.commit().await?;
        Ok(added)
    }

    async fn get_balance_snapshot(
        &self,
        address: Address,
        date: NaiveDate,
    ) -> Result<Option<BalanceSnapshot>, DbError> {
        let row = sqlx::query(
            "SELECT address, snapshot_date, block_number, balance, continuous_holding_days
             FROM balance_snapshots WHERE address = $1 AND snapshot_date = $2",
        )
        .bind(format!("{:#x}", address))
        .bind(format_date(date))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(BalanceSnapshot::from_row).transpose()
    }

    async fn get_balance_snapshots_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<BalanceSnapshot>, DbError> {
        let rows = sqlx::query(
            "SELECT address, snapshot_date, block_number, balance, continuous_holding_days
             FROM balance_snapshots WHERE snapshot_date = $1 ORDER BY address",
        )
        .bind(format_date(date))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(BalanceSnapshot::from_row).collect()
    }

    async fn upsert_balance_snapshot(&self, snapshot: &BalanceSnapshot) -> Result<bool, DbError> {
        let res = sqlx::query(
            "INSERT INTO balance_snapshots
             (address, snapshot_date, block_number, balance, continuous_holding_days)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (address, snapshot_date) DO NOTHING",
        )
        .bind(format!("{:#x}", snapshot.address))
        .bind(format_date(snapshot.date))
        .bind(to_db_block(snapshot.block_number)?)
        .bind(pad_u256(snapshot.balance))
        .bind(to_db_block(snapshot.continuous_holding_days)?)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn get_yield_record(
        &self,
        address: Address,
        date: NaiveDate,
    ) -> Result<Option<YieldRecord>, DbError> {
        let row = sqlx::query(
            "SELECT address, record_date, block_number, share_balance, underlying_value, exchange_rate, daily_yield
             FROM yield_records WHERE address = $1 AND record_date = $2",
        )
        .bind(format!("{:#x}", address))
        .bind(format_date(date))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(YieldRecord::from_row).transpose()
    }

    async fn upsert_yield_record(&self, record: &YieldRecord) -> Result<bool, DbError> {
        let res = sqlx::query(
            "INSERT INTO yield_records
             (address, record_date, block_number, share_balance, underlying_value, exchange_rate, daily_yield)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (address, record_date) DO NOTHING",
        )
        .bind(format!("{:#x}", record.address))
        .bind(format_date(record.date))
        .bind(to_db_block(record.block_number)?)
        .bind(pad_u256(record.share_balance))
        .bind(pad_u256(record.underlying_value))
        .bind(pad_u256(record.exchange_rate))
        .bind(pad_u256(record.daily_yield))
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }
}
