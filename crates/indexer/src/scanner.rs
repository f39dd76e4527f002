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

//! Scheduled scanner that snapshots every known holder at a confirmed block height and
//! advances a persisted cursor only when the whole run succeeded.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use alloy::primitives::{Address, U256};
use anyhow::anyhow;
use chrono::{DateTime, NaiveDate};
use futures_util::future::join_all;
use liquid_staking_rewards::{
    chain::with_timeout, ChainReader, Clock, RewardParameterFetcher, RewardParameters,
    EXCHANGE_RATE_SCALE,
};
use tokio::{sync::RwLock, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ScannerConfig,
    db::{BalanceSnapshot, CheckpointStore, SnapshotStore, YieldRecord},
    ServiceError,
};

/// Longest pause between retries of a failed run.
const MAX_BACKOFF_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerState {
    Idle,
    Running,
    Completed,
    /// The last run did not advance the checkpoint.
    Failed { reason: String },
}

/// Outcome of one [BlockRangeScanner::run_once] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Checkpoint block the run started from.
    pub from_block: u64,
    /// Confirmed block the balances were read at.
    pub target_block: u64,
    /// Addresses registered for the first time by holder discovery.
    pub new_addresses: u64,
    pub addresses_scanned: usize,
    /// Snapshot and yield rows inserted.
    pub rows_written: u64,
    /// Addresses whose rows for the date were already present.
    pub already_recorded: Vec<Address>,
    pub failed_addresses: Vec<Address>,
    pub checkpoint_advanced: bool,
}

impl ScanResult {
    fn noop(from_block: u64, target_block: u64) -> Self {
        Self {
            from_block,
            target_block,
            new_addresses: 0,
            addresses_scanned: 0,
            rows_written: 0,
            already_recorded: Vec::new(),
            failed_addresses: Vec::new(),
            checkpoint_advanced: false,
        }
    }

    /// No confirmed blocks past the checkpoint, so nothing was done.
    pub fn is_noop(&self) -> bool {
        self.from_block >= self.target_block
    }

    /// Turn per-address failures into an error.
    pub fn into_result(self) -> Result<Self, ServiceError> {
        if self.failed_addresses.is_empty() {
            Ok(self)
        } else {
            Err(ServiceError::AddressesFailed(self.failed_addresses))
        }
    }
}

#[derive(Debug, Default)]
struct AddressOutcome {
    rows_written: u64,
    already_recorded: bool,
}

/// Streak length for today's snapshot: yesterday's count plus one when yesterday's balance
/// was non-zero, otherwise a fresh streak of one.
fn continuous_holding_days(previous: Option<&BalanceSnapshot>) -> u64 {
    match previous {
        Some(prev) if !prev.balance.is_zero() => prev.continuous_holding_days + 1,
        _ => 1,
    }
}

/// Growth of yesterday's shares through the change in exchange rate since yesterday.
fn daily_yield(previous: Option<&YieldRecord>, exchange_rate: U256) -> U256 {
    let Some(prev) = previous else {
        return U256::ZERO;
    };
    prev.share_balance.saturating_mul(exchange_rate.saturating_sub(prev.exchange_rate))
        / U256::from(EXCHANGE_RATE_SCALE)
}

pub struct BlockRangeScanner {
    reader: Arc<dyn ChainReader>,
    checkpoints: Arc<dyn CheckpointStore>,
    snapshots: Arc<dyn SnapshotStore>,
    fetcher: RewardParameterFetcher,
    clock: Arc<dyn Clock>,
    config: ScannerConfig,
    state: RwLock<ScannerState>,
}

impl BlockRangeScanner {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        checkpoints: Arc<dyn CheckpointStore>,
        snapshots: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        config: ScannerConfig,
    ) -> Self {
        let fetcher = RewardParameterFetcher::new(reader.clone(), clock.clone());
        Self {
            reader,
            checkpoints,
            snapshots,
            fetcher,
            clock,
            config,
            state: RwLock::new(ScannerState::Idle),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub async fn state(&self) -> ScannerState {
        self.state.read().await.clone()
    }

    /// Scan from the checkpoint up to the confirmed head once.
    ///
    /// Per-address failures do not abort the run: they are reported in
    /// [ScanResult::failed_addresses] and keep the checkpoint where it was. Failing to read
    /// the chain head, to discover holders, or to read pool parameters aborts the run with
    /// an error and no checkpoint change.
    pub async fn run_once(&self) -> Result<ScanResult, ServiceError> {
        *self.state.write().await = ScannerState::Running;

        let result = self.scan().await;
        let state = match &result {
            Ok(scan) if scan.failed_addresses.is_empty() => ScannerState::Completed,
            Ok(scan) => ScannerState::Failed {
                reason: format!("{} addresses failed", scan.failed_addresses.len()),
            },
            Err(e) => ScannerState::Failed { reason: e.to_string() },
        };
        *self.state.write().await = state;

        result
    }

    async fn scan(&self) -> Result<ScanResult, ServiceError> {
        let start = Instant::now();
        let scanner_id = self.config.scanner_id.as_str();

        let from_block = match self.checkpoints.get_checkpoint(scanner_id).await? {
            Some(checkpoint) => checkpoint.last_processed_block,
            None => self.config.start_block,
        };

        let latest = with_timeout(self.config.rpc_timeout(), self.reader.latest_block()).await?;
        let target = latest.saturating_sub(self.config.confirmation_delay);
        if from_block >= target {
            tracing::debug!(
                "No confirmed blocks to scan [checkpoint={}, target={}]",
                from_block,
                target
            );
            return Ok(ScanResult::noop(from_block, target));
        }

        tracing::info!("Scanning blocks {} to {} [latest={}]", from_block, target, latest);
        self.checkpoints.mark_processing(scanner_id, target).await?;

        let new_addresses = self.discover_holders(from_block, target).await?;
        let params = self.fetcher.fetch_at(target).await?;
        let date = self.snapshot_date()?;

        let addresses = self.snapshots.list_all_user_addresses().await?;

        // Every chunk settles before the next starts, and all of them before the checkpoint
        // is considered.
        let mut outcomes = Vec::with_capacity(addresses.len());
        for chunk in addresses.chunks(self.config.address_concurrency.max(1)) {
            let futures = chunk.iter().map(|&address| {
                let params = &params;
                async move { (address, self.snapshot_address(address, target, date, params).await) }
            });
            outcomes.extend(join_all(futures).await);
        }

        let mut result = ScanResult {
            new_addresses,
            addresses_scanned: addresses.len(),
            ..ScanResult::noop(from_block, target)
        };
        for (address, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    result.rows_written += outcome.rows_written;
                    if outcome.already_recorded {
                        result.already_recorded.push(address);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to snapshot {:#x} at block {}: {}", address, target, e);
                    result.failed_addresses.push(address);
                }
            }
        }
        result.already_recorded.sort();
        result.failed_addresses.sort();

        if result.failed_addresses.is_empty() {
            self.checkpoints
                .set_checkpoint(scanner_id, target, self.config.confirmation_delay)
                .await?;
            result.checkpoint_advanced = true;
        } else {
            tracing::warn!(
                "{} of {} addresses failed, checkpoint stays at {}",
                result.failed_addresses.len(),
                addresses.len(),
                from_block
            );
        }

        tracing::info!(
            "Scan of blocks {} to {} finished in {:?} [addresses={}, rows_written={}, already_recorded={}, failed={}]",
            from_block,
            target,
            start.elapsed(),
            result.addresses_scanned,
            result.rows_written,
            result.already_recorded.len(),
            result.failed_addresses.len()
        );

        Ok(result)
    }

    /// Register every address seen in share-token transfers within `[from_block, to_block]`.
    async fn discover_holders(&self, from_block: u64, to_block: u64) -> Result<u64, ServiceError> {
        let chunk_size = self.config.chunk_size.max(1);
        let mut added = 0;
        let mut chunk_start = from_block;
        loop {
            let chunk_end = to_block.min(chunk_start.saturating_add(chunk_size - 1));
            let holders = with_timeout(
                self.config.rpc_timeout(),
                self.reader.token_holders_in_range(chunk_start, chunk_end),
            )
            .await?;
            let holders: Vec<Address> =
                holders.into_iter().filter(|address| !address.is_zero()).collect();
            if !holders.is_empty() {
                added += self.snapshots.add_user_addresses(&holders, chunk_start).await?;
            }
            tracing::trace!(
                "Holder discovery {} to {}: {} holders",
                chunk_start,
                chunk_end,
                holders.len()
            );

            if chunk_end >= to_block {
                break;
            }
            chunk_start = chunk_end + 1;
        }

        if added > 0 {
            tracing::info!("Registered {} new holder addresses", added);
        }
        Ok(added)
    }

    async fn snapshot_address(
        &self,
        address: Address,
        target: u64,
        date: NaiveDate,
        params: &RewardParameters,
    ) -> Result<AddressOutcome, ServiceError> {
        let balance =
            with_timeout(self.config.rpc_timeout(), self.reader.balance_at(address, target))
                .await?;

        let (previous_snapshot, previous_yield) = match date.pred_opt() {
            Some(previous_day) => tokio::try_join!(
                self.snapshots.get_balance_snapshot(address, previous_day),
                self.snapshots.get_yield_record(address, previous_day),
            )?,
            None => (None, None),
        };

        let snapshot = BalanceSnapshot {
            address,
            date,
            block_number: target,
            balance,
            continuous_holding_days: continuous_holding_days(previous_snapshot.as_ref()),
        };
        let record = YieldRecord {
            address,
            date,
            block_number: target,
            share_balance: balance,
            underlying_value: params.shares_to_value(balance),
            exchange_rate: params.exchange_rate,
            daily_yield: daily_yield(previous_yield.as_ref(), params.exchange_rate),
        };

        let snapshot_inserted = self.snapshots.upsert_balance_snapshot(&snapshot).await?;
        let yield_inserted = self.snapshots.upsert_yield_record(&record).await?;

        Ok(AddressOutcome {
            rows_written: u64::from(snapshot_inserted) + u64::from(yield_inserted),
            already_recorded: !snapshot_inserted && !yield_inserted,
        })
    }

    /// UTC calendar date of the clock's current time.
    fn snapshot_date(&self) -> Result<NaiveDate, ServiceError> {
        let now = self.clock.now();
        i64::try_from(now)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.date_naive())
            .ok_or_else(|| ServiceError::Error(anyhow!("clock value {now} is not a valid date")))
    }

    /// Run [Self::run_once] every configured interval until cancelled.
    ///
    /// Failed runs are retried with exponential backoff. Gives up with
    /// [ServiceError::MaxRetries] after `retries` consecutive failures, or immediately on an
    /// unrecoverable error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ServiceError> {
        let mut interval =
            tokio::time::interval(self.config.interval().max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scanner {} stopped", self.config.scanner_id);
                    return Ok(());
                }
                _ = interval.tick() => {}
            }

            let e = match self.run_once().await.and_then(ScanResult::into_result) {
                Ok(_) => {
                    attempt = 0;
                    continue;
                }
                Err(e) => e,
            };

            if !e.is_recoverable() {
                tracing::error!("Scanner {} failed: {:?}", self.config.scanner_id, e);
                return Err(e);
            }

            attempt += 1;
            if attempt > self.config.retries {
                tracing::error!("Aborting after {} consecutive attempts", attempt);
                return Err(ServiceError::MaxRetries);
            }

            // exponential backoff with a maximum delay of 120 seconds
            let delay =
                Duration::from_secs(2u64.saturating_pow(attempt - 1).min(MAX_BACKOFF_SECS));
            tracing::warn!(
                "Scan failed: {}, attempt number {}, retrying in {}s",
                e,
                attempt,
                delay.as_secs()
            );
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(balance: u64, days: u64) -> BalanceSnapshot {
        BalanceSnapshot {
            address: Address::ZERO,
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            block_number: 1,
            balance: U256::from(balance),
            continuous_holding_days: days,
        }
    }

    #[test]
    fn holding_days_streak() {
        assert_eq!(continuous_holding_days(None), 1);
        assert_eq!(continuous_holding_days(Some(&snapshot(5, 4))), 5);
        assert_eq!(continuous_holding_days(Some(&snapshot(0, 0))), 1);
        assert_eq!(continuous_holding_days(Some(&snapshot(0, 7))), 1);
    }

    #[test]
    fn daily_yield_from_rate_change() {
        let scale = U256::from(EXCHANGE_RATE_SCALE);
        let prev = YieldRecord {
            address: Address::ZERO,
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            block_number: 1,
            share_balance: U256::from(1_000u64) * scale,
            underlying_value: U256::from(1_000u64) * scale,
            exchange_rate: scale,
            daily_yield: U256::ZERO,
        };

        // Rate went from 1.0 to 1.001.
        let rate_now = scale + scale / U256::from(1_000u64);
        assert_eq!(daily_yield(Some(&prev), rate_now), scale);
        assert_eq!(daily_yield(None, rate_now), U256::ZERO);
        // A falling rate yields nothing rather than underflowing.
        assert_eq!(daily_yield(Some(&prev), scale / U256::from(2u64)), U256::ZERO);
    }

    #[test]
    fn scan_result_into_result() {
        let ok = ScanResult::noop(10, 10);
        assert!(ok.is_noop());
        assert!(ok.into_result().is_ok());

        let failed =
            ScanResult { failed_addresses: vec![Address::ZERO], ..ScanResult::noop(10, 20) };
        assert!(!failed.is_noop());
        assert!(matches!(failed.into_result(), Err(ServiceError::AddressesFailed(a)) if a.len() == 1));
    }
}
