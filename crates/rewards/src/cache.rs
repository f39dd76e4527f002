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

//! Reward parameter fetching with a last-known-good cache.

use std::{sync::Arc, time::Duration};

use tokio::{sync::RwLock, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    chain::{to_u64, ChainReadError, ChainReader, PoolParameter},
    clock::Clock,
    staking::RewardParameters,
};

/// Lower bound on the background refresh period, to bound load on the RPC endpoint.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Reads the five pool-wide reward parameters as one consistent snapshot.
#[derive(Clone)]
pub struct RewardParameterFetcher {
    reader: Arc<dyn ChainReader>,
    clock: Arc<dyn Clock>,
}

impl RewardParameterFetcher {
    pub fn new(reader: Arc<dyn ChainReader>, clock: Arc<dyn Clock>) -> Self {
        Self { reader, clock }
    }

    /// Snapshot at the current chain head.
    pub async fn fetch(&self) -> Result<RewardParameters, ChainReadError> {
        let block = self.reader.latest_block().await?;
        self.fetch_at(block).await
    }

    /// Snapshot at `block`. The reads run concurrently but are all pinned to the same
    /// height, so they observe the same pool state.
    pub async fn fetch_at(&self, block: u64) -> Result<RewardParameters, ChainReadError> {
        let reader = &self.reader;
        let (last_reward_block, reward_per_block, total_pooled_principal, total_shares, exchange_rate) =
            tokio::try_join!(
                reader.read_pool_parameter(PoolParameter::LastRewardBlock, block),
                reader.read_pool_parameter(PoolParameter::RewardPerBlock, block),
                reader.read_pool_parameter(PoolParameter::TotalPooledPrincipal, block),
                reader.read_pool_parameter(PoolParameter::TotalShares, block),
                reader.read_pool_parameter(PoolParameter::ExchangeRate, block),
            )?;

        Ok(RewardParameters {
            last_reward_block: to_u64(last_reward_block, "last reward block")?,
            reward_per_block,
            total_pooled_principal,
            total_shares,
            exchange_rate,
            block,
            fetched_at: self.clock.now(),
        })
    }
}

/// Reward parameters cached behind a lock, refreshed on demand and in the background.
///
/// A failed fetch never replaces the cached value.
#[derive(Clone)]
pub struct CachedRewardParameters {
    fetcher: RewardParameterFetcher,
    cache: Arc<RwLock<Option<RewardParameters>>>,
    refresh_interval: Duration,
}

impl CachedRewardParameters {
    /// `refresh_interval` is raised to [MIN_REFRESH_INTERVAL] if shorter.
    pub fn new(fetcher: RewardParameterFetcher, refresh_interval: Duration) -> Self {
        if refresh_interval < MIN_REFRESH_INTERVAL {
            tracing::warn!(
                "Reward parameter refresh interval {:?} below minimum, using {:?}",
                refresh_interval,
                MIN_REFRESH_INTERVAL
            );
        }
        Self {
            fetcher,
            cache: Arc::new(RwLock::new(None)),
            refresh_interval: refresh_interval.max(MIN_REFRESH_INTERVAL),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub async fn get_cached(&self) -> Option<RewardParameters> {
        self.cache.read().await.clone()
    }

    /// Cached value if present, otherwise fetch and cache.
    pub async fn get(&self) -> Result<RewardParameters, ChainReadError> {
        if let Some(params) = self.get_cached().await {
            return Ok(params);
        }
        let params = self.fetcher.fetch().await?;
        *self.cache.write().await = Some(params.clone());
        Ok(params)
    }

    /// Fetch a fresh snapshot. On failure the error is logged and the last-known-good value
    /// is returned instead, which is `None` only if nothing was ever fetched.
    pub async fn refresh(&self) -> Option<RewardParameters> {
        match self.fetcher.fetch().await {
            Ok(params) => {
                tracing::debug!(
                    "Refreshed reward parameters at block {} (last reward block {})",
                    params.block,
                    params.last_reward_block
                );
                *self.cache.write().await = Some(params.clone());
                Some(params)
            }
            Err(e) => {
                tracing::error!("Failed to refresh reward parameters: {}", e);
                self.get_cached().await
            }
        }
    }

    /// Spawn the background refresh loop. Refreshes once immediately.
    pub fn spawn_refresh_task(
        self: Arc<Self>,
        cancel_token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "Reward parameter refresh task started (interval: {}s)",
                self.refresh_interval.as_secs()
            );

            let mut ticker = tokio::time::interval(self.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.refresh().await;
                    }
                    _ = cancel_token.cancelled() => {
                        tracing::info!("Reward parameter refresh task shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FixedClock, MockChainReader};
    use alloy::primitives::U256;
    use tracing_test::traced_test;

    fn setup(latest: u64) -> (Arc<MockChainReader>, RewardParameterFetcher) {
        let reader = Arc::new(MockChainReader::new(latest));
        reader.set_pool_parameters(900, 5, 1_000_000, 500_000, 2_000_000_000_000_000_000);
        let fetcher = RewardParameterFetcher::new(reader.clone(), Arc::new(FixedClock::new(42)));
        (reader, fetcher)
    }

    #[tokio::test]
    async fn fetch_reads_all_parameters_at_one_height() {
        let (reader, fetcher) = setup(1_234);
        let params = fetcher.fetch().await.unwrap();

        assert_eq!(params.block, 1_234);
        assert_eq!(params.fetched_at, 42);
        assert_eq!(params.last_reward_block, 900);
        assert_eq!(params.reward_per_block, U256::from(5u64));
        assert_eq!(params.total_shares, U256::from(500_000u64));

        let reads = reader.parameter_reads();
        assert_eq!(reads.len(), PoolParameter::ALL.len());
        assert!(reads.iter().all(|(_, block)| *block == 1_234));
    }

    #[tokio::test]
    async fn fetch_fails_if_any_parameter_fails() {
        let (reader, fetcher) = setup(1_234);
        reader.fail_parameter(PoolParameter::TotalShares);
        assert!(fetcher.fetch().await.is_err());
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_refresh_keeps_last_known_good() {
        let (reader, fetcher) = setup(1_000);
        let cached = CachedRewardParameters::new(fetcher, MIN_REFRESH_INTERVAL);

        let first = cached.refresh().await.unwrap();
        assert_eq!(first.block, 1_000);

        reader.set_latest_block(1_100);
        reader.fail_parameter(PoolParameter::RewardPerBlock);
        let after_failure = cached.refresh().await.unwrap();
        assert_eq!(after_failure, first);
        assert_eq!(cached.get_cached().await, Some(first));
        assert!(logs_contain("Failed to refresh reward parameters"));
    }

    #[tokio::test]
    async fn refresh_without_cache_reports_nothing() {
        let (reader, fetcher) = setup(1_000);
        reader.fail_latest_block(true);
        let cached = CachedRewardParameters::new(fetcher, MIN_REFRESH_INTERVAL);
        assert!(cached.refresh().await.is_none());
        assert!(cached.get().await.is_err());
    }

    #[tokio::test]
    async fn get_serves_from_cache() {
        let (reader, fetcher) = setup(1_000);
        let cached = CachedRewardParameters::new(fetcher, MIN_REFRESH_INTERVAL);

        let first = cached.get().await.unwrap();
        reader.set_latest_block(2_000);
        let second = cached.get().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(reader.parameter_reads().len(), PoolParameter::ALL.len());
    }

    #[test]
    fn refresh_interval_is_clamped() {
        let (_, fetcher) = setup(1_000);
        let cached = CachedRewardParameters::new(fetcher, Duration::from_secs(10));
        assert_eq!(cached.refresh_interval(), MIN_REFRESH_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_task_runs_until_cancelled() {
        let (reader, fetcher) = setup(1_000);
        let cached = Arc::new(CachedRewardParameters::new(fetcher, MIN_REFRESH_INTERVAL));

        let cancel_token = CancellationToken::new();
        let handle = cached.clone().spawn_refresh_task(cancel_token.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cached.get_cached().await.map(|p| p.block), Some(1_000));

        reader.set_latest_block(1_500);
        tokio::time::sleep(MIN_REFRESH_INTERVAL).await;
        assert_eq!(cached.get_cached().await.map(|p| p.block), Some(1_500));

        cancel_token.cancel();
        handle.await.unwrap();
    }
}
