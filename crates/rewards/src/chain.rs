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

//! Read-only access to the chain.

use std::{collections::BTreeSet, future::Future, time::Duration};

use alloy::{
    eips::BlockId,
    primitives::{Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::{
        client::RpcClient,
        types::{BlockNumberOrTag, Filter},
    },
    sol,
    sol_types::SolEvent,
    transports::{layers::RetryBackoffLayer, RpcError, TransportErrorKind},
};
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::staking::StakePosition;

sol! {
    #[sol(rpc)]
    interface ILiquidStakingPool {
        function lastRewardBlock() external view returns (uint256);
        function rewardPerBlock() external view returns (uint256);
        function totalPooledPrincipal() external view returns (uint256);
        function totalShares() external view returns (uint256);
        function exchangeRate() external view returns (uint256);
        function getStakeCount(address user) external view returns (uint256);
        function getStake(address user, uint256 stakeId) external view returns (
            uint256 principal,
            uint256 shares,
            uint256 currentValue,
            uint256 lockEndTime,
            bool withdrawn,
            bool locked
        );
    }
}

sol! {
    #[sol(rpc)]
    interface IShareToken {
        event Transfer(address indexed from, address indexed to, uint256 value);
        function balanceOf(address account) external view returns (uint256);
    }
}

#[derive(Error, Debug)]
pub enum ChainReadError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError<TransportErrorKind>),

    #[error("Contract call error: {0}")]
    Contract(#[from] alloy::contract::Error),

    #[error("Chain read timed out after {0:?}")]
    Timeout(Duration),

    #[error("Block {0} not found")]
    MissingBlock(u64),

    #[error("Failed to decode chain data: {0}")]
    Decode(String),

    #[error("Chain unavailable: {0}")]
    Unavailable(String),
}

/// The five pool-wide values that make up [crate::RewardParameters].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoolParameter {
    LastRewardBlock,
    RewardPerBlock,
    TotalPooledPrincipal,
    TotalShares,
    ExchangeRate,
}

impl PoolParameter {
    pub const ALL: [PoolParameter; 5] = [
        PoolParameter::LastRewardBlock,
        PoolParameter::RewardPerBlock,
        PoolParameter::TotalPooledPrincipal,
        PoolParameter::TotalShares,
        PoolParameter::ExchangeRate,
    ];
}

/// Read-only chain accessor used by the valuation engine and the scanner.
///
/// Every read that depends on state takes an explicit block height so callers can build
/// consistent snapshots.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn latest_block(&self) -> Result<u64, ChainReadError>;

    /// Share-token balance of `address` as of `block`.
    async fn balance_at(&self, address: Address, block: u64) -> Result<U256, ChainReadError>;

    /// Timestamp of `block`, or `None` if the node does not know the block.
    async fn block_timestamp(&self, block: u64) -> Result<Option<u64>, ChainReadError>;

    async fn read_pool_parameter(
        &self,
        param: PoolParameter,
        block: u64,
    ) -> Result<U256, ChainReadError>;

    async fn stake_count(&self, user: Address, block: u64) -> Result<u64, ChainReadError>;

    async fn read_position(
        &self,
        user: Address,
        stake_id: u64,
        block: u64,
    ) -> Result<StakePosition, ChainReadError>;

    /// Addresses that sent or received share tokens within `[from_block, to_block]`.
    async fn token_holders_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Address>, ChainReadError>;
}

/// Bound a chain read by `timeout`.
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, ChainReadError>
where
    F: Future<Output = Result<T, ChainReadError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(ChainReadError::Timeout(timeout)),
    }
}

pub(crate) fn to_u64(value: U256, what: &str) -> Result<u64, ChainReadError> {
    u64::try_from(value).map_err(|_| ChainReadError::Decode(format!("{what} does not fit in u64")))
}

/// [ChainReader] backed by an alloy HTTP provider.
#[derive(Clone)]
pub struct AlloyChainReader {
    provider: DynProvider,
    pool_address: Address,
    share_token_address: Address,
    timeout: Duration,
}

impl AlloyChainReader {
    /// Connect to `rpc_url` with rate-limit aware retries.
    pub fn connect(
        rpc_url: Url,
        pool_address: Address,
        share_token_address: Address,
        timeout: Duration,
    ) -> Self {
        let client = RpcClient::builder().layer(RetryBackoffLayer::new(3, 1000, 200)).http(rpc_url);
        let provider = ProviderBuilder::new().connect_client(client).erased();
        Self::new(provider, pool_address, share_token_address, timeout)
    }

    pub fn new(
        provider: DynProvider,
        pool_address: Address,
        share_token_address: Address,
        timeout: Duration,
    ) -> Self {
        Self { provider, pool_address, share_token_address, timeout }
    }

    fn pool(&self) -> ILiquidStakingPool::ILiquidStakingPoolInstance<&DynProvider> {
        ILiquidStakingPool::new(self.pool_address, &self.provider)
    }
}

#[async_trait]
impl ChainReader for AlloyChainReader {
    async fn latest_block(&self) -> Result<u64, ChainReadError> {
        with_timeout(self.timeout, async {
            Ok::<_, ChainReadError>(self.provider.get_block_number().await?)
        })
        .await
    }

    async fn balance_at(&self, address: Address, block: u64) -> Result<U256, ChainReadError> {
        let token = IShareToken::new(self.share_token_address, &self.provider);
        with_timeout(self.timeout, async {
            Ok::<_, ChainReadError>(
                token.balanceOf(address).block(BlockId::number(block)).call().await?,
            )
        })
        .await
    }

    async fn block_timestamp(&self, block: u64) -> Result<Option<u64>, ChainReadError> {
        with_timeout(self.timeout, async {
            let block = self.provider.get_block_by_number(BlockNumberOrTag::Number(block)).await?;
            Ok::<_, ChainReadError>(block.map(|b| b.header.timestamp))
        })
        .await
    }

    async fn read_pool_parameter(
        &self,
        param: PoolParameter,
        block: u64,
    ) -> Result<U256, ChainReadError> {
        let pool = self.pool();
        let at = BlockId::number(block);
        with_timeout(self.timeout, async {
            let value = match param {
                PoolParameter::LastRewardBlock => pool.lastRewardBlock().block(at).call().await?,
                PoolParameter::RewardPerBlock => pool.rewardPerBlock().block(at).call().await?,
                PoolParameter::TotalPooledPrincipal => {
                    pool.totalPooledPrincipal().block(at).call().await?
                }
                PoolParameter::TotalShares => pool.totalShares().block(at).call().await?,
                PoolParameter::ExchangeRate => pool.exchangeRate().block(at).call().await?,
            };
            Ok::<_, ChainReadError>(value)
        })
        .await
    }

    async fn stake_count(&self, user: Address, block: u64) -> Result<u64, ChainReadError> {
        let pool = self.pool();
        with_timeout(self.timeout, async {
            let count = pool.getStakeCount(user).block(BlockId::number(block)).call().await?;
            to_u64(count, "stake count")
        })
        .await
    }

    async fn read_position(
        &self,
        user: Address,
        stake_id: u64,
        block: u64,
    ) -> Result<StakePosition, ChainReadError> {
        let pool = self.pool();
        with_timeout(self.timeout, async {
            let stake = pool
                .getStake(user, U256::from(stake_id))
                .block(BlockId::number(block))
                .call()
                .await?;
            Ok::<_, ChainReadError>(StakePosition {
                id: stake_id,
                principal: stake.principal,
                shares: stake.shares,
                confirmed_value: stake.currentValue,
                lock_end_time: to_u64(stake.lockEndTime, "lock end time")?,
                withdrawn: stake.withdrawn,
                locked: stake.locked,
            })
        })
        .await
    }

    async fn token_holders_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Address>, ChainReadError> {
        let filter = Filter::new()
            .address(self.share_token_address)
            .event_signature(IShareToken::Transfer::SIGNATURE_HASH)
            .from_block(BlockNumberOrTag::Number(from_block))
            .to_block(BlockNumberOrTag::Number(to_block));

        let logs = with_timeout(self.timeout, async {
            Ok::<_, ChainReadError>(self.provider.get_logs(&filter).await?)
        })
        .await?;

        let mut holders = BTreeSet::new();
        for log in logs {
            let decoded = log
                .log_decode::<IShareToken::Transfer>()
                .map_err(|e| ChainReadError::Decode(e.to_string()))?;
            holders.insert(decoded.inner.data.from);
            holders.insert(decoded.inner.data.to);
        }
        holders.remove(&Address::ZERO);

        Ok(holders.into_iter().collect())
    }
}
