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

//! Stake positions and pool-wide reward parameters.

use alloy::primitives::{Address, U256};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::chain::{ChainReadError, ChainReader};

/// One user's locked stake, as reported by the pool contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    /// Stake id, unique per user.
    pub id: u64,
    /// Amount originally staked.
    pub principal: U256,
    /// Pool shares credited at stake time.
    pub shares: U256,
    /// Last on-chain value of the position (shares at the confirmed exchange rate).
    pub confirmed_value: U256,
    /// Unix seconds at which the lock ends.
    pub lock_end_time: u64,
    /// Terminal flag set by unstaking.
    pub withdrawn: bool,
    /// Contract-reported lock flag. Informational; tiering uses `lock_end_time`.
    pub locked: bool,
}

impl StakePosition {
    /// Whether the position is still locked at `now`.
    pub fn is_locked_at(&self, now: u64) -> bool {
        now < self.lock_end_time
    }

    /// Profit already realized on-chain. Zero when the confirmed value is below principal.
    pub fn confirmed_profit(&self) -> U256 {
        self.confirmed_value.saturating_sub(self.principal)
    }
}

/// Snapshot of the pool's reward parameters, read at a single block height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardParameters {
    /// Block at which the pool's reward index was last updated on-chain.
    pub last_reward_block: u64,
    /// Native-asset reward emitted per block.
    pub reward_per_block: U256,
    pub total_pooled_principal: U256,
    pub total_shares: U256,
    /// Contract exchange rate, scaled by [crate::EXCHANGE_RATE_SCALE].
    pub exchange_rate: U256,
    /// Block height all five values were read at.
    pub block: u64,
    /// Unix seconds when the snapshot was taken. Acts as the snapshot version.
    pub fetched_at: u64,
}

impl RewardParameters {
    /// An undefined exchange rate means no valuation can be attempted.
    pub fn has_exchange_rate(&self) -> bool {
        !self.total_shares.is_zero()
    }

    /// Convert pool shares into the underlying asset at the current pool ratio.
    pub fn shares_to_value(&self, shares: U256) -> U256 {
        if self.total_shares.is_zero() {
            return U256::ZERO;
        }
        shares.saturating_mul(self.total_pooled_principal) / self.total_shares
    }
}

/// Load every stake of `user` at `block`.
///
/// Stake ids are assigned sequentially from zero by the pool contract, so the ids are
/// `0..getStakeCount(user)`. All reads are pinned to the same block.
pub async fn load_positions(
    reader: &dyn ChainReader,
    user: Address,
    block: u64,
) -> Result<Vec<StakePosition>, ChainReadError> {
    let count = reader.stake_count(user, block).await?;
    tracing::debug!("Loading {} stake positions for {:#x} at block {}", count, user, block);

    try_join_all((0..count).map(|id| reader.read_position(user, id, block))).await
}
