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

//! Test doubles for [ChainReader] and [Clock].

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::{
    chain::{ChainReadError, ChainReader, PoolParameter},
    clock::Clock,
    staking::StakePosition,
};

/// Clock that returns whatever it was last set to.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicU64,
}

impl FixedClock {
    pub fn new(now: u64) -> Self {
        Self { now: AtomicU64::new(now) }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Scriptable in-memory chain. Balances and pool parameters are the same at every height;
/// reads are recorded with the height they were made at.
#[derive(Default)]
pub struct MockChainReader {
    latest_block: AtomicU64,
    fail_latest: AtomicBool,
    fail_holders: AtomicBool,
    balances: Mutex<HashMap<Address, U256>>,
    failing_balances: Mutex<HashSet<Address>>,
    slow_balances: Mutex<HashMap<Address, Duration>>,
    pool_parameters: Mutex<HashMap<PoolParameter, U256>>,
    failing_parameters: Mutex<HashSet<PoolParameter>>,
    positions: Mutex<HashMap<Address, Vec<StakePosition>>>,
    holders: Mutex<Vec<(u64, Address)>>,
    balance_reads: Mutex<Vec<(Address, u64)>>,
    parameter_reads: Mutex<Vec<(PoolParameter, u64)>>,
    position_reads: Mutex<Vec<(Address, u64, u64)>>,
    holder_queries: Mutex<Vec<(u64, u64)>>,
}

impl MockChainReader {
    pub fn new(latest_block: u64) -> Self {
        Self { latest_block: AtomicU64::new(latest_block), ..Default::default() }
    }

    pub fn set_latest_block(&self, block: u64) {
        self.latest_block.store(block, Ordering::SeqCst);
    }

    pub fn fail_latest_block(&self, fail: bool) {
        self.fail_latest.store(fail, Ordering::SeqCst);
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.balances.lock().unwrap().insert(address, balance);
    }

    pub fn fail_balance(&self, address: Address) {
        self.failing_balances.lock().unwrap().insert(address);
    }

    pub fn restore_balance(&self, address: Address) {
        self.failing_balances.lock().unwrap().remove(&address);
        self.slow_balances.lock().unwrap().remove(&address);
    }

    /// Make balance reads for `address` take `delay` before answering.
    pub fn slow_balance(&self, address: Address, delay: Duration) {
        self.slow_balances.lock().unwrap().insert(address, delay);
    }

    pub fn set_pool_parameters(
        &self,
        last_reward_block: u64,
        reward_per_block: u128,
        total_pooled_principal: u128,
        total_shares: u128,
        exchange_rate: u128,
    ) {
        let mut params = self.pool_parameters.lock().unwrap();
        params.insert(PoolParameter::LastRewardBlock, U256::from(last_reward_block));
        params.insert(PoolParameter::RewardPerBlock, U256::from(reward_per_block));
        params.insert(PoolParameter::TotalPooledPrincipal, U256::from(total_pooled_principal));
        params.insert(PoolParameter::TotalShares, U256::from(total_shares));
        params.insert(PoolParameter::ExchangeRate, U256::from(exchange_rate));
    }

    pub fn fail_parameter(&self, param: PoolParameter) {
        self.failing_parameters.lock().unwrap().insert(param);
    }

    pub fn set_positions(&self, user: Address, positions: Vec<StakePosition>) {
        self.positions.lock().unwrap().insert(user, positions);
    }

    /// Register a share-token transfer touching `address` at `block`.
    pub fn add_holder(&self, block: u64, address: Address) {
        self.holders.lock().unwrap().push((block, address));
    }

    pub fn fail_holder_queries(&self, fail: bool) {
        self.fail_holders.store(fail, Ordering::SeqCst);
    }

    pub fn balance_reads(&self) -> Vec<(Address, u64)> {
        self.balance_reads.lock().unwrap().clone()
    }

    pub fn parameter_reads(&self) -> Vec<(PoolParameter, u64)> {
        self.parameter_reads.lock().unwrap().clone()
    }

    pub fn position_reads(&self) -> Vec<(Address, u64, u64)> {
        self.position_reads.lock().unwrap().clone()
    }

    pub fn holder_queries(&self) -> Vec<(u64, u64)> {
        self.holder_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn latest_block(&self) -> Result<u64, ChainReadError> {
        if self.fail_latest.load(Ordering::SeqCst) {
            return Err(ChainReadError::Unavailable("latest block".into()));
        }
        Ok(self.latest_block.load(Ordering::SeqCst))
    }

    async fn balance_at(&self, address: Address, block: u64) -> Result<U256, ChainReadError> {
        self.balance_reads.lock().unwrap().push((address, block));
        let delay = self.slow_balances.lock().unwrap().get(&address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_balances.lock().unwrap().contains(&address) {
            return Err(ChainReadError::Unavailable(format!("balance of {address:#x}")));
        }
        Ok(self.balances.lock().unwrap().get(&address).copied().unwrap_or_default())
    }

    async fn block_timestamp(&self, block: u64) -> Result<Option<u64>, ChainReadError> {
        if block > self.latest_block.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(block * crate::BLOCK_TIME_SECS))
    }

    async fn read_pool_parameter(
        &self,
        param: PoolParameter,
        block: u64,
    ) -> Result<U256, ChainReadError> {
        self.parameter_reads.lock().unwrap().push((param, block));
        if self.failing_parameters.lock().unwrap().contains(&param) {
            return Err(ChainReadError::Unavailable(format!("{param:?}")));
        }
        Ok(self.pool_parameters.lock().unwrap().get(&param).copied().unwrap_or_default())
    }

    async fn stake_count(&self, user: Address, _block: u64) -> Result<u64, ChainReadError> {
        Ok(self.positions.lock().unwrap().get(&user).map(|p| p.len() as u64).unwrap_or(0))
    }

    async fn read_position(
        &self,
        user: Address,
        stake_id: u64,
        block: u64,
    ) -> Result<StakePosition, ChainReadError> {
        self.position_reads.lock().unwrap().push((user, stake_id, block));
        self.positions
            .lock()
            .unwrap()
            .get(&user)
            .and_then(|positions| positions.iter().find(|p| p.id == stake_id).cloned())
            .ok_or_else(|| ChainReadError::Decode(format!("no stake {stake_id} for {user:#x}")))
    }

    async fn token_holders_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Address>, ChainReadError> {
        self.holder_queries.lock().unwrap().push((from_block, to_block));
        if self.fail_holders.load(Ordering::SeqCst) {
            return Err(ChainReadError::Unavailable("transfer logs".into()));
        }
        let mut holders: Vec<Address> = self
            .holders
            .lock()
            .unwrap()
            .iter()
            .filter(|(block, _)| (from_block..=to_block).contains(block))
            .map(|(_, address)| *address)
            .collect();
        holders.sort();
        holders.dedup();
        Ok(holders)
    }
}
