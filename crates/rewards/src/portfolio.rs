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

//! Portfolio-level view over a single address's positions.

use std::collections::{BTreeMap, HashSet};

use alloy::primitives::{Address, U256};

use crate::{
    staking::{RewardParameters, StakePosition},
    valuation::{estimate, PositionEstimate},
};

/// Sum of estimated profit across an address's live positions.
///
/// Estimates are keyed by position id, so a position seen twice in one refresh is counted
/// once. Once a position is observed withdrawn it stays excluded for the lifetime of the
/// view, even if a later refresh is fed stale data claiming otherwise.
#[derive(Debug, Clone)]
pub struct AggregateRewardsView {
    owner: Address,
    estimates: BTreeMap<u64, PositionEstimate>,
    withdrawn: HashSet<u64>,
    last_head: Option<u64>,
    params_version: Option<(u64, u64)>,
    /// Positions the current estimates were computed from.
    last_positions: Vec<StakePosition>,
}

impl AggregateRewardsView {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            estimates: BTreeMap::new(),
            withdrawn: HashSet::new(),
            last_head: None,
            params_version: None,
            last_positions: Vec::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Chain head of the last refresh.
    pub fn last_head(&self) -> Option<u64> {
        self.last_head
    }

    /// Whether the chain head, the parameter snapshot or the position set changed since the
    /// last refresh.
    pub fn needs_refresh(
        &self,
        positions: &[StakePosition],
        head: u64,
        params: &RewardParameters,
    ) -> bool {
        self.last_head != Some(head)
            || self.params_version != Some(version_of(params))
            || self.last_positions.as_slice() != positions
    }

    /// Recompute every estimate from `positions` and return the new total.
    pub fn refresh(
        &mut self,
        positions: &[StakePosition],
        params: &RewardParameters,
        head: u64,
        now: u64,
    ) -> U256 {
        self.estimates.clear();
        for position in positions {
            if position.withdrawn {
                self.withdrawn.insert(position.id);
            }
            if self.withdrawn.contains(&position.id) {
                continue;
            }
            self.estimates.insert(position.id, estimate(position, params, head, now));
        }
        self.last_head = Some(head);
        self.params_version = Some(version_of(params));
        self.last_positions = positions.to_vec();

        let total = self.total();
        tracing::debug!(
            "Refreshed portfolio of {:#x} at block {}: {} positions, total estimated profit {}",
            self.owner,
            head,
            self.estimates.len(),
            total
        );
        total
    }

    /// Refresh only if the head, the parameters or the positions changed. Returns the new total when it did.
    pub fn on_new_head(
        &mut self,
        positions: &[StakePosition],
        params: &RewardParameters,
        head: u64,
        now: u64,
    ) -> Option<U256> {
        if !self.needs_refresh(positions, head, params) {
            return None;
        }
        Some(self.refresh(positions, params, head, now))
    }

    /// Record an unstake seen outside a refresh, e.g. right after the transaction lands.
    pub fn observe_withdrawn(&mut self, position_id: u64) {
        self.withdrawn.insert(position_id);
        self.estimates.remove(&position_id);
    }

    pub fn total(&self) -> U256 {
        self.estimates
            .values()
            .fold(U256::ZERO, |acc, est| acc.saturating_add(est.estimated_profit))
    }

    pub fn estimates(&self) -> impl Iterator<Item = &PositionEstimate> {
        self.estimates.values()
    }

    pub fn estimate_for(&self, position_id: u64) -> Option<&PositionEstimate> {
        self.estimates.get(&position_id)
    }
}

fn version_of(params: &RewardParameters) -> (u64, u64) {
    (params.block, params.fetched_at)
}
