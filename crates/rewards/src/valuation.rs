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

//! Off-chain position valuation between on-chain reward index updates.
//!
//! For standard tiers the pending reward is the position's pro-rata share of the rewards
//! the pool has emitted since `last_reward_block`, bounded by what the tier's APR ceiling
//! allows over the same period. Test tiers skip the pool split and accrue a theoretical
//! reward that compresses a 30-day cycle into the tier's nominal lock length, hard capped
//! at 1% of principal.

use alloy::primitives::U256;

use crate::{
    staking::{RewardParameters, StakePosition},
    tiers::LockTier,
    BLOCKS_PER_YEAR, BLOCK_TIME_SECS, BPS_DENOMINATOR, GLOBAL_APR_CEILING_BPS,
};

/// Days in the nominal cycle a test tier stands in for.
const TEST_TIER_NOMINAL_DAYS: u64 = 30;
const DAYS_PER_YEAR: u64 = 365;
/// Test tiers never report more than principal / 100.
const TEST_TIER_PROFIT_DIVISOR: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateStatus {
    /// Pending reward was projected from new blocks.
    Estimated,
    /// No blocks since the pool's last on-chain reward update.
    NoNewBlocks,
    /// Pool has no shares, so the exchange rate is undefined.
    UndefinedExchangeRate,
    /// Position has been unstaked.
    Withdrawn,
}

/// Result of valuing one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionEstimate {
    pub position_id: u64,
    pub tier: LockTier,
    /// Reward accrued since the last on-chain update, not yet reflected in the confirmed value.
    pub pending_reward: U256,
    /// Confirmed profit plus pending reward.
    pub estimated_profit: U256,
    pub status: EstimateStatus,
}

impl PositionEstimate {
    fn zero(position_id: u64, tier: LockTier, status: EstimateStatus) -> Self {
        Self { position_id, tier, pending_reward: U256::ZERO, estimated_profit: U256::ZERO, status }
    }

    pub fn is_estimated(&self) -> bool {
        self.status == EstimateStatus::Estimated
    }
}

/// Value `position` at `current_block` and wall-clock `now`.
///
/// Never fails: withdrawn positions, an empty pool and a chain head that has not moved
/// past `last_reward_block` all yield a zero estimate tagged with the reason.
pub fn estimate(
    position: &StakePosition,
    params: &RewardParameters,
    current_block: u64,
    now: u64,
) -> PositionEstimate {
    let tier = LockTier::resolve(position.lock_end_time, now);

    if position.withdrawn {
        return PositionEstimate::zero(position.id, tier, EstimateStatus::Withdrawn);
    }
    if !params.has_exchange_rate() {
        return PositionEstimate::zero(position.id, tier, EstimateStatus::UndefinedExchangeRate);
    }
    if current_block <= params.last_reward_block {
        return PositionEstimate::zero(position.id, tier, EstimateStatus::NoNewBlocks);
    }
    let block_diff = current_block - params.last_reward_block;

    let (pending_reward, estimated_profit) = if tier.is_test() {
        let cap = test_tier_cap(position.principal);
        let pending = test_tier_reward(position.principal, tier, block_diff).min(cap);
        let profit = position.confirmed_profit().saturating_add(pending).min(cap);
        (pending, profit)
    } else {
        let pool_rewards = pool_new_rewards(params, block_diff);
        let pro_rata = pro_rata_share(position.shares, params.total_shares, pool_rewards);
        let ceiling = ceiling_reward(position.principal, tier.apr_bps(), block_diff);
        let pending = pro_rata.min(ceiling);
        (pending, position.confirmed_profit().saturating_add(pending))
    };

    PositionEstimate {
        position_id: position.id,
        tier,
        pending_reward,
        estimated_profit,
        status: EstimateStatus::Estimated,
    }
}

/// Rewards emitted pool-wide over `block_diff` blocks, bounded by the global APR ceiling.
pub fn pool_new_rewards(params: &RewardParameters, block_diff: u64) -> U256 {
    if exceeds_global_ceiling(params) {
        ceiling_reward(params.total_pooled_principal, GLOBAL_APR_CEILING_BPS, block_diff)
    } else {
        params.reward_per_block.saturating_mul(U256::from(block_diff))
    }
}

/// Whether `reward_per_block`, annualized over the pooled principal, is above the global
/// ceiling. Compared without division so an empty pool counts as exceeding it.
fn exceeds_global_ceiling(params: &RewardParameters) -> bool {
    let annual_bps_numerator = params
        .reward_per_block
        .saturating_mul(U256::from(BLOCKS_PER_YEAR))
        .saturating_mul(U256::from(BPS_DENOMINATOR));
    let ceiling = params.total_pooled_principal.saturating_mul(U256::from(GLOBAL_APR_CEILING_BPS));
    annual_bps_numerator > ceiling
}

/// Maximum reward `amount` can earn over `block_diff` blocks at `apr_bps`.
pub fn ceiling_reward(amount: U256, apr_bps: u64, block_diff: u64) -> U256 {
    amount.saturating_mul(U256::from(apr_bps)).saturating_mul(U256::from(block_diff))
        / (U256::from(BPS_DENOMINATOR) * U256::from(BLOCKS_PER_YEAR))
}

/// A position's slice of `pool_rewards`, going through its share of the pool in basis points.
fn pro_rata_share(shares: U256, total_shares: U256, pool_rewards: U256) -> U256 {
    if total_shares.is_zero() {
        return U256::ZERO;
    }
    let share_bps = shares.saturating_mul(U256::from(BPS_DENOMINATOR)) / total_shares;
    pool_rewards.saturating_mul(share_bps) / U256::from(BPS_DENOMINATOR)
}

/// Theoretical reward for a test tier after `block_diff` blocks.
///
/// The tier's nominal lock length stands in for a 30-day cycle: elapsing the whole lock
/// earns `principal * apr * 30 / 365`. Elapsed time is capped at the lock length.
fn test_tier_reward(principal: U256, tier: LockTier, block_diff: u64) -> U256 {
    let Some(cycle_secs) = tier.test_cycle_secs() else {
        return U256::ZERO;
    };
    let elapsed = block_diff.saturating_mul(BLOCK_TIME_SECS).min(cycle_secs);

    principal
        .saturating_mul(U256::from(tier.apr_bps()))
        .saturating_mul(U256::from(TEST_TIER_NOMINAL_DAYS))
        .saturating_mul(U256::from(elapsed))
        / (U256::from(BPS_DENOMINATOR) * U256::from(DAYS_PER_YEAR) * U256::from(cycle_secs))
}

fn test_tier_cap(principal: U256) -> U256 {
    principal / U256::from(TEST_TIER_PROFIT_DIVISOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000;
    const DAY: u64 = 86_400;

    fn params(total_pooled: u64, total_shares: u64, reward_per_block: u64) -> RewardParameters {
        RewardParameters {
            last_reward_block: 1_000,
            reward_per_block: U256::from(reward_per_block),
            total_pooled_principal: U256::from(total_pooled),
            total_shares: U256::from(total_shares),
            exchange_rate: U256::ZERO,
            block: 1_000,
            fetched_at: NOW,
        }
    }

    fn position(principal: u64, shares: u64, confirmed: u64, lock_end: u64) -> StakePosition {
        StakePosition {
            id: 7,
            principal: U256::from(principal),
            shares: U256::from(shares),
            confirmed_value: U256::from(confirmed),
            lock_end_time: lock_end,
            withdrawn: false,
            locked: lock_end > NOW,
        }
    }

    #[test]
    fn thirty_day_position_takes_min_of_pro_rata_and_ceiling() {
        let pool = params(100_000_000, 100_000, 1);
        let pos = position(1000, 1000, 1000, NOW + 30 * DAY);

        let est = estimate(&pos, &pool, 1_100, NOW);
        assert_eq!(est.tier, LockTier::Days30);
        assert_eq!(est.status, EstimateStatus::Estimated);

        // 100 blocks * 1 per block, position holds 100 bps of the pool.
        let pro_rata = U256::from(100u64 * (1000 * 10_000 / 100_000) / 10_000);
        let ceiling = U256::from(1000u64 * 120 * 100) / U256::from(10_000u64 * BLOCKS_PER_YEAR);
        assert_eq!(est.pending_reward, pro_rata.min(ceiling));
        assert_eq!(est.estimated_profit, est.pending_reward);
    }

    #[test]
    fn ceiling_binds_for_large_pool_share() {
        // Single staker pool with a generous emission rate.
        let principal = 1_000_000_000_000_000_000_000u128; // 1000 tokens
        let pool = RewardParameters {
            total_pooled_principal: U256::from(principal),
            total_shares: U256::from(principal),
            reward_per_block: U256::from(1_000_000_000_000_000u64),
            ..params(0, 0, 0)
        };
        let pos = StakePosition {
            principal: U256::from(principal),
            shares: U256::from(principal),
            confirmed_value: U256::from(principal),
            ..position(0, 0, 0, NOW + 10 * DAY)
        };

        let est = estimate(&pos, &pool, 1_000 + 43_200, NOW);
        let ceiling = ceiling_reward(U256::from(principal), 120, 43_200);
        assert_eq!(est.pending_reward, ceiling);
        assert!(est.pending_reward < pool_new_rewards(&pool, 43_200));
    }

    #[test]
    fn pro_rata_binds_for_small_emission() {
        let pool = params(1_000_000_000, 1_000_000_000, 1);
        let pos = position(500_000_000, 500_000_000, 500_000_000, NOW + 200 * DAY);

        let est = estimate(&pos, &pool, 2_000, NOW);
        assert_eq!(est.tier, LockTier::Days365);
        // Half of 1000 blocks * 1 per block.
        assert_eq!(est.pending_reward, U256::from(500u64));
        assert!(est.pending_reward < ceiling_reward(pos.principal, 1200, 1_000));
    }

    #[test]
    fn pool_rewards_capped_at_global_ceiling() {
        let pool = params(1_000_000, 1_000_000, 1_000);
        assert!(exceeds_global_ceiling(&pool));
        assert_eq!(
            pool_new_rewards(&pool, 100_000),
            ceiling_reward(U256::from(1_000_000u64), GLOBAL_APR_CEILING_BPS, 100_000)
        );

        let modest = params(1_000_000_000_000, 1_000_000, 1);
        assert!(!exceeds_global_ceiling(&modest));
        assert_eq!(pool_new_rewards(&modest, 100), U256::from(100u64));
    }

    #[test]
    fn test_tier_profit_is_capped_at_one_percent() {
        let pool = params(100_000_000, 100_000, 1);
        let pos = position(1000, 1000, 1000, NOW + 45);

        for block_diff in [1u64, 10, 30, 1_000, 1_000_000] {
            let est = estimate(&pos, &pool, 1_000 + block_diff, NOW);
            assert_eq!(est.tier, LockTier::Test1);
            assert!(est.estimated_profit <= U256::from(10u64), "block_diff={block_diff}");
        }

        // Confirmed gains beyond the cap are clamped too.
        let rich = position(1000, 1000, 1500, NOW + 45);
        let est = estimate(&rich, &pool, 1_100, NOW);
        assert_eq!(est.estimated_profit, U256::from(10u64));
    }

    #[test]
    fn test_tier_accrues_over_nominal_cycle() {
        let pool = params(100_000_000, 100_000, 1);
        let principal = 1_000_000_000u64;
        let pos = position(principal, 1000, principal, NOW + 300);
        assert_eq!(LockTier::resolve(pos.lock_end_time, NOW), LockTier::Test5);

        // 75 blocks is half of the 300s cycle: 2000 bps over 15/365 of a year.
        let half = estimate(&pos, &pool, 1_000 + 75, NOW);
        assert_eq!(
            half.pending_reward,
            U256::from(principal * 2000 * 30 * 150 / (10_000 * 365 * 300))
        );

        // The full cycle would be ~1.64% of principal, above the 1% cap.
        let full = estimate(&pos, &pool, 1_000 + 150, NOW);
        assert_eq!(full.pending_reward, U256::from(principal / 100));
        assert!(half.pending_reward < full.pending_reward);
    }

    #[test]
    fn zero_estimates() {
        let pool = params(100_000_000, 100_000, 1);
        let pos = position(1000, 1000, 1200, NOW + 30 * DAY);

        let same_block = estimate(&pos, &pool, 1_000, NOW);
        assert_eq!(same_block.pending_reward, U256::ZERO);
        assert_eq!(same_block.status, EstimateStatus::NoNewBlocks);

        let behind = estimate(&pos, &pool, 900, NOW);
        assert_eq!(behind.pending_reward, U256::ZERO);

        let empty_pool = RewardParameters { total_shares: U256::ZERO, ..pool.clone() };
        let est = estimate(&pos, &empty_pool, 1_100, NOW);
        assert_eq!(est.status, EstimateStatus::UndefinedExchangeRate);
        assert_eq!(est.estimated_profit, U256::ZERO);

        let withdrawn = StakePosition { withdrawn: true, ..pos };
        let est = estimate(&withdrawn, &pool, 1_100, NOW);
        assert_eq!(est.status, EstimateStatus::Withdrawn);
        assert_eq!(est.estimated_profit, U256::ZERO);
    }

    #[test]
    fn unlocked_position_uses_base_ceiling() {
        let pool = params(1_000_000_000, 1_000_000_000, 1_000);
        let pos = position(1_000_000_000, 1_000_000_000, 1_000_000_000, NOW - 1);
        let est = estimate(&pos, &pool, 1_000 + BLOCKS_PER_YEAR, NOW);
        assert_eq!(est.tier, LockTier::Unlocked);
        assert_eq!(est.pending_reward, ceiling_reward(pos.principal, 120, BLOCKS_PER_YEAR));
    }

    #[test]
    fn deterministic() {
        let pool = params(100_000_000, 100_000, 3);
        let pos = position(50_000, 40_000, 51_000, NOW + 100 * DAY);
        assert_eq!(estimate(&pos, &pool, 5_000, NOW), estimate(&pos, &pool, 5_000, NOW));
    }

    proptest! {
        #[test]
        fn standard_pending_reward_is_monotonic(
            principal in 1u64..u64::MAX / 2,
            shares in 1u64..1_000_000_000_000u64,
            extra_shares in 0u64..1_000_000_000_000u64,
            total_pooled in 0u64..u64::MAX,
            reward_per_block in 0u64..1_000_000_000_000_000_000u64,
            remaining in 301u64..400 * DAY,
            d1 in 1u64..10_000_000,
            step in 0u64..10_000_000,
        ) {
            let pool = params(total_pooled, shares + extra_shares, reward_per_block);
            let pos = position(principal, shares, principal, NOW + remaining);
            let a = estimate(&pos, &pool, 1_000 + d1, NOW);
            let b = estimate(&pos, &pool, 1_000 + d1 + step, NOW);
            prop_assert!(!a.tier.is_test());
            prop_assert!(a.pending_reward <= b.pending_reward);
            prop_assert!(a.estimated_profit <= b.estimated_profit);
        }

        #[test]
        fn test_tier_profit_never_exceeds_cap(
            principal in 0u64..u64::MAX,
            confirmed_gain in 0u64..u64::MAX / 2,
            remaining in 1u64..=300,
            block_diff in 1u64..100_000_000,
        ) {
            let pool = params(1_000_000, 1_000_000, 1_000);
            let confirmed = principal.saturating_add(confirmed_gain);
            let pos = position(principal, 1, confirmed, NOW + remaining);
            let est = estimate(&pos, &pool, 1_000 + block_diff, NOW);
            prop_assert!(est.tier.is_test());
            prop_assert!(est.estimated_profit <= U256::from(principal / 100));
            prop_assert!(est.pending_reward <= U256::from(principal / 100));
        }

        #[test]
        fn no_new_blocks_means_no_pending_reward(
            principal in 0u64..u64::MAX,
            remaining in 0u64..400 * DAY,
            behind in 0u64..1_000,
        ) {
            let pool = params(1_000_000, 1_000_000, 1_000);
            let pos = position(principal, principal, principal, NOW + remaining);
            let est = estimate(&pos, &pool, 1_000 - behind, NOW);
            prop_assert_eq!(est.pending_reward, U256::ZERO);
        }
    }
}
