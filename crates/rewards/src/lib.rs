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

//! Reward accrual and position valuation for the liquid staking pool.
//!
//! The pool only updates its reward index on-chain every so often. Between those
//! updates the value of a stake position is reconstructed off-chain from the pool-wide
//! [RewardParameters] and the position's lock tier. Everything here is a pure function of
//! its inputs except the [ChainReader] implementations and the parameter cache.

pub mod cache;
pub mod chain;
pub mod clock;
pub mod portfolio;
pub mod staking;
pub mod tiers;
pub mod valuation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::{CachedRewardParameters, RewardParameterFetcher, MIN_REFRESH_INTERVAL};
pub use chain::{AlloyChainReader, ChainReadError, ChainReader, PoolParameter};
pub use clock::{Clock, SystemClock};
pub use portfolio::AggregateRewardsView;
pub use staking::{load_positions, RewardParameters, StakePosition};
pub use tiers::{LockTier, TierBound, LOCK_TIER_TABLE};
pub use valuation::{estimate, EstimateStatus, PositionEstimate};

/// Average block time assumed when converting between blocks and wall-clock time.
pub const BLOCK_TIME_SECS: u64 = 2;
/// Seconds in a 365-day year.
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 3600;
/// Blocks produced per year at [BLOCK_TIME_SECS].
pub const BLOCKS_PER_YEAR: u64 = SECONDS_PER_YEAR / BLOCK_TIME_SECS;
/// Basis point denominator.
pub const BPS_DENOMINATOR: u64 = 10_000;
/// Ceiling on the annualized pool-wide reward rate, in basis points.
pub const GLOBAL_APR_CEILING_BPS: u64 = 3_000;
/// Fixed-point scale of the on-chain exchange rate.
pub const EXCHANGE_RATE_SCALE: u64 = 1_000_000_000_000_000_000;
