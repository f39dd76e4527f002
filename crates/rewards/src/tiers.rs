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

//! Lock tiers and their APR ceilings.
//!
//! A position's tier is derived from the time remaining until its lock ends. The mapping
//! is an ordered table evaluated front to back: the first bound whose
//! `max_remaining_secs` is greater than or equal to the remaining time wins. A remaining
//! time of zero or less is always [LockTier::Unlocked], regardless of the table, so the
//! test tiers cover the half-open window `(0, 300]` seconds and never overlap with the
//! unlocked state.

use std::fmt;

const MINUTE: u64 = 60;
const DAY: u64 = 24 * 3600;

/// Closed set of lock tiers a position can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockTier {
    /// Short demonstration tier, nominal 1 minute lock.
    Test1,
    /// Short demonstration tier, nominal 3 minute lock.
    Test3,
    /// Short demonstration tier, nominal 5 minute lock.
    Test5,
    Days30,
    Days90,
    Days180,
    Days365,
    /// Lock has ended.
    Unlocked,
}

/// One row of the tier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierBound {
    /// Inclusive upper bound on remaining lock time. `None` means unbounded.
    pub max_remaining_secs: Option<u64>,
    pub tier: LockTier,
    pub apr_bps: u64,
}

/// APR ceiling applied to unlocked positions.
pub const UNLOCKED_APR_BPS: u64 = 120;

/// Ordered tier table. Evaluated in order; see the module docs for the unlocked rule.
pub const LOCK_TIER_TABLE: &[TierBound] = &[
    TierBound { max_remaining_secs: Some(MINUTE), tier: LockTier::Test1, apr_bps: 1500 },
    TierBound { max_remaining_secs: Some(3 * MINUTE), tier: LockTier::Test3, apr_bps: 1750 },
    TierBound { max_remaining_secs: Some(5 * MINUTE), tier: LockTier::Test5, apr_bps: 2000 },
    TierBound { max_remaining_secs: Some(30 * DAY), tier: LockTier::Days30, apr_bps: 120 },
    TierBound { max_remaining_secs: Some(90 * DAY), tier: LockTier::Days90, apr_bps: 350 },
    TierBound { max_remaining_secs: Some(180 * DAY), tier: LockTier::Days180, apr_bps: 650 },
    TierBound { max_remaining_secs: None, tier: LockTier::Days365, apr_bps: 1200 },
];

impl LockTier {
    /// Resolve the tier for a position whose lock ends at `lock_end_time`, as seen at `now`.
    pub fn resolve(lock_end_time: u64, now: u64) -> Self {
        Self::from_remaining(lock_end_time as i128 - now as i128)
    }

    /// Resolve the tier from a signed remaining lock time in seconds.
    pub fn from_remaining(remaining_secs: i128) -> Self {
        if remaining_secs <= 0 {
            return LockTier::Unlocked;
        }
        let remaining = remaining_secs as u128;
        LOCK_TIER_TABLE
            .iter()
            .find(|bound| match bound.max_remaining_secs {
                Some(max) => remaining <= max as u128,
                None => true,
            })
            .map(|bound| bound.tier)
            .unwrap_or(LockTier::Days365)
    }

    /// APR ceiling for this tier, in basis points.
    pub fn apr_bps(&self) -> u64 {
        match self {
            LockTier::Unlocked => UNLOCKED_APR_BPS,
            tier => LOCK_TIER_TABLE
                .iter()
                .find(|bound| bound.tier == *tier)
                .map(|bound| bound.apr_bps)
                .unwrap_or(UNLOCKED_APR_BPS),
        }
    }

    /// Whether this is one of the short demonstration tiers.
    pub fn is_test(&self) -> bool {
        matches!(self, LockTier::Test1 | LockTier::Test3 | LockTier::Test5)
    }

    /// Nominal lock length of a test tier, in seconds. `None` for standard tiers.
    pub fn test_cycle_secs(&self) -> Option<u64> {
        match self {
            LockTier::Test1 => Some(MINUTE),
            LockTier::Test3 => Some(3 * MINUTE),
            LockTier::Test5 => Some(5 * MINUTE),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockTier::Test1 => "test-1",
            LockTier::Test3 => "test-3",
            LockTier::Test5 => "test-5",
            LockTier::Days30 => "30-day",
            LockTier::Days90 => "90-day",
            LockTier::Days180 => "180-day",
            LockTier::Days365 => "365-day",
            LockTier::Unlocked => "none",
        }
    }
}

impl fmt::Display for LockTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlocked_at_and_below_zero() {
        assert_eq!(LockTier::from_remaining(0), LockTier::Unlocked);
        assert_eq!(LockTier::from_remaining(-1), LockTier::Unlocked);
        assert_eq!(LockTier::from_remaining(-(30 * DAY as i128)), LockTier::Unlocked);
        assert_eq!(LockTier::resolve(1_000, 1_000), LockTier::Unlocked);
        assert_eq!(LockTier::resolve(999, 1_000), LockTier::Unlocked);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(LockTier::from_remaining(1), LockTier::Test1);
        assert_eq!(LockTier::from_remaining(60), LockTier::Test1);
        assert_eq!(LockTier::from_remaining(61), LockTier::Test3);
        assert_eq!(LockTier::from_remaining(180), LockTier::Test3);
        assert_eq!(LockTier::from_remaining(181), LockTier::Test5);
        assert_eq!(LockTier::from_remaining(300), LockTier::Test5);
        assert_eq!(LockTier::from_remaining(301), LockTier::Days30);
    }

    #[test]
    fn standard_tier_boundaries() {
        let day = DAY as i128;
        assert_eq!(LockTier::from_remaining(30 * day), LockTier::Days30);
        assert_eq!(LockTier::from_remaining(30 * day + 1), LockTier::Days90);
        assert_eq!(LockTier::from_remaining(90 * day), LockTier::Days90);
        assert_eq!(LockTier::from_remaining(90 * day + 1), LockTier::Days180);
        assert_eq!(LockTier::from_remaining(180 * day), LockTier::Days180);
        assert_eq!(LockTier::from_remaining(180 * day + 1), LockTier::Days365);
        assert_eq!(LockTier::from_remaining(365 * day), LockTier::Days365);
        // Locks longer than a year still map onto the longest tier.
        assert_eq!(LockTier::from_remaining(400 * day), LockTier::Days365);
    }

    #[test]
    fn apr_ceilings() {
        assert_eq!(LockTier::Test1.apr_bps(), 1500);
        assert_eq!(LockTier::Test3.apr_bps(), 1750);
        assert_eq!(LockTier::Test5.apr_bps(), 2000);
        assert_eq!(LockTier::Days30.apr_bps(), 120);
        assert_eq!(LockTier::Days90.apr_bps(), 350);
        assert_eq!(LockTier::Days180.apr_bps(), 650);
        assert_eq!(LockTier::Days365.apr_bps(), 1200);
        assert_eq!(LockTier::Unlocked.apr_bps(), 120);
    }

    #[test]
    fn table_is_strictly_ordered() {
        let bounds: Vec<u64> =
            LOCK_TIER_TABLE.iter().filter_map(|bound| bound.max_remaining_secs).collect();
        assert!(bounds.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(LOCK_TIER_TABLE.last().unwrap().max_remaining_secs, None);
    }

    #[test]
    fn only_short_tiers_are_test_tiers() {
        for bound in LOCK_TIER_TABLE {
            assert_eq!(bound.tier.is_test(), bound.tier.test_cycle_secs().is_some());
        }
        assert!(!LockTier::Unlocked.is_test());
    }
}
