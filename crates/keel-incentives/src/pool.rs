//! Per-pool reward accumulator.
//!
//! ## Formula
//!
//! ```text
//! reward              = elapsed * rate_per_second * allocation_weight / total_weight
//! acc_reward_per_share += reward * 1e12 / total_staked
//! ```
//!
//! Accrual is skipped, and only `last_reward_time` advances, when the pool
//! has no stake or when the total allocation weight is zero.

use keel_types::amount::decimal;
use keel_types::{ACC_REWARD_PRECISION, U256};
use serde::{Deserialize, Serialize};

use crate::{IncentivesError, Result};

/// Reward state of one staking pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    /// Total stake reported by the pool's position contract.
    #[serde(with = "decimal")]
    pub total_staked: U256,
    /// Share of the global rate assigned to this pool.
    #[serde(with = "decimal")]
    pub allocation_weight: U256,
    /// Timestamp up to which rewards have been accrued.
    pub last_reward_time: u64,
    /// Rewards per unit of stake since inception, scaled by 1e12.
    #[serde(with = "decimal")]
    pub acc_reward_per_share: U256,
}

fn mul(a: U256, b: U256) -> Result<U256> {
    a.checked_mul(b).ok_or(IncentivesError::Overflow)
}

impl PoolInfo {
    /// A fresh pool accruing from `now`.
    pub fn new(allocation_weight: U256, now: u64) -> Self {
        Self {
            total_staked: U256::ZERO,
            allocation_weight,
            last_reward_time: now,
            acc_reward_per_share: U256::ZERO,
        }
    }

    /// Rewards owed to this pool for the time since `last_reward_time`.
    pub fn reward_since_last(
        &self,
        now: u64,
        rate_per_second: u128,
        total_weight: U256,
    ) -> Result<U256> {
        if now <= self.last_reward_time || total_weight == U256::ZERO {
            return Ok(U256::ZERO);
        }
        let elapsed = U256::from(now - self.last_reward_time);
        let gross = mul(mul(elapsed, U256::from(rate_per_second))?, self.allocation_weight)?;
        Ok(gross / total_weight)
    }

    /// The accumulator value the pool would have at `now`, without
    /// mutating anything.
    pub fn projected_acc(
        &self,
        now: u64,
        rate_per_second: u128,
        total_weight: U256,
    ) -> Result<U256> {
        if now <= self.last_reward_time || self.total_staked == U256::ZERO {
            return Ok(self.acc_reward_per_share);
        }
        let reward = self.reward_since_last(now, rate_per_second, total_weight)?;
        let increment = mul(reward, U256::from(ACC_REWARD_PRECISION))? / self.total_staked;
        self.acc_reward_per_share
            .checked_add(increment)
            .ok_or(IncentivesError::Overflow)
    }

    /// Bring the accumulator up to `now`. A second call at the same `now`
    /// is a no-op.
    pub fn refresh(&mut self, now: u64, rate_per_second: u128, total_weight: U256) -> Result<()> {
        if now <= self.last_reward_time {
            return Ok(());
        }
        self.acc_reward_per_share = self.projected_acc(now, rate_per_second, total_weight)?;
        self.last_reward_time = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staked_pool(staked: u64, weight: u64) -> PoolInfo {
        PoolInfo {
            total_staked: U256::from(staked),
            ..PoolInfo::new(U256::from(weight), 1_000)
        }
    }

    #[test]
    fn test_single_pool_accrual() {
        let mut pool = staked_pool(1_000, 1);
        pool.refresh(1_010, 5, U256::ONE).expect("refresh");
        // 10s * 5/s = 50 rewards over 1000 stake => 0.05 per share
        assert_eq!(pool.acc_reward_per_share, U256::from(50_000_000_000u64));
        assert_eq!(pool.last_reward_time, 1_010);
    }

    #[test]
    fn test_weight_share() {
        let pool = staked_pool(100, 1);
        let reward = pool.reward_since_last(1_100, 4, U256::from(4u8)).expect("reward");
        assert_eq!(reward, U256::from(100u8));
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let mut pool = staked_pool(1_000, 1);
        pool.refresh(1_500, 3, U256::ONE).expect("first");
        let after_first = pool;
        pool.refresh(1_500, 3, U256::ONE).expect("second");
        assert_eq!(pool, after_first);
    }

    #[test]
    fn test_zero_stake_skips_accrual() {
        let mut pool = PoolInfo::new(U256::ONE, 1_000);
        pool.refresh(2_000, 100, U256::ONE).expect("refresh");
        assert_eq!(pool.acc_reward_per_share, U256::ZERO);
        assert_eq!(pool.last_reward_time, 2_000);
    }

    #[test]
    fn test_zero_total_weight_skips_accrual() {
        let mut pool = staked_pool(1_000, 0);
        pool.refresh(2_000, 100, U256::ZERO).expect("refresh");
        assert_eq!(pool.acc_reward_per_share, U256::ZERO);
        assert_eq!(pool.last_reward_time, 2_000);
    }

    #[test]
    fn test_past_timestamp_is_noop() {
        let mut pool = staked_pool(1_000, 1);
        let before = pool;
        pool.refresh(500, 100, U256::ONE).expect("refresh");
        assert_eq!(pool, before);
    }

    #[test]
    fn test_projection_matches_refresh() {
        let mut pool = staked_pool(333, 2);
        let projected = pool.projected_acc(1_777, 9, U256::from(3u8)).expect("project");
        pool.refresh(1_777, 9, U256::from(3u8)).expect("refresh");
        assert_eq!(projected, pool.acc_reward_per_share);
    }

    #[test]
    fn test_overflow_reported() {
        let mut pool = PoolInfo {
            total_staked: U256::ONE,
            allocation_weight: U256::MAX,
            ..PoolInfo::new(U256::MAX, 0)
        };
        let err = pool.refresh(10, u128::MAX, U256::ONE).unwrap_err();
        assert!(matches!(err, IncentivesError::Overflow));
    }
}
