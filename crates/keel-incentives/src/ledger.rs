//! Per-user stake and reward-debt bookkeeping.
//!
//! A user's reward debt is `staked_amount * acc_reward_per_share / 1e12` as
//! of their last interaction with the pool. Pending rewards are the
//! difference between that product at the current accumulator and the debt.
//!
//! Rewards settled on a balance change are parked in the user's base
//! claimable balance until the next claim.

use std::collections::HashMap;

use keel_types::amount::decimal;
use keel_types::{Address, ACC_REWARD_PRECISION, U256};
use serde::{Deserialize, Serialize};

use crate::{IncentivesError, Result};

/// Stake of one user in one pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPoolInfo {
    /// Stake reported at the user's last balance change.
    #[serde(with = "decimal")]
    pub staked_amount: U256,
    /// Accumulator snapshot times stake, scaled down by 1e12.
    #[serde(with = "decimal")]
    pub reward_debt: U256,
}

/// `amount * acc / 1e12`.
pub fn accrued(amount: U256, acc_reward_per_share: U256) -> Result<U256> {
    amount
        .checked_mul(acc_reward_per_share)
        .map(|v| v / U256::from(ACC_REWARD_PRECISION))
        .ok_or(IncentivesError::Overflow)
}

impl UserPoolInfo {
    /// Rewards earned since the last snapshot.
    pub fn pending(&self, acc_reward_per_share: U256) -> Result<U256> {
        accrued(self.staked_amount, acc_reward_per_share)?
            .checked_sub(self.reward_debt)
            .ok_or(IncentivesError::Overflow)
    }
}

/// All user-side state of the controller.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    positions: HashMap<(Address, Address), UserPoolInfo>,
    base_claimable: HashMap<Address, U256>,
    claim_receivers: HashMap<Address, Address>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of `user` in the pool for `token`; zero if never staked.
    pub fn position(&self, token: &Address, user: &Address) -> UserPoolInfo {
        self.positions
            .get(&(*token, *user))
            .copied()
            .unwrap_or_default()
    }

    /// Rewards settled but not yet minted for `user`.
    pub fn base_claimable(&self, user: &Address) -> U256 {
        self.base_claimable.get(user).copied().unwrap_or(U256::ZERO)
    }

    /// Reset and return the user's base claimable balance.
    pub fn take_base_claimable(&mut self, user: &Address) -> U256 {
        self.base_claimable.remove(user).unwrap_or(U256::ZERO)
    }

    /// Record a new balance at accumulator `acc`, parking any pending
    /// rewards in the base claimable balance. Returns the amount parked.
    pub fn apply_balance_change(
        &mut self,
        token: &Address,
        user: &Address,
        new_balance: U256,
        acc: U256,
    ) -> Result<U256> {
        let position = self.position(token, user);
        let pending = if position.staked_amount > U256::ZERO {
            position.pending(acc)?
        } else {
            U256::ZERO
        };

        if pending > U256::ZERO {
            let base = self.base_claimable(user);
            let updated = base.checked_add(pending).ok_or(IncentivesError::Overflow)?;
            self.base_claimable.insert(*user, updated);
        }

        self.positions.insert(
            (*token, *user),
            UserPoolInfo {
                staked_amount: new_balance,
                reward_debt: accrued(new_balance, acc)?,
            },
        );
        Ok(pending)
    }

    /// Move the user's debt up to accumulator `acc` and return the
    /// difference, which is exactly the rewards pending in this pool.
    pub fn settle(&mut self, token: &Address, user: &Address, acc: U256) -> Result<U256> {
        let position = self.position(token, user);
        let new_debt = accrued(position.staked_amount, acc)?;
        let delta = new_debt
            .checked_sub(position.reward_debt)
            .ok_or(IncentivesError::Overflow)?;
        if position != UserPoolInfo::default() {
            self.positions.insert(
                (*token, *user),
                UserPoolInfo {
                    reward_debt: new_debt,
                    ..position
                },
            );
        }
        Ok(delta)
    }

    /// Where rewards for `user` are minted. Defaults to the user.
    pub fn claim_receiver(&self, user: &Address) -> Address {
        self.claim_receivers.get(user).copied().unwrap_or(*user)
    }

    /// Route future rewards for `user` to `receiver`.
    pub fn set_claim_receiver(&mut self, user: &Address, receiver: Address) {
        if receiver == *user {
            self.claim_receivers.remove(user);
        } else {
            self.claim_receivers.insert(*user, receiver);
        }
    }
}
