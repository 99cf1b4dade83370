//! Bounded-supply minting.
//!
//! The controller never mints more than `max_mintable` in total. A request
//! beyond the remaining headroom is truncated to it, silently; the excess
//! is not recorded anywhere.

use std::collections::HashMap;

use keel_types::amount::decimal;
use keel_types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::MintError;

/// External minter of reward tokens.
pub trait RewardMinter: Send {
    /// Mint `amount` to `receiver`. `apply_penalty` selects the vesting
    /// path with an early-exit penalty.
    fn mint(&mut self, receiver: &Address, amount: U256, apply_penalty: bool)
        -> Result<(), MintError>;
}

/// Running total against a hard cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintPolicy {
    /// Tokens minted so far.
    #[serde(with = "decimal")]
    pub minted: U256,
    /// Cap on `minted`.
    #[serde(with = "decimal")]
    pub max_mintable: U256,
}

impl MintPolicy {
    /// A policy with nothing minted yet and the given cap.
    pub fn new(max_mintable: U256) -> Self {
        Self {
            minted: U256::ZERO,
            max_mintable,
        }
    }

    /// Tokens that may still be minted.
    pub fn headroom(&self) -> U256 {
        self.max_mintable.saturating_sub(self.minted)
    }

    /// Admit up to `requested` tokens, recording what was admitted.
    pub fn admit(&mut self, requested: U256) -> U256 {
        let headroom = self.headroom();
        let admitted = requested.min(headroom);
        if admitted < requested {
            tracing::warn!(
                requested = %requested,
                admitted = %admitted,
                "mint truncated at supply cap"
            );
        }
        self.minted += admitted;
        admitted
    }
}

/// One recorded mint call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MintCall {
    /// Account credited.
    pub receiver: Address,
    /// Amount actually minted, after the cap.
    pub amount: U256,
    /// Whether the minter should apply its early-exit penalty.
    pub apply_penalty: bool,
}

/// A minter that keeps balances in memory.
#[derive(Debug, Default)]
pub struct InMemoryMinter {
    balances: HashMap<Address, U256>,
    calls: Vec<MintCall>,
    reject: bool,
}

impl InMemoryMinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance minted to `account` so far.
    pub fn balance_of(&self, account: &Address) -> U256 {
        self.balances.get(account).copied().unwrap_or(U256::ZERO)
    }

    /// Every successful mint, in order.
    pub fn calls(&self) -> &[MintCall] {
        &self.calls
    }

    /// Sum of all minted balances.
    pub fn total_supply(&self) -> U256 {
        self.balances.values().fold(U256::ZERO, |acc, v| acc + *v)
    }

    /// Make subsequent mints fail.
    pub fn reject_mints(&mut self, reject: bool) {
        self.reject = reject;
    }
}

impl RewardMinter for InMemoryMinter {
    fn mint(
        &mut self,
        receiver: &Address,
        amount: U256,
        apply_penalty: bool,
    ) -> Result<(), MintError> {
        if self.reject {
            return Err(MintError::Rejected("minter paused".to_string()));
        }
        let balance = self.balances.entry(*receiver).or_insert(U256::ZERO);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| MintError::Rejected("balance overflow".to_string()))?;
        self.calls.push(MintCall {
            receiver: *receiver,
            amount,
            apply_penalty,
        });
        Ok(())
    }
}
