//! The incentives controller.
//!
//! Every entry point brings state up to date in a fixed order before acting:
//! emission schedule first, then pool accumulators, then the user ledger.
//! When a scheduled rate change is due, every pool is refreshed at the old
//! rate before the new rate takes effect, so no interval is ever accrued at
//! the wrong rate.
//!
//! ## Atomicity
//!
//! Mutating calls work on a staged copy of the state. The copy replaces the
//! live state only when the whole call succeeds, including the reward
//! minter and any onward incentive hook, which are invoked last. Events
//! raised during the call are published after that commit.

use std::collections::HashMap;
use std::sync::Arc;

use keel_types::events::{EventSink, NullSink, ProtocolEvent};
use keel_types::{format_address, Address, U256};
use serde::{Deserialize, Serialize};

use crate::hooks::OnwardIncentives;
use crate::ledger::{Ledger, UserPoolInfo};
use crate::minter::{MintPolicy, RewardMinter};
use crate::pool::PoolInfo;
use crate::schedule::{EmissionPoint, EmissionSchedule};
use crate::{IncentivesError, Result};

/// One-time setup parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Administrator: allocation weights, onward incentives, receivers.
    #[serde(with = "keel_types::amount::hex_address")]
    pub owner: Address,
    /// The only caller allowed to register pools.
    #[serde(with = "keel_types::amount::hex_address")]
    pub pool_configurator: Address,
    /// Reference time for emission offsets.
    pub start_time: u64,
    /// Hard cap on total rewards minted.
    #[serde(with = "keel_types::amount::decimal")]
    pub max_mintable: U256,
    /// Emission offsets in chronological order.
    pub emission_offsets: Vec<u128>,
    /// Rates matching `emission_offsets`.
    pub emission_rates: Vec<u128>,
}

#[derive(Clone, Debug)]
struct ControllerState {
    schedule: EmissionSchedule,
    rewards_per_second: u128,
    pools: HashMap<Address, PoolInfo>,
    registered_tokens: Vec<Address>,
    total_allocation_weight: U256,
    ledger: Ledger,
    mint_policy: MintPolicy,
    last_timestamp: u64,
}

impl ControllerState {
    fn mass_update_pools(&mut self, now: u64) -> Result<()> {
        let rate = self.rewards_per_second;
        let total = self.total_allocation_weight;
        for token in &self.registered_tokens {
            if let Some(pool) = self.pools.get_mut(token) {
                pool.refresh(now, rate, total)?;
            }
        }
        Ok(())
    }

    /// Activate at most one due emission point, refreshing every pool at
    /// the outgoing rate first.
    fn update_emissions(
        &mut self,
        start_time: u64,
        now: u64,
        events: &mut Vec<ProtocolEvent>,
    ) -> Result<()> {
        let Some(point) = self.schedule.due(start_time, now) else {
            return Ok(());
        };
        self.mass_update_pools(now)?;
        self.rewards_per_second = point.rate_per_second;
        self.schedule.pop();

        tracing::info!(
            rate_per_second = point.rate_per_second,
            start_offset = point.start_offset,
            remaining = self.schedule.len(),
            "emission rate activated"
        );
        events.push(ProtocolEvent::EmissionRateUpdated {
            rate_per_second: point.rate_per_second,
        });
        Ok(())
    }

    fn refresh_pool(&mut self, token: &Address, now: u64) -> Result<U256> {
        let rate = self.rewards_per_second;
        let total = self.total_allocation_weight;
        let pool = self
            .pools
            .get_mut(token)
            .ok_or(IncentivesError::UnknownPool(*token))?;
        pool.refresh(now, rate, total)?;
        Ok(pool.acc_reward_per_share)
    }
}

/// Distributes a scheduled reward stream across staking pools.
pub struct IncentivesController<M> {
    owner: Address,
    pool_configurator: Address,
    start_time: u64,
    state: ControllerState,
    minter: M,
    onward: HashMap<Address, Box<dyn OnwardIncentives>>,
    sink: Arc<dyn EventSink>,
}

impl<M: RewardMinter> IncentivesController<M> {
    /// Set up the controller. The emission schedule is supplied in
    /// chronological order.
    ///
    /// # Errors
    ///
    /// - [`IncentivesError::LengthMismatch`] if offsets and rates differ in length
    /// - [`IncentivesError::InvalidSchedule`] if offsets decrease
    pub fn initialize(config: ControllerConfig, minter: M) -> Result<Self> {
        let schedule =
            EmissionSchedule::from_chronological(&config.emission_offsets, &config.emission_rates)?;

        tracing::info!(
            owner = %format_address(&config.owner),
            start_time = config.start_time,
            max_mintable = %config.max_mintable,
            emission_points = schedule.len(),
            "incentives controller initialised"
        );

        Ok(Self {
            owner: config.owner,
            pool_configurator: config.pool_configurator,
            start_time: config.start_time,
            state: ControllerState {
                schedule,
                rewards_per_second: 0,
                pools: HashMap::new(),
                registered_tokens: Vec::new(),
                total_allocation_weight: U256::ZERO,
                ledger: Ledger::new(),
                mint_policy: MintPolicy::new(config.max_mintable),
                last_timestamp: 0,
            },
            minter,
            onward: HashMap::new(),
            sink: Arc::new(NullSink),
        })
    }

    /// Publish events to `sink` from now on.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    fn begin(&self, now: u64) -> Result<ControllerState> {
        if now < self.state.last_timestamp {
            return Err(IncentivesError::NonMonotonicTime {
                now,
                last: self.state.last_timestamp,
            });
        }
        let mut staged = self.state.clone();
        staged.last_timestamp = now;
        Ok(staged)
    }

    fn commit(&mut self, staged: ControllerState, events: Vec<ProtocolEvent>) {
        self.state = staged;
        for event in events {
            self.sink.emit(event);
        }
    }

    fn require(&self, caller: &Address, expected: &Address, action: &'static str) -> Result<()> {
        self.require_any(caller, &[*expected], action)
    }

    fn require_any(&self, caller: &Address, allowed: &[Address], action: &'static str) -> Result<()> {
        if !allowed.contains(caller) {
            tracing::warn!(caller = %format_address(caller), action, "unauthorized call rejected");
            return Err(IncentivesError::Unauthorized {
                caller: *caller,
                action,
            });
        }
        Ok(())
    }

    /// Register a pool for `token`. Only the pool configurator may call this.
    ///
    /// Every existing pool is refreshed before the total weight changes.
    pub fn add_pool(
        &mut self,
        caller: &Address,
        now: u64,
        token: Address,
        allocation_weight: U256,
    ) -> Result<()> {
        self.require(caller, &self.pool_configurator, "add_pool")?;
        if self.state.pools.contains_key(&token) {
            return Err(IncentivesError::PoolAlreadyRegistered(token));
        }

        let mut staged = self.begin(now)?;
        let mut events = Vec::new();
        staged.update_emissions(self.start_time, now, &mut events)?;
        staged.mass_update_pools(now)?;

        staged.total_allocation_weight = staged
            .total_allocation_weight
            .checked_add(allocation_weight)
            .ok_or(IncentivesError::Overflow)?;
        staged.registered_tokens.push(token);
        staged
            .pools
            .insert(token, PoolInfo::new(allocation_weight, now));

        tracing::info!(token = %format_address(&token), %allocation_weight, "pool added");
        events.push(ProtocolEvent::PoolAdded {
            token,
            allocation_weight,
        });
        self.commit(staged, events);
        Ok(())
    }

    /// Replace the allocation weights of several pools at once.
    /// Owner only; every pool is refreshed at the old weights first.
    pub fn batch_update_allocation_weights(
        &mut self,
        caller: &Address,
        now: u64,
        tokens: &[Address],
        weights: &[U256],
    ) -> Result<()> {
        self.require(caller, &self.owner, "batch_update_allocation_weights")?;
        if tokens.len() != weights.len() {
            return Err(IncentivesError::LengthMismatch {
                left: tokens.len(),
                right: weights.len(),
            });
        }

        let mut staged = self.begin(now)?;
        let mut events = Vec::new();
        staged.update_emissions(self.start_time, now, &mut events)?;
        staged.mass_update_pools(now)?;

        let mut total = staged.total_allocation_weight;
        for (token, &weight) in tokens.iter().zip(weights) {
            let pool = staged
                .pools
                .get_mut(token)
                .ok_or(IncentivesError::UnknownPool(*token))?;
            total = total
                .checked_sub(pool.allocation_weight)
                .and_then(|t| t.checked_add(weight))
                .ok_or(IncentivesError::Overflow)?;
            pool.allocation_weight = weight;
            events.push(ProtocolEvent::AllocationWeightUpdated {
                token: *token,
                allocation_weight: weight,
            });
        }
        staged.total_allocation_weight = total;

        tracing::info!(pools = tokens.len(), total_weight = %total, "allocation weights updated");
        self.commit(staged, events);
        Ok(())
    }

    /// Record a stake balance change for `user`. The caller must be the
    /// registered token of the pool.
    pub fn handle_action(
        &mut self,
        caller: &Address,
        now: u64,
        user: Address,
        balance: U256,
        total_supply: U256,
    ) -> Result<()> {
        let token = *caller;
        if !self.state.pools.contains_key(&token) {
            tracing::warn!(caller = %format_address(caller), "balance change from unregistered token");
            return Err(IncentivesError::Unauthorized {
                caller: token,
                action: "handle_action",
            });
        }

        let mut staged = self.begin(now)?;
        let mut events = Vec::new();
        staged.update_emissions(self.start_time, now, &mut events)?;
        let acc = staged.refresh_pool(&token, now)?;

        let parked = staged
            .ledger
            .apply_balance_change(&token, &user, balance, acc)?;
        if let Some(pool) = staged.pools.get_mut(&token) {
            pool.total_staked = total_supply;
        }

        tracing::debug!(
            token = %format_address(&token),
            user = %format_address(&user),
            %balance,
            %total_supply,
            %parked,
            "balance updated"
        );
        events.push(ProtocolEvent::BalanceUpdated {
            token,
            user,
            balance,
            total_supply,
        });

        if let Some(hook) = self.onward.get_mut(&token) {
            hook.handle_action(&token, &user, balance, total_supply)?;
        }

        self.commit(staged, events);
        Ok(())
    }

    /// Mint every reward owed to `user` across `tokens`, plus any rewards
    /// parked by earlier balance changes. Anyone may trigger a claim; the
    /// rewards always go to the user's claim receiver.
    ///
    /// Returns the amount actually minted, which is less than the amount
    /// owed once the supply cap is reached.
    pub fn claim(&mut self, now: u64, user: Address, tokens: &[Address]) -> Result<U256> {
        let mut staged = self.begin(now)?;
        let mut events = Vec::new();
        staged.update_emissions(self.start_time, now, &mut events)?;

        let mut pending = staged.ledger.take_base_claimable(&user);
        for token in tokens {
            let acc = staged.refresh_pool(token, now)?;
            let delta = staged.ledger.settle(token, &user, acc)?;
            pending = pending
                .checked_add(delta)
                .ok_or(IncentivesError::Overflow)?;
        }

        let minted = staged.mint_policy.admit(pending);
        if minted > U256::ZERO {
            let receiver = staged.ledger.claim_receiver(&user);
            self.minter.mint(&receiver, minted, true)?;

            tracing::info!(
                user = %format_address(&user),
                receiver = %format_address(&receiver),
                %minted,
                owed = %pending,
                "rewards claimed"
            );
            events.push(ProtocolEvent::RewardsClaimed {
                user,
                receiver,
                amount: minted,
            });
        }

        self.commit(staged, events);
        Ok(minted)
    }

    /// Rewards pending for `user` in each of `tokens` at `now`, without
    /// touching any state. Scheduled rate changes that are due but not yet
    /// activated are not reflected.
    pub fn claimable_reward(&self, now: u64, user: &Address, tokens: &[Address]) -> Result<Vec<U256>> {
        tokens
            .iter()
            .map(|token| {
                let pool = self
                    .state
                    .pools
                    .get(token)
                    .ok_or(IncentivesError::UnknownPool(*token))?;
                let acc = pool.projected_acc(
                    now,
                    self.state.rewards_per_second,
                    self.state.total_allocation_weight,
                )?;
                self.state.ledger.position(token, user).pending(acc)
            })
            .collect()
    }

    /// Bring the schedule and every pool up to `now`.
    pub fn mass_update_pools(&mut self, now: u64) -> Result<()> {
        let mut staged = self.begin(now)?;
        let mut events = Vec::new();
        staged.update_emissions(self.start_time, now, &mut events)?;
        staged.mass_update_pools(now)?;
        self.commit(staged, events);
        Ok(())
    }

    /// Route future rewards for `user` to `receiver`. Callable by the user
    /// or the owner.
    pub fn set_claim_receiver(
        &mut self,
        caller: &Address,
        user: Address,
        receiver: Address,
    ) -> Result<()> {
        self.require_any(caller, &[user, self.owner], "set_claim_receiver")?;
        self.state.ledger.set_claim_receiver(&user, receiver);
        self.sink
            .emit(ProtocolEvent::ClaimReceiverUpdated { user, receiver });
        Ok(())
    }

    /// Install or remove the onward incentive hook of a pool. Owner only.
    pub fn set_onward_incentives(
        &mut self,
        caller: &Address,
        token: Address,
        hook: Option<Box<dyn OnwardIncentives>>,
    ) -> Result<()> {
        self.require(caller, &self.owner, "set_onward_incentives")?;
        if !self.state.pools.contains_key(&token) {
            return Err(IncentivesError::UnknownPool(token));
        }
        let enabled = hook.is_some();
        match hook {
            Some(hook) => {
                self.onward.insert(token, hook);
            }
            None => {
                self.onward.remove(&token);
            }
        }
        self.sink
            .emit(ProtocolEvent::OnwardIncentivesUpdated { token, enabled });
        Ok(())
    }

    /// Administrator allowed to re-weight pools and install hooks.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Reference time that emission offsets are measured from.
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Number of registered pools.
    pub fn pool_length(&self) -> usize {
        self.state.registered_tokens.len()
    }

    /// Tokens in registration order.
    pub fn registered_tokens(&self) -> &[Address] {
        &self.state.registered_tokens
    }

    /// Accumulator state of the pool for `token`, if registered.
    pub fn pool_info(&self, token: &Address) -> Option<PoolInfo> {
        self.state.pools.get(token).copied()
    }

    /// Stake and reward debt of `user` in the pool for `token`.
    ///
    /// Unknown pairs read as an empty position.
    pub fn user_info(&self, token: &Address, user: &Address) -> UserPoolInfo {
        self.state.ledger.position(token, user)
    }

    /// Rewards parked for `user` by earlier balance changes.
    pub fn user_base_claimable(&self, user: &Address) -> U256 {
        self.state.ledger.base_claimable(user)
    }

    /// Where claims for `user` are paid. Defaults to `user`.
    pub fn claim_receiver(&self, user: &Address) -> Address {
        self.state.ledger.claim_receiver(user)
    }

    /// Emission rate currently in force.
    pub fn rewards_per_second(&self) -> u128 {
        self.state.rewards_per_second
    }

    /// Sum of every pool's allocation weight.
    pub fn total_allocation_weight(&self) -> U256 {
        self.state.total_allocation_weight
    }

    /// Rewards minted so far.
    pub fn minted_tokens(&self) -> U256 {
        self.state.mint_policy.minted
    }

    /// Supply cap on rewards minted through this controller.
    pub fn max_mintable_tokens(&self) -> U256 {
        self.state.mint_policy.max_mintable
    }

    /// Scheduled rate changes not yet activated, in activation order.
    pub fn pending_emissions(&self) -> Vec<EmissionPoint> {
        self.state.schedule.pending()
    }

    /// The reward minter.
    pub fn minter(&self) -> &M {
        &self.minter
    }

    /// Mutable access to the reward minter, for test doubles.
    pub fn minter_mut(&mut self) -> &mut M {
        &mut self.minter
    }
}
