//! Incentives controller command handlers.

use keel_types::format_address;
use serde_json::Value;

use super::{param_address, param_addresses, param_amount, param_amounts, param_now, Result};
use crate::rpc::RpcError;
use crate::NodeState;

/// Register a pool.
pub fn add_pool(state: &mut NodeState, params: &Value) -> Result {
    let caller = param_address(params, "caller")?;
    let token = param_address(params, "token")?;
    let weight = param_amount(params, "allocation_weight")?;
    state
        .controller
        .add_pool(&caller, param_now(params)?, token, weight)?;
    Ok(serde_json::json!({ "pool_length": state.controller.pool_length() }))
}

/// Replace allocation weights.
pub fn batch_update_allocation_weights(state: &mut NodeState, params: &Value) -> Result {
    let caller = param_address(params, "caller")?;
    let tokens = param_addresses(params, "tokens")?;
    let weights = param_amounts(params, "weights")?;
    state.controller.batch_update_allocation_weights(
        &caller,
        param_now(params)?,
        &tokens,
        &weights,
    )?;
    Ok(serde_json::json!({
        "total_allocation_weight": state.controller.total_allocation_weight().to_string(),
    }))
}

/// Record a balance change reported by a pool token.
pub fn handle_action(state: &mut NodeState, params: &Value) -> Result {
    let caller = param_address(params, "caller")?;
    let user = param_address(params, "user")?;
    let balance = param_amount(params, "balance")?;
    let total_supply = param_amount(params, "total_supply")?;
    state
        .controller
        .handle_action(&caller, param_now(params)?, user, balance, total_supply)?;
    Ok(serde_json::json!({ "ok": true }))
}

/// Claim rewards for a user across pools.
pub fn claim(state: &mut NodeState, params: &Value) -> Result {
    let user = param_address(params, "user")?;
    let tokens = param_addresses(params, "tokens")?;
    let minted = state.controller.claim(param_now(params)?, user, &tokens)?;
    Ok(serde_json::json!({
        "minted": minted.to_string(),
        "receiver": format_address(&state.controller.claim_receiver(&user)),
    }))
}

/// Quote pending rewards per pool without mutating anything.
pub fn claimable_reward(state: &mut NodeState, params: &Value) -> Result {
    let user = param_address(params, "user")?;
    let tokens = param_addresses(params, "tokens")?;
    let amounts = state
        .controller
        .claimable_reward(param_now(params)?, &user, &tokens)?;
    let amounts: Vec<String> = amounts.iter().map(ToString::to_string).collect();
    Ok(serde_json::json!({
        "claimable": amounts,
        "base_claimable": state.controller.user_base_claimable(&user).to_string(),
    }))
}

/// Bring the schedule and every pool up to date.
pub fn mass_update_pools(state: &mut NodeState, params: &Value) -> Result {
    state.controller.mass_update_pools(param_now(params)?)?;
    Ok(serde_json::json!({
        "rewards_per_second": state.controller.rewards_per_second().to_string(),
    }))
}

/// Route a user's rewards elsewhere.
pub fn set_claim_receiver(state: &mut NodeState, params: &Value) -> Result {
    let caller = param_address(params, "caller")?;
    let user = param_address(params, "user")?;
    let receiver = param_address(params, "receiver")?;
    state.controller.set_claim_receiver(&caller, user, receiver)?;
    Ok(serde_json::json!({ "receiver": format_address(&receiver) }))
}

/// Accumulator state of one pool.
pub fn get_pool_info(state: &mut NodeState, params: &Value) -> Result {
    let token = param_address(params, "token")?;
    let pool = state
        .controller
        .pool_info(&token)
        .ok_or_else(|| RpcError::from(keel_incentives::IncentivesError::UnknownPool(token)))?;
    serde_json::to_value(pool).map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// Stake and reward debt of one user in one pool.
pub fn get_user_info(state: &mut NodeState, params: &Value) -> Result {
    let token = param_address(params, "token")?;
    let user = param_address(params, "user")?;
    serde_json::to_value(state.controller.user_info(&token, &user))
        .map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// Controller-wide figures.
pub fn get_controller_info(state: &mut NodeState) -> Result {
    let c = &state.controller;
    let tokens: Vec<String> = c.registered_tokens().iter().map(format_address).collect();
    let pending: Vec<Value> = c
        .pending_emissions()
        .iter()
        .map(|p| {
            serde_json::json!({
                "start_offset": p.start_offset.to_string(),
                "rate_per_second": p.rate_per_second.to_string(),
            })
        })
        .collect();
    Ok(serde_json::json!({
        "owner": format_address(&c.owner()),
        "start_time": c.start_time(),
        "pool_length": c.pool_length(),
        "registered_tokens": tokens,
        "rewards_per_second": c.rewards_per_second().to_string(),
        "total_allocation_weight": c.total_allocation_weight().to_string(),
        "minted_tokens": c.minted_tokens().to_string(),
        "max_mintable_tokens": c.max_mintable_tokens().to_string(),
        "pending_emissions": pending,
    }))
}

/// Reward token balance held by an account in the in-process minter.
pub fn get_reward_balance(state: &mut NodeState, params: &Value) -> Result {
    let account = param_address(params, "account")?;
    Ok(serde_json::json!({
        "balance": state.controller.minter().balance_of(&account).to_string(),
    }))
}
