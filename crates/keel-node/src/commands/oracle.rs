//! Price feed command handlers.

use serde_json::Value;

use super::{param_amount, param_now, param_timestamp, Result};
use crate::rpc::RpcError;
use crate::{Feed, NodeState};

fn feed_json(state: &NodeState, price: keel_types::U256) -> Value {
    let feed = state.feed.as_price_feed();
    serde_json::json!({
        "price": price.to_string(),
        "status": feed.status(),
        "last_good_price": feed.last_good_price().to_string(),
    })
}

/// Evaluate the current price without committing.
pub fn fetch_price(state: &mut NodeState, params: &Value) -> Result {
    let price = state.feed.as_price_feed().fetch_price(param_now(params)?);
    Ok(feed_json(state, price))
}

/// Evaluate and commit the current price.
pub fn update_price(state: &mut NodeState, params: &Value) -> Result {
    let price = state.feed.as_price_feed_mut().update_price(param_now(params)?);
    Ok(feed_json(state, price))
}

/// Committed status and last good price.
pub fn get_feed_status(state: &mut NodeState) -> Result {
    let feed = state.feed.as_price_feed();
    Ok(serde_json::json!({
        "name": state.config.oracle.name,
        "kind": state.config.oracle.kind,
        "status": feed.status(),
        "last_good_price": feed.last_good_price().to_string(),
    }))
}

/// Replace the price served by a fixed feed.
pub fn set_fixed_price(state: &mut NodeState, params: &Value) -> Result {
    let price = param_amount(params, "price")?;
    match state.feed {
        Feed::Fixed(ref mut feed) => feed.set_price(price)?,
        Feed::MockRound(_) => return Err(RpcError::unsupported_feed("feed is not fixed")),
    }
    Ok(serde_json::json!({ "price": price.to_string() }))
}

/// Publish a new round on the scripted aggregator.
pub fn push_round(state: &mut NodeState, params: &Value) -> Result {
    let answer = params
        .get("answer")
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::invalid_params("answer required"))?;
    let updated_at = match param_timestamp(params, "updated_at")? {
        Some(updated_at) => updated_at,
        None => param_now(params)?,
    };

    let Feed::MockRound(ref feed) = state.feed else {
        return Err(RpcError::unsupported_feed("feed has no scripted aggregator"));
    };
    let round_id = feed.oracle().push_round(i128::from(answer), updated_at);
    Ok(serde_json::json!({ "round_id": round_id }))
}
