//! RPC command handlers.
//!
//! Each submodule implements the commands for one protocol area. Every
//! mutating command accepts an optional `now` (Unix seconds); the node
//! clock is used when it is absent.

pub mod incentives;
pub mod oracle;

use keel_types::amount::parse_amount;
use keel_types::{parse_address, Address, U256};
use serde_json::Value;

use crate::events::EventFilter;
use crate::rpc::RpcError;
use crate::NodeState;

pub(crate) type Result = std::result::Result<Value, RpcError>;

/// Explicit `now`, else the node clock. A `now` that is present but not a
/// non-negative integer is rejected rather than replaced.
pub(crate) fn param_now(params: &Value) -> std::result::Result<u64, RpcError> {
    param_timestamp(params, "now").map(|now| now.unwrap_or_else(crate::unix_now))
}

/// Optional Unix-seconds field.
pub(crate) fn param_timestamp(
    params: &Value,
    key: &str,
) -> std::result::Result<Option<u64>, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            RpcError::invalid_params(&format!("{key} must be a non-negative integer"))
        }),
    }
}

pub(crate) fn param_address(params: &Value, key: &str) -> std::result::Result<Address, RpcError> {
    let raw = params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))?;
    parse_address(raw).map_err(|e| RpcError::invalid_params(&format!("{key}: {e}")))
}

fn to_amount(value: &Value) -> Option<U256> {
    match value {
        Value::String(s) => parse_amount(s).ok(),
        Value::Number(n) => n.as_u64().map(U256::from),
        _ => None,
    }
}

/// An amount given as a decimal string or a non-negative integer.
pub(crate) fn param_amount(params: &Value, key: &str) -> std::result::Result<U256, RpcError> {
    params
        .get(key)
        .and_then(to_amount)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be a decimal amount")))
}

pub(crate) fn param_addresses(
    params: &Value,
    key: &str,
) -> std::result::Result<Vec<Address>, RpcError> {
    let items = params
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be an array")))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| RpcError::invalid_params(&format!("{key}: expected hex string")))
                .and_then(|s| {
                    parse_address(s).map_err(|e| RpcError::invalid_params(&format!("{key}: {e}")))
                })
        })
        .collect()
}

pub(crate) fn param_amounts(params: &Value, key: &str) -> std::result::Result<Vec<U256>, RpcError> {
    let items = params
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be an array")))?;
    items
        .iter()
        .map(|item| {
            to_amount(item)
                .ok_or_else(|| RpcError::invalid_params(&format!("{key}: expected decimal amount")))
        })
        .collect()
}

/// Start forwarding events as notifications.
pub fn subscribe_events(state: &mut NodeState, params: &Value) -> Result {
    let filter: EventFilter = serde_json::from_value(params.clone())
        .map_err(|e| RpcError::invalid_params(&e.to_string()))?;
    state.subscription = Some(filter);
    Ok(serde_json::json!({
        "subscribed": true,
        "sequence": state.event_bus.sequence(),
    }))
}

/// Stop forwarding events.
pub fn unsubscribe_events(state: &mut NodeState) -> Result {
    let was_subscribed = state.subscription.take().is_some();
    Ok(serde_json::json!({ "unsubscribed": was_subscribed }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_amount_accepts_string_and_number() {
        let params = serde_json::json!({ "a": "115792089237316195423570985008687907853269984665640564039457584007913129639935", "b": 7 });
        assert_eq!(param_amount(&params, "a").expect("a"), U256::MAX);
        assert_eq!(param_amount(&params, "b").expect("b"), U256::from(7u64));
        assert!(param_amount(&params, "c").is_err());
    }

    #[test]
    fn test_param_amount_rejects_negative() {
        let params = serde_json::json!({ "a": -5, "b": "-5" });
        assert!(param_amount(&params, "a").is_err());
        assert!(param_amount(&params, "b").is_err());
    }

    #[test]
    fn test_param_addresses() {
        let params = serde_json::json!({
            "tokens": ["0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a", "0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b"],
            "bad": ["0x12"],
        });
        let tokens = param_addresses(&params, "tokens").expect("tokens");
        assert_eq!(tokens[1], keel_types::address_from_byte(0x0b));
        assert!(param_addresses(&params, "bad").is_err());
    }

    #[test]
    fn test_param_now_explicit() {
        assert_eq!(param_now(&serde_json::json!({ "now": 5 })).expect("now"), 5);
        assert!(param_now(&serde_json::json!({})).expect("clock") > 0);
    }

    #[test]
    fn test_param_now_rejects_malformed() {
        for bad in [serde_json::json!("1000"), serde_json::json!(-1), serde_json::json!(1.5)] {
            let err = param_now(&serde_json::json!({ "now": bad })).unwrap_err();
            assert_eq!(err.code, -32602);
        }
    }
}
