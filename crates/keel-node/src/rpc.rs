//! Line-delimited JSON-RPC 2.0.
//!
//! Each input line is one request; each output line is one response or
//! notification. Requests are dispatched one at a time under the node
//! mutex.

use std::sync::Arc;

use keel_incentives::IncentivesError;
use keel_oracle::OracleError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, warn};

use crate::commands;
use crate::events::Event;
use crate::NodeState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Server-initiated message carrying one event.
#[derive(Debug, Serialize)]
pub struct RpcNotification {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Notification method, `event`.
    pub method: String,
    /// The sequenced event.
    pub params: Event,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    /// JSON-RPC error code. Protocol errors use the -32010..-32051 range.
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, detail: Option<String>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: detail.map(|d| serde_json::json!({ "detail": d })),
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({ "method": method })),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(-32602, "INVALID_PARAMS", Some(detail.to_string()))
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(-32603, "INTERNAL_ERROR", Some(detail.to_string()))
    }

    /// The call needs a different feed kind (-32050).
    pub fn unsupported_feed(detail: &str) -> Self {
        Self::new(-32050, "UNSUPPORTED_FEED", Some(detail.to_string()))
    }
}

impl From<IncentivesError> for RpcError {
    fn from(err: IncentivesError) -> Self {
        let (code, message) = match &err {
            IncentivesError::Unauthorized { .. } => (-32010, "UNAUTHORIZED"),
            IncentivesError::PoolAlreadyRegistered(_) => (-32020, "POOL_ALREADY_REGISTERED"),
            IncentivesError::UnknownPool(_) => (-32021, "UNKNOWN_POOL"),
            IncentivesError::LengthMismatch { .. } | IncentivesError::InvalidSchedule(_) => {
                (-32602, "INVALID_PARAMS")
            }
            IncentivesError::NonMonotonicTime { .. } => (-32030, "NON_MONOTONIC_TIME"),
            IncentivesError::Overflow => (-32031, "OVERFLOW"),
            IncentivesError::Mint(_) => (-32040, "MINT_FAILED"),
            IncentivesError::OnwardIncentives(_) => (-32041, "ONWARD_INCENTIVES_FAILED"),
        };
        Self::new(code, message, Some(err.to_string()))
    }
}

impl From<OracleError> for RpcError {
    fn from(err: OracleError) -> Self {
        Self::new(-32051, "ORACLE_ERROR", Some(err.to_string()))
    }
}

/// Serve requests from `reader` until EOF, writing responses to `out`.
pub async fn serve<R>(
    reader: R,
    out: mpsc::UnboundedSender<String>,
    state: Arc<Mutex<NodeState>>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&state, &line).await;
        if out.send(serde_json::to_string(&response)?).is_err() {
            break; // writer gone
        }
    }
    Ok(())
}

/// Parse and dispatch one request line.
pub async fn handle_line(state: &Arc<Mutex<NodeState>>, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) if request.jsonrpc == "2.0" => {
            let mut guard = state.lock().await;
            dispatch_request(&mut guard, request)
        }
        Ok(request) => RpcResponse::error(request.id, RpcError::invalid_request()),
        Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
    }
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
fn dispatch_request(state: &mut NodeState, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();
    let params = &request.params;

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Price feed
        "fetch_price" => commands::oracle::fetch_price(state, params),
        "update_price" => commands::oracle::update_price(state, params),
        "get_feed_status" => commands::oracle::get_feed_status(state),
        "set_fixed_price" => commands::oracle::set_fixed_price(state, params),
        "push_round" => commands::oracle::push_round(state, params),

        // Incentives
        "add_pool" => commands::incentives::add_pool(state, params),
        "batch_update_allocation_weights" => {
            commands::incentives::batch_update_allocation_weights(state, params)
        }
        "handle_action" => commands::incentives::handle_action(state, params),
        "claim" => commands::incentives::claim(state, params),
        "claimable_reward" => commands::incentives::claimable_reward(state, params),
        "mass_update_pools" => commands::incentives::mass_update_pools(state, params),
        "set_claim_receiver" => commands::incentives::set_claim_receiver(state, params),
        "get_pool_info" => commands::incentives::get_pool_info(state, params),
        "get_user_info" => commands::incentives::get_user_info(state, params),
        "get_controller_info" => commands::incentives::get_controller_info(state),
        "get_reward_balance" => commands::incentives::get_reward_balance(state, params),

        // Event subscription
        "subscribe_events" => commands::subscribe_events(state, params),
        "unsubscribe_events" => commands::unsubscribe_events(state),

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => {
            debug!(method, code = err.code, "RPC call failed");
            RpcResponse::error(id, err)
        }
    }
}

/// Forward bus events matching the active subscription as notifications.
pub async fn forward_events(
    mut events: broadcast::Receiver<Event>,
    state: Arc<Mutex<NodeState>>,
    out: mpsc::UnboundedSender<String>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let wanted = match state.lock().await.subscription {
            Some(ref filter) => filter.matches(&event),
            None => false,
        };
        if !wanted {
            continue;
        }

        let notification = RpcNotification {
            jsonrpc: "2.0".to_string(),
            method: "event".to_string(),
            params: event,
        };
        match serde_json::to_string(&notification) {
            Ok(line) => {
                if out.send(line).is_err() {
                    break;
                }
            }
            Err(e) => warn!("event serialization failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::events::EventBus;

    fn state() -> Arc<Mutex<NodeState>> {
        let node = NodeState::build(NodeConfig::default(), EventBus::new(64), 1_000).expect("build");
        Arc::new(Mutex::new(node))
    }

    async fn call(state: &Arc<Mutex<NodeState>>, method: &str, params: serde_json::Value) -> RpcResponse {
        let line = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        })
        .to_string();
        handle_line(state, &line).await
    }

    #[test]
    fn test_rpc_error_codes() {
        let err = RpcError::method_not_found("unknown");
        assert_eq!(err.code, -32601);

        let err = RpcError::from(IncentivesError::NonMonotonicTime { now: 1, last: 2 });
        assert_eq!(err.code, -32030);
        assert_eq!(err.message, "NON_MONOTONIC_TIME");
    }

    #[test]
    fn test_rpc_response_shapes() {
        let resp = RpcResponse::success(serde_json::json!(1), serde_json::json!({"ok": true}));
        assert!(resp.result.is_some());
        assert!(resp.error.is_none());

        let resp = RpcResponse::error(serde_json::json!(1), RpcError::internal_error("test"));
        assert!(resp.result.is_none());
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let state = state();
        let resp = handle_line(&state, "{not json").await;
        assert_eq!(resp.error.expect("error").code, -32700);
    }

    #[tokio::test]
    async fn test_wrong_version_rejected() {
        let state = state();
        let resp = handle_line(&state, r#"{"jsonrpc":"1.0","id":3,"method":"fetch_price"}"#).await;
        assert_eq!(resp.error.expect("error").code, -32600);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let state = state();
        let resp = call(&state, "mint_everything", serde_json::json!({})).await;
        assert_eq!(resp.error.expect("error").code, -32601);
    }

    #[tokio::test]
    async fn test_fetch_price_over_rpc() {
        let state = state();
        let resp = call(&state, "fetch_price", serde_json::json!({ "now": 1_000 })).await;
        let result = resp.result.expect("result");
        assert_eq!(result["price"], "1000000000000000000");
        assert_eq!(result["status"], "working");
    }

    #[tokio::test]
    async fn test_stake_and_claim_over_rpc() {
        let state = state();
        let token = "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a";
        let user = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
        let configurator = "0x0202020202020202020202020202020202020202";

        let resp = call(
            &state,
            "add_pool",
            serde_json::json!({ "caller": configurator, "token": token, "allocation_weight": "1", "now": 1_000 }),
        )
        .await;
        assert!(resp.error.is_none(), "{:?}", resp.error);

        let resp = call(
            &state,
            "handle_action",
            serde_json::json!({ "caller": token, "user": user, "balance": "100", "total_supply": "100", "now": 1_001 }),
        )
        .await;
        assert!(resp.error.is_none(), "{:?}", resp.error);

        let resp = call(
            &state,
            "claim",
            serde_json::json!({ "user": user, "tokens": [token], "now": 1_003 }),
        )
        .await;
        // Default schedule: 1e18 per second from the first call after start
        assert_eq!(resp.result.expect("result")["minted"], "2000000000000000000");

        let resp = call(&state, "get_reward_balance", serde_json::json!({ "account": user })).await;
        assert_eq!(resp.result.expect("result")["balance"], "2000000000000000000");
    }

    #[tokio::test]
    async fn test_library_errors_map_to_rpc_errors() {
        let state = state();
        let resp = call(
            &state,
            "add_pool",
            serde_json::json!({
                "caller": "0x0101010101010101010101010101010101010101",
                "token": "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a",
                "allocation_weight": "1",
            }),
        )
        .await;
        assert_eq!(resp.error.expect("error").code, -32010);
    }

    #[tokio::test]
    async fn test_subscription_forwards_events() {
        let state = state();
        let bus = state.lock().await.event_bus.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_events(bus.subscribe(), state.clone(), tx));

        let resp = call(&state, "subscribe_events", serde_json::json!({ "categories": ["incentives"] })).await;
        assert!(resp.error.is_none());

        call(
            &state,
            "add_pool",
            serde_json::json!({
                "caller": "0x0202020202020202020202020202020202020202",
                "token": "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a",
                "allocation_weight": "3",
                "now": 1_000,
            }),
        )
        .await;

        let line = rx.recv().await.expect("notification");
        let json: serde_json::Value = serde_json::from_str(&line).expect("json");
        assert_eq!(json["method"], "event");
        assert_eq!(json["params"]["event_type"], "pool_added");
        assert_eq!(json["params"]["allocation_weight"], "3");
        forwarder.abort();
    }
}
