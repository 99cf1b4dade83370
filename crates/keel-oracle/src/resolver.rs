//! `Working` / `Untrusted` price resolution.
//!
//! Two transition functions are provided. [`resolve_round`] is used by
//! aggregators with round history and additionally distrusts sudden price
//! jumps between consecutive rounds. [`resolve_timestamp`] is used by push
//! oracles and relies on validity and freshness alone.
//!
//! | From | Reading | To | Price served |
//! |---|---|---|---|
//! | Working | current or previous broken, or current frozen | Untrusted | last good |
//! | Working | jump above max deviation | Untrusted | current |
//! | Working | valid | Working | current |
//! | Untrusted | broken or frozen | Untrusted | last good |
//! | Untrusted | valid | Working | current |
//!
//! Recovery from `Untrusted` never checks deviation.

use keel_types::{U256, WAD};
use serde::{Deserialize, Serialize};

use crate::response::PriceResponse;
use crate::FeedStatus;

/// Default maximum age of a reading before it is frozen (4 hours).
pub const DEFAULT_TIMEOUT_SECS: u64 = 4 * 60 * 60;

/// Default maximum round-to-round deviation, 50% at 18 decimals.
pub const DEFAULT_MAX_DEVIATION_WAD: u128 = WAD / 2;

/// Persistent feed state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedState {
    /// Current trust status.
    pub status: FeedStatus,
    /// Most recent accepted price. Always positive.
    #[serde(with = "keel_types::amount::decimal")]
    pub last_good_price: U256,
}

/// Outcome of one resolver step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Status after the step.
    pub status: FeedStatus,
    /// Price served by the step.
    pub price: U256,
}

impl Resolution {
    fn fallback(state: &FeedState) -> Self {
        Self {
            status: FeedStatus::Untrusted,
            price: state.last_good_price,
        }
    }

    fn trusted(status: FeedStatus, response: &PriceResponse) -> Self {
        Self {
            status,
            price: response.value,
        }
    }
}

/// Parameters of the round-based transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundParams {
    /// Maximum reading age in seconds.
    pub timeout: u64,
    /// Maximum relative change between rounds, at 18 decimals.
    pub max_deviation: U256,
}

impl Default for RoundParams {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            max_deviation: U256::from(DEFAULT_MAX_DEVIATION_WAD),
        }
    }
}

/// Whether a reading fails basic validity checks.
///
/// Broken means: the read failed, the round id is zero (round-based
/// oracles only), the timestamp is zero or later than `now`, or the
/// price is not positive.
pub fn is_broken(response: &PriceResponse, now: u64) -> bool {
    !response.succeeded
        || response.round_id == Some(0)
        || response.timestamp == 0
        || response.timestamp > now
        || response.value == U256::ZERO
}

/// Whether a reading is older than `timeout`.
pub fn is_frozen(response: &PriceResponse, now: u64, timeout: u64) -> bool {
    now.saturating_sub(response.timestamp) > timeout
}

/// Relative change between two prices, measured against the larger one,
/// at 18 decimals. Symmetric in its arguments.
pub fn relative_deviation(current: U256, previous: U256) -> U256 {
    let max = current.max(previous);
    let min = current.min(previous);
    if max == U256::ZERO {
        return U256::ZERO;
    }
    // (max - min) < 2^255 for any pair of normalized i128 answers
    (max - min).checked_mul(U256::from(WAD)).map_or(U256::from(WAD), |scaled| scaled / max)
}

/// Whether the move from `previous` to `current` exceeds `max_deviation`.
pub fn price_change_above_max(current: U256, previous: U256, max_deviation: U256) -> bool {
    relative_deviation(current, previous) > max_deviation
}

/// Round-based transition.
pub fn resolve_round(
    state: &FeedState,
    current: &PriceResponse,
    previous: &PriceResponse,
    now: u64,
    params: &RoundParams,
) -> Resolution {
    let current_broken = is_broken(current, now);
    let current_frozen = is_frozen(current, now, params.timeout);

    match state.status {
        FeedStatus::Working => {
            if current_broken || is_broken(previous, now) || current_frozen {
                return Resolution::fallback(state);
            }
            if price_change_above_max(current.value, previous.value, params.max_deviation) {
                return Resolution::trusted(FeedStatus::Untrusted, current);
            }
            Resolution::trusted(FeedStatus::Working, current)
        }
        FeedStatus::Untrusted => {
            if current_broken || current_frozen {
                return Resolution::fallback(state);
            }
            Resolution::trusted(FeedStatus::Working, current)
        }
    }
}

/// Timestamp-only transition; no round history, no deviation check.
pub fn resolve_timestamp(
    state: &FeedState,
    current: &PriceResponse,
    now: u64,
    timeout: u64,
) -> Resolution {
    if is_broken(current, now) || is_frozen(current, now, timeout) {
        return Resolution::fallback(state);
    }
    Resolution::trusted(FeedStatus::Working, current)
}
