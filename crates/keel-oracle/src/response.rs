//! Oracle response normalizer.
//!
//! Turns raw oracle calls into [`PriceResponse`] values at 18 decimals.
//! Any failure along the call path produces the unsuccessful sentinel
//! ([`PriceResponse::unsuccessful`]) instead of an error; the resolver then
//! classifies it as broken.
//!
//! ## Scaling
//!
//! ```text
//! decimals < 18:  value = answer * 10^(18 - decimals)
//! decimals > 18:  value = answer / 10^(decimals - 18)   (truncating)
//! ```
//!
//! A non-positive answer normalizes to zero, which the resolver treats as
//! a broken price.

use keel_types::{TARGET_DIGITS, U256};

use crate::source::{PushOracle, PushReading, RoundData, RoundOracle};
use crate::SourceError;

/// A normalized oracle reading. Never persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PriceResponse {
    /// Round identifier; `None` for oracles without rounds.
    pub round_id: Option<u64>,
    /// Price at 18 decimals.
    pub value: U256,
    /// Timestamp of the reading.
    pub timestamp: u64,
    /// Whether every call on the read path succeeded.
    pub succeeded: bool,
    /// Decimal precision reported by the source.
    pub source_decimals: u8,
}

impl PriceResponse {
    /// The sentinel for a failed read: all fields zero, `succeeded = false`.
    pub const fn unsuccessful() -> Self {
        Self {
            round_id: None,
            value: U256::ZERO,
            timestamp: 0,
            succeeded: false,
            source_decimals: 0,
        }
    }

    /// Normalize one aggregator round.
    pub fn from_round(round: &RoundData, decimals: u8) -> Self {
        Self {
            round_id: Some(round.round_id),
            value: scale_answer(round.answer, decimals),
            timestamp: round.updated_at,
            succeeded: true,
            source_decimals: decimals,
        }
    }
}

/// `10^exp`, or `None` if it does not fit in 256 bits.
pub(crate) fn pow10(exp: u32) -> Option<U256> {
    let ten = U256::from(10u8);
    let mut acc = U256::ONE;
    for _ in 0..exp {
        acc = acc.checked_mul(ten)?;
    }
    Some(acc)
}

/// Rescale a positive raw integer from `decimals` to 18 decimals.
///
/// Downscaling truncates. An upscale can never overflow for an `i128`
/// answer, since the factor is at most `10^18`.
pub fn scale_price(raw: U256, decimals: u8) -> U256 {
    if decimals == TARGET_DIGITS {
        return raw;
    }
    if decimals < TARGET_DIGITS {
        let factor = pow10(u32::from(TARGET_DIGITS - decimals)).unwrap_or(U256::MAX);
        raw.checked_mul(factor).unwrap_or(U256::MAX)
    } else {
        match pow10(u32::from(decimals - TARGET_DIGITS)) {
            Some(divisor) => raw / divisor,
            // Divisor exceeds 2^256, so any raw value truncates to zero
            None => U256::ZERO,
        }
    }
}

/// Rescale a signed oracle answer. Non-positive answers map to zero.
pub fn scale_answer(answer: i128, decimals: u8) -> U256 {
    match u128::try_from(answer) {
        Ok(positive) if positive > 0 => scale_price(U256::from(positive), decimals),
        _ => U256::ZERO,
    }
}

fn try_current<O: RoundOracle + ?Sized>(oracle: &O) -> Result<PriceResponse, SourceError> {
    let decimals = oracle.decimals()?;
    let round = oracle.latest_round_data()?;
    Ok(PriceResponse::from_round(&round, decimals))
}

fn try_previous<O: RoundOracle + ?Sized>(
    oracle: &O,
    current_round_id: u64,
    decimals: u8,
) -> Result<PriceResponse, SourceError> {
    let previous_id = current_round_id
        .checked_sub(1)
        .ok_or(SourceError::MissingRound(0))?;
    let round = oracle.get_round_data(previous_id)?;
    Ok(PriceResponse::from_round(&round, decimals))
}

/// Convert the outcome of an oracle read into a response, folding every
/// error into the unsuccessful sentinel.
pub fn into_response(result: Result<PriceResponse, SourceError>) -> PriceResponse {
    match result {
        Ok(response) => response,
        Err(error) => {
            tracing::debug!(%error, "oracle read failed; using unsuccessful response");
            PriceResponse::unsuccessful()
        }
    }
}

/// Read the latest round, normalized.
pub fn current_response<O: RoundOracle + ?Sized>(oracle: &O) -> PriceResponse {
    into_response(try_current(oracle))
}

/// Read round `current_round_id - 1`, normalized.
///
/// Historical decimals are not available from the aggregator, so the
/// current round's `decimals` are reused.
pub fn previous_response<O: RoundOracle + ?Sized>(
    oracle: &O,
    current_round_id: u64,
    decimals: u8,
) -> PriceResponse {
    into_response(try_previous(oracle, current_round_id, decimals))
}

/// Normalize a push-oracle reading.
///
/// A negative exponent is the decimal precision; a positive exponent
/// multiplies the mantissa. Readings that cannot be represented come back
/// unsuccessful.
pub fn push_response(reading: &PushReading) -> PriceResponse {
    let decimals = match u8::try_from(reading.expo.unsigned_abs()) {
        Ok(d) if reading.expo <= 0 => d,
        Ok(_) => 0,
        Err(_) => {
            tracing::debug!(expo = reading.expo, "push reading exponent out of range");
            return PriceResponse::unsuccessful();
        }
    };

    let mut value = scale_answer(i128::from(reading.price), decimals);
    if reading.expo > 0 {
        let multiplied = pow10(reading.expo.unsigned_abs()).and_then(|f| value.checked_mul(f));
        match multiplied {
            Some(v) => value = v,
            None => return PriceResponse::unsuccessful(),
        }
    }

    PriceResponse {
        round_id: None,
        value,
        timestamp: reading.publish_time,
        succeeded: true,
        source_decimals: decimals,
    }
}

/// Read and normalize the latest push reading.
pub fn current_push_response<O: PushOracle + ?Sized>(oracle: &O) -> PriceResponse {
    into_response(oracle.price_unsafe().map(|reading| push_response(&reading)))
}
