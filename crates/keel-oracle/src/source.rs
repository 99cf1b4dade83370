//! External oracle interfaces.
//!
//! These are the collaborator contracts a feed consumes. Every method may
//! fail; a failure is a recoverable bad reading, never a fatal error.

use std::sync::Arc;

use crate::SourceError;

/// One round as reported by a round-based aggregator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundData {
    /// Aggregator round identifier.
    pub round_id: u64,
    /// Raw answer at the oracle's own decimal precision.
    pub answer: i128,
    /// When the round started.
    pub started_at: u64,
    /// When the answer was last updated.
    pub updated_at: u64,
    /// Round in which the answer was computed.
    pub answered_in_round: u64,
}

/// A round-based aggregator with queryable history.
pub trait RoundOracle: Send + Sync {
    /// Decimal precision of answers.
    fn decimals(&self) -> Result<u8, SourceError>;

    /// The most recent round.
    fn latest_round_data(&self) -> Result<RoundData, SourceError>;

    /// A specific historical round.
    fn get_round_data(&self, round_id: u64) -> Result<RoundData, SourceError>;
}

impl<T: RoundOracle + ?Sized> RoundOracle for Arc<T> {
    fn decimals(&self) -> Result<u8, SourceError> {
        (**self).decimals()
    }

    fn latest_round_data(&self) -> Result<RoundData, SourceError> {
        (**self).latest_round_data()
    }

    fn get_round_data(&self, round_id: u64) -> Result<RoundData, SourceError> {
        (**self).get_round_data(round_id)
    }
}

/// A reading from a push oracle: `price * 10^expo`, plus or minus `conf * 10^expo`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PushReading {
    /// Raw price mantissa.
    pub price: i64,
    /// Confidence interval half-width, same exponent as `price`.
    pub conf: u64,
    /// Base-10 exponent.
    pub expo: i32,
    /// Unix timestamp at which the reading was published.
    pub publish_time: u64,
}

/// A push oracle with no round history.
pub trait PushOracle: Send + Sync {
    /// The latest published reading, without any freshness check.
    fn price_unsafe(&self) -> Result<PushReading, SourceError>;
}

impl<T: PushOracle + ?Sized> PushOracle for Arc<T> {
    fn price_unsafe(&self) -> Result<PushReading, SourceError> {
        (**self).price_unsafe()
    }
}
