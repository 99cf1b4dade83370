//! # keel-oracle
//!
//! Price resolution against unreliable external oracles.
//!
//! Every feed reduces an external reading to a [`response::PriceResponse`]
//! normalized to 18 decimals, then runs the resolver state machine to decide
//! whether the reading is trusted or whether the cached last good price is
//! served instead. Price queries never fail once a feed exists.
//!
//! ## Modules
//!
//! - [`source`]: External oracle interfaces (round-based and push-based)
//! - [`response`]: Response normalizer and the unsuccessful sentinel
//! - [`resolver`]: `Working` / `Untrusted` state machine
//! - [`round_feed`]: Feed over a round-based aggregator
//! - [`push_feed`]: Feed over a push oracle with confidence intervals
//! - [`stub`]: Fixed-price stand-in
//! - [`mock`]: Scriptable oracle doubles for tests and local runs

pub mod mock;
pub mod push_feed;
pub mod resolver;
pub mod response;
pub mod round_feed;
pub mod source;
pub mod stub;

pub use keel_types::events::FeedStatus;
use keel_types::U256;

/// Error types for price feed construction and configuration.
///
/// Reads from a live feed never produce these; they only arise while a feed
/// is being brought into existence.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The oracle could not supply a trustworthy initial price.
    #[error("initial price unavailable: {reason}")]
    InitialPriceUnavailable {
        /// Why the initial reading was rejected.
        reason: String,
    },

    /// Feed parameters are unusable.
    #[error("invalid feed config: {0}")]
    InvalidConfig(String),
}

/// Failure of a single call into an external oracle.
///
/// Only the normalizer ever sees this type: it is converted into the
/// unsuccessful [`response::PriceResponse`] on the spot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The call reverted.
    #[error("oracle call reverted: {0}")]
    Reverted(String),

    /// The requested historical round does not exist.
    #[error("round {0} not available")]
    MissingRound(u64),

    /// The oracle could not be reached.
    #[error("oracle unavailable")]
    Unavailable,
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;

/// A source of 18-decimal prices.
///
/// Implemented by every feed variant so consumers can hold a
/// `Box<dyn PriceFeed>` chosen at configuration time.
pub trait PriceFeed: Send {
    /// Evaluate the current price without committing any state.
    fn fetch_price(&self, now: u64) -> U256;

    /// Evaluate the current price and commit the resulting status and
    /// last good price.
    fn update_price(&mut self, now: u64) -> U256;

    /// Current trust status.
    fn status(&self) -> FeedStatus;

    /// The cached last good price.
    fn last_good_price(&self) -> U256;
}

impl<F: PriceFeed + ?Sized> PriceFeed for Box<F> {
    fn fetch_price(&self, now: u64) -> U256 {
        (**self).fetch_price(now)
    }

    fn update_price(&mut self, now: u64) -> U256 {
        (**self).update_price(now)
    }

    fn status(&self) -> FeedStatus {
        (**self).status()
    }

    fn last_good_price(&self) -> U256 {
        (**self).last_good_price()
    }
}
