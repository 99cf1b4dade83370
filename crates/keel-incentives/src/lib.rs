//! # keel-incentives
//!
//! Time-weighted reward accrual for staked positions.
//!
//! A global reward rate, driven by an emission schedule, is split across
//! pools by allocation weight. Each pool keeps a running reward-per-share
//! accumulator; each user keeps a reward-debt snapshot against it, so a
//! claim costs O(pools claimed) regardless of how many users stake.
//!
//! ## Modules
//!
//! - [`schedule`]: Emission schedule of future rate changes
//! - [`pool`]: Per-pool reward accumulator
//! - [`ledger`]: Per-user stake and reward-debt bookkeeping
//! - [`minter`]: Bounded-supply minting policy and the minter interface
//! - [`hooks`]: Onward incentive hooks fed by balance changes
//! - [`controller`]: The incentives controller tying it all together

use keel_types::{format_address, Address};

pub mod controller;
pub mod hooks;
pub mod ledger;
pub mod minter;
pub mod pool;
pub mod schedule;

pub use controller::{ControllerConfig, IncentivesController};

/// Failure reported by the external reward minter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MintError {
    /// The minter refused the request.
    #[error("mint rejected: {0}")]
    Rejected(String),
}

/// Failure reported by an onward incentive hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("onward incentives failed: {0}")]
pub struct HookError(pub String);

/// Error types for incentive operations.
///
/// Any error aborts the whole call; no partial state is kept.
#[derive(Debug, thiserror::Error)]
pub enum IncentivesError {
    /// The caller may not perform this action.
    #[error("unauthorized: {} may not {action}", format_address(.caller))]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
        /// The attempted action.
        action: &'static str,
    },

    /// A pool for this token already exists.
    #[error("pool already registered: {}", format_address(.0))]
    PoolAlreadyRegistered(Address),

    /// No pool exists for this token.
    #[error("unknown pool: {}", format_address(.0))]
    UnknownPool(Address),

    /// Parallel input arrays differ in length.
    #[error("length mismatch: {left} vs {right}")]
    LengthMismatch {
        /// Length of the first array.
        left: usize,
        /// Length of the second array.
        right: usize,
    },

    /// A call arrived with a timestamp earlier than one already processed.
    #[error("non-monotonic time: {now} < {last}")]
    NonMonotonicTime {
        /// Timestamp of the rejected call.
        now: u64,
        /// Latest timestamp processed.
        last: u64,
    },

    /// Arithmetic overflow in reward calculation.
    #[error("arithmetic overflow")]
    Overflow,

    /// The emission schedule is malformed.
    #[error("invalid emission schedule: {0}")]
    InvalidSchedule(String),

    /// The reward minter failed.
    #[error(transparent)]
    Mint(#[from] MintError),

    /// An onward incentive hook failed.
    #[error(transparent)]
    OnwardIncentives(#[from] HookError),
}

/// Convenience result type for incentive operations.
pub type Result<T> = std::result::Result<T, IncentivesError>;
