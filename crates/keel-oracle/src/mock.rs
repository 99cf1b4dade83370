//! Scriptable oracle doubles.
//!
//! Both mocks use interior mutability so a test can keep an `Arc` handle,
//! hand a clone to a feed, and keep scripting readings or injecting
//! failures afterwards.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::source::{PushOracle, PushReading, RoundData, RoundOracle};
use crate::SourceError;

#[derive(Debug, Default)]
struct RoundState {
    decimals: u8,
    rounds: BTreeMap<u64, RoundData>,
    latest: Option<u64>,
    fail_decimals: bool,
    fail_latest: bool,
    fail_history: bool,
}

/// A round-based aggregator whose history is scripted by the caller.
#[derive(Debug, Default)]
pub struct MockRoundOracle {
    state: Mutex<RoundState>,
}

impl MockRoundOracle {
    /// Create an aggregator with no rounds at the given precision.
    pub fn new(decimals: u8) -> Self {
        Self {
            state: Mutex::new(RoundState {
                decimals,
                ..RoundState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoundState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a new round after the latest one and make it current.
    /// Returns the new round id.
    pub fn push_round(&self, answer: i128, updated_at: u64) -> u64 {
        let mut state = self.lock();
        let round_id = state.latest.map_or(1, |id| id + 1);
        state.rounds.insert(
            round_id,
            RoundData {
                round_id,
                answer,
                started_at: updated_at,
                updated_at,
                answered_in_round: round_id,
            },
        );
        state.latest = Some(round_id);
        round_id
    }

    /// Install an arbitrary round, possibly malformed, as the latest.
    pub fn set_latest(&self, round: RoundData) {
        let mut state = self.lock();
        state.rounds.insert(round.round_id, round);
        state.latest = Some(round.round_id);
    }

    /// Change the reported precision.
    pub fn set_decimals(&self, decimals: u8) {
        self.lock().decimals = decimals;
    }

    /// Make `decimals()` revert.
    pub fn fail_decimals(&self, fail: bool) {
        self.lock().fail_decimals = fail;
    }

    /// Make `latest_round_data()` revert.
    pub fn fail_latest(&self, fail: bool) {
        self.lock().fail_latest = fail;
    }

    /// Make `get_round_data()` revert.
    pub fn fail_history(&self, fail: bool) {
        self.lock().fail_history = fail;
    }
}

impl RoundOracle for MockRoundOracle {
    fn decimals(&self) -> Result<u8, SourceError> {
        let state = self.lock();
        if state.fail_decimals {
            return Err(SourceError::Reverted("decimals".to_string()));
        }
        Ok(state.decimals)
    }

    fn latest_round_data(&self) -> Result<RoundData, SourceError> {
        let state = self.lock();
        if state.fail_latest {
            return Err(SourceError::Reverted("latestRoundData".to_string()));
        }
        let latest = state.latest.ok_or(SourceError::Unavailable)?;
        state
            .rounds
            .get(&latest)
            .copied()
            .ok_or(SourceError::MissingRound(latest))
    }

    fn get_round_data(&self, round_id: u64) -> Result<RoundData, SourceError> {
        let state = self.lock();
        if state.fail_history {
            return Err(SourceError::Reverted("getRoundData".to_string()));
        }
        state
            .rounds
            .get(&round_id)
            .copied()
            .ok_or(SourceError::MissingRound(round_id))
    }
}

#[derive(Debug, Default)]
struct PushState {
    reading: Option<PushReading>,
    fail: bool,
}

/// A push oracle whose latest reading is set by the caller.
#[derive(Debug, Default)]
pub struct MockPushOracle {
    state: Mutex<PushState>,
}

impl MockPushOracle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PushState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a reading.
    pub fn publish(&self, price: i64, conf: u64, expo: i32, publish_time: u64) {
        self.lock().reading = Some(PushReading {
            price,
            conf,
            expo,
            publish_time,
        });
    }

    /// Make reads revert.
    pub fn fail(&self, fail: bool) {
        self.lock().fail = fail;
    }
}

impl PushOracle for MockPushOracle {
    fn price_unsafe(&self) -> Result<PushReading, SourceError> {
        let state = self.lock();
        if state.fail {
            return Err(SourceError::Reverted("getPriceUnsafe".to_string()));
        }
        state.reading.ok_or(SourceError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_round_increments_ids() {
        let oracle = MockRoundOracle::new(8);
        assert_eq!(oracle.push_round(1, 10), 1);
        assert_eq!(oracle.push_round(2, 20), 2);
        let latest = oracle.latest_round_data().expect("latest");
        assert_eq!(latest.round_id, 2);
        assert_eq!(latest.answer, 2);
        assert_eq!(oracle.get_round_data(1).expect("history").answer, 1);
    }

    #[test]
    fn test_empty_oracle_is_unavailable() {
        let oracle = MockRoundOracle::new(8);
        assert_eq!(oracle.latest_round_data(), Err(SourceError::Unavailable));
        assert_eq!(oracle.get_round_data(3), Err(SourceError::MissingRound(3)));
    }

    #[test]
    fn test_failure_injection() {
        let oracle = MockRoundOracle::new(8);
        oracle.push_round(1, 10);
        oracle.fail_history(true);
        assert!(oracle.get_round_data(1).is_err());
        oracle.fail_history(false);
        assert!(oracle.get_round_data(1).is_ok());
    }

    #[test]
    fn test_push_oracle_publish_and_fail() {
        let oracle = MockPushOracle::new();
        assert_eq!(oracle.price_unsafe(), Err(SourceError::Unavailable));
        oracle.publish(100, 1, -2, 5);
        assert_eq!(oracle.price_unsafe().expect("reading").price, 100);
        oracle.fail(true);
        assert!(oracle.price_unsafe().is_err());
    }
}
