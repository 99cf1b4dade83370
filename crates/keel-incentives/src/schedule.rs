//! Emission schedule.
//!
//! A list of future reward-rate changes, each taking effect once more than
//! `start_offset` seconds have passed since the controller's start time.
//! Callers supply points in chronological order; they are stored reversed
//! so the next point to activate is always at the end.
//!
//! At most one point is consumed per call, and a consumed point is never
//! restored.

use serde::{Deserialize, Serialize};

use crate::{IncentivesError, Result};

/// One scheduled rate change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionPoint {
    /// Seconds after start time at which this rate takes over.
    pub start_offset: u128,
    /// Global reward rate in tokens per second.
    pub rate_per_second: u128,
}

/// Pending emission points, next-to-activate last.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionSchedule {
    reversed: Vec<EmissionPoint>,
}

impl EmissionSchedule {
    /// Build a schedule from parallel chronological arrays.
    ///
    /// # Errors
    ///
    /// - [`IncentivesError::LengthMismatch`] if the arrays differ in length
    /// - [`IncentivesError::InvalidSchedule`] if offsets decrease
    pub fn from_chronological(offsets: &[u128], rates: &[u128]) -> Result<Self> {
        if offsets.len() != rates.len() {
            return Err(IncentivesError::LengthMismatch {
                left: offsets.len(),
                right: rates.len(),
            });
        }
        if let Some(pair) = offsets.windows(2).find(|w| w[1] < w[0]) {
            return Err(IncentivesError::InvalidSchedule(format!(
                "offset {} follows {}",
                pair[1], pair[0]
            )));
        }

        let reversed = offsets
            .iter()
            .zip(rates)
            .rev()
            .map(|(&start_offset, &rate_per_second)| EmissionPoint {
                start_offset,
                rate_per_second,
            })
            .collect();
        Ok(Self { reversed })
    }

    /// The point that activates next, if any.
    pub fn next(&self) -> Option<&EmissionPoint> {
        self.reversed.last()
    }

    /// The next point, if it is due at `now`.
    ///
    /// Due means `now > start_time` and `now - start_time > start_offset`.
    pub fn due(&self, start_time: u64, now: u64) -> Option<EmissionPoint> {
        if now <= start_time {
            return None;
        }
        let elapsed = u128::from(now - start_time);
        self.next().filter(|p| elapsed > p.start_offset).copied()
    }

    /// Consume the next point.
    pub fn pop(&mut self) -> Option<EmissionPoint> {
        self.reversed.pop()
    }

    /// Remaining points in activation order.
    pub fn pending(&self) -> Vec<EmissionPoint> {
        self.reversed.iter().rev().copied().collect()
    }

    /// Number of points not yet activated.
    pub fn len(&self) -> usize {
        self.reversed.len()
    }

    /// True once every emission point has been activated.
    pub fn is_empty(&self) -> bool {
        self.reversed.is_empty()
    }
}
