//! Price feed over a round-based aggregator.
//!
//! Each evaluation reads the latest round and the round before it, then
//! applies [`resolve_round`]. Construction requires one valid, fresh
//! reading; a feed that cannot establish an initial price never exists.

use std::sync::Arc;

use keel_types::events::{EventSink, NullSink, ProtocolEvent};
use keel_types::U256;
use serde::{Deserialize, Serialize};

use crate::resolver::{
    is_broken, is_frozen, resolve_round, FeedState, Resolution, RoundParams,
    DEFAULT_MAX_DEVIATION_WAD, DEFAULT_TIMEOUT_SECS,
};
use crate::response::{current_response, previous_response};
use crate::source::RoundOracle;
use crate::{FeedStatus, OracleError, PriceFeed, Result};

/// Configuration of a round-based feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundFeedConfig {
    /// Maximum reading age in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum round-to-round move at 18 decimals (5e17 = 50%).
    #[serde(default = "default_max_deviation")]
    pub max_deviation_wad: u128,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_deviation() -> u128 {
    DEFAULT_MAX_DEVIATION_WAD
}

impl Default for RoundFeedConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_deviation_wad: default_max_deviation(),
        }
    }
}

impl RoundFeedConfig {
    fn params(&self) -> RoundParams {
        RoundParams {
            timeout: self.timeout_secs,
            max_deviation: U256::from(self.max_deviation_wad),
        }
    }
}

/// A price feed backed by a [`RoundOracle`].
pub struct RoundFeed<O> {
    name: String,
    oracle: O,
    params: RoundParams,
    state: FeedState,
    sink: Arc<dyn EventSink>,
}

impl<O: RoundOracle> RoundFeed<O> {
    /// Build a feed, requiring a valid, fresh initial reading.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidConfig`] if the deviation bound is zero
    /// - [`OracleError::InitialPriceUnavailable`] if the initial reading is
    ///   broken or frozen
    pub fn new(name: impl Into<String>, oracle: O, config: RoundFeedConfig, now: u64) -> Result<Self> {
        Self::with_sink(name, oracle, config, now, Arc::new(NullSink))
    }

    /// Build a feed that publishes status changes to `sink`.
    pub fn with_sink(
        name: impl Into<String>,
        oracle: O,
        config: RoundFeedConfig,
        now: u64,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        if config.max_deviation_wad == 0 {
            return Err(OracleError::InvalidConfig(
                "max deviation must be positive".to_string(),
            ));
        }
        let name = name.into();
        let params = config.params();

        let initial = current_response(&oracle);
        if is_broken(&initial, now) {
            return Err(OracleError::InitialPriceUnavailable {
                reason: "initial reading is broken".to_string(),
            });
        }
        if is_frozen(&initial, now, params.timeout) {
            return Err(OracleError::InitialPriceUnavailable {
                reason: format!(
                    "initial reading is frozen: updated {}, now {}, timeout {}",
                    initial.timestamp, now, params.timeout
                ),
            });
        }

        tracing::info!(feed = %name, price = %initial.value, "round feed initialised");

        Ok(Self {
            name,
            oracle,
            params,
            state: FeedState {
                status: FeedStatus::Working,
                last_good_price: initial.value,
            },
            sink,
        })
    }

    fn evaluate(&self, now: u64) -> Resolution {
        let current = current_response(&self.oracle);
        let previous = match current.round_id {
            Some(round_id) if current.succeeded => {
                previous_response(&self.oracle, round_id, current.source_decimals)
            }
            _ => crate::response::PriceResponse::unsuccessful(),
        };
        resolve_round(&self.state, &current, &previous, now, &self.params)
    }

    /// Feed name used in logs and events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying oracle.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Snapshot of the persistent state.
    pub fn state(&self) -> FeedState {
        self.state
    }
}

/// Commit a resolution to `state`, publishing events for what changed.
pub(crate) fn commit(
    name: &str,
    state: &mut FeedState,
    resolution: Resolution,
    sink: &dyn EventSink,
) -> U256 {
    if resolution.status != state.status {
        match resolution.status {
            FeedStatus::Untrusted => {
                tracing::warn!(feed = %name, "price feed untrusted; serving fallback");
            }
            FeedStatus::Working => tracing::info!(feed = %name, "price feed working again"),
        }
        state.status = resolution.status;
        sink.emit(ProtocolEvent::PriceFeedStatusChanged {
            feed: name.to_string(),
            status: resolution.status,
        });
    }
    if resolution.price != state.last_good_price && resolution.price != U256::ZERO {
        state.last_good_price = resolution.price;
        sink.emit(ProtocolEvent::LastGoodPriceUpdated {
            feed: name.to_string(),
            price: resolution.price,
        });
    }
    state.last_good_price
}

impl<O: RoundOracle> PriceFeed for RoundFeed<O> {
    fn fetch_price(&self, now: u64) -> U256 {
        self.evaluate(now).price
    }

    fn update_price(&mut self, now: u64) -> U256 {
        let resolution = self.evaluate(now);
        tracing::debug!(feed = %self.name, status = ?resolution.status, price = %resolution.price, "round feed resolved");
        commit(&self.name, &mut self.state, resolution, self.sink.as_ref())
    }

    fn status(&self) -> FeedStatus {
        self.state.status
    }

    fn last_good_price(&self) -> U256 {
        self.state.last_good_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRoundOracle;
    use keel_types::events::RecordingSink;
    use keel_types::WAD;

    const T0: u64 = 1_700_000_000;

    fn usd(units: i128) -> i128 {
        units * 100_000_000
    }

    fn wad(units: u64) -> U256 {
        U256::from(units) * U256::from(WAD)
    }

    fn setup() -> (Arc<MockRoundOracle>, Arc<RecordingSink>, RoundFeed<Arc<MockRoundOracle>>) {
        let oracle = Arc::new(MockRoundOracle::new(8));
        oracle.push_round(usd(100), T0 - 120);
        oracle.push_round(usd(100), T0 - 60);
        let sink = Arc::new(RecordingSink::new());
        let feed = RoundFeed::with_sink(
            "eth-usd",
            oracle.clone(),
            RoundFeedConfig::default(),
            T0,
            sink.clone(),
        )
        .expect("feed");
        (oracle, sink, feed)
    }

    #[test]
    fn test_construction_takes_initial_price() {
        let (_, _, feed) = setup();
        assert_eq!(feed.status(), FeedStatus::Working);
        assert_eq!(feed.last_good_price(), wad(100));
    }

    #[test]
    fn test_construction_fails_on_broken_reading() {
        let oracle = MockRoundOracle::new(8);
        oracle.push_round(0, T0);
        let err = RoundFeed::new("x", oracle, RoundFeedConfig::default(), T0)
            .err()
            .expect("broken initial reading");
        assert!(matches!(err, OracleError::InitialPriceUnavailable { .. }));
    }

    #[test]
    fn test_construction_fails_on_unreachable_oracle() {
        let oracle = MockRoundOracle::new(8);
        let err = RoundFeed::new("x", oracle, RoundFeedConfig::default(), T0)
            .err()
            .expect("no rounds");
        assert!(matches!(err, OracleError::InitialPriceUnavailable { .. }));
    }

    #[test]
    fn test_construction_fails_on_frozen_reading() {
        let oracle = MockRoundOracle::new(8);
        oracle.push_round(usd(100), T0 - DEFAULT_TIMEOUT_SECS - 1);
        let err = RoundFeed::new("x", oracle, RoundFeedConfig::default(), T0)
            .err()
            .expect("frozen initial reading");
        assert!(matches!(err, OracleError::InitialPriceUnavailable { .. }));
    }

    #[test]
    fn test_zero_deviation_config_rejected() {
        let oracle = MockRoundOracle::new(8);
        oracle.push_round(usd(100), T0);
        let config = RoundFeedConfig {
            max_deviation_wad: 0,
            ..RoundFeedConfig::default()
        };
        let err = RoundFeed::new("x", oracle, config, T0).err().expect("invalid");
        assert!(matches!(err, OracleError::InvalidConfig(_)));
    }

    #[test]
    fn test_fetch_price_does_not_mutate() {
        let (oracle, sink, feed) = setup();
        oracle.fail_latest(true);
        assert_eq!(feed.fetch_price(T0), wad(100));
        assert_eq!(feed.status(), FeedStatus::Working);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_update_price_follows_oracle() {
        let (oracle, sink, mut feed) = setup();
        oracle.push_round(usd(120), T0);
        assert_eq!(feed.update_price(T0), wad(120));
        assert_eq!(feed.last_good_price(), wad(120));
        assert_eq!(
            sink.take(),
            vec![ProtocolEvent::LastGoodPriceUpdated {
                feed: "eth-usd".to_string(),
                price: wad(120),
            }]
        );
    }

    #[test]
    fn test_outage_then_recovery() {
        let (oracle, sink, mut feed) = setup();

        oracle.fail_latest(true);
        assert_eq!(feed.update_price(T0), wad(100));
        assert_eq!(feed.status(), FeedStatus::Untrusted);

        // Still down: no further status event
        assert_eq!(feed.update_price(T0 + 10), wad(100));

        oracle.fail_latest(false);
        oracle.push_round(usd(90), T0 + 20);
        assert_eq!(feed.update_price(T0 + 20), wad(90));
        assert_eq!(feed.status(), FeedStatus::Working);

        let status_events: Vec<_> = sink
            .take()
            .into_iter()
            .filter(|e| matches!(e, ProtocolEvent::PriceFeedStatusChanged { .. }))
            .collect();
        assert_eq!(status_events.len(), 2);
    }

    #[test]
    fn test_jump_is_served_but_flagged() {
        let (oracle, _, mut feed) = setup();
        oracle.push_round(usd(201), T0);
        assert_eq!(feed.update_price(T0), wad(201));
        assert_eq!(feed.status(), FeedStatus::Untrusted);
        assert_eq!(feed.last_good_price(), wad(201));
    }

    #[test]
    fn test_missing_history_is_broken_previous() {
        let oracle = Arc::new(MockRoundOracle::new(8));
        oracle.push_round(usd(100), T0);
        let mut feed =
            RoundFeed::new("x", oracle.clone(), RoundFeedConfig::default(), T0).expect("feed");
        oracle.fail_history(true);
        oracle.push_round(usd(101), T0 + 1);
        assert_eq!(feed.update_price(T0 + 1), wad(100));
        assert_eq!(feed.status(), FeedStatus::Untrusted);
    }
}
