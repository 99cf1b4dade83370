//! Price feed over a push oracle.
//!
//! Push oracles publish `(price, conf, expo, publish_time)` with no round
//! history, so the feed uses the timestamp-only transition. A reading whose
//! confidence interval is too wide relative to its price is treated as a
//! broken reading.

use std::sync::Arc;

use keel_types::events::{EventSink, NullSink};
use keel_types::{U256, WAD};
use serde::{Deserialize, Serialize};

use crate::resolver::{is_broken, is_frozen, resolve_timestamp, FeedState, DEFAULT_TIMEOUT_SECS};
use crate::response::{push_response, PriceResponse};
use crate::round_feed::commit;
use crate::source::{PushOracle, PushReading};
use crate::{FeedStatus, OracleError, PriceFeed, Result};

/// Configuration of a push feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushFeedConfig {
    /// Maximum reading age in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum `conf / price` at 18 decimals. `None` disables the check.
    #[serde(default)]
    pub max_confidence_ratio_wad: Option<u128>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for PushFeedConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_confidence_ratio_wad: None,
        }
    }
}

/// Whether `conf / |price|` exceeds `max_ratio_wad`.
pub fn confidence_too_wide(reading: &PushReading, max_ratio_wad: u128) -> bool {
    let price = u128::from(reading.price.unsigned_abs());
    if price == 0 {
        return true;
    }
    // conf < 2^64 and WAD < 2^60, so the product fits in u128
    let ratio = u128::from(reading.conf) * WAD / price;
    ratio > max_ratio_wad
}

/// A price feed backed by a [`PushOracle`].
pub struct PushFeed<O> {
    name: String,
    oracle: O,
    config: PushFeedConfig,
    state: FeedState,
    sink: Arc<dyn EventSink>,
}

impl<O: PushOracle> PushFeed<O> {
    /// Build a feed, requiring a valid, fresh initial reading.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InitialPriceUnavailable`] if the initial reading is
    ///   broken, frozen, or too uncertain
    pub fn new(name: impl Into<String>, oracle: O, config: PushFeedConfig, now: u64) -> Result<Self> {
        Self::with_sink(name, oracle, config, now, Arc::new(NullSink))
    }

    /// Build a feed that publishes status changes to `sink`.
    pub fn with_sink(
        name: impl Into<String>,
        oracle: O,
        config: PushFeedConfig,
        now: u64,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let name = name.into();
        let mut feed = Self {
            name,
            oracle,
            config,
            state: FeedState {
                status: FeedStatus::Working,
                last_good_price: U256::ZERO,
            },
            sink,
        };

        let initial = feed.read();
        if is_broken(&initial, now) || is_frozen(&initial, now, feed.config.timeout_secs) {
            return Err(OracleError::InitialPriceUnavailable {
                reason: format!(
                    "push reading unusable: succeeded {}, published {}, now {}",
                    initial.succeeded, initial.timestamp, now
                ),
            });
        }
        feed.state.last_good_price = initial.value;

        tracing::info!(feed = %feed.name, price = %initial.value, "push feed initialised");
        Ok(feed)
    }

    /// Read and normalize the latest reading, applying the confidence bound.
    fn read(&self) -> PriceResponse {
        let reading = match self.oracle.price_unsafe() {
            Ok(reading) => reading,
            Err(error) => {
                tracing::debug!(feed = %self.name, %error, "push oracle read failed");
                return PriceResponse::unsuccessful();
            }
        };
        if let Some(max_ratio) = self.config.max_confidence_ratio_wad {
            if confidence_too_wide(&reading, max_ratio) {
                tracing::debug!(
                    feed = %self.name,
                    conf = reading.conf,
                    price = reading.price,
                    "push reading confidence too wide"
                );
                return PriceResponse::unsuccessful();
            }
        }
        push_response(&reading)
    }

    /// Feed name used in logs and events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the persistent state.
    pub fn state(&self) -> FeedState {
        self.state
    }
}

impl<O: PushOracle> PriceFeed for PushFeed<O> {
    fn fetch_price(&self, now: u64) -> U256 {
        resolve_timestamp(&self.state, &self.read(), now, self.config.timeout_secs).price
    }

    fn update_price(&mut self, now: u64) -> U256 {
        let resolution = resolve_timestamp(&self.state, &self.read(), now, self.config.timeout_secs);
        commit(&self.name, &mut self.state, resolution, self.sink.as_ref())
    }

    fn status(&self) -> FeedStatus {
        self.state.status
    }

    fn last_good_price(&self) -> U256 {
        self.state.last_good_price
    }
}
