//! Fixed-price stand-in feed.
//!
//! Serves a configured price with no external dependency. Useful for
//! assets pegged by construction and for local development. The price can
//! be changed administratively via [`FixedPriceFeed::set_price`].

use keel_types::{U256, WAD};

use crate::{FeedStatus, OracleError, PriceFeed, Result};

/// Default price: 1.0 at 18 decimals.
pub const DEFAULT_PRICE: u128 = WAD;

/// A feed that always reports the same price and is always `Working`.
#[derive(Debug, Clone)]
pub struct FixedPriceFeed {
    price: U256,
}

impl FixedPriceFeed {
    /// Create a feed at [`DEFAULT_PRICE`].
    pub fn new() -> Self {
        Self {
            price: U256::from(DEFAULT_PRICE),
        }
    }

    /// Create a feed at a custom price.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InitialPriceUnavailable`] if `price` is zero
    pub fn with_price(price: U256) -> Result<Self> {
        if price == U256::ZERO {
            return Err(OracleError::InitialPriceUnavailable {
                reason: "fixed price must be positive".to_string(),
            });
        }
        Ok(Self { price })
    }

    /// Replace the served price. Zero is rejected.
    pub fn set_price(&mut self, price: U256) -> Result<()> {
        if price == U256::ZERO {
            return Err(OracleError::InvalidConfig(
                "fixed price must be positive".to_string(),
            ));
        }
        tracing::warn!(new_price = %price, "fixed feed: price changed");
        self.price = price;
        Ok(())
    }
}

impl Default for FixedPriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceFeed for FixedPriceFeed {
    fn fetch_price(&self, _now: u64) -> U256 {
        self.price
    }

    fn update_price(&mut self, _now: u64) -> U256 {
        self.price
    }

    fn status(&self) -> FeedStatus {
        FeedStatus::Working
    }

    fn last_good_price(&self) -> U256 {
        self.price
    }
}
