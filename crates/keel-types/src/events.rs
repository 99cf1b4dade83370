//! Protocol events.
//!
//! Price feeds and the incentives controller publish events through an
//! [`EventSink`]. Controllers buffer events for the duration of a call and
//! publish them only after the call commits.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::amount::{decimal, hex_address};
use crate::{Address, U256};

/// Trust status of a price feed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    /// The external source is trusted.
    #[default]
    Working,
    /// The external source is distrusted; the cached price is served.
    Untrusted,
}

/// Every event the protocol core can emit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    // Price feed events
    PriceFeedStatusChanged {
        feed: String,
        status: FeedStatus,
    },
    LastGoodPriceUpdated {
        feed: String,
        #[serde(with = "decimal")]
        price: U256,
    },

    // Incentive events
    PoolAdded {
        #[serde(with = "hex_address")]
        token: Address,
        #[serde(with = "decimal")]
        allocation_weight: U256,
    },
    AllocationWeightUpdated {
        #[serde(with = "hex_address")]
        token: Address,
        #[serde(with = "decimal")]
        allocation_weight: U256,
    },
    EmissionRateUpdated {
        rate_per_second: u128,
    },
    BalanceUpdated {
        #[serde(with = "hex_address")]
        token: Address,
        #[serde(with = "hex_address")]
        user: Address,
        #[serde(with = "decimal")]
        balance: U256,
        #[serde(with = "decimal")]
        total_supply: U256,
    },
    RewardsClaimed {
        #[serde(with = "hex_address")]
        user: Address,
        #[serde(with = "hex_address")]
        receiver: Address,
        #[serde(with = "decimal")]
        amount: U256,
    },
    ClaimReceiverUpdated {
        #[serde(with = "hex_address")]
        user: Address,
        #[serde(with = "hex_address")]
        receiver: Address,
    },
    OnwardIncentivesUpdated {
        #[serde(with = "hex_address")]
        token: Address,
        enabled: bool,
    },
}

/// Destination for protocol events.
pub trait EventSink: Send + Sync {
    /// Publish one event.
    fn emit(&self, event: ProtocolEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ProtocolEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProtocolEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<ProtocolEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ProtocolEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
