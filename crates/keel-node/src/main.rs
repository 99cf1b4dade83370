//! keel-node: hosts one price feed and the incentives controller.
//!
//! Single OS process running a Tokio runtime. Clients speak line-delimited
//! JSON-RPC 2.0 over stdin/stdout; every call runs under one mutex, so the
//! protocol state sees strictly serialized, atomic operations. Logs go to
//! stderr.

mod commands;
mod config;
mod events;
mod rpc;

use std::sync::Arc;

use keel_incentives::minter::InMemoryMinter;
use keel_incentives::IncentivesController;
use keel_oracle::mock::MockRoundOracle;
use keel_oracle::round_feed::RoundFeed;
use keel_oracle::stub::FixedPriceFeed;
use keel_oracle::PriceFeed;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use crate::config::{FeedKind, NodeConfig};
use crate::events::{EventBus, EventFilter};

/// The price feed hosted by the node.
pub enum Feed {
    Fixed(FixedPriceFeed),
    MockRound(RoundFeed<Arc<MockRoundOracle>>),
}

impl Feed {
    /// The hosted feed behind the common trait.
    pub fn as_price_feed(&self) -> &dyn PriceFeed {
        match self {
            Feed::Fixed(feed) => feed,
            Feed::MockRound(feed) => feed,
        }
    }

    /// Mutable variant of [`Feed::as_price_feed`].
    pub fn as_price_feed_mut(&mut self) -> &mut dyn PriceFeed {
        match self {
            Feed::Fixed(feed) => feed,
            Feed::MockRound(feed) => feed,
        }
    }
}

/// Node-wide state, guarded by one mutex.
pub struct NodeState {
    /// Configuration.
    pub config: NodeConfig,
    /// The hosted price feed.
    pub feed: Feed,
    /// The incentives controller, minting into memory.
    pub controller: IncentivesController<InMemoryMinter>,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// Active event subscription, if any.
    pub subscription: Option<EventFilter>,
}

impl NodeState {
    /// Build the feed and controller described by `config`.
    pub fn build(config: NodeConfig, event_bus: EventBus, now: u64) -> anyhow::Result<Self> {
        let sink = Arc::new(event_bus.clone());

        let feed = match config.oracle.kind {
            FeedKind::Fixed => Feed::Fixed(FixedPriceFeed::with_price(config.oracle.fixed_price_wad)?),
            FeedKind::MockRound => {
                let oracle = Arc::new(MockRoundOracle::new(config.oracle.decimals));
                // Two rounds, so the first update already has history
                let answer = i128::from(config.oracle.initial_answer);
                oracle.push_round(answer, now);
                oracle.push_round(answer, now);
                Feed::MockRound(RoundFeed::with_sink(
                    config.oracle.name.clone(),
                    oracle,
                    config.oracle.round_feed_config(),
                    now,
                    sink.clone(),
                )?)
            }
        };

        let controller = IncentivesController::initialize(
            config.incentives.controller_config(now),
            InMemoryMinter::new(),
        )?
        .with_sink(sink);

        Ok(Self {
            config,
            feed,
            controller,
            event_bus,
            subscription: None,
        })
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = NodeConfig::load(std::env::args().nth(1))?;

    // 2. Initialize tracing on stderr; stdout carries RPC traffic
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_directive().parse()?),
        )
        .init();

    info!("keel node starting");

    // 3. Create event bus and protocol state
    let event_bus = EventBus::new(1024);
    let state = Arc::new(Mutex::new(NodeState::build(
        config,
        event_bus.clone(),
        unix_now(),
    )?));

    // 4. Single writer for responses and notifications
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(mut line) = out_rx.recv().await {
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    // 5. Forward subscribed events as notifications
    let forwarder = tokio::spawn(rpc::forward_events(
        event_bus.subscribe(),
        state.clone(),
        out_tx.clone(),
    ));

    // 6. Serve requests until stdin closes
    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = rpc::serve(stdin, out_tx, state) => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    forwarder.abort();
    let _ = writer.await;
    info!("keel node stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_oracle::FeedStatus;
    use keel_types::U256;

    #[test]
    fn test_build_fixed_feed() {
        let state = NodeState::build(NodeConfig::default(), EventBus::new(8), 1_000).expect("build");
        let feed = state.feed.as_price_feed();
        assert_eq!(feed.status(), FeedStatus::Working);
        assert_eq!(feed.fetch_price(1_000), U256::from(keel_types::WAD));
        assert_eq!(state.controller.start_time(), 1_000);
    }

    #[test]
    fn test_build_mock_round_feed() {
        let mut config = NodeConfig::default();
        config.oracle.kind = FeedKind::MockRound;
        config.oracle.initial_answer = 250_000_000;
        let mut state = NodeState::build(config, EventBus::new(8), 1_000).expect("build");
        let price = state.feed.as_price_feed_mut().update_price(1_010);
        assert_eq!(price, U256::from(2_500_000_000_000_000_000u128));
        assert_eq!(state.feed.as_price_feed().status(), FeedStatus::Working);
    }

    #[test]
    fn test_build_rejects_zero_fixed_price() {
        let mut config = NodeConfig::default();
        config.oracle.fixed_price_wad = U256::ZERO;
        assert!(NodeState::build(config, EventBus::new(8), 1_000).is_err());
    }
}
