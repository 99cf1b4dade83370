//! Node configuration file.

use std::path::PathBuf;

use anyhow::Context;
use keel_incentives::ControllerConfig;
use keel_oracle::round_feed::RoundFeedConfig;
use keel_types::{address_from_byte, Address, U256};
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file when no path argument is given.
pub const CONFIG_ENV: &str = "KEEL_CONFIG";

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Price feed settings.
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Incentives controller settings.
    #[serde(default)]
    pub incentives: IncentivesConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which price feed the node hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedKind {
    /// Constant price, always `Working`.
    #[default]
    Fixed,
    /// Round-based feed over an in-process scriptable aggregator.
    MockRound,
}

/// Price feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub kind: FeedKind,
    /// Name carried in feed events.
    #[serde(default = "default_feed_name")]
    pub name: String,
    /// Maximum reading age in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum round-to-round move at 18 decimals.
    #[serde(
        with = "keel_types::amount::decimal_u128",
        default = "default_max_deviation_wad"
    )]
    pub max_deviation_wad: u128,
    /// Served price for the `fixed` kind, at 18 decimals.
    #[serde(with = "keel_types::amount::decimal", default = "default_fixed_price_wad")]
    pub fixed_price_wad: U256,
    /// First round's answer for the `mock-round` kind, in source decimals.
    #[serde(default = "default_initial_answer")]
    pub initial_answer: i64,
    /// Source decimals for the `mock-round` kind.
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

/// One scheduled rate change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionPointConfig {
    /// Seconds after `start_time`.
    #[serde(with = "keel_types::amount::decimal_u128")]
    pub start_offset: u128,
    /// Reward units emitted per second once active.
    #[serde(with = "keel_types::amount::decimal_u128")]
    pub rate_per_second: u128,
}

/// Incentives controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncentivesConfig {
    #[serde(with = "keel_types::amount::hex_address", default = "default_owner")]
    pub owner: Address,
    #[serde(
        with = "keel_types::amount::hex_address",
        default = "default_pool_configurator"
    )]
    pub pool_configurator: Address,
    /// Reference time for emission offsets. 0 = node start time.
    #[serde(default)]
    pub start_time: u64,
    #[serde(with = "keel_types::amount::decimal", default = "default_max_mintable")]
    pub max_mintable: U256,
    /// Chronological rate changes.
    #[serde(default = "default_emission_schedule")]
    pub emission_schedule: Vec<EmissionPointConfig>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_feed_name() -> String {
    "primary".to_string()
}

fn default_timeout_secs() -> u64 {
    keel_oracle::resolver::DEFAULT_TIMEOUT_SECS
}

fn default_max_deviation_wad() -> u128 {
    500_000_000_000_000_000
}

fn default_fixed_price_wad() -> U256 {
    U256::from(keel_types::WAD)
}

fn default_initial_answer() -> i64 {
    100_000_000
}

fn default_decimals() -> u8 {
    8
}

fn default_owner() -> Address {
    address_from_byte(0x01)
}

fn default_pool_configurator() -> Address {
    address_from_byte(0x02)
}

fn default_max_mintable() -> U256 {
    // 100M tokens at 18 decimals
    U256::from(100_000_000u128 * keel_types::WAD)
}

fn default_emission_schedule() -> Vec<EmissionPointConfig> {
    vec![EmissionPointConfig {
        start_offset: 0,
        rate_per_second: 1_000_000_000_000_000_000,
    }]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            kind: FeedKind::Fixed,
            name: default_feed_name(),
            timeout_secs: default_timeout_secs(),
            max_deviation_wad: default_max_deviation_wad(),
            fixed_price_wad: default_fixed_price_wad(),
            initial_answer: default_initial_answer(),
            decimals: default_decimals(),
        }
    }
}

impl Default for IncentivesConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            pool_configurator: default_pool_configurator(),
            start_time: 0,
            max_mintable: default_max_mintable(),
            emission_schedule: default_emission_schedule(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl OracleConfig {
    /// Resolver parameters for the round-based feed.
    pub fn round_feed_config(&self) -> RoundFeedConfig {
        RoundFeedConfig {
            timeout_secs: self.timeout_secs,
            max_deviation_wad: self.max_deviation_wad,
        }
    }
}

impl IncentivesConfig {
    /// Controller setup, with a zero `start_time` replaced by `now`.
    pub fn controller_config(&self, now: u64) -> ControllerConfig {
        let start_time = if self.start_time == 0 {
            now
        } else {
            self.start_time
        };
        ControllerConfig {
            owner: self.owner,
            pool_configurator: self.pool_configurator,
            start_time,
            max_mintable: self.max_mintable,
            emission_offsets: self
                .emission_schedule
                .iter()
                .map(|p| p.start_offset)
                .collect(),
            emission_rates: self
                .emission_schedule
                .iter()
                .map(|p| p.rate_per_second)
                .collect(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from `path`, else `$KEEL_CONFIG`, else defaults.
    pub fn load(path: Option<String>) -> anyhow::Result<Self> {
        match Self::config_path(path) {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse a TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn config_path(path: Option<String>) -> Option<PathBuf> {
        path.or_else(|| std::env::var(CONFIG_ENV).ok())
            .map(PathBuf::from)
    }

    /// Default `EnvFilter` directive for the configured level.
    pub fn log_directive(&self) -> String {
        format!("keel={}", self.logging.log_level)
    }
}
