//! # keel-types
//!
//! Shared domain types used across the Keel workspace: account addresses,
//! 256-bit amounts, fixed-point scales, and protocol events.

pub mod amount;
pub mod events;

pub use ethnum::U256;

/// A 20-byte account or contract address.
pub type Address = [u8; 20];

/// Decimal precision of every normalized price.
pub const TARGET_DIGITS: u8 = 18;

/// One unit at 18 decimals (1e18), the scale of normalized prices and ratios.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Scale applied to `acc_reward_per_share` (1e12).
pub const ACC_REWARD_PRECISION: u128 = 1_000_000_000_000;

/// Errors raised while parsing shared types.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Address string was not 20 bytes of hex.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Amount string was not a decimal 256-bit integer.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// Parse a hex address, with or without a `0x` prefix.
pub fn parse_address(s: &str) -> Result<Address, TypesError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| TypesError::InvalidAddress(e.to_string()))?;
    Address::try_from(bytes.as_slice())
        .map_err(|_| TypesError::InvalidAddress(format!("expected 20 bytes, got {}", bytes.len())))
}

/// Format an address as `0x`-prefixed lowercase hex.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Build a deterministic address from a single byte. Handy for fixtures.
pub const fn address_from_byte(byte: u8) -> Address {
    [byte; 20]
}
