//! Serde adapters for 256-bit amounts and addresses.
//!
//! Amounts travel as decimal strings so JSON consumers never lose precision;
//! addresses travel as `0x`-prefixed hex.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serializer};

use crate::{Address, TypesError, U256};

/// Parse a decimal string into a [`U256`].
pub fn parse_amount(s: &str) -> Result<U256, TypesError> {
    U256::from_str_radix(s.trim(), 10).map_err(|e| TypesError::InvalidAmount(e.to_string()))
}

/// Accepts a decimal string or a non-negative integer.
struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = U256;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal string or a non-negative integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
        parse_amount(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
        Ok(U256::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
        u64::try_from(v)
            .map(U256::from)
            .map_err(|_| E::custom(format!("amount must not be negative, got {v}")))
    }
}

/// `#[serde(with = "keel_types::amount::decimal")]` for `U256` fields.
///
/// Serializes as a decimal string. Deserializes from a decimal string or an
/// integer, so small values can be written bare in TOML.
pub mod decimal {
    use super::*;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

/// `#[serde(with = "keel_types::amount::decimal_u128")]` for `u128` fields.
pub mod decimal_u128 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let value = deserializer.deserialize_any(AmountVisitor)?;
        u128::try_from(value).map_err(|_| de::Error::custom(format!("{value} exceeds u128")))
    }
}

/// `#[serde(with = "keel_types::amount::hex_address")]` for [`Address`] fields.
pub mod hex_address {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::format_address(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let s = String::deserialize(deserializer)?;
        crate::parse_address(&s).map_err(serde::de::Error::custom)
    }
}
