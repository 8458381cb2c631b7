// src/types/conversions.rs
//
// Decoding of the wire shapes the read RPC has been observed to return for a single
// 256-bit value. Everything downstream works on `U256`; nothing else branches on shape.

use crate::error::CodecError;
use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// One integer word as it appears on the wire: a JSON number, a `0x` hex string,
/// or a decimal string.
///
/// JSON numbers are exact only up to `u64::MAX`. A larger number has already been rounded to
/// a float by the JSON layer, so it decodes into `Inexact` and is refused by
/// [`to_u256`](Self::to_u256); nodes must send such values as strings or limbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireWord {
    Number(u64),
    Text(String),
    /// Negative, fractional, or beyond 64 bits
    Inexact(serde_json::Number),
}

impl WireWord {
    pub fn to_u256(&self) -> Result<U256, CodecError> {
        match self {
            WireWord::Number(n) => Ok(U256::from(*n)),
            WireWord::Text(s) => parse_u256_word(s),
            WireWord::Inexact(n) => Err(CodecError::InvalidAmount(format!(
                "JSON number {} is not an exact unsigned 64-bit integer; send it as a string",
                n
            ))),
        }
    }
}

impl From<U256> for WireWord {
    fn from(value: U256) -> Self {
        WireWord::Text(format!("{:#x}", value))
    }
}

/// A 256-bit wire amount in any of its observed shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireAmount {
    /// `{ "low": .., "high": .. }` 128-bit limbs
    Limbs { low: WireWord, high: WireWord },
    /// `[low, high]`
    Pair([WireWord; 2]),
    /// a single big integer
    Single(WireWord),
}

impl WireAmount {
    /// Collapses any shape into one `U256`. Limbs must each fit in 128 bits.
    pub fn to_u256(&self) -> Result<U256, CodecError> {
        match self {
            WireAmount::Single(word) => word.to_u256(),
            WireAmount::Limbs { low, high } => join_limbs(low.to_u256()?, high.to_u256()?),
            WireAmount::Pair([low, high]) => join_limbs(low.to_u256()?, high.to_u256()?),
        }
    }

    /// Splits a value into its `{low, high}` limb form.
    pub fn limbs(value: U256) -> Self {
        let (low, high) = split_limbs(value);
        WireAmount::Limbs {
            low: low.into(),
            high: high.into(),
        }
    }
}

impl From<U256> for WireAmount {
    fn from(value: U256) -> Self {
        WireAmount::Single(value.into())
    }
}

impl From<u128> for WireAmount {
    fn from(value: u128) -> Self {
        WireAmount::Single(U256::from(value).into())
    }
}

fn limb_max() -> U256 {
    U256::from(u128::MAX)
}

fn join_limbs(low: U256, high: U256) -> Result<U256, CodecError> {
    if low > limb_max() || high > limb_max() {
        return Err(CodecError::InvalidAmount(format!(
            "limb out of 128-bit range (low={:#x}, high={:#x})",
            low, high
        )));
    }
    Ok((high << 128usize) | low)
}

/// Returns `(low, high)` 128-bit limbs of `value`.
pub fn split_limbs(value: U256) -> (U256, U256) {
    (value & limb_max(), value >> 128usize)
}

/// Parses a `0x`-prefixed hex or plain decimal integer string into a `U256`.
pub fn parse_u256_word(raw: &str) -> Result<U256, CodecError> {
    let s = raw.trim();
    if let Some(hex_digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex_digits.is_empty() || !hex_digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CodecError::InvalidAmount(format!("not a hex integer: {:?}", raw)));
        }
        return U256::from_str_radix(hex_digits, 16)
            .map_err(|_| CodecError::InvalidAmount(format!("exceeds 256 bits: {:?}", raw)));
    }
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(CodecError::InvalidAmount(format!("not an integer: {:?}", raw)));
    }
    U256::from_dec_str(s).map_err(|_| CodecError::InvalidAmount(format!("exceeds 256 bits: {:?}", raw)))
}
