// src/normalization.rs
//
// Fixed-point amount codec: converts 256-bit base-unit amounts into decimal strings at an
// asset's precision and back, without rounding in either direction.

use crate::error::CodecError;
use crate::types::WireAmount;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest precision whose scale factor (10^precision) fits in 256 bits.
pub const MAX_PRECISION: u8 = 77;

/// 10^precision as `U256`, or `None` past `MAX_PRECISION`.
#[inline]
pub fn pow10_u256(precision: u8) -> Option<U256> {
    if precision > MAX_PRECISION {
        return None;
    }
    Some(U256::exp10(precision as usize))
}

/// A base-unit amount paired with the precision of its asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub wire: U256,
    pub precision: u8,
}

impl Amount {
    pub fn new(wire: U256, precision: u8) -> Self {
        Self { wire, precision }
    }

    pub fn zero(precision: u8) -> Self {
        Self::new(U256::zero(), precision)
    }

    pub fn from_decimal(value: &str, precision: u8) -> Result<Self, CodecError> {
        Ok(Self::new(decimal_to_wire(value, precision)?, precision))
    }

    pub fn to_decimal(&self) -> Result<String, CodecError> {
        format_units(self.wire, self.precision)
    }

    pub fn is_zero(&self) -> bool {
        self.wire.is_zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{} (raw)", self.wire),
        }
    }
}

/// Decodes a wire amount in any observed shape and renders it as a decimal string.
///
/// The output is canonical: no trailing fractional zeros and no trailing `.`.
pub fn wire_to_decimal(wire: &WireAmount, precision: u8) -> Result<String, CodecError> {
    format_units(wire.to_u256()?, precision)
}

/// Like [`wire_to_decimal`] but limits the output to `max_digits` fractional digits.
///
/// Fails with `PrecisionLoss` instead of dropping a non-zero digit.
pub fn wire_to_decimal_truncated(
    wire: &WireAmount,
    precision: u8,
    max_digits: u8,
) -> Result<String, CodecError> {
    let full = wire_to_decimal(wire, precision)?;
    if let Some((_, frac)) = full.split_once('.') {
        if frac.len() > max_digits as usize {
            return Err(CodecError::PrecisionLoss(format!(
                "{} cannot be shown with {} fractional digits",
                full, max_digits
            )));
        }
    }
    Ok(full)
}

/// Renders base units as a canonical decimal string at `precision`.
pub fn format_units(value: U256, precision: u8) -> Result<String, CodecError> {
    let scale = pow10_u256(precision).ok_or_else(|| {
        CodecError::PrecisionLoss(format!("precision {} exceeds 256-bit range", precision))
    })?;
    let int_part = value / scale;
    let frac_part = value % scale;
    if frac_part.is_zero() {
        return Ok(int_part.to_string());
    }
    let padded = format!("{:0>width$}", frac_part.to_string(), width = precision as usize);
    Ok(format!("{}.{}", int_part, padded.trim_end_matches('0')))
}

struct DecimalParts<'a> {
    int_part: &'a str,
    frac_part: &'a str,
}

fn split_decimal(raw: &str) -> Result<DecimalParts<'_>, CodecError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(CodecError::InvalidAmount("empty amount".to_string()));
    }
    if s.starts_with('-') {
        return Err(CodecError::InvalidAmount(format!("negative amount {:?}", raw)));
    }
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    let digits_only = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !digits_only(int_part) || !digits_only(frac_part) {
        return Err(CodecError::InvalidAmount(format!("not a decimal number: {:?}", raw)));
    }
    Ok(DecimalParts { int_part, frac_part })
}

fn compose_units(int_part: &str, frac_part: &str, precision: u8, raw: &str) -> Result<U256, CodecError> {
    let mut digits = String::with_capacity(int_part.len() + precision as usize);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    for _ in frac_part.len()..precision as usize {
        digits.push('0');
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(digits)
        .map_err(|_| CodecError::InvalidAmount(format!("{:?} exceeds 256 bits at precision {}", raw, precision)))
}

/// Parses a non-negative decimal string into base units at `precision`.
///
/// Trailing zeros past the precision are accepted; any other extra fractional digit
/// fails with `PrecisionOverflow`.
pub fn decimal_to_wire(value: &str, precision: u8) -> Result<U256, CodecError> {
    if precision > MAX_PRECISION {
        return Err(CodecError::PrecisionOverflow {
            value: value.to_string(),
            precision,
        });
    }
    let parts = split_decimal(value)?;
    let frac = parts.frac_part.trim_end_matches('0');
    if frac.len() > precision as usize {
        return Err(CodecError::PrecisionOverflow {
            value: value.trim().to_string(),
            precision,
        });
    }
    compose_units(parts.int_part, frac, precision, value)
}

/// Parses a decimal string dropping fractional digits past `precision` (floor).
///
/// Only used to classify inputs; amounts that get submitted go through [`decimal_to_wire`].
pub fn decimal_to_wire_floor(value: &str, precision: u8) -> Result<U256, CodecError> {
    let parts = split_decimal(value)?;
    let keep = parts.frac_part.len().min(precision as usize);
    compose_units(parts.int_part, &parts.frac_part[..keep], precision, value)
}
