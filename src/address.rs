// src/address.rs
//
// Canonical 256-bit identifiers for pools, share tokens and assets. Every comparison and
// map key goes through `PoolId`, never through the raw string a collaborator returned.

use crate::error::AddressError;
use ethers::types::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Number of hex digits in the canonical form.
pub const CANONICAL_HEX_WIDTH: usize = 64;

/// A normalized on-chain identifier. Renders as `0x` followed by 64 lower-case hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PoolId(U256);

impl PoolId {
    pub fn from_u256(value: U256) -> Self {
        Self(value)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Fixed-width canonical form.
    pub fn canonical(&self) -> String {
        format!("0x{:0>width$}", format!("{:x}", self.0), width = CANONICAL_HEX_WIDTH)
    }

    /// Shortened form used as a display placeholder, e.g. `0x0000…beef`.
    pub fn short(&self) -> String {
        let full = self.canonical();
        format!("{}…{}", &full[..6], &full[full.len() - 4..])
    }
}

/// Normalizes a hex string (with or without `0x`, any case, unpadded).
pub fn normalize(raw: &str) -> Result<PoolId, AddressError> {
    let s = raw.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return Err(AddressError::MalformedAddress {
            raw: raw.to_string(),
            reason: "empty",
        });
    }
    if digits.len() > CANONICAL_HEX_WIDTH {
        return Err(AddressError::MalformedAddress {
            raw: raw.to_string(),
            reason: "wider than 256 bits",
        });
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressError::MalformedAddress {
            raw: raw.to_string(),
            reason: "non-hex characters",
        });
    }
    U256::from_str_radix(digits, 16)
        .map(PoolId)
        .map_err(|_| AddressError::MalformedAddress {
            raw: raw.to_string(),
            reason: "not a hex integer",
        })
}

/// Normalizes an identifier as it appears in a JSON payload: a hex string or an integer.
pub fn normalize_value(value: &Value) -> Result<PoolId, AddressError> {
    match value {
        Value::String(s) => normalize(s),
        Value::Number(n) => n.as_u64().map(|v| PoolId(U256::from(v))).ok_or_else(|| {
            AddressError::MalformedAddress {
                raw: n.to_string(),
                reason: "not a non-negative integer",
            }
        }),
        other => Err(AddressError::MalformedAddress {
            raw: other.to_string(),
            reason: "unsupported JSON type",
        }),
    }
}

/// Compares two raw identifiers by their normalized forms.
pub fn equals(a: &str, b: &str) -> Result<bool, AddressError> {
    Ok(normalize(a)? == normalize(b)?)
}

impl FromStr for PoolId {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)
    }
}

impl From<U256> for PoolId {
    fn from(value: U256) -> Self {
        PoolId(value)
    }
}

impl From<Address> for PoolId {
    fn from(address: Address) -> Self {
        PoolId(U256::from_big_endian(address.as_bytes()))
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl fmt::Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolId({})", self.canonical())
    }
}

impl Serialize for PoolId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for PoolId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        normalize_value(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_width_and_case() {
        let id = normalize("0xABC").unwrap();
        assert_eq!(id.canonical(), format!("0x{}abc", "0".repeat(61)));
        assert_eq!(id.canonical().len(), 66);
    }

    #[test]
    fn test_equal_across_encodings() {
        let forms = [
            "0x00000000000000000000000000000000000000000000000000000000000BEEF",
            "0xbeef",
            "BEEF",
            "0XbEeF",
            "  0x000beef ",
        ];
        for a in forms {
            for b in forms {
                assert!(equals(a, b).unwrap(), "{} vs {}", a, b);
            }
        }
        assert_eq!(normalize_value(&serde_json::json!(48879)).unwrap(), normalize("beef").unwrap());
    }

    #[test]
    fn test_evm_address_matches_hex() {
        let address: Address = "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1".parse().unwrap();
        let id = PoolId::from(address);
        assert!(equals(&id.canonical(), "0x82af49447d8a07e3bd95bd0d56f35241523fbab1").unwrap());
    }

    #[test]
    fn test_malformed_inputs() {
        let too_wide = format!("0x1{}", "0".repeat(64));
        for bad in ["", "0x", "0xgg", "hello", too_wide.as_str()] {
            assert!(
                matches!(normalize(bad), Err(AddressError::MalformedAddress { .. })),
                "{:?} should be malformed",
                bad
            );
        }
        assert!(normalize_value(&serde_json::json!(-1)).is_err());
        assert!(normalize_value(&serde_json::json!(null)).is_err());
    }

    #[test]
    fn test_max_width_is_accepted() {
        let full = "f".repeat(64);
        assert_eq!(normalize(&full).unwrap().as_u256(), U256::MAX);
    }

    #[test]
    fn test_serde_uses_canonical_form() {
        let id: PoolId = serde_json::from_str("\"0x1\"").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"0x{}1\"", "0".repeat(63)));
    }

    #[test]
    fn test_short_placeholder() {
        let id = normalize("0xbeef").unwrap();
        assert_eq!(id.short(), "0x0000…beef");
    }
}
