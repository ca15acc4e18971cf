// src/address.rs
//! Account and contract addresses

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub const ADDRESS_LEN: usize = 32;

/// Account or contract address (32 bytes).
///
/// Ordering is byte-wise, which is the same as ordering by the hex form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Deterministic address of a module account, derived from its name.
    pub fn module(name: &str) -> Self {
        let hash = Sha256::digest(name.as_bytes());
        Self(hash.into())
    }

    /// Create from hex string (with or without `0x`)
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        if bytes.len() != ADDRESS_LEN {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; ADDRESS_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ADDRESS_LEN {
            return None;
        }
        let mut arr = [0u8; ADDRESS_LEN];
        arr.copy_from_slice(bytes);
        Some(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Address({}...{})", &hex[..8], &hex[56..])
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
