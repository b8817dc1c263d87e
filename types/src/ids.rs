//! Identifier types for transactions, sub-blocks, and validators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A globally unique transaction identifier, assigned by the submitter.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(String);

impl TxId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TxId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TxId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A validator identity as known to the validator registry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValidatorId(String);

impl ValidatorId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ValidatorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ValidatorId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A 32-byte sub-block identifier (Blake2b digest of its assembly inputs).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubBlockId([u8; 32]);

impl SubBlockId {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Debug for SubBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubBlockId({}\u{2026})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for SubBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_block_id_hex_round_trip() {
        let id = SubBlockId::new([0xab; 32]);
        let parsed = SubBlockId::from_hex(&id.to_string()).expect("valid hex");
        assert_eq!(parsed, id);
    }

    #[test]
    fn sub_block_id_rejects_short_hex() {
        assert!(SubBlockId::from_hex("abcd").is_none());
        assert!(SubBlockId::from_hex("not hex").is_none());
    }

    #[test]
    fn debug_is_abbreviated() {
        let id = SubBlockId::new([0x01; 32]);
        assert_eq!(format!("{id:?}"), "SubBlockId(01010101\u{2026})");
    }
}
