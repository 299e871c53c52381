//! Chunk integrity checksums
//!
//! Provides [`Checksum`], a strongly-typed 32-byte SHA-256 digest declared
//! by the producer for every chunk payload and recomputed by the consumer.

use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Digest length in bytes
pub const CHECKSUM_LEN: usize = 32;

/// A 32-byte SHA-256 checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    /// Create a checksum from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; CHECKSUM_LEN]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }

    /// Create checksum from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ChecksumError> {
        let arr: [u8; CHECKSUM_LEN] = bytes.try_into().map_err(|_| ChecksumError::InvalidLength {
            expected: CHECKSUM_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Compute the checksum of a payload
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Check a payload against this checksum
    #[inline]
    #[must_use]
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }

}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Checksum {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for Checksum {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl serde::Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = <String as serde::Deserialize>::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing checksums
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    /// Invalid digest length
    #[error("invalid checksum length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
