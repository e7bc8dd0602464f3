//! Content-addressed hashing for marketplace artifacts.
//!
//! A single hash format is used everywhere an artifact is pinned:
//! `contract_hash`, `artifact_hash`, lockfile integrity digests. The wire
//! form is exactly 64 lowercase hex characters (SHA-256); anything else is
//! rejected at the parse boundary.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// SHA-256 content digest of an artifact.
///
/// Serialized as a 64-character lowercase hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute the digest of the given bytes.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex representation (64 characters).
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in &self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// Parse a 64-character lowercase hex digest.
    ///
    /// Uppercase digits, wrong length, and non-hex characters are all
    /// rejected; the wire format is deliberately narrow.
    pub fn parse_hex(input: &str) -> Result<Self, HashParseError> {
        if input.len() != 64 {
            return Err(HashParseError::WrongLength {
                actual: input.len(),
            });
        }
        let mut bytes = [0u8; 32];
        for (index, chunk) in input.as_bytes().chunks(2).enumerate() {
            let hi = hex_nibble(chunk[0]).ok_or(HashParseError::InvalidCharacter {
                index: index * 2,
                character: chunk[0] as char,
            })?;
            let lo = hex_nibble(chunk[1]).ok_or(HashParseError::InvalidCharacter {
                index: index * 2 + 1,
                character: chunk[1] as char,
            })?;
            bytes[index] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_hex(&raw).map_err(D::Error::custom)
    }
}

/// Errors from parsing a hex digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashParseError {
    /// Input was not exactly 64 characters.
    WrongLength { actual: usize },
    /// Input contained a character outside `[0-9a-f]`.
    InvalidCharacter { index: usize, character: char },
}

impl fmt::Display for HashParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongLength { actual } => {
                write!(f, "hash must be 64 hex characters, got {actual}")
            }
            Self::InvalidCharacter { index, character } => {
                write!(
                    f,
                    "invalid hash character `{character}` at index {index} (lowercase hex only)"
                )
            }
        }
    }
}

impl std::error::Error for HashParseError {}
