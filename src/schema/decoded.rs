//! Provides [`Decoded`], a byte string that remembers the encoded form it was
//! parsed from.
//!
//! Signatures and key IDs appear in metadata as hex strings. Because the
//! canonical form of a metadata document must re-serialize byte-identically,
//! the decoded bytes keep the original string around and write it back out
//! verbatim.

use crate::schema::error::{self, Error, Result};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use snafu::ResultExt;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;

/// A scheme for encoding bytes as a string.
pub trait Encode {
    /// Encode bytes into a string.
    fn encode(bytes: &[u8]) -> String;
}

/// A scheme for decoding bytes from a string.
pub trait Decode {
    /// Decode bytes from a string.
    fn decode(encoded: &str) -> Result<Vec<u8>>;
}

/// Lowercase hexadecimal encoding.
#[derive(Debug, Clone, Copy)]
pub struct Hex;

impl Encode for Hex {
    fn encode(bytes: &[u8]) -> String {
        hex::encode(bytes)
    }
}

impl Decode for Hex {
    fn decode(encoded: &str) -> Result<Vec<u8>> {
        hex::decode(encoded).context(error::HexDecodeSnafu)
    }
}

/// Decoded bytes along with the original encoded string, so that
/// re-serialization reproduces the input exactly.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    bytes: Vec<u8>,
    original: String,
    marker: PhantomData<T>,
}

impl<T> Decoded<T> {
    /// The decoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume this object and return its decoded bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl<T: Decode> std::str::FromStr for Decoded<T> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self {
            bytes: T::decode(s)?,
            original: s.to_owned(),
            marker: PhantomData,
        })
    }
}

impl<T: Encode> From<Vec<u8>> for Decoded<T> {
    fn from(bytes: Vec<u8>) -> Self {
        let original = T::encode(&bytes);
        Self {
            bytes,
            original,
            marker: PhantomData,
        }
    }
}

impl<T> AsRef<[u8]> for Decoded<T> {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<T> Deref for Decoded<T> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<T> fmt::Display for Decoded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

// Equality and hashing consider the bytes only; two encodings of the same
// bytes are the same value.

impl<T> PartialEq for Decoded<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl<T> Eq for Decoded<T> {}

impl<T> PartialEq<[u8]> for Decoded<T> {
    fn eq(&self, other: &[u8]) -> bool {
        self.bytes == other
    }
}

impl<T> Hash for Decoded<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl<'de, T: Decode> Deserialize<'de> for Decoded<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let original = String::deserialize(deserializer)?;
        let bytes = T::decode(&original).map_err(D::Error::custom)?;
        Ok(Self {
            bytes,
            original,
            marker: PhantomData,
        })
    }
}

impl<T> Serialize for Decoded<T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.original)
    }
}
