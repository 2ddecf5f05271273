//! SHA3-256 content hashing (C1).
//!
//! `Hash` is the identity of a [`crate::chunk::ChunkMeta`] and the leaf type
//! of the [`crate::merkle`] tree. Hex formatting matches the `hex`-crate
//! convention the teacher codebase already uses for content hashes
//! (`db::chunks::ChunkRecord::content_hash`).

use sha3::{Digest, Sha3_256};
use std::fmt;
use std::str::FromStr;

/// A 32-byte SHA3-256 digest, used as a content-address throughout the crate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let bytes = hex::decode(s).map_err(|_| HashParseError(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(HashParseError(s.to_string()));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Hash(out))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid hash hex string: {0}")]
pub struct HashParseError(String);

impl FromStr for Hash {
    type Err = HashParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_hex(s)
    }
}

impl TryFrom<String> for Hash {
    type Error = HashParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Hash::from_hex(&value)
    }
}

impl From<Hash> for String {
    fn from(h: Hash) -> Self {
        h.to_hex()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

/// Hash an arbitrary byte slice with SHA3-256.
pub fn hash(bytes: &[u8]) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}

/// Hash the raw concatenation of two digests (used by the Merkle engine).
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&left.0);
    buf.extend_from_slice(&right.0);
    hash(&buf)
}

/// Verify that `bytes` hashes to `expected`, in constant time with respect
/// to the digest comparison (the hash computation itself is not
/// constant-time, which is standard for content-integrity checks — only the
/// final comparison needs to resist timing side channels).
pub fn verify(bytes: &[u8], expected: &Hash) -> bool {
    let actual = hash(bytes);
    constant_time_eq(&actual.0, &expected.0)
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for i in 0..32 {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}
