//! Digest primitives and the pluggable hash function capability.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest as _;
use std::fmt;

/// A named alias for a 32-byte(u8) array, used to represent a 256-bit hash.
pub type H256 = [u8; 32];

/// A wrapper type for H256 with Display and Debug formatting.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Hash(pub H256);

impl Hash {
    /// The zero hash (all zeros).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a new Hash from raw bytes.
    pub fn from_bytes(bytes: H256) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &H256 {
        &self.0
    }

    /// Convert to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Number of leading `0` characters in the hex encoding.
    pub fn leading_zero_nibbles(&self) -> u32 {
        let mut count = 0;
        for byte in self.0 {
            if byte == 0 {
                count += 2;
                continue;
            }
            if byte >> 4 == 0 {
                count += 1;
            }
            break;
        }
        count
    }

    /// Whether the hex encoding starts with at least `zeros` zero characters.
    pub fn meets_difficulty(&self, zeros: u32) -> bool {
        self.leading_zero_nibbles() >= zeros
    }

    /// First eight hex characters, used for file names and compact output.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(0x{})", self.short_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl From<H256> for Hash {
    fn from(bytes: H256) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for H256 {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// JSON carries digests as hex strings; binary encodings keep the raw bytes.
impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(HexVisitor)
        } else {
            H256::deserialize(deserializer).map(Hash)
        }
    }
}

struct HexVisitor;

impl Visitor<'_> for HexVisitor {
    type Value = Hash;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a 64 character hex digest")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Hash, E> {
        Hash::from_hex(v).map_err(E::custom)
    }
}

/// A fixed-width cryptographic digest function.
///
/// Everything that hashes (Merkle aggregation, block digests, mining) takes
/// an implementation of this trait explicitly, so tests and deployments can
/// swap the primitive.
pub trait HashFunction: Send + Sync {
    /// Digest a single byte string.
    fn digest(&self, data: &[u8]) -> Hash;

    /// Digest the concatenation of several byte strings.
    fn digest_concat(&self, parts: &[&[u8]]) -> Hash {
        self.digest(&parts.concat())
    }
}

impl<T: HashFunction + ?Sized> HashFunction for &T {
    fn digest(&self, data: &[u8]) -> Hash {
        (**self).digest(data)
    }

    fn digest_concat(&self, parts: &[&[u8]]) -> Hash {
        (**self).digest_concat(parts)
    }
}

/// SHA-256, the default digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sha256;

impl HashFunction for Sha256 {
    fn digest(&self, data: &[u8]) -> Hash {
        Hash(sha2::Sha256::digest(data).into())
    }

    fn digest_concat(&self, parts: &[&[u8]]) -> Hash {
        let mut hasher = sha2::Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Hash(hasher.finalize().into())
    }
}

/// Blake3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Blake3;

impl HashFunction for Blake3 {
    fn digest(&self, data: &[u8]) -> Hash {
        Hash(blake3::hash(data).into())
    }

    fn digest_concat(&self, parts: &[&[u8]]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Hash(hasher.finalize().into())
    }
}

/// Runtime-selectable digest, for configuration files and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm: {other}")),
        }
    }
}

impl HashFunction for HashAlgorithm {
    fn digest(&self, data: &[u8]) -> Hash {
        match self {
            HashAlgorithm::Sha256 => Sha256.digest(data),
            HashAlgorithm::Blake3 => Blake3.digest(data),
        }
    }

    fn digest_concat(&self, parts: &[&[u8]]) -> Hash {
        match self {
            HashAlgorithm::Sha256 => Sha256.digest_concat(parts),
            HashAlgorithm::Blake3 => Blake3.digest_concat(parts),
        }
    }
}

/// Hash arbitrary data using SHA-256.
pub fn hash(data: &[u8]) -> Hash {
    Sha256.digest(data)
}

/// Hash multiple pieces of data by concatenating them.
pub fn hash_concat(parts: &[&[u8]]) -> Hash {
    Sha256.digest_concat(parts)
}
