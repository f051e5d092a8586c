//! Content hashing primitives
//!
//! Provides [`ContentHash`], a strongly-typed 32-byte Blake3 digest, and
//! [`ContentHasher`], an incremental builder used to fold many inputs
//! (view contents, extension records) into a single cache key.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte content hash (Blake3)
///
/// Immutable and cheap to clone (Copy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new hash from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create hash from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != 32 {
            return Err(HashError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Compute Blake3 hash of arbitrary data
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self::new(*blake3::hash(data).as_bytes())
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

// Hex string in every format; compiled artifacts are persisted as JSON.
impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental hasher over a sequence of labelled fields
///
/// Every field is written with a length prefix so that adjacent fields can
/// never be confused (`"ab" + "c"` hashes differently from `"a" + "bc"`).
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    inner: blake3::Hasher,
}

impl ContentHasher {
    /// Create empty hasher
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a byte field
    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        self.inner.update(&(bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
        self
    }

    /// Append a string field
    #[inline]
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.update(s.as_bytes())
    }

    /// Append an optional string field, distinguishing `None` from `Some("")`
    pub fn update_opt_str(&mut self, s: Option<&str>) -> &mut Self {
        match s {
            Some(s) => {
                self.inner.update(&[1]);
                self.update_str(s)
            }
            None => {
                self.inner.update(&[0]);
                self
            }
        }
    }

    /// Append an integer field
    #[inline]
    pub fn update_i64(&mut self, value: i64) -> &mut Self {
        self.update(&value.to_le_bytes())
    }

    /// Append another hash
    #[inline]
    pub fn update_hash(&mut self, hash: &ContentHash) -> &mut Self {
        self.update(hash.as_bytes())
    }

    /// Finish and produce the digest
    #[inline]
    #[must_use]
    pub fn finalize(&self) -> ContentHash {
        ContentHash::new(*self.inner.finalize().as_bytes())
    }
}

/// Errors that can occur when working with content hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid hash length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_is_deterministic() {
        assert_eq!(ContentHash::compute(b"view"), ContentHash::compute(b"view"));
        assert_ne!(ContentHash::compute(b"view"), ContentHash::compute(b"view2"));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let result = ContentHash::from_slice(&[1u8; 31]);
        assert!(matches!(
            result,
            Err(HashError::InvalidLength { expected: 32, actual: 31 })
        ));
    }

    #[test]
    fn display_and_parse() {
        let hash = ContentHash::compute(b"test");
        let parsed: ContentHash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
        assert!(hash.to_string().starts_with(&hash.short()));
    }

    #[test]
    fn parse_rejects_non_hex() {
        assert!(matches!("zz".parse::<ContentHash>(), Err(HashError::HexDecode(_))));
        assert!(matches!(
            "abcd".parse::<ContentHash>(),
            Err(HashError::InvalidLength { expected: 32, actual: 2 })
        ));
        assert!(serde_json::from_str::<ContentHash>("\"abcd\"").is_err());
    }

    #[test]
    fn serde_json_is_hex_string() {
        let hash = ContentHash::compute(b"test");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        let decoded: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, decoded);
    }

    #[test]
    fn hasher_fields_are_length_prefixed() {
        let mut a = ContentHasher::new();
        a.update_str("ab").update_str("c");
        let mut b = ContentHasher::new();
        b.update_str("a").update_str("bc");
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn hasher_distinguishes_none_from_empty() {
        let mut a = ContentHasher::new();
        a.update_opt_str(None);
        let mut b = ContentHasher::new();
        b.update_opt_str(Some(""));
        assert_ne!(a.finalize(), b.finalize());
    }
}
