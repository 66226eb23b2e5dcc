//! Strong type definitions for index attestation.
//!
//! Epoch intervals and digests are newtypes so that a bare `(u64, u64)` or a
//! hex string cannot be passed where a validated value is expected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// A chain epoch. Non-negative, monotonically non-decreasing across the index.
pub type Epoch = u64;

/// The largest epoch that can be stored in a SQLite INTEGER column.
pub const MAX_EPOCH: Epoch = i64::MAX as u64;

/// A closed interval `[start, stop]` of epochs.
///
/// Always non-empty: `start <= stop`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawRange", into = "RawRange")]
pub struct EpochRange {
    start: Epoch,
    stop: Epoch,
}

#[derive(Serialize, Deserialize)]
struct RawRange {
    start: Epoch,
    stop: Epoch,
}

impl TryFrom<RawRange> for EpochRange {
    type Error = CoreError;

    fn try_from(raw: RawRange) -> Result<Self> {
        EpochRange::new(raw.start, raw.stop)
    }
}

impl From<EpochRange> for RawRange {
    fn from(range: EpochRange) -> Self {
        RawRange {
            start: range.start,
            stop: range.stop,
        }
    }
}

impl EpochRange {
    /// Create a range, rejecting `start > stop` and epochs beyond [`MAX_EPOCH`].
    pub fn new(start: Epoch, stop: Epoch) -> Result<Self> {
        if start > stop {
            return Err(CoreError::InvalidRange { start, stop });
        }
        if stop > MAX_EPOCH {
            return Err(CoreError::EpochOverflow(stop));
        }
        Ok(Self { start, stop })
    }

    /// A range covering a single epoch.
    pub fn single(epoch: Epoch) -> Result<Self> {
        Self::new(epoch, epoch)
    }

    pub const fn start(&self) -> Epoch {
        self.start
    }

    pub const fn stop(&self) -> Epoch {
        self.stop
    }

    /// Number of epochs covered. Never zero.
    pub const fn len(&self) -> u64 {
        self.stop - self.start + 1
    }

    pub const fn contains(&self, epoch: Epoch) -> bool {
        self.start <= epoch && epoch <= self.stop
    }

    /// Clamp `[start, stop]` to this range, returning `None` when they do not overlap.
    pub fn clip(&self, start: Epoch, stop: Epoch) -> Option<EpochRange> {
        let start = start.max(self.start);
        let stop = stop.min(self.stop);
        (start <= stop).then_some(EpochRange { start, stop })
    }
}

impl fmt::Debug for EpochRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.stop)
    }
}

impl fmt::Display for EpochRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.stop)
    }
}

/// An interval of epochs absent from the queried data source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gap {
    pub start: Epoch,
    pub stop: Epoch,
}

impl Gap {
    pub const fn new(start: Epoch, stop: Epoch) -> Self {
        Self { start, stop }
    }

    pub const fn len(&self) -> u64 {
        self.stop - self.start + 1
    }
}

impl From<EpochRange> for Gap {
    fn from(range: EpochRange) -> Self {
        Gap::new(range.start, range.stop)
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.stop)
    }
}

/// A 32-byte chunk digest, rendered as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChecksumHash(pub [u8; 32]);

impl ChecksumHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex. Accepts an optional `0x` prefix and either case.
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| CoreError::MalformedHash(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| CoreError::MalformedHash(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ChecksumHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChecksumHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChecksumHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ChecksumHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; 32]> for ChecksumHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ChecksumHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ChecksumHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChecksumHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChecksumHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// The attestation "the messages over `range` hashed to `hash`".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChecksumRecord {
    pub range: EpochRange,
    pub hash: ChecksumHash,
}

impl ChecksumRecord {
    pub const fn new(range: EpochRange, hash: ChecksumHash) -> Self {
        Self { range, hash }
    }

    pub const fn start(&self) -> Epoch {
        self.range.start()
    }

    pub const fn stop(&self) -> Epoch {
        self.range.stop()
    }
}

impl fmt::Display for ChecksumRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.range, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_rejects_inverted_bounds() {
        assert_eq!(
            EpochRange::new(10, 9),
            Err(CoreError::InvalidRange { start: 10, stop: 9 })
        );
        assert!(EpochRange::new(9, 9).is_ok());
    }

    #[test]
    fn test_range_rejects_unstorable_epoch() {
        assert_eq!(
            EpochRange::new(0, u64::MAX),
            Err(CoreError::EpochOverflow(u64::MAX))
        );
        assert!(EpochRange::new(0, MAX_EPOCH).is_ok());
    }

    #[test]
    fn test_range_len_and_contains() {
        let range = EpochRange::new(5, 8).unwrap();
        assert_eq!(range.len(), 4);
        assert!(range.contains(5));
        assert!(range.contains(8));
        assert!(!range.contains(9));
    }

    #[test]
    fn test_range_clip() {
        let range = EpochRange::new(10, 20).unwrap();
        assert_eq!(range.clip(0, 15), Some(EpochRange::new(10, 15).unwrap()));
        assert_eq!(range.clip(18, 40), Some(EpochRange::new(18, 20).unwrap()));
        assert_eq!(range.clip(21, 40), None);
    }

    #[test]
    fn test_range_deserialize_validates() {
        let ok: EpochRange = serde_json::from_str(r#"{"start":1,"stop":2}"#).unwrap();
        assert_eq!(ok, EpochRange::new(1, 2).unwrap());
        assert!(serde_json::from_str::<EpochRange>(r#"{"start":3,"stop":2}"#).is_err());
    }

    #[test]
    fn test_hash_hex_parsing() {
        let hash = ChecksumHash::from_bytes([0xab; 32]);
        assert_eq!(ChecksumHash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert_eq!(
            ChecksumHash::from_hex(&format!("0x{}", hash.to_hex().to_uppercase())).unwrap(),
            hash
        );
        assert!(matches!(
            ChecksumHash::from_hex("abcd"),
            Err(CoreError::MalformedHash(_))
        ));
        assert!(matches!(
            ChecksumHash::from_hex("not hex at all"),
            Err(CoreError::MalformedHash(_))
        ));
    }

    #[test]
    fn test_hash_display_is_full_hex() {
        let hash = ChecksumHash::from_bytes([0x01; 32]);
        assert_eq!(hash.to_string().len(), 64);
        assert!(format!("{:?}", hash).starts_with("ChecksumHash("));
    }

    #[test]
    fn test_hash_serde_as_string() {
        let hash = ChecksumHash::from_bytes([0x0f; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: ChecksumHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
