use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for one print batch (one submission of the print action).
///
/// Wraps a UUID to provide type safety and prevent mixing up
/// batch IDs with other UUID-based identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Creates a new random batch ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a batch ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<BatchId> for Uuid {
    fn from(id: BatchId) -> Self {
        id.0
    }
}

/// Errors produced when parsing identifier strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Invalid pallet number '{0}': expected '<date-prefix>/<sequence>'")]
    InvalidPalletNumber(String),

    #[error("Series code must not be empty")]
    EmptySeries,
}

/// A pallet number of the form `<date-prefix>/<sequence>`, e.g. `20240521/001`.
///
/// The sequence is a per-day monotonically increasing integer. Ordering
/// compares the date prefix first, then the numeric sequence, so `x/10`
/// sorts after `x/9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PalletNumber {
    raw: String,
    split: usize,
    sequence: u32,
}

impl PalletNumber {
    /// Builds a pallet number from a date prefix and a sequence, zero-padding
    /// the sequence to three digits.
    pub fn new(date_prefix: &str, sequence: u32) -> Self {
        let raw = format!("{date_prefix}/{sequence:03}");
        Self {
            split: date_prefix.len(),
            raw,
            sequence,
        }
    }

    /// Parses a pallet number string.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        let invalid = || IdentifierError::InvalidPalletNumber(value.to_string());
        let (prefix, seq) = value.split_once('/').ok_or_else(invalid)?;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if seq.is_empty() || !seq.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let sequence = seq.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self {
            raw: value.to_string(),
            split: prefix.len(),
            sequence,
        })
    }

    /// Returns the date prefix (the part before `/`).
    pub fn date_prefix(&self) -> &str {
        &self.raw[..self.split]
    }

    /// Returns the per-day sequence number.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Storage-safe file stem (`/` replaced by `_`).
    pub fn file_stem(&self) -> String {
        self.raw.replace('/', "_")
    }
}

impl Ord for PalletNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date_prefix()
            .cmp(other.date_prefix())
            .then(self.sequence.cmp(&other.sequence))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for PalletNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for PalletNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for PalletNumber {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PalletNumber> for String {
    fn from(value: PalletNumber) -> Self {
        value.raw
    }
}

/// Opaque series code, correlated 1:1 with a pallet number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Series(String);

impl Series {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdentifierError::EmptySeries);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Series {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Series> for String {
    fn from(value: Series) -> Self {
        value.0
    }
}

/// A reserved pallet handle: pallet number plus its series code.
///
/// Identifiers order by pallet number, which is the order labels are
/// written, rendered and printed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub pallet_number: PalletNumber,
    pub series: Series,
}

impl Identifier {
    pub fn new(pallet_number: PalletNumber, series: Series) -> Self {
        Self {
            pallet_number,
            series,
        }
    }

    /// Shorthand for the pallet number's sequence.
    pub fn sequence(&self) -> u32 {
        self.pallet_number.sequence()
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pallet_number
            .cmp(&other.pallet_number)
            .then_with(|| self.series.cmp(&other.series))
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.pallet_number, self.series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_id_new_creates_unique_ids() {
        let id1 = BatchId::new();
        let id2 = BatchId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn batch_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = BatchId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn pallet_number_formats_with_padding() {
        let pn = PalletNumber::new("20240521", 7);
        assert_eq!(pn.as_str(), "20240521/007");
        assert_eq!(pn.date_prefix(), "20240521");
        assert_eq!(pn.sequence(), 7);
        assert_eq!(pn.file_stem(), "20240521_007");
    }

    #[test]
    fn pallet_number_parse_accepts_unpadded_sequence() {
        let pn = PalletNumber::parse("210524/12").unwrap();
        assert_eq!(pn.date_prefix(), "210524");
        assert_eq!(pn.sequence(), 12);
        assert_eq!(pn.to_string(), "210524/12");
    }

    #[test]
    fn pallet_number_parse_rejects_garbage() {
        for bad in ["", "20240521", "/1", "2024/", "2024/x1", "ab/1", "2024/1/2"] {
            assert!(PalletNumber::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn pallet_numbers_order_numerically_by_sequence() {
        let mut numbers = vec![
            PalletNumber::parse("20240521/10").unwrap(),
            PalletNumber::parse("20240521/9").unwrap(),
            PalletNumber::parse("20240520/99").unwrap(),
        ];
        numbers.sort();
        let ordered: Vec<&str> = numbers.iter().map(|n| n.as_str()).collect();
        assert_eq!(ordered, vec!["20240520/99", "20240521/9", "20240521/10"]);
    }

    #[test]
    fn series_rejects_blank() {
        assert_eq!(Series::new("  "), Err(IdentifierError::EmptySeries));
        assert_eq!(Series::new("210524-AB12CD").unwrap().as_str(), "210524-AB12CD");
    }

    #[test]
    fn identifier_serializes_as_plain_strings() {
        let id = Identifier::new(
            PalletNumber::new("20240521", 1),
            Series::new("210524-AB12CD").unwrap(),
        );
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["pallet_number"], "20240521/001");
        assert_eq!(json["series"], "210524-AB12CD");

        let back: Identifier = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn invalid_pallet_number_fails_deserialization() {
        let result: Result<PalletNumber, _> = serde_json::from_str("\"not-a-pallet\"");
        assert!(result.is_err());
    }
}
