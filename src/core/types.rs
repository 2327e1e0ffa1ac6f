use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing an rs-identifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Empty identifier")]
    Empty,

    #[error("Identifier '{0}' does not start with 'rs'")]
    MissingPrefix(String),

    #[error("Identifier '{0}' must be 'rs' followed by digits")]
    NotNumeric(String),

    #[error("Identifier '{0}' has a leading zero")]
    LeadingZero(String),

    #[error("Identifier '{0}' is out of range")]
    Overflow(String),
}

/// A dbSNP rs-identifier, stored by its numeric accession.
///
/// Parsing is strict: exactly `rs` followed by decimal digits with no leading
/// zero, so that `Display` reproduces the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RsId(u64);

impl RsId {
    #[must_use]
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    /// Numeric part of the accession (the partition sort key)
    #[must_use]
    pub fn number(self) -> u64 {
        self.0
    }
}

impl FromStr for RsId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdentifierError::Empty);
        }
        let digits = s
            .strip_prefix("rs")
            .ok_or_else(|| IdentifierError::MissingPrefix(s.to_string()))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdentifierError::NotNumeric(s.to_string()));
        }
        if digits.starts_with('0') {
            return Err(IdentifierError::LeadingZero(s.to_string()));
        }
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| IdentifierError::Overflow(s.to_string()))
    }
}

impl TryFrom<String> for RsId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RsId> for String {
    fn from(value: RsId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rs{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{0}' is not a standard chromosome label (1-22, X, Y, MT)")]
pub struct ChromosomeError(pub String);

/// Standard chromosome labels in canonical order
pub const CHROMOSOME_LABELS: [&str; 25] = [
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y", "MT",
];

/// One of the standardized chromosome labels.
///
/// Ordering follows [`CHROMOSOME_LABELS`], which is also the order partitions
/// are searched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Chromosome(u8);

impl Chromosome {
    /// Parse an exact standardized label. Use
    /// [`standardize_contig`](crate::core::contig::standardize_contig) for
    /// `chr`-prefixed or RefSeq names.
    ///
    /// # Errors
    ///
    /// Returns `ChromosomeError` if the label is not in the standard set.
    pub fn parse(label: &str) -> Result<Self, ChromosomeError> {
        CHROMOSOME_LABELS
            .iter()
            .position(|l| *l == label)
            .map(Self::from_index)
            .ok_or_else(|| ChromosomeError(label.to_string()))
    }

    #[allow(clippy::cast_possible_truncation)] // index < 25
    fn from_index(index: usize) -> Self {
        Self(index as u8)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        CHROMOSOME_LABELS[self.0 as usize]
    }

    /// All chromosomes in canonical order
    pub fn all() -> impl Iterator<Item = Chromosome> {
        (0..CHROMOSOME_LABELS.len()).map(Self::from_index)
    }
}

impl TryFrom<String> for Chromosome {
    type Error = ChromosomeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Chromosome> for String {
    fn from(value: Chromosome) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single nucleotide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Base {
    A,
    C,
    G,
    T,
}

impl Base {
    /// Parse a one-base allele, case-insensitively. Anything else (indels,
    /// IUPAC codes, symbolic alleles) yields `None`.
    #[must_use]
    pub fn parse(allele: &str) -> Option<Self> {
        match allele.as_bytes() {
            [b] => Self::from_byte(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b.to_ascii_uppercase() {
            b'A' => Some(Self::A),
            b'C' => Some(Self::C),
            b'G' => Some(Self::G),
            b'T' => Some(Self::T),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::C => "C",
            Self::G => "G",
            Self::T => "T",
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
