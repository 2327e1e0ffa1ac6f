use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::types::{Base, Chromosome, RsId};

/// One row of the filtered source catalog, as emitted by the upstream
/// filtering stage. Nothing here is validated yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub rsid: String,
    pub chrom: String,
    /// 1-based position
    pub pos: u64,
    pub ref_allele: String,
    /// Comma-separated when the site is multi-allelic
    pub alt_allele: String,
}

impl VariantRecord {
    pub fn new(
        rsid: impl Into<String>,
        chrom: impl Into<String>,
        pos: u64,
        ref_allele: impl Into<String>,
        alt_allele: impl Into<String>,
    ) -> Self {
        Self {
            rsid: rsid.into(),
            chrom: chrom.into(),
            pos,
            ref_allele: ref_allele.into(),
            alt_allele: alt_allele.into(),
        }
    }
}

/// Why a record was dropped during a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Identifier is not `rs<digits>`
    MalformedIdentifier,
    /// Chromosome label outside 1-22, X, Y, MT
    NonStandardChromosome,
    /// Position is zero
    InvalidPosition,
    /// More than one alternate allele
    MultiAllelic,
    /// Missing alternate, indel, MNV, non-ACGT base, or REF == ALT
    NonSnv,
    /// Identifier already seen on the same chromosome
    DuplicateIdentifier,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MalformedIdentifier => "malformed identifier",
            Self::NonStandardChromosome => "non-standard chromosome",
            Self::InvalidPosition => "invalid position",
            Self::MultiAllelic => "multi-allelic",
            Self::NonSnv => "not a single-nucleotide variant",
            Self::DuplicateIdentifier => "duplicate identifier",
        };
        f.write_str(s)
    }
}

/// A validated single-nucleotide variant with its coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnvRecord {
    pub rsid: RsId,
    pub chromosome: Chromosome,
    pub position: u64,
    pub reference: Base,
    pub alternate: Base,
}

impl SnvRecord {
    /// Validate a raw record.
    ///
    /// Checks run in order identifier, chromosome, position, alleles; the
    /// first failure is the reported reason.
    ///
    /// # Errors
    ///
    /// Returns the `RejectReason` for the first failed check.
    pub fn validate(record: &VariantRecord) -> Result<Self, RejectReason> {
        let rsid: RsId = record
            .rsid
            .parse()
            .map_err(|_| RejectReason::MalformedIdentifier)?;
        let chromosome =
            Chromosome::parse(&record.chrom).map_err(|_| RejectReason::NonStandardChromosome)?;
        if record.pos == 0 {
            return Err(RejectReason::InvalidPosition);
        }
        if record.alt_allele.contains(',') {
            return Err(RejectReason::MultiAllelic);
        }
        let reference = Base::parse(&record.ref_allele).ok_or(RejectReason::NonSnv)?;
        let alternate = Base::parse(&record.alt_allele).ok_or(RejectReason::NonSnv)?;
        if reference == alternate {
            return Err(RejectReason::NonSnv);
        }

        Ok(Self {
            rsid,
            chromosome,
            position: record.pos,
            reference,
            alternate,
        })
    }

    /// `<chrom>_<pos>_<ref>_<alt>` key for the variant
    #[must_use]
    pub fn variant_id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.chromosome, self.position, self.reference, self.alternate
        )
    }
}
