//! Input parsers.
//!
//! - **VCF**: filtered variant records (`.vcf`, `.vcf.gz`) for the partition
//!   builder

pub mod vcf;
