//! Core data types for the variant lookup store.
//!
//! - [`RsId`]: typed dbSNP rs-identifier (`rs<digits>`)
//! - [`Chromosome`]: one of the standardized labels `1..22, X, Y, MT`
//! - [`Base`]: a single nucleotide
//! - [`VariantRecord`]: an unvalidated row from the filtered catalog
//! - [`SnvRecord`]: a validated single-nucleotide variant
//!
//! ## Contig Naming
//!
//! Partitions are keyed by the NCBI/Ensembl style labels. Other conventions
//! can be mapped onto them with [`contig::standardize_contig`]:
//!
//! | Source | Chromosome 17 | Mitochondrial |
//! |--------|---------------|---------------|
//! | UCSC   | chr17         | chrM          |
//! | NCBI   | 17            | MT            |
//! | RefSeq | NC_000017.11  | NC_012920.1   |
//!
//! [`RsId`]: types::RsId
//! [`Chromosome`]: types::Chromosome
//! [`Base`]: types::Base
//! [`VariantRecord`]: variant::VariantRecord
//! [`SnvRecord`]: variant::SnvRecord

pub mod contig;
pub mod types;
pub mod variant;
