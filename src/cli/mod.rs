//! Command-line interface for variantdb.
//!
//! Available commands:
//!
//! - **build**: Build the per-chromosome lookup partitions from a filtered VCF
//! - **query**: Resolve rs-identifiers to coordinates
//! - **info**: Show what is published in the store
//!
//! ## Usage
//!
//! ```text
//! # Build from the filtered dbSNP VCF
//! variantdb build dbsnp.filtered.vcf.gz --standardize-contigs
//!
//! # Look up identifiers
//! variantdb query rs1042522 rs429358
//!
//! # Restrict to one chromosome, identifiers from a file
//! variantdb query --input ids.txt --chromosome chr17 --format tsv
//!
//! # Use a different store root
//! variantdb --root /data/variantdb info
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::StoreConfig;

pub mod build;
pub mod info;
pub mod query;

#[derive(Parser)]
#[command(name = "variantdb")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Build and query a partitioned dbSNP rsID lookup store")]
#[command(
    long_about = "variantdb turns a filtered dbSNP VCF into one sorted Parquet table per chromosome and resolves rs-identifiers to chromosome, position, reference and alternate allele.\n\nThe store root defaults to $HOME/.cache/variantdb (override with VARIANTDB_HOME or --root)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Store root directory [default: $VARIANTDB_HOME or ~/.cache/variantdb]
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Catalog tag prefixing every file [default: $VARIANTDB_CATALOG or GCF_000001405.40]
    #[arg(long, global = true)]
    pub catalog: Option<String>,
}

impl Cli {
    /// Store configuration from flags, falling back to the environment
    ///
    /// # Errors
    ///
    /// Returns an error if no root can be determined or the catalog tag is invalid.
    pub fn store_config(&self) -> anyhow::Result<StoreConfig> {
        Ok(StoreConfig::resolve(
            self.root.clone(),
            self.catalog.clone(),
        )?)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the lookup partitions from a filtered VCF
    Build(build::BuildArgs),

    /// Resolve rs-identifiers to coordinates
    Query(query::QueryArgs),

    /// Show the published partitions and build manifest
    Info,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}
