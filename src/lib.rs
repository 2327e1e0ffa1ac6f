//! # variantdb
//!
//! A partitioned lookup store mapping dbSNP rs-identifiers to genomic
//! coordinates.
//!
//! The store is built once from a filtered variant catalog (biallelic SNVs on
//! the standard chromosomes) and then queried in batches. Each chromosome gets
//! its own Parquet table sorted by rs number, so a lookup only decodes the
//! row groups that can hold its identifiers and finds each one by binary
//! search.
//!
//! ## Features
//!
//! - **Validated builds**: malformed, multi-allelic and non-SNV records are
//!   dropped and counted per reason
//! - **Disjoint partitions**: an identifier on two chromosomes fails the build
//!   (or is reported, keeping the first occurrence)
//! - **Atomic publish**: readers never see a half-written rebuild
//! - **Order-aligned results**: one output row per input identifier, with
//!   unresolved identifiers reported explicitly
//!
//! ## Example
//!
//! ```rust,no_run
//! use variantdb::{StoreConfig, VariantStore};
//!
//! let store = VariantStore::from_config(&StoreConfig::from_env().unwrap());
//! let mut session = store.session();
//!
//! let result = session.query_all(&["rs1042522", "rs_unknown"]).unwrap();
//! for row in &result {
//!     match row.record() {
//!         Some(r) => println!("{} -> {}:{}", row.query, r.chromosome, r.position),
//!         None => println!("{} unresolved", row.query),
//!     }
//! }
//!
//! // Only chromosome 17
//! let result = session.query_chromosome(&["rs1042522"], "chr17").unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`catalog`]: Partition builder, Parquet tables and store layout
//! - [`lookup`]: Query sessions and result sets
//! - [`core`]: Identifier, chromosome and variant record types
//! - [`parsing`]: Filtered VCF reader
//! - [`config`]: Store root and catalog tag resolution
//! - [`cli`]: Command-line interface implementation

pub mod catalog;
pub mod cli;
pub mod config;
pub mod core;
pub mod lookup;
pub mod parsing;

// Re-export commonly used types for convenience
pub use catalog::builder::{build, BuildOptions, BuildSummary, IntegrityPolicy, PartitionBuilder};
pub use catalog::store::VariantStore;
pub use config::StoreConfig;
pub use core::types::*;
pub use core::variant::{SnvRecord, VariantRecord};
pub use lookup::engine::{LookupSession, MatchPolicy, QueryOptions};
pub use lookup::result::{LookupRow, QueryResult, Resolution};
