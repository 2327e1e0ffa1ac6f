//! Partitioned storage for the rsID lookup tables.
//!
//! A store root holds, per catalog tag (default `GCF_000001405.40`):
//!
//! | File | Contents |
//! |------|----------|
//! | `<catalog>.chr<label>.lookup.parquet` | One chromosome, sorted by rs number |
//! | `<catalog>.parquet` | Every accepted record |
//! | `<catalog>.manifest.json` | Build metadata |
//!
//! Partition tables are immutable once published. A rebuild writes every file
//! to a temporary first and renames it into place only when all of them were
//! written. Files it replaces or removes are backed up first, so a rebuild
//! that fails while renaming restores the previous set. Sessions keep their
//! partition files open and are not affected by a rebuild until invalidated.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use variantdb::catalog::builder::{try_build, BuildOptions};
//! use variantdb::catalog::store::VariantStore;
//! use variantdb::config::StoreConfig;
//! use variantdb::parsing::vcf::{read_vcf_file, VcfOptions};
//!
//! let config = StoreConfig::from_env().unwrap();
//! let store = VariantStore::from_config(&config);
//!
//! let records = read_vcf_file(Path::new("filtered.vcf.gz"), VcfOptions::default()).unwrap();
//! let summary = try_build(store.layout().clone(), BuildOptions::default(), records).unwrap();
//! println!("{summary}");
//!
//! let result = store.query_all(&["rs1042522", "rs429358"]).unwrap();
//! for row in &result {
//!     println!("{} {:?}", row.query, row.record());
//! }
//! ```

pub mod builder;
pub mod columnar;
pub mod index;
pub mod layout;
pub mod store;
