use std::path::{Path, PathBuf};

use crate::config::StoreConfig;
use crate::core::types::Chromosome;

/// File extension for every table
pub const TABLE_EXT: &str = "parquet";

/// File naming inside a store root:
///
/// - `<catalog>.chr<label>.lookup.parquet` per chromosome
/// - `<catalog>.parquet` full catalog
/// - `<catalog>.manifest.json` build sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
    catalog: String,
}

impl StoreLayout {
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            root: config.root.clone(),
            catalog: config.catalog.clone(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    #[must_use]
    pub fn partition_path(&self, chromosome: Chromosome) -> PathBuf {
        self.root.join(format!(
            "{}.chr{}.lookup.{TABLE_EXT}",
            self.catalog,
            chromosome.label()
        ))
    }

    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(format!("{}.{TABLE_EXT}", self.catalog))
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(format!("{}.manifest.json", self.catalog))
    }

    /// Chromosomes that currently have a published partition, in canonical order
    #[must_use]
    pub fn existing_partitions(&self) -> Vec<Chromosome> {
        Chromosome::all()
            .filter(|c| self.partition_path(*c).is_file())
            .collect()
    }
}

impl From<&StoreConfig> for StoreLayout {
    fn from(config: &StoreConfig) -> Self {
        Self::new(config)
    }
}
