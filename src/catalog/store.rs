use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::catalog::builder::{IntegrityConflict, RejectCounts};
use crate::catalog::layout::StoreLayout;
use crate::config::StoreConfig;
use crate::core::types::Chromosome;
use crate::lookup::engine::{LookupError, LookupSession, QueryOptions};
use crate::lookup::result::QueryResult;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read manifest: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Manifest version for compatibility checking
pub const MANIFEST_VERSION: &str = "1.0.0";

/// One published partition, as listed in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub chromosome: Chromosome,
    pub rows: usize,
    pub file: String,
}

/// Build metadata written next to the partitions. Informational only: the
/// lookup engine finds partitions by file name, not through the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    pub version: String,
    pub catalog: String,
    pub created_at: String,
    pub total_records: usize,
    pub accepted: usize,
    pub rejected: RejectCounts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<IntegrityConflict>,
    pub partitions: Vec<PartitionEntry>,
}

impl BuildManifest {
    #[must_use]
    pub fn new(
        catalog: &str,
        total_records: usize,
        accepted: usize,
        rejected: RejectCounts,
        conflicts: Vec<IntegrityConflict>,
        partitions: Vec<PartitionEntry>,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            catalog: catalog.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            total_records,
            accepted,
            rejected,
            conflicts,
            partitions,
        }
    }

    /// Load a manifest from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::ReadError` if the file cannot be read, or
    /// `CatalogError::ParseError` if it is not a valid manifest.
    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)?;

        // Version check (warn but don't fail)
        if manifest.version != MANIFEST_VERSION {
            tracing::warn!(
                "Manifest version mismatch (expected {}, found {})",
                MANIFEST_VERSION,
                manifest.version
            );
        }
        Ok(manifest)
    }
}

/// Handle on one catalog's published partitions.
///
/// Holds no open files; sessions open partitions on demand.
#[derive(Debug, Clone)]
pub struct VariantStore {
    layout: StoreLayout,
}

impl VariantStore {
    #[must_use]
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(StoreLayout::new(config))
    }

    #[must_use]
    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Chromosomes with a published partition
    #[must_use]
    pub fn chromosomes(&self) -> Vec<Chromosome> {
        self.layout.existing_partitions()
    }

    /// The build manifest, if one was written
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the manifest exists but cannot be read.
    pub fn manifest(&self) -> Result<Option<BuildManifest>, CatalogError> {
        let path = self.layout.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        BuildManifest::load_from_file(&path).map(Some)
    }

    /// Start a lookup session with default options
    #[must_use]
    pub fn session(&self) -> LookupSession<'_> {
        LookupSession::new(self, QueryOptions::default())
    }

    #[must_use]
    pub fn session_with(&self, options: QueryOptions) -> LookupSession<'_> {
        LookupSession::new(self, options)
    }

    /// One-shot [`LookupSession::query_all`]
    ///
    /// # Errors
    ///
    /// Returns `LookupError` if a partition cannot be read.
    pub fn query_all<S: AsRef<str>>(&self, identifiers: &[S]) -> Result<QueryResult, LookupError> {
        self.session().query_all(identifiers)
    }

    /// One-shot [`LookupSession::query_chromosome`]
    ///
    /// # Errors
    ///
    /// Returns `LookupError` if the partition exists but cannot be read.
    pub fn query_chromosome<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        chromosome: &str,
    ) -> Result<QueryResult, LookupError> {
        self.session().query_chromosome(identifiers, chromosome)
    }
}
