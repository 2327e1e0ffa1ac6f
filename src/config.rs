//! Store configuration.
//!
//! The store root defaults to `$HOME/.cache/variantdb` and can be moved with
//! the `VARIANTDB_HOME` environment variable. The catalog tag names the build
//! (by default the dbSNP release accession) and prefixes every file.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the store root
pub const HOME_ENV: &str = "VARIANTDB_HOME";

/// Environment variable overriding the catalog tag
pub const CATALOG_ENV: &str = "VARIANTDB_CATALOG";

/// dbSNP release used when no catalog tag is given
pub const DEFAULT_CATALOG: &str = "GCF_000001405.40";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine store root: set {HOME_ENV} or HOME")]
    NoRoot,

    #[error("Invalid catalog tag '{0}': use letters, digits, '.', '_' or '-'")]
    InvalidCatalog(String),

    #[error("Failed to create store root {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub catalog: String,
}

impl StoreConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidCatalog` if the tag cannot be used in a
    /// file name.
    pub fn new(root: impl Into<PathBuf>, catalog: impl Into<String>) -> Result<Self, ConfigError> {
        let catalog = catalog.into();
        validate_catalog_tag(&catalog)?;
        Ok(Self {
            root: root.into(),
            catalog,
        })
    }

    /// Resolve configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NoRoot` if neither `VARIANTDB_HOME` nor `HOME`
    /// is set, or `ConfigError::InvalidCatalog` for a bad `VARIANTDB_CATALOG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(None, None)
    }

    /// Resolve configuration, preferring explicit values over the environment
    ///
    /// # Errors
    ///
    /// See [`StoreConfig::from_env`].
    pub fn resolve(root: Option<PathBuf>, catalog: Option<String>) -> Result<Self, ConfigError> {
        let root = match root {
            Some(root) => root,
            None => default_root()?,
        };
        let catalog = catalog
            .or_else(|| std::env::var(CATALOG_ENV).ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| DEFAULT_CATALOG.to_string());
        Self::new(root, catalog)
    }

    /// Create the root directory if it does not exist
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::CreateRoot` on I/O failure.
    pub fn ensure_root(&self) -> Result<&Path, ConfigError> {
        std::fs::create_dir_all(&self.root).map_err(|source| ConfigError::CreateRoot {
            path: self.root.clone(),
            source,
        })?;
        Ok(&self.root)
    }
}

fn default_root() -> Result<PathBuf, ConfigError> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|s| !s.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    std::env::var_os("HOME")
        .filter(|s| !s.is_empty())
        .map(|home| PathBuf::from(home).join(".cache").join("variantdb"))
        .ok_or(ConfigError::NoRoot)
}

fn validate_catalog_tag(tag: &str) -> Result<(), ConfigError> {
    let valid = !tag.is_empty()
        && !tag.starts_with('.')
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidCatalog(tag.to_string()))
    }
}
