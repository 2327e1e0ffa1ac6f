//! Partition builder: turns a stream of filtered variant records into
//! per-chromosome lookup tables.
//!
//! Records are validated as they arrive and buffered per chromosome (at most
//! 25 buffers). `finish` then sorts each buffer by identifier, drops
//! same-chromosome duplicates, checks that no identifier sits on two
//! chromosomes, and publishes the new file set as one unit. Tables are written
//! to temporary files in the store root and only renamed into place once all
//! of them were written. Before a published file is replaced or removed it is
//! hard-linked to a backup, and a failure during the rename phase puts every
//! backup back. Dropping a builder without calling `finish`, or any failed
//! build, leaves the previously published store untouched.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use parquet::errors::ParquetError;
use serde::{Deserialize, Serialize};
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::columnar::{TableKind, TableWriter, DEFAULT_ROW_GROUP_SIZE};
use crate::catalog::layout::StoreLayout;
use crate::catalog::store::{BuildManifest, PartitionEntry};
use crate::core::types::{Chromosome, RsId};
use crate::core::variant::{RejectReason, SnvRecord, VariantRecord};
use crate::parsing::vcf::ParseError;

/// Rows per record batch written to Parquet
pub const DEFAULT_BATCH_SIZE: usize = 500_000;

const PROGRESS_INTERVAL: usize = 1_000_000;

/// Conflicts beyond this many are counted but not logged individually
const MAX_LOGGED_CONFLICTS: usize = 20;

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Failed to publish {path}: {source}")]
    Publish {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Input error: {0}")]
    Input(#[from] ParseError),

    #[error("{} identifier(s) found on more than one chromosome (first: {})", .0.len(), .0.first().map(ToString::to_string).unwrap_or_default())]
    Integrity(Vec<IntegrityConflict>),

    #[error("Reject rate {rejected}/{total} exceeds threshold {threshold}")]
    RejectRateExceeded {
        rejected: usize,
        total: usize,
        threshold: f64,
    },

    #[error("No valid records in input ({rejected} rejected)")]
    NoRecords { rejected: usize },
}

/// What to do when an identifier appears on two chromosomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityPolicy {
    /// Fail the build and publish nothing
    #[default]
    Fail,
    /// Keep the occurrence seen first in the input, drop the others, and list
    /// every conflict in the summary
    Report,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub integrity: IntegrityPolicy,
    /// Fail when `rejected / total` exceeds this fraction
    pub max_reject_fraction: Option<f64>,
    pub batch_size: usize,
    /// Rows per Parquet row group; lookups decode one row group at a time
    pub row_group_size: usize,
    /// Also write the `<catalog>.parquet` aggregate
    pub write_catalog: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            integrity: IntegrityPolicy::Fail,
            max_reject_fraction: None,
            batch_size: DEFAULT_BATCH_SIZE,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            write_catalog: true,
        }
    }
}

/// Where a conflicting identifier was seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub chromosome: Chromosome,
    pub position: u64,
}

impl std::fmt::Display for Occurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.chromosome, self.position)
    }
}

/// The same identifier observed under two chromosomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityConflict {
    pub rsid: RsId,
    /// Earlier in the input
    pub first: Occurrence,
    pub second: Occurrence,
}

impl std::fmt::Display for IntegrityConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {} and {}", self.rsid, self.first, self.second)
    }
}

/// Per-reason reject counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RejectCounts(BTreeMap<RejectReason, usize>);

impl RejectCounts {
    pub fn add(&mut self, reason: RejectReason) {
        *self.0.entry(reason).or_default() += 1;
    }

    #[must_use]
    pub fn get(&self, reason: RejectReason) -> usize {
        self.0.get(&reason).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RejectReason, usize)> + '_ {
        self.0.iter().map(|(r, n)| (*r, *n))
    }
}

#[derive(Debug, Clone, Copy)]
struct Staged {
    seq: u64,
    record: SnvRecord,
}

/// Builds and publishes the partitions of one catalog
pub struct PartitionBuilder {
    layout: StoreLayout,
    options: BuildOptions,
    partitions: BTreeMap<Chromosome, Vec<Staged>>,
    total: usize,
    rejects: RejectCounts,
    #[cfg(test)]
    fail_writing: Option<TableKind>,
}

impl PartitionBuilder {
    #[must_use]
    pub fn new(layout: StoreLayout, options: BuildOptions) -> Self {
        Self {
            layout,
            options,
            partitions: BTreeMap::new(),
            total: 0,
            rejects: RejectCounts::default(),
            #[cfg(test)]
            fail_writing: None,
        }
    }

    /// Validate and stage one record. Invalid records are counted, never
    /// staged.
    pub fn push(&mut self, record: &VariantRecord) {
        let seq = self.total as u64;
        self.total += 1;

        match SnvRecord::validate(record) {
            Ok(record) => {
                self.partitions
                    .entry(record.chromosome)
                    .or_default()
                    .push(Staged { seq, record });
            }
            Err(reason) => {
                debug!("Rejected {} ({}:{}): {reason}", record.rsid, record.chrom, record.pos);
                self.rejects.add(reason);
            }
        }

        if self.total % PROGRESS_INTERVAL == 0 {
            info!(
                "Progress: {} records read, {} rejected",
                self.total,
                self.rejects.total()
            );
        }
    }

    /// Sort, check, write and publish all partitions
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::Integrity` under `IntegrityPolicy::Fail` when an
    /// identifier is on two chromosomes, `BuilderError::RejectRateExceeded` or
    /// `BuilderError::NoRecords` when the input is unusable, and I/O or
    /// Parquet errors from writing. `BuilderError::Publish` means a rename or
    /// removal failed; the files already swapped in were restored first. On
    /// any error the previously published store is left as it was.
    pub fn finish(mut self) -> Result<BuildSummary, BuilderError> {
        for rows in self.partitions.values_mut() {
            rows.sort_by_key(|s| s.record.rsid.number());
            let before = rows.len();
            rows.dedup_by_key(|s| s.record.rsid.number());
            for _ in rows.len()..before {
                self.rejects.add(RejectReason::DuplicateIdentifier);
            }
        }

        let conflicts = resolve_conflicts(&mut self.partitions);
        for conflict in conflicts.iter().take(MAX_LOGGED_CONFLICTS) {
            warn!("Identifier on two chromosomes: {conflict}");
        }
        if conflicts.len() > MAX_LOGGED_CONFLICTS {
            warn!(
                "... and {} more identifier conflicts",
                conflicts.len() - MAX_LOGGED_CONFLICTS
            );
        }
        if !conflicts.is_empty() && self.options.integrity == IntegrityPolicy::Fail {
            return Err(BuilderError::Integrity(conflicts));
        }

        let rejected = self.rejects.total();
        if let Some(threshold) = self.options.max_reject_fraction {
            #[allow(clippy::cast_precision_loss)]
            let fraction = if self.total == 0 {
                0.0
            } else {
                rejected as f64 / self.total as f64
            };
            if fraction > threshold {
                return Err(BuilderError::RejectRateExceeded {
                    rejected,
                    total: self.total,
                    threshold,
                });
            }
        }

        self.partitions.retain(|_, rows| !rows.is_empty());
        if self.partitions.is_empty() {
            return Err(BuilderError::NoRecords { rejected });
        }

        let root = self.layout.root().to_path_buf();
        std::fs::create_dir_all(&root)?;

        // Phase 1: write everything to temporaries
        let mut staged_files: Vec<(NamedTempFile, PathBuf)> = Vec::new();
        let mut partitions = Vec::with_capacity(self.partitions.len());

        for (chromosome, rows) in &self.partitions {
            let path = self.layout.partition_path(*chromosome);
            let kind = TableKind::Partition(*chromosome);
            let (tmp, written) = self.write_table(&root, kind, rows.iter().map(|s| s.record))?;
            debug!("Wrote {written} rows for chromosome {chromosome}");
            partitions.push(PartitionEntry {
                chromosome: *chromosome,
                rows: written,
                file: file_name(&path),
            });
            staged_files.push((tmp, path));
        }

        let accepted: usize = partitions.iter().map(|p| p.rows).sum();

        if self.options.write_catalog {
            let records = self
                .partitions
                .values()
                .flat_map(|rows| rows.iter().map(|s| s.record));
            let (tmp, written) = self.write_table(&root, TableKind::Catalog, records)?;
            debug!("Wrote {written} rows to the catalog table");
            staged_files.push((tmp, self.layout.catalog_path()));
        }

        let manifest = BuildManifest::new(
            self.layout.catalog(),
            self.total,
            accepted,
            self.rejects.clone(),
            conflicts.clone(),
            partitions.clone(),
        );
        let mut tmp = temp_in(&root, "manifest")?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), &manifest)?;
        tmp.as_file().sync_all()?;
        staged_files.push((tmp, self.layout.manifest_path()));

        // Phase 2: swap the new set in, or put the old one back
        let built: HashSet<Chromosome> = self.partitions.keys().copied().collect();
        let stale: Vec<PathBuf> = self
            .layout
            .existing_partitions()
            .into_iter()
            .filter(|c| !built.contains(c))
            .map(|c| self.layout.partition_path(c))
            .collect();

        let mut publication = Publication::new(&root);
        if let Err(err) = publication.apply(staged_files, &stale) {
            warn!("Publish failed, restoring the previous store: {err}");
            publication.rollback();
            return Err(err);
        }
        publication.commit();

        let summary = BuildSummary {
            catalog: self.layout.catalog().to_string(),
            total_records: self.total,
            accepted,
            rejects: self.rejects,
            conflicts,
            partitions,
            catalog_written: self.options.write_catalog,
        };
        info!(
            "Build complete: {} partitions, {} records accepted, {} rejected, {} conflicts",
            summary.partitions.len(),
            summary.accepted,
            summary.rejects.total(),
            summary.conflicts.len()
        );
        Ok(summary)
    }

    /// Stream records into a new temporary table in `root`
    fn write_table(
        &self,
        root: &Path,
        kind: TableKind,
        records: impl Iterator<Item = SnvRecord>,
    ) -> Result<(NamedTempFile, usize), BuilderError> {
        let tag = match kind {
            TableKind::Partition(c) => format!("chr{c}"),
            TableKind::Catalog => "catalog".to_string(),
        };
        let tmp = temp_in(root, &tag)?;
        let mut writer = TableWriter::try_new(
            tmp,
            kind,
            self.options.batch_size,
            self.options.row_group_size,
        )?;
        for record in records {
            writer.push(record)?;
        }
        #[cfg(test)]
        if self.fail_writing == Some(kind) {
            return Err(BuilderError::Io(std::io::Error::other(
                "simulated write failure",
            )));
        }
        let (tmp, written) = writer.finish()?;
        tmp.as_file().sync_all()?;
        Ok((tmp, written))
    }
}

/// Build a store from an in-memory or streaming sequence of records
///
/// # Errors
///
/// See [`PartitionBuilder::finish`].
pub fn build<I>(
    layout: StoreLayout,
    options: BuildOptions,
    records: I,
) -> Result<BuildSummary, BuilderError>
where
    I: IntoIterator<Item = VariantRecord>,
{
    let mut builder = PartitionBuilder::new(layout, options);
    for record in records {
        builder.push(&record);
    }
    builder.finish()
}

/// Like [`build`] for fallible streams such as the VCF reader. The first
/// input error aborts the build without publishing anything.
///
/// # Errors
///
/// Returns the input error, or see [`PartitionBuilder::finish`].
pub fn try_build<I, E>(
    layout: StoreLayout,
    options: BuildOptions,
    records: I,
) -> Result<BuildSummary, BuilderError>
where
    I: IntoIterator<Item = Result<VariantRecord, E>>,
    BuilderError: From<E>,
{
    let mut builder = PartitionBuilder::new(layout, options);
    for record in records {
        builder.push(&record?);
    }
    builder.finish()
}

/// Find identifiers present in more than one partition. The occurrence with
/// the lowest input sequence number is kept; the others are removed from their
/// partitions and returned as conflicts.
fn resolve_conflicts(partitions: &mut BTreeMap<Chromosome, Vec<Staged>>) -> Vec<IntegrityConflict> {
    let lists: Vec<(Chromosome, &Vec<Staged>)> =
        partitions.iter().map(|(c, rows)| (*c, rows)).collect();

    // k-way merge over the sorted partitions
    let mut heap: BinaryHeap<Reverse<(u64, usize, usize)>> = BinaryHeap::new();
    for (i, (_, rows)) in lists.iter().enumerate() {
        if let Some(first) = rows.first() {
            heap.push(Reverse((first.record.rsid.number(), i, 0)));
        }
    }

    let mut conflicts = Vec::new();
    let mut losers: Vec<(Chromosome, u64)> = Vec::new();
    let mut group: Vec<Staged> = Vec::new();
    let mut group_key: Option<u64> = None;

    let mut close_group = |group: &mut Vec<Staged>, conflicts: &mut Vec<IntegrityConflict>| {
        if group.len() > 1 {
            group.sort_by_key(|s| s.seq);
            let keep = group[0].record;
            for other in &group[1..] {
                conflicts.push(IntegrityConflict {
                    rsid: keep.rsid,
                    first: Occurrence {
                        chromosome: keep.chromosome,
                        position: keep.position,
                    },
                    second: Occurrence {
                        chromosome: other.record.chromosome,
                        position: other.record.position,
                    },
                });
                losers.push((other.record.chromosome, other.record.rsid.number()));
            }
        }
        group.clear();
    };

    while let Some(Reverse((key, i, j))) = heap.pop() {
        let rows = lists[i].1;
        if let Some(next) = rows.get(j + 1) {
            heap.push(Reverse((next.record.rsid.number(), i, j + 1)));
        }
        if group_key != Some(key) {
            close_group(&mut group, &mut conflicts);
            group_key = Some(key);
        }
        group.push(rows[j]);
    }
    close_group(&mut group, &mut conflicts);

    for (chromosome, key) in losers {
        if let Some(rows) = partitions.get_mut(&chromosome) {
            if let Ok(idx) = rows.binary_search_by_key(&key, |s| s.record.rsid.number()) {
                rows.remove(idx);
            }
        }
    }

    conflicts
}

fn temp_in(root: &Path, tag: &str) -> Result<NamedTempFile, BuilderError> {
    Ok(tempfile::Builder::new()
        .prefix(&format!(".{tag}."))
        .suffix(".tmp")
        .tempfile_in(root)?)
}

/// Files swapped into the store root by one build, with a backup of whatever
/// each target held before
struct Publication<'a> {
    root: &'a Path,
    done: Vec<(PathBuf, Option<TempPath>)>,
}

impl<'a> Publication<'a> {
    fn new(root: &'a Path) -> Self {
        Self {
            root,
            done: Vec::new(),
        }
    }

    fn apply(
        &mut self,
        files: Vec<(NamedTempFile, PathBuf)>,
        stale: &[PathBuf],
    ) -> Result<(), BuilderError> {
        for (tmp, path) in files {
            self.replace(tmp, &path)?;
        }
        for path in stale {
            info!("Removing stale partition {}", path.display());
            self.remove(path)?;
        }
        Ok(())
    }

    /// Hard-link an existing file to a hidden backup next to it
    fn backup(&self, path: &Path) -> Result<Option<TempPath>, BuilderError> {
        if !path.is_file() {
            return Ok(None);
        }
        tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name(path)))
            .suffix(".bak")
            .make_in(self.root, |backup| std::fs::hard_link(path, backup))
            .map(|tmp| Some(tmp.into_temp_path()))
            .map_err(|source| BuilderError::Publish {
                path: path.to_path_buf(),
                source,
            })
    }

    fn replace(&mut self, tmp: NamedTempFile, path: &Path) -> Result<(), BuilderError> {
        let backup = self.backup(path)?;
        publish(tmp, path)?;
        self.done.push((path.to_path_buf(), backup));
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> Result<(), BuilderError> {
        let backup = self.backup(path)?;
        std::fs::remove_file(path).map_err(|source| BuilderError::Publish {
            path: path.to_path_buf(),
            source,
        })?;
        self.done.push((path.to_path_buf(), backup));
        Ok(())
    }

    /// Undo every change, newest first
    fn rollback(self) {
        for (path, backup) in self.done.into_iter().rev() {
            let restored = match backup {
                Some(backup) => backup.persist(&path).map_err(|e| e.error),
                None => std::fs::remove_file(&path),
            };
            match restored {
                Ok(()) => debug!("Restored {}", path.display()),
                Err(e) => warn!("Failed to restore {}: {e}", path.display()),
            }
        }
    }

    /// Keep the new files. The backups are deleted on drop.
    fn commit(self) {
        debug!("Published {} file change(s)", self.done.len());
    }
}

/// Atomically rename a finished temporary into place
fn publish(tmp: NamedTempFile, path: &Path) -> Result<(), BuilderError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }
    let file: File = tmp.persist(path).map_err(|e| BuilderError::Publish {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    drop(file);
    debug!("Published {}", path.display());
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Outcome of a successful build
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub catalog: String,
    pub total_records: usize,
    pub accepted: usize,
    pub rejects: RejectCounts,
    pub conflicts: Vec<IntegrityConflict>,
    pub partitions: Vec<PartitionEntry>,
    pub catalog_written: bool,
}

impl BuildSummary {
    #[must_use]
    pub fn partition_rows(&self, chromosome: Chromosome) -> Option<usize> {
        self.partitions
            .iter()
            .find(|p| p.chromosome == chromosome)
            .map(|p| p.rows)
    }
}

impl std::fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Partition Build Summary")?;
        writeln!(f, "=======================")?;
        writeln!(f, "Catalog:  {}", self.catalog)?;
        writeln!(f, "Records:  {}", self.total_records)?;
        writeln!(f, "Accepted: {}", self.accepted)?;
        writeln!(f, "Rejected: {}", self.rejects.total())?;
        for (reason, count) in self.rejects.iter() {
            writeln!(f, "  - {reason}: {count}")?;
        }
        writeln!(f)?;

        writeln!(f, "Partitions: {}", self.partitions.len())?;
        for partition in &self.partitions {
            writeln!(
                f,
                "  chr{:<3} {:>12} rows  {}",
                partition.chromosome.label(),
                partition.rows,
                partition.file
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Conflicts: {}", self.conflicts.len())?;
        for conflict in self.conflicts.iter().take(MAX_LOGGED_CONFLICTS) {
            writeln!(f, "  - {conflict}")?;
        }
        if self.conflicts.len() > MAX_LOGGED_CONFLICTS {
            writeln!(
                f,
                "  ... and {} more",
                self.conflicts.len() - MAX_LOGGED_CONFLICTS
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::columnar::read_records;
    use crate::config::StoreConfig;

    fn layout(dir: &Path) -> StoreLayout {
        StoreLayout::new(&StoreConfig::new(dir, "test").unwrap())
    }

    fn rec(rsid: &str, chrom: &str, pos: u64, r: &str, a: &str) -> VariantRecord {
        VariantRecord::new(rsid, chrom, pos, r, a)
    }

    fn chrom(label: &str) -> Chromosome {
        Chromosome::parse(label).unwrap()
    }

    #[test]
    fn test_groups_by_chromosome() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            rec("rs1042522", "17", 7_676_154, "G", "C"),
            rec("rs28934578", "17", 7_675_088, "C", "T"),
            rec("rs6025", "1", 169_549_811, "C", "T"),
            rec("rs5030868", "X", 154_534_419, "G", "A"),
            rec("rs1800372", "17", 43_045_711, "T", "A"),
        ];
        let summary = build(layout(dir.path()), BuildOptions::default(), records).unwrap();

        assert_eq!(summary.partitions.len(), 3);
        assert_eq!(summary.partition_rows(chrom("17")), Some(3));
        assert_eq!(summary.partition_rows(chrom("1")), Some(1));
        assert_eq!(summary.partition_rows(chrom("X")), Some(1));
        assert_eq!(summary.accepted, 5);
        assert_eq!(summary.rejects.total(), 0);

        let chr17 = read_records(&layout(dir.path()).partition_path(chrom("17"))).unwrap();
        let ids: Vec<String> = chr17.iter().map(|r| r.rsid.to_string()).collect();
        assert_eq!(ids, vec!["rs1042522", "rs1800372", "rs28934578"]);
        assert!(chr17.iter().all(|r| r.chromosome == chrom("17")));

        let all = read_records(&layout(dir.path()).catalog_path()).unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_rejects_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            rec("rs1", "1", 100, "A", "G"),
            rec("rs2", "1", 200, "A", "G,T"),
            rec("rs3", "1", 300, "AT", "A"),
            rec("bogus", "1", 400, "A", "G"),
            rec("rs5", "chrUn", 500, "A", "G"),
            rec("rs1", "1", 100, "A", "G"),
        ];
        let summary = build(layout(dir.path()), BuildOptions::default(), records).unwrap();

        assert_eq!(summary.total_records, 6);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejects.total(), 5);
        assert_eq!(summary.rejects.get(RejectReason::MultiAllelic), 1);
        assert_eq!(summary.rejects.get(RejectReason::NonSnv), 1);
        assert_eq!(summary.rejects.get(RejectReason::MalformedIdentifier), 1);
        assert_eq!(summary.rejects.get(RejectReason::NonStandardChromosome), 1);
        assert_eq!(summary.rejects.get(RejectReason::DuplicateIdentifier), 1);
    }

    #[test]
    fn test_integrity_conflict_fails_build() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            rec("rs7", "2", 1000, "A", "G"),
            rec("rs8", "2", 2000, "C", "T"),
            rec("rs7", "5", 3000, "A", "G"),
        ];
        let err = build(layout(dir.path()), BuildOptions::default(), records).unwrap_err();
        match err {
            BuilderError::Integrity(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].rsid.to_string(), "rs7");
                assert_eq!(conflicts[0].first.chromosome, chrom("2"));
                assert_eq!(conflicts[0].first.position, 1000);
                assert_eq!(conflicts[0].second.chromosome, chrom("5"));
                assert_eq!(conflicts[0].second.position, 3000);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing was published
        assert!(layout(dir.path()).existing_partitions().is_empty());
        assert!(!layout(dir.path()).manifest_path().exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_integrity_report_keeps_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        // rs7 appears on chr5 first in the input, then on chr2
        let records = vec![
            rec("rs7", "5", 3000, "A", "G"),
            rec("rs8", "2", 2000, "C", "T"),
            rec("rs7", "2", 1000, "A", "G"),
            rec("rs7", "X", 10, "C", "G"),
        ];
        let options = BuildOptions {
            integrity: IntegrityPolicy::Report,
            ..BuildOptions::default()
        };
        let summary = build(layout(dir.path()), options, records).unwrap();

        assert_eq!(summary.conflicts.len(), 2);
        assert!(summary
            .conflicts
            .iter()
            .all(|c| c.first.chromosome == chrom("5")));
        assert_eq!(summary.partition_rows(chrom("5")), Some(1));
        assert_eq!(summary.partition_rows(chrom("2")), Some(1));
        // chrX only held the conflicting record
        assert_eq!(summary.partition_rows(chrom("X")), None);
        assert!(!layout(dir.path()).partition_path(chrom("X")).exists());
    }

    #[test]
    fn test_reject_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            rec("rs1", "1", 100, "A", "G"),
            rec("rs2", "1", 200, "A", "G,T"),
            rec("rs3", "1", 300, "AT", "A"),
        ];
        let options = BuildOptions {
            max_reject_fraction: Some(0.5),
            ..BuildOptions::default()
        };
        let err = build(layout(dir.path()), options, records).unwrap_err();
        assert!(matches!(
            err,
            BuilderError::RejectRateExceeded {
                rejected: 2,
                total: 3,
                ..
            }
        ));
        assert!(layout(dir.path()).existing_partitions().is_empty());
    }

    #[test]
    fn test_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let err = build(
            layout(dir.path()),
            BuildOptions::default(),
            vec![rec("rs1", "1", 1, "A", "A,C")],
        )
        .unwrap_err();
        assert!(matches!(err, BuilderError::NoRecords { rejected: 1 }));
    }

    #[test]
    fn test_rebuild_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            rec("rs30", "3", 30, "A", "C"),
            rec("rs10", "3", 10, "G", "T"),
            rec("rs20", "4", 20, "C", "A"),
        ];
        build(layout(dir.path()), BuildOptions::default(), records.clone()).unwrap();
        let path = layout(dir.path()).partition_path(chrom("3"));
        let first = std::fs::read(&path).unwrap();

        build(layout(dir.path()), BuildOptions::default(), records).unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rebuild_removes_stale_partitions() {
        let dir = tempfile::tempdir().unwrap();
        build(
            layout(dir.path()),
            BuildOptions::default(),
            vec![rec("rs1", "1", 1, "A", "C"), rec("rs2", "2", 2, "A", "C")],
        )
        .unwrap();
        assert_eq!(layout(dir.path()).existing_partitions().len(), 2);

        build(
            layout(dir.path()),
            BuildOptions::default(),
            vec![rec("rs1", "1", 1, "A", "C")],
        )
        .unwrap();
        assert_eq!(layout(dir.path()).existing_partitions(), vec![chrom("1")]);
    }

    #[test]
    fn test_small_batches() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<VariantRecord> = (1..=25)
            .map(|i| rec(&format!("rs{i}"), "9", i * 10, "A", "G"))
            .collect();
        let options = BuildOptions {
            batch_size: 4,
            write_catalog: false,
            ..BuildOptions::default()
        };
        let summary = build(layout(dir.path()), options, records).unwrap();
        assert_eq!(summary.partition_rows(chrom("9")), Some(25));
        assert!(!summary.catalog_written);
        assert!(!layout(dir.path()).catalog_path().exists());

        let rows = read_records(&layout(dir.path()).partition_path(chrom("9"))).unwrap();
        assert_eq!(rows.len(), 25);
        assert!(rows.windows(2).all(|w| w[0].rsid < w[1].rsid));
    }

    #[test]
    fn test_abandoned_builder_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = PartitionBuilder::new(layout(dir.path()), BuildOptions::default());
        builder.push(&rec("rs1", "1", 1, "A", "C"));
        drop(builder);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_failed_table_write_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        build(
            layout(dir.path()),
            BuildOptions::default(),
            vec![rec("rs1", "1", 100, "A", "C"), rec("rs2", "2", 200, "A", "C")],
        )
        .unwrap();
        let before = listing(dir.path());

        // Partitions are already staged when the catalog table fails
        let mut builder = PartitionBuilder::new(layout(dir.path()), BuildOptions::default());
        builder.fail_writing = Some(TableKind::Catalog);
        builder.push(&rec("rs1", "1", 999, "A", "C"));
        let err = builder.finish().unwrap_err();
        assert!(matches!(err, BuilderError::Io(_)), "{err}");

        assert_eq!(listing(dir.path()), before);
        let chr1 = read_records(&layout(dir.path()).partition_path(chrom("1"))).unwrap();
        assert_eq!(chr1[0].position, 100);
        assert_eq!(layout(dir.path()).existing_partitions().len(), 2);
    }

    #[test]
    fn test_failed_publish_restores_previous_store() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        build(
            layout.clone(),
            BuildOptions::default(),
            vec![rec("rs1", "1", 100, "A", "C"), rec("rs2", "2", 200, "A", "C")],
        )
        .unwrap();

        // The manifest is renamed last; a directory in its place makes that fail
        std::fs::remove_file(layout.manifest_path()).unwrap();
        std::fs::create_dir(layout.manifest_path()).unwrap();
        std::fs::write(layout.manifest_path().join("keep"), b"x").unwrap();
        let before = listing(dir.path());

        let err = build(
            layout.clone(),
            BuildOptions::default(),
            vec![rec("rs1", "1", 999, "A", "C"), rec("rs3", "3", 300, "A", "C")],
        )
        .unwrap_err();
        assert!(matches!(err, BuilderError::Publish { .. }), "{err}");

        // Replaced files are back, the new partition is gone, no backups left
        assert_eq!(listing(dir.path()), before);
        assert_eq!(layout.existing_partitions(), vec![chrom("1"), chrom("2")]);
        let chr1 = read_records(&layout.partition_path(chrom("1"))).unwrap();
        assert_eq!(chr1[0].position, 100);
        let catalog = read_records(&layout.catalog_path()).unwrap();
        let positions: Vec<u64> = catalog.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![100, 200]);
    }

    #[test]
    fn test_aggregate_streams_every_partition_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let options = BuildOptions {
            batch_size: 2,
            row_group_size: 3,
            ..BuildOptions::default()
        };
        let records = vec![
            rec("rs50", "X", 5, "A", "C"),
            rec("rs7", "2", 7, "A", "C"),
            rec("rs3", "2", 3, "A", "C"),
            rec("rs90", "1", 9, "A", "C"),
            rec("rs1", "X", 1, "A", "C"),
        ];
        build(layout(dir.path()), options, records).unwrap();

        let catalog = read_records(&layout(dir.path()).catalog_path()).unwrap();
        let ids: Vec<String> = catalog.iter().map(|r| r.rsid.to_string()).collect();
        assert_eq!(ids, vec!["rs90", "rs3", "rs7", "rs1", "rs50"]);
    }
}
