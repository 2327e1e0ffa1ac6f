use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::columnar::StorageError;
use crate::catalog::index::PartitionIndex;
use crate::catalog::store::VariantStore;
use crate::core::contig::standardize_contig;
use crate::core::types::{Chromosome, IdentifierError, RsId};
use crate::core::variant::SnvRecord;
use crate::lookup::result::{LookupRow, QueryResult, Resolution};

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Partition for chromosome {chromosome} is unreadable: {source}")]
    Partition {
        chromosome: Chromosome,
        #[source]
        source: StorageError,
    },
}

/// Tie-break when an identifier is present in more than one partition.
/// Only observable on stores built without the disjointness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Probe every partition; report identifiers found more than once as
    /// [`Resolution::Ambiguous`] with every match
    #[default]
    AllMatches,
    /// Stop at the first partition (canonical chromosome order) holding the
    /// identifier
    FirstMatch,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub policy: MatchPolicy,
}

/// A query session over one store.
///
/// The session keeps every partition it opens, with the row groups decoded so
/// far, until [`invalidate`](Self::invalidate) is called. Open partitions hold
/// their file handle, so all queries made through the session see one
/// consistent snapshot even if the store is rebuilt meanwhile. Call
/// `invalidate` after a rebuild completes to pick up the new data.
pub struct LookupSession<'a> {
    store: &'a VariantStore,
    options: QueryOptions,
    /// Partition set captured on first use of `query_all`
    chromosomes: Option<Vec<Chromosome>>,
    /// `None` records a partition known to be absent
    cache: HashMap<Chromosome, Option<PartitionIndex>>,
}

impl<'a> LookupSession<'a> {
    #[must_use]
    pub fn new(store: &'a VariantStore, options: QueryOptions) -> Self {
        Self {
            store,
            options,
            chromosomes: None,
            cache: HashMap::new(),
        }
    }

    /// Drop every loaded partition
    pub fn invalidate(&mut self) {
        self.chromosomes = None;
        self.cache.clear();
    }

    /// Drop one loaded partition and the captured partition set; other
    /// partitions keep their snapshot
    pub fn invalidate_chromosome(&mut self, chromosome: Chromosome) {
        self.chromosomes = None;
        self.cache.remove(&chromosome);
    }

    /// Chromosomes whose partitions are currently loaded
    #[must_use]
    pub fn loaded_chromosomes(&self) -> Vec<Chromosome> {
        let mut loaded: Vec<Chromosome> = self
            .cache
            .iter()
            .filter(|(_, index)| index.is_some())
            .map(|(c, _)| *c)
            .collect();
        loaded.sort();
        loaded
    }

    /// Resolve identifiers against every partition.
    ///
    /// Each partition is opened at most once per session and searched once
    /// per call for all identifiers still pending. Output rows align 1:1 with
    /// `identifiers`, duplicates included.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Partition` if a partition file exists but cannot
    /// be read. Missing identifiers are never an error.
    pub fn query_all<S: AsRef<str>>(
        &mut self,
        identifiers: &[S],
    ) -> Result<QueryResult, LookupError> {
        let parsed = parse_all(identifiers);
        let mut pending = unique_ids(&parsed);
        let policy = self.options.policy;

        let chromosomes = match &self.chromosomes {
            Some(chromosomes) => chromosomes.clone(),
            None => {
                let chromosomes = self.store.chromosomes();
                self.chromosomes = Some(chromosomes.clone());
                chromosomes
            }
        };

        let mut found: HashMap<RsId, Vec<SnvRecord>> = HashMap::new();
        for chromosome in chromosomes {
            if pending.is_empty() {
                break;
            }
            let Some(index) = self.partition(chromosome)? else {
                continue;
            };

            let hits = index
                .lookup(&pending)
                .map_err(|source| LookupError::Partition { chromosome, source })?;
            debug!(
                "chr{chromosome}: {} of {} identifiers found, {}/{} row groups decoded",
                hits.len(),
                pending.len(),
                index.decoded_row_groups(),
                index.num_row_groups()
            );
            for record in hits {
                found.entry(record.rsid).or_default().push(record);
            }
            if policy == MatchPolicy::FirstMatch {
                pending.retain(|id| !found.contains_key(id));
            }
        }

        for (id, matches) in &found {
            if matches.len() > 1 {
                let chromosomes: Vec<&str> = matches.iter().map(|r| r.chromosome.label()).collect();
                warn!("{id} found in {} partitions: {}", matches.len(), chromosomes.join(", "));
            }
        }

        Ok(build_result(identifiers, parsed, |id| {
            found.get(&id).cloned().unwrap_or_default()
        }))
    }

    /// Resolve identifiers against one chromosome's partition only.
    ///
    /// The chromosome is standardized first (`chr17` is `17`). An unknown
    /// chromosome or a missing partition leaves every row unresolved.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Partition` if the partition file exists but
    /// cannot be read.
    pub fn query_chromosome<S: AsRef<str>>(
        &mut self,
        identifiers: &[S],
        chromosome: &str,
    ) -> Result<QueryResult, LookupError> {
        let parsed = parse_all(identifiers);

        let mut found: HashMap<RsId, SnvRecord> = HashMap::new();
        match standardize_contig(chromosome) {
            Some(standard) => {
                if let Some(index) = self.partition(standard)? {
                    let hits = index.lookup(&unique_ids(&parsed)).map_err(|source| {
                        LookupError::Partition {
                            chromosome: standard,
                            source,
                        }
                    })?;
                    found.extend(hits.into_iter().map(|record| (record.rsid, record)));
                }
            }
            None => debug!("'{chromosome}' is not a standard chromosome; nothing can resolve"),
        }

        Ok(build_result(identifiers, parsed, |id| {
            found.get(&id).copied().into_iter().collect()
        }))
    }

    /// Open (or reuse) a partition. `Ok(None)` when no partition file exists.
    fn partition(
        &mut self,
        chromosome: Chromosome,
    ) -> Result<Option<&mut PartitionIndex>, LookupError> {
        if !self.cache.contains_key(&chromosome) {
            let opened = self.open_partition(chromosome)?;
            self.cache.insert(chromosome, opened);
        }
        Ok(self.cache.get_mut(&chromosome).and_then(Option::as_mut))
    }

    fn open_partition(
        &self,
        chromosome: Chromosome,
    ) -> Result<Option<PartitionIndex>, LookupError> {
        let path = self.store.layout().partition_path(chromosome);
        match PartitionIndex::open(&path, chromosome) {
            Ok(index) => {
                debug!(
                    "Opened {} ({} rows in {} row groups)",
                    path.display(),
                    index.num_rows(),
                    index.num_row_groups()
                );
                Ok(Some(index))
            }
            Err(StorageError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                debug!("No partition for chromosome {chromosome}");
                Ok(None)
            }
            Err(source) => Err(LookupError::Partition { chromosome, source }),
        }
    }
}

/// Well-formed identifiers, sorted and deduplicated
fn unique_ids(parsed: &[Result<RsId, IdentifierError>]) -> Vec<RsId> {
    let mut ids: Vec<RsId> = parsed.iter().filter_map(|p| p.as_ref().ok()).copied().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn parse_all<S: AsRef<str>>(identifiers: &[S]) -> Vec<Result<RsId, IdentifierError>> {
    identifiers.iter().map(|s| s.as_ref().parse()).collect()
}

fn build_result<S, F>(
    identifiers: &[S],
    parsed: Vec<Result<RsId, IdentifierError>>,
    mut matches_for: F,
) -> QueryResult
where
    S: AsRef<str>,
    F: FnMut(RsId) -> Vec<SnvRecord>,
{
    let rows = identifiers
        .iter()
        .zip(parsed)
        .map(|(query, parsed)| {
            let resolution = match parsed {
                Err(e) => Resolution::Malformed(e),
                Ok(id) => {
                    let mut matches = matches_for(id);
                    match matches.len() {
                        0 => Resolution::Unresolved,
                        1 => Resolution::Resolved(matches.remove(0)),
                        _ => Resolution::Ambiguous(matches),
                    }
                }
            };
            LookupRow {
                query: query.as_ref().to_string(),
                resolution,
            }
        })
        .collect();
    QueryResult::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builder::{build, BuildOptions};
    use crate::catalog::columnar::{TableKind, TableWriter};
    use crate::config::StoreConfig;
    use crate::core::types::Base;
    use crate::core::variant::VariantRecord;

    fn store(dir: &std::path::Path) -> VariantStore {
        VariantStore::from_config(&StoreConfig::new(dir, "test").unwrap())
    }

    fn build_store(dir: &std::path::Path, records: Vec<VariantRecord>) -> VariantStore {
        let store = store(dir);
        build(store.layout().clone(), BuildOptions::default(), records).unwrap();
        store
    }

    fn rec(rsid: &str, chrom: &str, pos: u64, r: &str, a: &str) -> VariantRecord {
        VariantRecord::new(rsid, chrom, pos, r, a)
    }

    /// Write a partition by hand, bypassing the builder's disjointness check
    fn write_partition(store: &VariantStore, chromosome: &str, records: &[SnvRecord]) {
        let chromosome = Chromosome::parse(chromosome).unwrap();
        let file = std::fs::File::create(store.layout().partition_path(chromosome)).unwrap();
        let mut writer =
            TableWriter::try_new(file, TableKind::Partition(chromosome), 100, 100).unwrap();
        for record in records {
            writer.push(*record).unwrap();
        }
        writer.finish().unwrap();
    }

    fn snv(rs: u64, chrom: &str, pos: u64) -> SnvRecord {
        SnvRecord {
            rsid: RsId::new(rs),
            chromosome: Chromosome::parse(chrom).unwrap(),
            position: pos,
            reference: Base::A,
            alternate: Base::G,
        }
    }

    #[test]
    fn test_query_all_preserves_order_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            vec![
                rec("rs10", "1", 100, "A", "G"),
                rec("rs20", "2", 200, "C", "T"),
                rec("rs30", "X", 300, "G", "A"),
            ],
        );

        let ids = ["rs30", "rs10", "rs99", "rs30", "junk", "rs20"];
        let result = store.query_all(&ids).unwrap();
        assert_eq!(result.len(), ids.len());

        let queries: Vec<&str> = result.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(queries, ids);

        let chroms: Vec<Option<&str>> = result
            .iter()
            .map(|r| r.record().map(|rec| rec.chromosome.label()))
            .collect();
        assert_eq!(
            chroms,
            vec![Some("X"), Some("1"), None, Some("X"), None, Some("2")]
        );
        assert!(matches!(
            result.rows()[4].resolution,
            Resolution::Malformed(_)
        ));
        assert_eq!(result.unresolved(), vec!["rs99", "junk"]);
    }

    #[test]
    fn test_query_chromosome_is_a_hard_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            vec![
                rec("rs10", "1", 100, "A", "G"),
                rec("rs20", "2", 200, "C", "T"),
            ],
        );

        let result = store.query_chromosome(&["rs10", "rs20"], "2").unwrap();
        assert_eq!(result.rows()[0].resolution, Resolution::Unresolved);
        assert_eq!(result.rows()[1].record().unwrap().position, 200);

        // Lenient chromosome naming
        let result = store.query_chromosome(&["rs20"], "chr2").unwrap();
        assert_eq!(result.resolved_count(), 1);
    }

    #[test]
    fn test_unknown_chromosome_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(dir.path(), vec![rec("rs10", "1", 100, "A", "G")]);

        for chromosome in ["5", "banana", ""] {
            let result = store.query_chromosome(&["rs10", "rs11"], chromosome).unwrap();
            assert_eq!(result.len(), 2);
            assert_eq!(result.resolved_count(), 0);
        }
    }

    #[test]
    fn test_empty_store_and_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let result = store.query_all(&["rs1"]).unwrap();
        assert_eq!(result.unresolved(), vec!["rs1"]);

        let empty: [&str; 0] = [];
        assert!(store.query_all(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_partition_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(dir.path(), vec![rec("rs10", "1", 100, "A", "G")]);
        let chr3 = Chromosome::parse("3").unwrap();
        std::fs::write(store.layout().partition_path(chr3), b"garbage").unwrap();

        // Scoped to a healthy partition: fine
        assert!(store.query_chromosome(&["rs10"], "1").is_ok());

        let err = store.query_all(&["rs10"]).unwrap_err();
        let LookupError::Partition { chromosome, source } = err;
        assert_eq!(chromosome, chr3);
        assert!(matches!(source, StorageError::Parquet { .. }));
    }

    #[test]
    fn test_ambiguous_matches_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        write_partition(&store, "1", &[snv(5, "1", 50), snv(6, "1", 60)]);
        write_partition(&store, "7", &[snv(5, "7", 500)]);

        let result = store.query_all(&["rs5", "rs6"]).unwrap();
        let ambiguous = result.ambiguous();
        assert_eq!(ambiguous.len(), 1);
        let labels: Vec<&str> = ambiguous[0]
            .matches()
            .iter()
            .map(|r| r.chromosome.label())
            .collect();
        assert_eq!(labels, vec!["1", "7"]);
        assert_eq!(result.rows()[1].resolution, Resolution::Resolved(snv(6, "1", 60)));

        let mut first_match = store.session_with(QueryOptions {
            policy: MatchPolicy::FirstMatch,
        });
        let result = first_match.query_all(&["rs5"]).unwrap();
        assert_eq!(result.rows()[0].resolution, Resolution::Resolved(snv(5, "1", 50)));
    }

    #[test]
    fn test_first_match_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            vec![rec("rs10", "1", 100, "A", "G"), rec("rs20", "2", 200, "C", "T")],
        );
        let mut session = store.session_with(QueryOptions {
            policy: MatchPolicy::FirstMatch,
        });
        session.query_all(&["rs10"]).unwrap();
        // Everything resolved in chr1, so chr2 was never opened
        assert_eq!(
            session.loaded_chromosomes(),
            vec![Chromosome::parse("1").unwrap()]
        );

        let mut session = store.session();
        session.query_all(&["rs10"]).unwrap();
        assert_eq!(session.loaded_chromosomes().len(), 2);
    }

    #[test]
    fn test_session_keeps_snapshot_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(dir.path(), vec![rec("rs10", "1", 100, "A", "G")]);
        let mut session = store.session();
        assert_eq!(session.query_all(&["rs10"]).unwrap().resolved_count(), 1);

        build(
            store.layout().clone(),
            BuildOptions::default(),
            vec![rec("rs11", "1", 110, "A", "G")],
        )
        .unwrap();

        let result = session.query_all(&["rs10", "rs11"]).unwrap();
        assert_eq!(result.unresolved(), vec!["rs11"]);

        session.invalidate();
        let result = session.query_all(&["rs10", "rs11"]).unwrap();
        assert_eq!(result.unresolved(), vec!["rs10"]);
    }

    #[test]
    fn test_invalidate_chromosome_refreshes_only_that_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(
            dir.path(),
            vec![rec("rs10", "1", 100, "A", "G"), rec("rs20", "2", 200, "C", "T")],
        );
        let mut session = store.session();
        let position =
            |result: &QueryResult, row: usize| result.rows()[row].record().unwrap().position;

        let result = session.query_all(&["rs10", "rs20"]).unwrap();
        assert_eq!((position(&result, 0), position(&result, 1)), (100, 200));

        build(
            store.layout().clone(),
            BuildOptions::default(),
            vec![rec("rs10", "1", 111, "A", "G"), rec("rs20", "2", 222, "C", "T")],
        )
        .unwrap();

        session.invalidate_chromosome(Chromosome::parse("1").unwrap());
        assert_eq!(
            session.loaded_chromosomes(),
            vec![Chromosome::parse("2").unwrap()]
        );
        let result = session.query_all(&["rs10", "rs20"]).unwrap();
        assert_eq!((position(&result, 0), position(&result, 1)), (111, 200));

        session.invalidate();
        let result = session.query_all(&["rs10", "rs20"]).unwrap();
        assert_eq!((position(&result, 0), position(&result, 1)), (111, 222));
    }
}
