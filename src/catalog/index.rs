use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

use crate::catalog::columnar::{PartitionFile, RowGroupData, StorageError};
use crate::core::types::{Chromosome, RsId};
use crate::core::variant::SnvRecord;

/// Identifier index over one partition file.
///
/// Row groups are located from their `rs_number` statistics and decoded the
/// first time a lookup needs them; decoded groups are kept for later lookups.
#[derive(Debug)]
pub struct PartitionIndex {
    file: PartitionFile,
    decoded: BTreeMap<usize, RowGroupData>,
}

impl PartitionIndex {
    /// Open a partition file and verify its footer
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the file is unreadable or corrupt.
    pub fn open(path: &Path, chromosome: Chromosome) -> Result<Self, StorageError> {
        Ok(Self {
            file: PartitionFile::open(path, chromosome)?,
            decoded: BTreeMap::new(),
        })
    }

    /// Look up a batch of identifiers. Returns the records found, in no
    /// particular order; absent identifiers are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a row group that may hold one of the
    /// identifiers cannot be decoded.
    pub fn lookup(&mut self, ids: &[RsId]) -> Result<Vec<SnvRecord>, StorageError> {
        let mut wanted: BTreeMap<usize, Vec<u64>> = BTreeMap::new();
        for id in ids {
            for group in self.file.candidate_groups(id.number()) {
                wanted.entry(group).or_default().push(id.number());
            }
        }

        let chromosome = self.file.chromosome();
        let mut found = Vec::new();
        for (group, keys) in wanted {
            let data = match self.decoded.entry(group) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.file.read_row_group(group)?),
            };
            for key in keys {
                if let Ok(row) = data.keys.binary_search(&key) {
                    found.push(record_at(data, chromosome, row));
                }
            }
        }
        Ok(found)
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.file.num_rows()
    }

    #[must_use]
    pub fn num_row_groups(&self) -> usize {
        self.file.num_row_groups()
    }

    /// Row groups decoded so far
    #[must_use]
    pub fn decoded_row_groups(&self) -> usize {
        self.decoded.len()
    }
}

fn record_at(data: &RowGroupData, chromosome: Chromosome, row: usize) -> SnvRecord {
    SnvRecord {
        rsid: RsId::new(data.keys[row]),
        chromosome,
        position: data.positions[row],
        reference: data.references[row],
        alternate: data.alternates[row],
    }
}
