//! Parquet encoding and decoding of variant tables.
//!
//! Partition files and the full-catalog file share one schema:
//!
//! | column       | type   | notes                              |
//! |--------------|--------|------------------------------------|
//! | `rsid`       | utf8   | `rs<digits>`                       |
//! | `rs_number`  | uint64 | numeric accession, partition key   |
//! | `chrom`      | utf8   | standardized label                 |
//! | `pos`        | uint64 | 1-based                            |
//! | `ref`        | utf8   | single base                        |
//! | `alt`        | utf8   | single base                        |
//! | `variant_id` | utf8   | `<chrom>_<pos>_<ref>_<alt>`        |
//!
//! Partition files are sorted by `rs_number` with unique keys and carry
//! per-row-group `rs_number` statistics. [`PartitionFile`] opens only the
//! footer, then decodes the row groups whose key range can hold a wanted
//! identifier, reading just the `rs_number`, `pos`, `ref` and `alt` columns.
//! Ordering is verified on both levels, so a file written by something else
//! (or truncated) is reported as corrupt rather than silently misread.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder,
};
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::metadata::{ColumnChunkMetaData, ParquetMetaData};
use parquet::file::properties::WriterProperties;
use parquet::file::statistics::Statistics;
use parquet::format::KeyValue;
use thiserror::Error;

use crate::core::types::{Base, Chromosome, RsId};
use crate::core::variant::SnvRecord;

/// Bumped on incompatible schema changes
pub const FORMAT_VERSION: &str = "1";

pub const META_FORMAT_VERSION: &str = "variantdb.format_version";
pub const META_CHROMOSOME: &str = "variantdb.chromosome";
pub const META_SORTED_BY: &str = "variantdb.sorted_by";

pub const COL_RSID: &str = "rsid";
pub const COL_RS_NUMBER: &str = "rs_number";
pub const COL_CHROM: &str = "chrom";
pub const COL_POS: &str = "pos";
pub const COL_REF: &str = "ref";
pub const COL_ALT: &str = "alt";
pub const COL_VARIANT_ID: &str = "variant_id";

/// Rows per row group. Lookups decode whole row groups, so this bounds the
/// work per identifier.
pub const DEFAULT_ROW_GROUP_SIZE: usize = 1 << 17;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read Parquet file {path}: {source}")]
    Parquet { path: PathBuf, source: ParquetError },

    #[error("Failed to decode record batch from {path}: {source}")]
    Arrow { path: PathBuf, source: ArrowError },

    #[error("Corrupt table {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl StorageError {
    fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

#[must_use]
pub fn variant_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(COL_RSID, DataType::Utf8, false),
        Field::new(COL_RS_NUMBER, DataType::UInt64, false),
        Field::new(COL_CHROM, DataType::Utf8, false),
        Field::new(COL_POS, DataType::UInt64, false),
        Field::new(COL_REF, DataType::Utf8, false),
        Field::new(COL_ALT, DataType::Utf8, false),
        Field::new(COL_VARIANT_ID, DataType::Utf8, false),
    ]))
}

/// What a table file contains, recorded in its key/value metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// One chromosome, sorted by `rs_number`
    Partition(Chromosome),
    /// All chromosomes, in canonical chromosome order then `rs_number`
    Catalog,
}

fn writer_properties(kind: TableKind, row_group_size: usize) -> WriterProperties {
    let kv = |key: &str, value: &str| KeyValue {
        key: key.to_string(),
        value: Some(value.to_string()),
    };
    let mut metadata = vec![
        kv("created_by", "variantdb"),
        kv(META_FORMAT_VERSION, FORMAT_VERSION),
    ];
    match kind {
        TableKind::Partition(chromosome) => {
            metadata.push(kv(META_CHROMOSOME, chromosome.label()));
            metadata.push(kv(META_SORTED_BY, COL_RS_NUMBER));
        }
        TableKind::Catalog => metadata.push(kv(META_SORTED_BY, "chrom,rs_number")),
    }

    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(row_group_size.max(1))
        .set_key_value_metadata(Some(metadata))
        .build()
}

/// Build one record batch from validated records
///
/// # Errors
///
/// Returns an `ArrowError` if the batch cannot be assembled.
pub fn records_to_batch(records: &[SnvRecord]) -> Result<RecordBatch, ArrowError> {
    let rsid = StringArray::from_iter_values(records.iter().map(|r| r.rsid.to_string()));
    let rs_number = UInt64Array::from_iter_values(records.iter().map(|r| r.rsid.number()));
    let chrom = StringArray::from_iter_values(records.iter().map(|r| r.chromosome.label()));
    let pos = UInt64Array::from_iter_values(records.iter().map(|r| r.position));
    let reference = StringArray::from_iter_values(records.iter().map(|r| r.reference.as_str()));
    let alternate = StringArray::from_iter_values(records.iter().map(|r| r.alternate.as_str()));
    let variant_id = StringArray::from_iter_values(records.iter().map(SnvRecord::variant_id));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(rsid),
        Arc::new(rs_number),
        Arc::new(chrom),
        Arc::new(pos),
        Arc::new(reference),
        Arc::new(alternate),
        Arc::new(variant_id),
    ];
    RecordBatch::try_new(variant_schema(), columns)
}

/// Streams validated records into a Parquet file, one record batch per
/// `batch_size` rows.
pub struct TableWriter<W: Write + Send> {
    writer: ArrowWriter<W>,
    buffer: Vec<SnvRecord>,
    batch_size: usize,
    rows: usize,
}

impl<W: Write + Send> TableWriter<W> {
    /// # Errors
    ///
    /// Returns a `ParquetError` if the writer cannot be initialised.
    pub fn try_new(
        sink: W,
        kind: TableKind,
        batch_size: usize,
        row_group_size: usize,
    ) -> Result<Self, ParquetError> {
        let properties = writer_properties(kind, row_group_size);
        let writer = ArrowWriter::try_new(sink, variant_schema(), Some(properties))?;
        Ok(Self {
            writer,
            buffer: Vec::with_capacity(batch_size.min(1 << 16)),
            batch_size: batch_size.max(1),
            rows: 0,
        })
    }

    /// # Errors
    ///
    /// Returns a `ParquetError` if flushing a full batch fails.
    pub fn push(&mut self, record: SnvRecord) -> Result<(), ParquetError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ParquetError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = records_to_batch(&self.buffer)?;
        self.writer.write(&batch)?;
        self.rows += self.buffer.len();
        self.buffer.clear();
        Ok(())
    }

    /// Flush, write the footer and hand back the sink
    ///
    /// # Errors
    ///
    /// Returns a `ParquetError` if the final write or footer fails.
    pub fn finish(mut self) -> Result<(W, usize), ParquetError> {
        self.flush()?;
        let rows = self.rows;
        let sink = self.writer.into_inner()?;
        Ok((sink, rows))
    }
}

/// Smallest and largest `rs_number` in one row group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    pub min: u64,
    pub max: u64,
}

impl KeyRange {
    #[must_use]
    pub fn contains(&self, key: u64) -> bool {
        self.min <= key && key <= self.max
    }
}

/// The lookup columns of one decoded row group. `keys` is strictly
/// ascending, so lookups are a binary search.
#[derive(Debug, Clone, Default)]
pub struct RowGroupData {
    pub keys: Vec<u64>,
    pub positions: Vec<u64>,
    pub references: Vec<Base>,
    pub alternates: Vec<Base>,
}

/// An open partition file.
///
/// Opening reads and verifies the footer only. The file handle stays open,
/// so row groups decoded later come from the same file even if a rebuild
/// replaces it on disk meanwhile.
#[derive(Debug)]
pub struct PartitionFile {
    path: PathBuf,
    chromosome: Chromosome,
    file: File,
    metadata: ArrowReaderMetadata,
    projection: ProjectionMask,
    /// Row groups with `rs_number` statistics, in key order
    ranges: Vec<(KeyRange, usize)>,
    /// Row groups without statistics; these can hold any key
    unbounded: Vec<usize>,
}

impl PartitionFile {
    /// Open a partition file and check its footer
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the file cannot be opened or parsed, its
    /// metadata names a different chromosome (or none), a lookup column is
    /// missing, or its row-group key ranges overlap or are out of order.
    pub fn open(path: &Path, chromosome: Chromosome) -> Result<Self, StorageError> {
        let file = File::open(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let metadata = ArrowReaderMetadata::load(&file, ArrowReaderOptions::new()).map_err(
            |source| StorageError::Parquet {
                path: path.to_path_buf(),
                source,
            },
        )?;
        check_format_version(path, metadata.metadata())?;

        match key_value(metadata.metadata(), META_CHROMOSOME) {
            Some(declared) if declared == chromosome.label() => {}
            Some(declared) => {
                return Err(StorageError::corrupt(
                    path,
                    format!("file declares chromosome {declared}, expected {chromosome}"),
                ));
            }
            None => return Err(StorageError::corrupt(path, "no chromosome in file metadata")),
        }

        let leaves = metadata.parquet_schema().columns();
        let leaf = |name: &str| {
            leaves
                .iter()
                .position(|column| column.name() == name)
                .ok_or_else(|| StorageError::corrupt(path, format!("missing column '{name}'")))
        };
        let key_column = leaf(COL_RS_NUMBER)?;
        let projection = ProjectionMask::leaves(
            metadata.parquet_schema(),
            [key_column, leaf(COL_POS)?, leaf(COL_REF)?, leaf(COL_ALT)?],
        );

        let mut ranges: Vec<(KeyRange, usize)> = Vec::new();
        let mut unbounded = Vec::new();
        for (group, row_group) in metadata.metadata().row_groups().iter().enumerate() {
            match key_range(row_group.column(key_column)) {
                Some(range) => {
                    if ranges.last().is_some_and(|(previous, _)| range.min <= previous.max) {
                        return Err(StorageError::corrupt(
                            path,
                            format!("row group {group} overlaps the keys of an earlier one"),
                        ));
                    }
                    ranges.push((range, group));
                }
                None => unbounded.push(group),
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            chromosome,
            file,
            metadata,
            projection,
            ranges,
            unbounded,
        })
    }

    #[must_use]
    pub fn chromosome(&self) -> Chromosome {
        self.chromosome
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        usize::try_from(self.metadata.metadata().file_metadata().num_rows()).unwrap_or(0)
    }

    #[must_use]
    pub fn num_row_groups(&self) -> usize {
        self.metadata.metadata().num_row_groups()
    }

    /// Row groups that may hold `key`: the one whose statistics cover it, if
    /// any, plus every row group without statistics.
    pub fn candidate_groups(&self, key: u64) -> impl Iterator<Item = usize> + '_ {
        let idx = self.ranges.partition_point(|(range, _)| range.max < key);
        let bounded = self
            .ranges
            .get(idx)
            .filter(|(range, _)| range.contains(key))
            .map(|(_, group)| *group);
        bounded.into_iter().chain(self.unbounded.iter().copied())
    }

    /// Decode the lookup columns of one row group
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row group cannot be decoded, holds a
    /// null or invalid value, or its keys are unsorted or fall outside its
    /// statistics.
    pub fn read_row_group(&self, group: usize) -> Result<RowGroupData, StorageError> {
        let path = self.path.as_path();
        let file = self.file.try_clone().map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = ParquetRecordBatchReaderBuilder::new_with_metadata(file, self.metadata.clone())
            .with_projection(self.projection.clone())
            .with_row_groups(vec![group])
            .build()
            .map_err(|source| StorageError::Parquet {
                path: path.to_path_buf(),
                source,
            })?;
        let range = self
            .ranges
            .iter()
            .find(|(_, g)| *g == group)
            .map(|(range, _)| *range);

        let mut data = RowGroupData::default();
        for batch in reader {
            let batch = batch.map_err(|source| StorageError::Arrow {
                path: path.to_path_buf(),
                source,
            })?;
            let keys = col_u64(&batch, COL_RS_NUMBER, path)?;
            let positions = col_u64(&batch, COL_POS, path)?;
            let references = col_string(&batch, COL_REF, path)?;
            let alternates = col_string(&batch, COL_ALT, path)?;

            for row in 0..batch.num_rows() {
                if keys.is_null(row)
                    || positions.is_null(row)
                    || references.is_null(row)
                    || alternates.is_null(row)
                {
                    return Err(StorageError::corrupt(
                        path,
                        format!("null value in row group {group}"),
                    ));
                }
                let key = keys.value(row);
                if data.keys.last().is_some_and(|&last| key <= last) {
                    return Err(StorageError::corrupt(
                        path,
                        format!("keys not strictly ascending at rs{key}"),
                    ));
                }
                if range.is_some_and(|range| !range.contains(key)) {
                    return Err(StorageError::corrupt(
                        path,
                        format!("rs{key} is outside the statistics of row group {group}"),
                    ));
                }
                data.keys.push(key);
                data.positions.push(positions.value(row));
                data.references.push(base(references.value(row), "ref", path)?);
                data.alternates.push(base(alternates.value(row), "alt", path)?);
            }
        }
        Ok(data)
    }
}

/// `rs_number` range from a column chunk's statistics. Unsigned columns are
/// stored as INT64 and compared unsigned by the writer.
#[allow(clippy::cast_sign_loss)]
fn key_range(column: &ColumnChunkMetaData) -> Option<KeyRange> {
    match column.statistics() {
        Some(Statistics::Int64(stats)) => match (stats.min_opt(), stats.max_opt()) {
            (Some(min), Some(max)) => Some(KeyRange {
                min: *min as u64,
                max: *max as u64,
            }),
            _ => None,
        },
        _ => None,
    }
}

fn base(value: &str, column: &str, path: &Path) -> Result<Base, StorageError> {
    Base::parse(value)
        .ok_or_else(|| StorageError::corrupt(path, format!("invalid {column} allele '{value}'")))
}

/// Read every row of a table file (partition or full catalog) in file order
///
/// # Errors
///
/// Returns `StorageError` if the file cannot be read or decoded.
pub fn read_records(path: &Path) -> Result<Vec<SnvRecord>, StorageError> {
    let file = File::open(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|source| StorageError::Parquet {
            path: path.to_path_buf(),
            source,
        })?;
    check_format_version(path, builder.metadata())?;
    let reader = builder.build().map_err(|source| StorageError::Parquet {
        path: path.to_path_buf(),
        source,
    })?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|source| StorageError::Arrow {
            path: path.to_path_buf(),
            source,
        })?;
        let columns = BatchColumns::from_batch(&batch, path)?;
        for row in 0..batch.num_rows() {
            out.push(columns.record(row, path)?);
        }
    }
    Ok(out)
}

fn key_value<'m>(metadata: &'m ParquetMetaData, key: &str) -> Option<&'m str> {
    metadata
        .file_metadata()
        .key_value_metadata()
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == key))
        .and_then(|kv| kv.value.as_deref())
}

fn check_format_version(path: &Path, metadata: &ParquetMetaData) -> Result<(), StorageError> {
    match key_value(metadata, META_FORMAT_VERSION) {
        Some(FORMAT_VERSION) | None => Ok(()),
        Some(other) => Err(StorageError::corrupt(
            path,
            format!("unsupported format version {other}"),
        )),
    }
}

/// Typed views of the columns a full-row reader needs
struct BatchColumns<'a> {
    rs_number: &'a UInt64Array,
    chrom: &'a StringArray,
    pos: &'a UInt64Array,
    reference: &'a StringArray,
    alternate: &'a StringArray,
}

impl<'a> BatchColumns<'a> {
    fn from_batch(batch: &'a RecordBatch, path: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            rs_number: col_u64(batch, COL_RS_NUMBER, path)?,
            chrom: col_string(batch, COL_CHROM, path)?,
            pos: col_u64(batch, COL_POS, path)?,
            reference: col_string(batch, COL_REF, path)?,
            alternate: col_string(batch, COL_ALT, path)?,
        })
    }

    fn record(&self, row: usize, path: &Path) -> Result<SnvRecord, StorageError> {
        let null = self.rs_number.is_null(row)
            || self.chrom.is_null(row)
            || self.pos.is_null(row)
            || self.reference.is_null(row)
            || self.alternate.is_null(row);
        if null {
            return Err(StorageError::corrupt(path, format!("null value in row {row}")));
        }

        let chromosome = Chromosome::parse(self.chrom.value(row))
            .map_err(|e| StorageError::corrupt(path, e.to_string()))?;

        Ok(SnvRecord {
            rsid: RsId::new(self.rs_number.value(row)),
            chromosome,
            position: self.pos.value(row),
            reference: base(self.reference.value(row), "ref", path)?,
            alternate: base(self.alternate.value(row), "alt", path)?,
        })
    }
}

fn col_u64<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a UInt64Array, StorageError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StorageError::corrupt(path, format!("missing column '{name}'")))?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| StorageError::corrupt(path, format!("column '{name}' is not uint64")))
}

fn col_string<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a StringArray, StorageError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StorageError::corrupt(path, format!("missing column '{name}'")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| StorageError::corrupt(path, format!("column '{name}' is not utf8")))
}
