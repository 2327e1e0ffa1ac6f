//! Reader for filtered VCF files, the builder's usual input.
//!
//! Records are parsed with noodles; only `CHROM POS ID REF ALT` are kept.
//! They are passed through unvalidated: the builder decides what to reject
//! and counts it. Supports plain, gzip and bgzip compressed files (`.vcf`,
//! `.vcf.gz`, `.vcf.bgz`).

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use noodles::bgzf;
use noodles::vcf;
use noodles::vcf::variant::record::{AlternateBases, Ids};
use noodles::vcf::variant::RecordBuf;
use thiserror::Error;

use crate::core::contig::standardize_contig;
use crate::core::variant::VariantRecord;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid VCF header: {0}")]
    InvalidHeader(String),

    #[error("Invalid VCF record {record}: {reason}")]
    InvalidFormat { record: usize, reason: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VcfOptions {
    /// Rewrite contig names such as `chr17` or `NC_000017.11` to `17`.
    /// Names with no standard form are left as-is.
    pub standardize_contigs: bool,
}

/// Check if the path is a gzipped file
#[allow(clippy::case_sensitive_file_extension_comparisons)] // Already lowercased
fn is_gzipped(path: &Path) -> bool {
    let path_str = path.to_string_lossy().to_lowercase();
    path_str.ends_with(".gz") || path_str.ends_with(".bgz")
}

/// A gzip member header carrying the BGZF `BC` extra subfield
fn is_bgzf(path: &Path) -> io::Result<bool> {
    let mut magic = Vec::with_capacity(14);
    File::open(path)?.take(14).read_to_end(&mut magic)?;
    Ok(magic.len() == 14 && magic[..4] == [0x1f, 0x8b, 0x08, 0x04] && &magic[12..] == b"BC")
}

/// Streaming iterator of variant records from a VCF
pub struct VcfReader<R> {
    inner: vcf::io::Reader<R>,
    header: vcf::Header,
    options: VcfOptions,
    buf: RecordBuf,
    /// Data records read so far
    record: usize,
    done: bool,
}

impl VcfReader<Box<dyn BufRead>> {
    /// Open a VCF file, decompressing by extension, and read its header
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Io` if the file cannot be opened, or
    /// `ParseError::InvalidHeader` if the header does not parse.
    pub fn open(path: &Path, options: VcfOptions) -> Result<Self, ParseError> {
        let file = File::open(path)?;
        let reader: Box<dyn BufRead> = if is_gzipped(path) && is_bgzf(path)? {
            Box::new(bgzf::Reader::new(file))
        } else if is_gzipped(path) {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Self::new(reader, options)
    }
}

impl<R: BufRead> VcfReader<R> {
    /// Wrap a reader positioned at the start of the header
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidHeader` if the header does not parse.
    pub fn new(reader: R, options: VcfOptions) -> Result<Self, ParseError> {
        let mut inner = vcf::io::Reader::new(reader);
        let header = inner.read_header().map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => ParseError::InvalidHeader(e.to_string()),
            _ => ParseError::Io(e),
        })?;
        Ok(Self {
            inner,
            header,
            options,
            buf: RecordBuf::default(),
            record: 0,
            done: false,
        })
    }

    fn read_record(&mut self) -> Result<Option<VariantRecord>, ParseError> {
        match self.inner.read_record_buf(&self.header, &mut self.buf) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(ParseError::InvalidFormat {
                    record: self.record + 1,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(ParseError::Io(e)),
        }
        self.record += 1;
        self.convert().map(Some)
    }

    fn convert(&self) -> Result<VariantRecord, ParseError> {
        let record = &self.buf;
        let position = record
            .variant_start()
            .ok_or_else(|| ParseError::InvalidFormat {
                record: self.record,
                reason: "missing POS".to_string(),
            })?;

        let chrom = record.reference_sequence_name();
        let chrom = if self.options.standardize_contigs {
            standardize_contig(chrom).map_or(chrom, |c| c.label())
        } else {
            chrom
        };

        let ids: Vec<&str> = record.ids().iter().collect();
        let alternates: Vec<&str> = record
            .alternate_bases()
            .iter()
            .collect::<io::Result<_>>()
            .map_err(|e| ParseError::InvalidFormat {
                record: self.record,
                reason: e.to_string(),
            })?;

        Ok(VariantRecord::new(
            missing_as_dot(&ids.join(";")),
            chrom,
            position.get() as u64,
            record.reference_bases(),
            missing_as_dot(&alternates.join(",")),
        ))
    }
}

fn missing_as_dot(value: &str) -> &str {
    if value.is_empty() {
        "."
    } else {
        value
    }
}

impl<R: BufRead> Iterator for VcfReader<R> {
    type Item = Result<VariantRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Open a VCF file as a record iterator
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be opened, or
/// `ParseError::InvalidHeader` if its header does not parse.
pub fn read_vcf_file(
    path: &Path,
    options: VcfOptions,
) -> Result<VcfReader<Box<dyn BufRead>>, ParseError> {
    VcfReader::open(path, options)
}
