use serde::Serialize;

use crate::core::types::IdentifierError;
use crate::core::variant::SnvRecord;

/// How one requested identifier was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Found in exactly one partition
    Resolved(SnvRecord),
    /// Found in more than one partition; all matches in search order
    Ambiguous(Vec<SnvRecord>),
    /// Not found within the query's scope
    Unresolved,
    /// Input text is not an rs-identifier; never looked up
    Malformed(IdentifierError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Resolved,
    Ambiguous,
    Unresolved,
    Malformed,
}

impl std::fmt::Display for RowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Resolved => "resolved",
            Self::Ambiguous => "ambiguous",
            Self::Unresolved => "unresolved",
            Self::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

/// One output row, aligned with one input identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRow {
    /// The identifier exactly as supplied
    pub query: String,
    pub resolution: Resolution,
}

impl LookupRow {
    #[must_use]
    pub fn status(&self) -> RowStatus {
        match self.resolution {
            Resolution::Resolved(_) => RowStatus::Resolved,
            Resolution::Ambiguous(_) => RowStatus::Ambiguous,
            Resolution::Unresolved => RowStatus::Unresolved,
            Resolution::Malformed(_) => RowStatus::Malformed,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(
            self.resolution,
            Resolution::Resolved(_) | Resolution::Ambiguous(_)
        )
    }

    /// The coordinate for this row; for ambiguous rows, the match from the
    /// first partition searched
    #[must_use]
    pub fn record(&self) -> Option<&SnvRecord> {
        self.matches().first()
    }

    #[must_use]
    pub fn matches(&self) -> &[SnvRecord] {
        match &self.resolution {
            Resolution::Resolved(record) => std::slice::from_ref(record),
            Resolution::Ambiguous(records) => records,
            Resolution::Unresolved | Resolution::Malformed(_) => &[],
        }
    }
}

/// Flat, serializable view of a row. Coordinate fields are `None` for
/// unresolved and malformed rows.
#[derive(Debug, Clone, Serialize)]
pub struct RowView<'a> {
    pub query: &'a str,
    pub status: RowStatus,
    pub chrom: Option<&'static str>,
    pub pos: Option<u64>,
    #[serde(rename = "ref")]
    pub reference: Option<&'static str>,
    #[serde(rename = "alt")]
    pub alternate: Option<&'static str>,
    pub variant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub other_matches: Vec<String>,
}

impl<'a> From<&'a LookupRow> for RowView<'a> {
    fn from(row: &'a LookupRow) -> Self {
        let record = row.record();
        Self {
            query: &row.query,
            status: row.status(),
            chrom: record.map(|r| r.chromosome.label()),
            pos: record.map(|r| r.position),
            reference: record.map(|r| r.reference.as_str()),
            alternate: record.map(|r| r.alternate.as_str()),
            variant_id: record.map(SnvRecord::variant_id),
            error: match &row.resolution {
                Resolution::Malformed(e) => Some(e.to_string()),
                _ => None,
            },
            other_matches: row
                .matches()
                .iter()
                .skip(1)
                .map(SnvRecord::variant_id)
                .collect(),
        }
    }
}

/// Rows aligned 1:1 with the input identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    rows: Vec<LookupRow>,
}

impl QueryResult {
    #[must_use]
    pub fn new(rows: Vec<LookupRow>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn rows(&self) -> &[LookupRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LookupRow> {
        self.rows.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_resolved()).count()
    }

    /// Inputs that were not resolved (including malformed ones), in input
    /// order, duplicates kept
    #[must_use]
    pub fn unresolved(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|r| !r.is_resolved())
            .map(|r| r.query.as_str())
            .collect()
    }

    /// Rows whose identifier matched in more than one partition
    #[must_use]
    pub fn ambiguous(&self) -> Vec<&LookupRow> {
        self.rows
            .iter()
            .filter(|r| matches!(r.resolution, Resolution::Ambiguous(_)))
            .collect()
    }

    #[must_use]
    pub fn views(&self) -> Vec<RowView<'_>> {
        self.rows.iter().map(RowView::from).collect()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a LookupRow;
    type IntoIter = std::slice::Iter<'a, LookupRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
