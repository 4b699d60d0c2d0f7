//! Common type definitions for the L-Store record store

use serde::{Deserialize, Serialize};

/// Record identifier, shared by base and tail records. Never reused.
pub type RecordId = u64;

/// Column value. Every data column holds integers.
pub type Value = i64;

/// Primary key value
pub type Key = Value;

/// Per-table logical creation clock
pub type Timestamp = u64;

/// Maximum number of data columns a table may declare (width of the schema encoding)
pub const MAX_COLUMNS: usize = 64;

// ============================================================================
// Schema Encoding
// ============================================================================

/// Per-column bitmap on a tail record. Bit `i` set means the record carries a
/// new value for column `i`; clear means the value is inherited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaEncoding(u64);

impl SchemaEncoding {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Marks every `Some` entry of a sparse update
    #[must_use]
    pub fn from_sparse(columns: &[Option<Value>]) -> Self {
        let bits = columns
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_some())
            .fold(0u64, |acc, (i, _)| acc | (1 << i));
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_set(self, column: usize) -> bool {
        column < MAX_COLUMNS && self.0 & (1 << column) != 0
    }

    #[must_use]
    pub const fn with(self, column: usize) -> Self {
        Self(self.0 | (1 << column))
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

// ============================================================================
// Projection
// ============================================================================

/// Column projection for reads. Unprojected columns come back absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    columns: Vec<bool>,
}

impl Projection {
    /// Project every column
    #[must_use]
    pub fn all(num_columns: usize) -> Self {
        Self {
            columns: vec![true; num_columns],
        }
    }

    /// Project only the listed columns
    #[must_use]
    pub fn only(num_columns: usize, selected: &[usize]) -> Self {
        let mut columns = vec![false; num_columns];
        for &column in selected {
            if let Some(flag) = columns.get_mut(column) {
                *flag = true;
            }
        }
        Self { columns }
    }

    /// Build from a 0/1 bitmap; any non-zero entry selects the column
    #[must_use]
    pub fn from_bitmap(bitmap: &[u8]) -> Self {
        Self {
            columns: bitmap.iter().map(|&bit| bit != 0).collect(),
        }
    }

    #[must_use]
    pub fn is_selected(&self, column: usize) -> bool {
        self.columns.get(column).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
    }
}

// ============================================================================
// Relative Version
// ============================================================================

/// Which state of a row a versioned read reconstructs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelativeVersion {
    /// Apply the whole chain
    #[default]
    Latest,
    /// Skip this many of the newest tail records. Clamps to `Original`.
    Back(usize),
    /// Ignore every tail record: the oldest state still stored
    Original,
}

impl RelativeVersion {
    /// Number of newest tail records to skip on a chain of `chain_len`
    #[must_use]
    pub fn skip(self, chain_len: usize) -> usize {
        match self {
            RelativeVersion::Latest => 0,
            RelativeVersion::Back(n) => n.min(chain_len),
            RelativeVersion::Original => chain_len,
        }
    }
}

impl From<i64> for RelativeVersion {
    fn from(version: i64) -> Self {
        match version {
            0 => RelativeVersion::Latest,
            v if v > 0 => RelativeVersion::Back(usize::try_from(v).unwrap_or(usize::MAX)),
            _ => RelativeVersion::Original,
        }
    }
}

// ============================================================================
// Record
// ============================================================================

/// A resolved row returned by reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Base record id
    pub rid: RecordId,
    /// Primary key
    pub key: Key,
    /// One entry per table column, `None` where not projected
    pub columns: Vec<Option<Value>>,
}

impl Record {
    pub fn new(rid: RecordId, key: Key, columns: Vec<Option<Value>>) -> Self {
        Self { rid, key, columns }
    }

    /// Value of a column, if projected
    #[must_use]
    pub fn get(&self, column: usize) -> Option<Value> {
        self.columns.get(column).copied().flatten()
    }

    /// All columns, for fully projected reads
    #[must_use]
    pub fn values(&self) -> Option<Vec<Value>> {
        self.columns.iter().copied().collect()
    }
}
