//! Value indexes over base records
//!
//! Each column may carry an ordered index from value to the set of base rids
//! whose current value in that column equals it. The primary-key column is
//! always indexed and its sets are singletons.

use std::collections::{BTreeMap, BTreeSet};

use lstore_common::error::StorageError;
use lstore_common::types::{RecordId, Value};

/// Ordered index for one column
#[derive(Debug, Default, Clone)]
pub struct ColumnIndex {
    data: BTreeMap<Value, BTreeSet<RecordId>>,
}

impl ColumnIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: Value, rid: RecordId) {
        self.data.entry(value).or_default().insert(rid);
    }

    pub fn remove(&mut self, value: Value, rid: RecordId) {
        if let Some(rids) = self.data.get_mut(&value) {
            rids.remove(&rid);
            if rids.is_empty() {
                self.data.remove(&value);
            }
        }
    }

    pub fn lookup(&self, value: Value) -> Vec<RecordId> {
        self.data
            .get(&value)
            .map(|rids| rids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Rids for values in `[begin, end]`, in value order
    pub fn range(&self, begin: Value, end: Value) -> Vec<RecordId> {
        if begin > end {
            return Vec::new();
        }
        self.data
            .range(begin..=end)
            .flat_map(|(_, rids)| rids.iter().copied())
            .collect()
    }

    pub fn contains(&self, value: Value) -> bool {
        self.data.contains_key(&value)
    }

    /// Number of distinct values
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// All indexes of one table
#[derive(Debug, Clone)]
pub struct Index {
    key_column: usize,
    columns: Vec<Option<ColumnIndex>>,
}

impl Index {
    /// Create the index set with the primary-key column materialized
    pub fn new(num_columns: usize, key_column: usize) -> Self {
        let mut columns = vec![None; num_columns];
        if let Some(slot) = columns.get_mut(key_column) {
            *slot = Some(ColumnIndex::new());
        }
        Self {
            key_column,
            columns,
        }
    }

    /// Base rids whose `column` holds `value`. Empty if unindexed.
    pub fn locate(&self, column: usize, value: Value) -> Vec<RecordId> {
        self.column(column)
            .map(|idx| idx.lookup(value))
            .unwrap_or_default()
    }

    /// Base rids whose `column` value lies in `[begin, end]`
    pub fn locate_range(
        &self,
        column: usize,
        begin: Value,
        end: Value,
    ) -> Result<Vec<RecordId>, StorageError> {
        self.column(column)
            .map(|idx| idx.range(begin, end))
            .ok_or(StorageError::IndexNotPresent(column))
    }

    /// Rid holding a primary key
    pub fn locate_key(&self, key: Value) -> Option<RecordId> {
        self.column(self.key_column)
            .and_then(|idx| idx.lookup(key).first().copied())
    }

    pub fn contains_key(&self, key: Value) -> bool {
        self.column(self.key_column)
            .is_some_and(|idx| idx.contains(key))
    }

    /// Materialize an index from `(value, rid)` pairs. Returns false without
    /// touching anything if the column is already indexed.
    pub fn create_index<I>(&mut self, column: usize, entries: I) -> Result<bool, StorageError>
    where
        I: IntoIterator<Item = (Value, RecordId)>,
    {
        let num_columns = self.columns.len();
        let slot = self
            .columns
            .get_mut(column)
            .ok_or(StorageError::ColumnOutOfRange {
                column,
                num_columns,
            })?;
        if slot.is_some() {
            return Ok(false);
        }

        let mut idx = ColumnIndex::new();
        for (value, rid) in entries {
            idx.insert(value, rid);
        }
        *slot = Some(idx);
        Ok(true)
    }

    /// Discard a secondary index. Returns false if none existed.
    pub fn drop_index(&mut self, column: usize) -> Result<bool, StorageError> {
        if column == self.key_column {
            return Err(StorageError::PrimaryIndexRequired(column));
        }
        Ok(self
            .columns
            .get_mut(column)
            .and_then(Option::take)
            .is_some())
    }

    /// Add a new base record's values to every active index
    pub fn insert_row(&mut self, rid: RecordId, values: &[Value]) {
        for (column, idx) in self.columns.iter_mut().enumerate() {
            if let (Some(idx), Some(&value)) = (idx.as_mut(), values.get(column)) {
                idx.insert(value, rid);
            }
        }
    }

    /// Remove a base record's current values from every active index
    pub fn remove_row(&mut self, rid: RecordId, values: &[Value]) {
        for (column, idx) in self.columns.iter_mut().enumerate() {
            if let (Some(idx), Some(&value)) = (idx.as_mut(), values.get(column)) {
                idx.remove(value, rid);
            }
        }
    }

    /// Move `rid` from `old` to `new` in `column`'s index, if the column is indexed
    pub fn reindex(&mut self, column: usize, rid: RecordId, old: Value, new: Value) {
        if old == new {
            return;
        }
        if let Some(Some(idx)) = self.columns.get_mut(column) {
            idx.remove(old, rid);
            idx.insert(new, rid);
        }
    }

    pub fn is_indexed(&self, column: usize) -> bool {
        self.column(column).is_some()
    }

    pub fn indexed_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(i, idx)| idx.as_ref().map(|_| i))
            .collect()
    }

    pub fn key_column(&self) -> usize {
        self.key_column
    }

    fn column(&self, column: usize) -> Option<&ColumnIndex> {
        self.columns.get(column).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_index_always_present() {
        let index = Index::new(3, 0);
        assert!(index.is_indexed(0));
        assert!(!index.is_indexed(1));
        assert_eq!(index.indexed_columns(), vec![0]);
    }

    #[test]
    fn test_locate_and_range() {
        let mut index = Index::new(2, 0);
        index.insert_row(1, &[10, 5]);
        index.insert_row(2, &[20, 5]);
        index.insert_row(3, &[30, 6]);

        assert_eq!(index.locate(0, 20), vec![2]);
        assert_eq!(index.locate_key(30), Some(3));
        assert!(index.locate(0, 99).is_empty());
        assert!(index.locate(1, 5).is_empty());

        assert_eq!(index.locate_range(0, 10, 20).unwrap(), vec![1, 2]);
        assert_eq!(index.locate_range(0, 15, 40).unwrap(), vec![2, 3]);
        assert!(index.locate_range(0, 40, 10).unwrap().is_empty());
        assert_eq!(
            index.locate_range(1, 0, 10),
            Err(StorageError::IndexNotPresent(1))
        );
    }

    #[test]
    fn test_secondary_index_lifecycle() {
        let mut index = Index::new(2, 0);
        index.insert_row(1, &[10, 5]);

        let created = index.create_index(1, vec![(5, 1), (5, 2), (7, 3)]).unwrap();
        assert!(created);
        assert_eq!(index.locate(1, 5), vec![1, 2]);
        assert!(!index.create_index(1, vec![(9, 9)]).unwrap());
        assert!(index.locate(1, 9).is_empty());

        index.reindex(1, 2, 5, 7);
        assert_eq!(index.locate(1, 5), vec![1]);
        assert_eq!(index.locate(1, 7), vec![2, 3]);

        assert!(index.drop_index(1).unwrap());
        assert!(!index.drop_index(1).unwrap());
        assert!(index.locate(1, 7).is_empty());
    }

    #[test]
    fn test_primary_index_cannot_be_dropped() {
        let mut index = Index::new(2, 1);
        assert_eq!(index.drop_index(1), Err(StorageError::PrimaryIndexRequired(1)));
        assert!(index.is_indexed(1));
    }

    #[test]
    fn test_remove_row_clears_all_indexes() {
        let mut index = Index::new(2, 0);
        index.create_index(1, Vec::new()).unwrap();
        index.insert_row(4, &[40, 1]);
        index.remove_row(4, &[40, 1]);

        assert!(!index.contains_key(40));
        assert!(index.locate(1, 1).is_empty());
    }

    #[test]
    fn test_create_index_out_of_range() {
        let mut index = Index::new(2, 0);
        assert!(matches!(
            index.create_index(5, Vec::new()),
            Err(StorageError::ColumnOutOfRange { column: 5, .. })
        ));
    }
}
