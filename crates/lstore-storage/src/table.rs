//! Table: insert, versioned reads, updates, deletes and range aggregation
//!
//! A row is one base record spread over per-column base pages. Updates never
//! touch it; each appends a sparse tail record and splices it onto the head of
//! the row's version chain. Reads walk the chain from the newest tail toward
//! the base, taking the first value found per column.
//!
//! Lock order is `write_lock` → `index` → `base` → `tail`. Readers hold the
//! index read guard for the whole resolution so a concurrent delete can never
//! leave them with an index hit that has no directory entry.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument};

use lstore_common::error::{Result, StorageError};
use lstore_common::metrics;
use lstore_common::types::{
    Key, Projection, Record, RecordId, RelativeVersion, SchemaEncoding, Timestamp, Value,
    MAX_COLUMNS,
};

use crate::index::Index;
use crate::page::PageSet;
use crate::page_directory::PageDirectory;
use crate::version::{
    base_meta, decode_u64, encode_u64, tail_meta, walk_chain, Indirection,
};
use crate::TableOptions;

/// Page and record counters for one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableStats {
    /// Live rows
    pub live_records: usize,
    /// Live tail records across all chains
    pub tail_records: usize,
    /// Resident base page generations
    pub base_pages: usize,
    /// Resident tail page generations
    pub tail_pages: usize,
    /// Resident page generations (base and tail) with no room left
    pub full_pages: usize,
    /// Rows queued for merge
    pub pending_merges: usize,
}

/// A table of integer columns with one primary-key column
pub struct Table {
    pub(crate) name: String,
    pub(crate) num_columns: usize,
    pub(crate) key_column: usize,
    pub(crate) options: TableOptions,
    next_rid: AtomicU64,
    clock: AtomicU64,
    pub(crate) base: RwLock<PageSet>,
    pub(crate) tail: RwLock<PageSet>,
    pub(crate) directory: PageDirectory,
    pub(crate) indirection: Indirection,
    pub(crate) index: RwLock<Index>,
    pub(crate) merge_queue: DashSet<RecordId>,
    /// Serializes writers; readers never take it
    pub(crate) write_lock: Mutex<()>,
}

impl Table {
    /// Create an empty table
    pub fn new(
        name: impl Into<String>,
        num_columns: usize,
        key_column: usize,
        options: TableOptions,
    ) -> Result<Self> {
        let name = name.into();
        if num_columns == 0 || num_columns > MAX_COLUMNS {
            return Err(StorageError::InvalidSchema(format!(
                "table {name} must have between 1 and {MAX_COLUMNS} columns, got {num_columns}"
            ))
            .into());
        }
        if key_column >= num_columns {
            return Err(StorageError::InvalidSchema(format!(
                "key column {key_column} out of range for {num_columns} columns"
            ))
            .into());
        }
        if options.page_capacity == 0 {
            return Err(StorageError::InvalidSchema("page capacity must be positive".into()).into());
        }

        info!(
            table = %name,
            num_columns,
            key_column,
            page_capacity = options.page_capacity,
            "created table"
        );

        Ok(Self {
            base: RwLock::new(PageSet::new(
                "base",
                base_meta::WIDTH + num_columns,
                options.page_capacity,
            )),
            tail: RwLock::new(PageSet::new(
                "tail",
                tail_meta::WIDTH + num_columns,
                options.page_capacity,
            )),
            directory: PageDirectory::new(),
            indirection: Indirection::default(),
            index: RwLock::new(Index::new(num_columns, key_column)),
            merge_queue: DashSet::new(),
            write_lock: Mutex::new(()),
            next_rid: AtomicU64::new(1),
            clock: AtomicU64::new(0),
            name,
            num_columns,
            key_column,
            options,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn key_column(&self) -> usize {
        self.key_column
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert a row. The primary key is `columns[key_column]`.
    #[instrument(level = "debug", skip(self, columns), fields(table = %self.name))]
    pub fn insert(&self, columns: &[Value]) -> Result<RecordId> {
        self.observe("insert", || self.insert_row(columns))
    }

    fn insert_row(&self, columns: &[Value]) -> Result<RecordId> {
        self.check_arity(columns.len())?;
        let key = columns[self.key_column];

        let _guard = self.write_lock.lock();
        let mut index = self.index.write();
        if index.contains_key(key) {
            return Err(StorageError::DuplicateKey(key).into());
        }

        let rid = self.allocate_rid();
        let mut row = Vec::with_capacity(base_meta::WIDTH + self.num_columns);
        row.push(Some(encode_u64(rid)));
        row.push(Some(encode_u64(self.tick())));
        row.push(Some(encode_u64(SchemaEncoding::empty().bits())));
        row.extend(columns.iter().copied().map(Some));

        let (location, opened) = self.base.write().append(&row)?;
        if opened {
            metrics::record_page_allocated(&self.name, "base");
        }
        self.directory.put_base(rid, location);
        index.insert_row(rid, columns);

        debug!(rid, key, page = location.page, slot = location.slot, "inserted");
        Ok(rid)
    }

    /// Append a tail record carrying the `Some` entries of `columns`
    #[instrument(level = "debug", skip(self, columns), fields(table = %self.name))]
    pub fn update(&self, key: Key, columns: &[Option<Value>]) -> Result<()> {
        self.observe("update", || self.update_row(key, columns))
    }

    fn update_row(&self, key: Key, columns: &[Option<Value>]) -> Result<()> {
        self.check_arity(columns.len())?;
        let mut sparse = columns.to_vec();
        match sparse[self.key_column] {
            Some(value) if value != key => {
                return Err(StorageError::PrimaryKeyImmutable(key).into());
            }
            _ => sparse[self.key_column] = None,
        }
        let schema = SchemaEncoding::from_sparse(&sparse);

        let _guard = self.write_lock.lock();
        let mut index = self.index.write();
        let rid = index
            .locate_key(key)
            .ok_or(StorageError::KeyNotFound(key))?;

        // Current values of indexed columns this update changes
        let reindexed: Vec<usize> = index
            .indexed_columns()
            .into_iter()
            .filter(|&c| schema.is_set(c))
            .collect();
        let previous = if reindexed.is_empty() {
            None
        } else {
            let base = self.base.read();
            let tail = self.tail.read();
            Some(self.resolve(
                &base,
                &tail,
                rid,
                &Projection::only(self.num_columns, &reindexed),
                RelativeVersion::Latest,
            )?)
        };

        let tail_rid = self.allocate_rid();
        let older = self.indirection.head(rid).map(|h| h.newest);
        let mut row = Vec::with_capacity(tail_meta::WIDTH + self.num_columns);
        row.push(Some(encode_u64(tail_rid)));
        row.push(older.map(encode_u64));
        row.push(Some(encode_u64(self.tick())));
        row.push(Some(encode_u64(schema.bits())));
        row.push(Some(encode_u64(rid)));
        row.extend(sparse.iter().copied());

        {
            let mut tail = self.tail.write();
            let (location, opened) = tail.append(&row)?;
            if opened {
                metrics::record_page_allocated(&self.name, "tail");
            }
            self.directory.put_tail(tail_rid, location);
        }

        // The tail record is fully written and addressable; publish it.
        let head = self.indirection.splice(rid, tail_rid);

        if let Some(previous) = previous {
            for column in reindexed {
                if let (Some(old), Some(new)) = (previous.get(column), sparse[column]) {
                    index.reindex(column, rid, old, new);
                }
            }
        }

        if head.length >= self.options.merge_threshold {
            self.merge_queue.insert(rid);
        }

        debug!(rid, tail_rid, chain_length = head.length, "updated");
        Ok(())
    }

    /// Remove a row and its whole version chain
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub fn delete(&self, key: Key) -> Result<()> {
        self.observe("delete", || self.delete_row(key))
    }

    fn delete_row(&self, key: Key) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut index = self.index.write();
        let rid = index
            .locate_key(key)
            .ok_or(StorageError::KeyNotFound(key))?;

        let mut base = self.base.write();
        let mut tail = self.tail.write();

        let current = self.resolve(
            &base,
            &tail,
            rid,
            &Projection::all(self.num_columns),
            RelativeVersion::Latest,
        )?;
        let values = current
            .values()
            .ok_or_else(|| StorageError::CorruptData(format!("row {rid} has absent columns")))?;

        let chain = match self.indirection.head(rid) {
            Some(head) => walk_chain(&tail, &self.directory, rid, head)?,
            None => Vec::new(),
        };

        index.remove_row(rid, &values);
        for header in &chain {
            self.directory.remove_tail(header.rid);
            tail.tombstone(header.location);
        }
        self.indirection.clear(rid);
        if let Some(location) = self.directory.remove(rid) {
            base.tombstone(location);
        }
        self.merge_queue.remove(&rid);

        debug!(rid, key, tail_records = chain.len(), "deleted");
        Ok(())
    }

    /// Read-then-update of one column. Not atomic with respect to other writers.
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub fn increment(&self, key: Key, column: usize) -> Result<()> {
        self.check_column(column)?;
        if column == self.key_column {
            return Err(StorageError::PrimaryKeyImmutable(key).into());
        }
        let current = self
            .select(key, self.key_column, &Projection::only(self.num_columns, &[column]))?
            .into_iter()
            .next()
            .and_then(|record| record.get(column))
            .ok_or(StorageError::KeyNotFound(key))?;

        let mut columns = vec![None; self.num_columns];
        columns[column] = Some(current.wrapping_add(1));
        self.update(key, &columns)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current state of every row whose `column` equals `search_value`
    #[instrument(level = "debug", skip(self, projection), fields(table = %self.name))]
    pub fn select(
        &self,
        search_value: Value,
        column: usize,
        projection: &Projection,
    ) -> Result<Vec<Record>> {
        self.observe("select", || {
            self.select_rows(search_value, column, projection, RelativeVersion::Latest)
        })
    }

    /// Like [`Table::select`], reconstructing the state `relative_version`
    /// updates ago. `0` is the latest state, negative values the insert-time
    /// state; values past the chain length clamp to the insert-time state.
    #[instrument(level = "debug", skip(self, projection), fields(table = %self.name))]
    pub fn select_version(
        &self,
        search_value: Value,
        column: usize,
        projection: &Projection,
        relative_version: i64,
    ) -> Result<Vec<Record>> {
        self.observe("select_version", || {
            self.select_rows(
                search_value,
                column,
                projection,
                RelativeVersion::from(relative_version),
            )
        })
    }

    fn select_rows(
        &self,
        search_value: Value,
        column: usize,
        projection: &Projection,
        version: RelativeVersion,
    ) -> Result<Vec<Record>> {
        self.check_column(column)?;
        self.check_arity(projection.len())?;

        let index = self.index.read();
        let rids = index.locate(column, search_value);
        if rids.is_empty() {
            return Err(StorageError::KeyNotFound(search_value).into());
        }

        let base = self.base.read();
        let tail = self.tail.read();
        let records = rids
            .into_iter()
            .map(|rid| self.resolve(&base, &tail, rid, projection, version))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(index);
        Ok(records)
    }

    /// Current full row for a primary key
    pub fn get(&self, key: Key) -> Result<Record> {
        self.select(key, self.key_column, &Projection::all(self.num_columns))?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::KeyNotFound(key).into())
    }

    /// Sum of `column` over live rows with keys in `[start, end]`
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub fn sum(&self, start: Key, end: Key, column: usize) -> Result<i64> {
        self.observe("sum", || {
            self.sum_rows(start, end, column, RelativeVersion::Latest)
        })
    }

    /// [`Table::sum`] over the state `relative_version` updates ago
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub fn sum_version(
        &self,
        start: Key,
        end: Key,
        column: usize,
        relative_version: i64,
    ) -> Result<i64> {
        self.observe("sum_version", || {
            self.sum_rows(start, end, column, RelativeVersion::from(relative_version))
        })
    }

    fn sum_rows(&self, start: Key, end: Key, column: usize, version: RelativeVersion) -> Result<i64> {
        self.check_column(column)?;

        let index = self.index.read();
        let rids = index.locate_range(self.key_column, start, end)?;
        if rids.is_empty() {
            return Err(StorageError::NoMatch { start, end }.into());
        }

        let base = self.base.read();
        let tail = self.tail.read();
        let projection = Projection::only(self.num_columns, &[column]);
        let mut total: i64 = 0;
        for rid in rids {
            let record = self.resolve(&base, &tail, rid, &projection, version)?;
            let value = record
                .get(column)
                .ok_or_else(|| StorageError::missing_slot(rid))?;
            total = total.wrapping_add(value);
        }
        Ok(total)
    }

    /// Resolve one base record against its chain. Callers hold the index read
    /// or write guard plus both page-set guards.
    pub(crate) fn resolve(
        &self,
        base: &PageSet,
        tail: &PageSet,
        rid: RecordId,
        projection: &Projection,
        version: RelativeVersion,
    ) -> std::result::Result<Record, StorageError> {
        let location = self
            .directory
            .get_base(rid)
            .ok_or_else(|| StorageError::missing_location(rid))?;
        let stored = base
            .read(location, base_meta::RID)
            .map(decode_u64)
            .ok_or_else(|| StorageError::missing_slot(rid))?;
        if stored != rid {
            return Err(StorageError::CorruptData(format!(
                "base slot for rid {rid} holds rid {stored}"
            )));
        }

        let chain = match self.indirection.head(rid) {
            Some(head) => walk_chain(tail, &self.directory, rid, head)?,
            None => Vec::new(),
        };
        metrics::record_chain_walk(chain.len());
        let visible = &chain[version.skip(chain.len())..];

        let read_base = |column: usize| {
            base.read(location, base_meta::WIDTH + column)
                .ok_or_else(|| StorageError::missing_slot(rid))
        };

        let mut columns = vec![None; self.num_columns];
        for column in projection.selected().filter(|&c| c < self.num_columns) {
            let value = match visible.iter().find(|h| h.schema.is_set(column)) {
                Some(header) => tail
                    .read(header.location, tail_meta::WIDTH + column)
                    .ok_or_else(|| StorageError::missing_slot(header.rid))?,
                None => read_base(column)?,
            };
            columns[column] = Some(value);
        }

        Ok(Record::new(rid, read_base(self.key_column)?, columns))
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Build an index on `column` from every live row's current value. No-op
    /// if the column is already indexed.
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub fn create_index(&self, column: usize) -> Result<()> {
        self.check_column(column)?;

        let _guard = self.write_lock.lock();
        let mut index = self.index.write();
        if index.is_indexed(column) {
            return Ok(());
        }

        let entries = {
            let base = self.base.read();
            let tail = self.tail.read();
            let projection = Projection::only(self.num_columns, &[column]);
            let mut entries = Vec::with_capacity(self.directory.base_len());
            for rid in self.directory.base_rids() {
                let record = self.resolve(&base, &tail, rid, &projection, RelativeVersion::Latest)?;
                let value = record
                    .get(column)
                    .ok_or_else(|| StorageError::missing_slot(rid))?;
                entries.push((value, rid));
            }
            entries
        };

        let count = entries.len();
        index.create_index(column, entries)?;
        info!(table = %self.name, column, entries = count, "created index");
        Ok(())
    }

    /// Drop a secondary index. The primary-key index cannot be dropped.
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub fn drop_index(&self, column: usize) -> Result<()> {
        self.check_column(column)?;
        if self.index.write().drop_index(column)? {
            info!(table = %self.name, column, "dropped index");
        }
        Ok(())
    }

    pub fn is_indexed(&self, column: usize) -> bool {
        self.index.read().is_indexed(column)
    }

    /// Rids the index maps `value` to in `column`
    pub fn locate(&self, column: usize, value: Value) -> Vec<RecordId> {
        self.index.read().locate(column, value)
    }

    /// Rids whose `column` value lies in `[begin, end]`
    pub fn locate_range(&self, column: usize, begin: Value, end: Value) -> Result<Vec<RecordId>> {
        Ok(self.index.read().locate_range(column, begin, end)?)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn contains_key(&self, key: Key) -> bool {
        self.index.read().contains_key(key)
    }

    /// Live rows
    pub fn len(&self) -> usize {
        self.directory.base_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tail records in a row's chain
    pub fn version_count(&self, key: Key) -> Result<usize> {
        let index = self.index.read();
        let rid = index
            .locate_key(key)
            .ok_or(StorageError::KeyNotFound(key))?;
        Ok(self.indirection.head(rid).map_or(0, |h| h.length))
    }

    pub fn stats(&self) -> TableStats {
        let base = self.base.read();
        let tail = self.tail.read();
        TableStats {
            live_records: self.directory.base_len(),
            tail_records: self.directory.tail_len(),
            base_pages: base.resident_pages(),
            tail_pages: tail.resident_pages(),
            full_pages: base.full_pages() + tail.full_pages(),
            pending_merges: self.merge_queue.len(),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn allocate_rid(&self) -> RecordId {
        self.next_rid.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn tick(&self) -> Timestamp {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn check_column(&self, column: usize) -> std::result::Result<(), StorageError> {
        if column >= self.num_columns {
            return Err(StorageError::ColumnOutOfRange {
                column,
                num_columns: self.num_columns,
            });
        }
        Ok(())
    }

    fn check_arity(&self, actual: usize) -> std::result::Result<(), StorageError> {
        if actual != self.num_columns {
            return Err(StorageError::ArityMismatch {
                expected: self.num_columns,
                actual,
            });
        }
        Ok(())
    }

    fn observe<T>(&self, operation: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let timer = metrics::LatencyTimer::new(operation);
        let result = f();
        drop(timer);
        metrics::record_operation(&self.name, operation, result.is_ok());
        match &result {
            Err(e) if e.is_corruption() => {
                error!(table = %self.name, operation, error = %e, "corrupt table state");
            }
            Ok(_) if matches!(operation, "insert" | "delete") => {
                metrics::set_live_records(&self.name, self.directory.base_len());
            }
            _ => {}
        }
        result
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("num_columns", &self.num_columns)
            .field("key_column", &self.key_column)
            .field("live_records", &self.directory.base_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(num_columns: usize) -> Table {
        Table::new("grades", num_columns, 0, TableOptions::default()).unwrap()
    }

    fn small_pages(num_columns: usize, page_capacity: usize) -> Table {
        let options = TableOptions {
            page_capacity,
            merge_threshold: 4,
        };
        Table::new("grades", num_columns, 0, options).unwrap()
    }

    fn all(t: &Table) -> Projection {
        Projection::all(t.num_columns())
    }

    #[test]
    fn test_new_validates_schema() {
        assert!(Table::new("t", 0, 0, TableOptions::default()).is_err());
        assert!(Table::new("t", 3, 3, TableOptions::default()).is_err());
        assert!(Table::new("t", MAX_COLUMNS + 1, 0, TableOptions::default()).is_err());
        assert!(Table::new("t", MAX_COLUMNS, 0, TableOptions::default()).is_ok());
    }

    #[test]
    fn test_insert_select_round_trip() {
        let t = table(5);
        let rid = t.insert(&[1, 10, 20, 30, 40]).unwrap();

        let records = t.select(1, 0, &all(&t)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rid, rid);
        assert_eq!(records[0].key, 1);
        assert_eq!(records[0].values(), Some(vec![1, 10, 20, 30, 40]));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let t = table(2);
        t.insert(&[1, 10]).unwrap();
        let err = t.insert(&[1, 99]).unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(t.get(1).unwrap().values(), Some(vec![1, 10]));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_insert_arity_checked() {
        let t = table(3);
        assert!(matches!(
            t.insert(&[1, 2]),
            Err(lstore_common::Error::Storage(StorageError::ArityMismatch {
                expected: 3,
                actual: 2
            }))
        ));
    }

    #[test]
    fn test_rids_are_unique_and_increasing() {
        let t = table(2);
        let a = t.insert(&[1, 0]).unwrap();
        t.update(1, &[None, Some(5)]).unwrap();
        let b = t.insert(&[2, 0]).unwrap();
        assert!(b > a + 1, "tail record consumed a rid in between");
    }

    #[test]
    fn test_projection_leaves_columns_absent() {
        let t = table(3);
        t.insert(&[1, 2, 3]).unwrap();
        let record = &t.select(1, 0, &Projection::from_bitmap(&[0, 0, 1])).unwrap()[0];
        assert_eq!(record.columns, vec![None, None, Some(3)]);
        assert_eq!(record.key, 1);
    }

    #[test]
    fn test_projection_width_checked() {
        let t = table(3);
        t.insert(&[1, 2, 3]).unwrap();
        assert!(t.select(1, 0, &Projection::all(2)).is_err());
    }

    #[test]
    fn test_select_missing_key() {
        let t = table(2);
        assert!(t.select(7, 0, &all(&t)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_select_column_out_of_range() {
        let t = table(2);
        assert!(matches!(
            t.select(1, 5, &all(&t)),
            Err(lstore_common::Error::Storage(StorageError::ColumnOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_select_on_unindexed_column_is_not_found() {
        let t = table(2);
        t.insert(&[1, 50]).unwrap();
        assert!(t.select(50, 1, &all(&t)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_sparse_update() {
        let t = table(5);
        t.insert(&[1, 10, 20, 30, 40]).unwrap();
        t.update(1, &[None, None, Some(99), None, None]).unwrap();

        assert_eq!(t.get(1).unwrap().values(), Some(vec![1, 10, 99, 30, 40]));
        let v0 = &t.select_version(1, 0, &all(&t), 0).unwrap()[0];
        assert_eq!(v0.values(), Some(vec![1, 10, 99, 30, 40]));
    }

    #[test]
    fn test_newest_update_wins_per_column() {
        let t = table(3);
        t.insert(&[1, 0, 0]).unwrap();
        t.update(1, &[None, Some(1), Some(1)]).unwrap();
        t.update(1, &[None, Some(2), None]).unwrap();

        assert_eq!(t.get(1).unwrap().values(), Some(vec![1, 2, 1]));
        assert_eq!(t.version_count(1).unwrap(), 2);
    }

    #[test]
    fn test_select_version_walks_back() {
        let t = table(2);
        t.insert(&[1, 100]).unwrap();
        for v in 1..=3 {
            t.update(1, &[None, Some(100 + v)]).unwrap();
        }
        let at = |version: i64| t.select_version(1, 0, &all(&t), version).unwrap()[0].get(1);

        assert_eq!(at(0), Some(103));
        assert_eq!(at(1), Some(102));
        assert_eq!(at(2), Some(101));
        assert_eq!(at(3), Some(100));
        assert_eq!(at(8), Some(100));
        assert_eq!(at(-1), Some(100));
    }

    #[test]
    fn test_select_version_skips_whole_tail_records() {
        let t = table(3);
        t.insert(&[1, 10, 20]).unwrap();
        t.update(1, &[None, Some(11), None]).unwrap();
        t.update(1, &[None, None, Some(21)]).unwrap();

        // Skipping only the newest update keeps the older change to column 1
        let record = &t.select_version(1, 0, &all(&t), 1).unwrap()[0];
        assert_eq!(record.values(), Some(vec![1, 11, 20]));
    }

    #[test]
    fn test_update_missing_key() {
        let t = table(2);
        assert!(t.update(3, &[None, Some(1)]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_cannot_change_primary_key() {
        let t = table(2);
        t.insert(&[1, 10]).unwrap();
        assert!(matches!(
            t.update(1, &[Some(2), None]),
            Err(lstore_common::Error::Storage(StorageError::PrimaryKeyImmutable(1)))
        ));
        // Restating the key is allowed and carries nothing
        t.update(1, &[Some(1), Some(11)]).unwrap();
        assert_eq!(t.get(1).unwrap().values(), Some(vec![1, 11]));
    }

    #[test]
    fn test_empty_update_counts_as_version() {
        let t = table(2);
        t.insert(&[1, 10]).unwrap();
        t.update(1, &[None, Some(11)]).unwrap();
        t.update(1, &[None, None]).unwrap();

        assert_eq!(t.version_count(1).unwrap(), 2);
        assert_eq!(t.select_version(1, 0, &all(&t), 1).unwrap()[0].get(1), Some(11));
        assert_eq!(t.select_version(1, 0, &all(&t), 2).unwrap()[0].get(1), Some(10));
    }

    #[test]
    fn test_delete_hides_row() {
        let t = table(2);
        t.insert(&[1, 10]).unwrap();
        t.update(1, &[None, Some(11)]).unwrap();
        t.delete(1).unwrap();

        assert!(t.select(1, 0, &all(&t)).unwrap_err().is_not_found());
        assert!(t.sum(1, 1, 1).unwrap_err().is_no_match());
        assert!(t.delete(1).unwrap_err().is_not_found());
        assert!(t.update(1, &[None, Some(1)]).unwrap_err().is_not_found());

        let stats = t.stats();
        assert_eq!(stats.live_records, 0);
        assert_eq!(stats.tail_records, 0);
        assert!(t.locate(0, 1).is_empty());
    }

    #[test]
    fn test_key_reusable_after_delete() {
        let t = table(2);
        let first = t.insert(&[1, 10]).unwrap();
        t.delete(1).unwrap();
        let second = t.insert(&[1, 20]).unwrap();
        assert_ne!(first, second);
        assert_eq!(t.get(1).unwrap().values(), Some(vec![1, 20]));
        assert_eq!(t.version_count(1).unwrap(), 0);
    }

    #[test]
    fn test_sum_and_sum_version() {
        let t = table(2);
        for key in 1..=5 {
            t.insert(&[key, key * 10]).unwrap();
        }
        t.update(3, &[None, Some(999)]).unwrap();

        assert_eq!(t.sum(1, 5, 1).unwrap(), 10 + 20 + 999 + 40 + 50);
        assert_eq!(t.sum(2, 3, 1).unwrap(), 20 + 999);
        assert_eq!(t.sum_version(1, 5, 1, 1).unwrap(), 150);
        assert_eq!(t.sum_version(1, 5, 1, -1).unwrap(), 150);
        assert!(t.sum(6, 10, 1).unwrap_err().is_no_match());
        assert!(t.sum(5, 1, 1).unwrap_err().is_no_match());
    }

    #[test]
    fn test_sum_zero_is_not_no_match() {
        let t = table(2);
        t.insert(&[1, 0]).unwrap();
        assert_eq!(t.sum(1, 1, 1).unwrap(), 0);
    }

    #[test]
    fn test_increment() {
        let t = table(3);
        t.insert(&[1, 5, 7]).unwrap();
        t.increment(1, 2).unwrap();
        t.increment(1, 2).unwrap();

        assert_eq!(t.get(1).unwrap().values(), Some(vec![1, 5, 9]));
        assert!(t.increment(2, 1).unwrap_err().is_not_found());
        assert!(t.increment(1, 0).is_err());
    }

    #[test]
    fn test_pages_roll_over() {
        let t = small_pages(2, 4);
        for key in 0..10 {
            t.insert(&[key, key * 2]).unwrap();
        }
        let stats = t.stats();
        assert_eq!(stats.base_pages, 3);
        assert_eq!(stats.full_pages, 2);
        for key in 0..10 {
            assert_eq!(t.get(key).unwrap().get(1), Some(key * 2));
        }
    }

    #[test]
    fn test_secondary_index_follows_updates() {
        let t = table(3);
        t.insert(&[1, 7, 0]).unwrap();
        t.insert(&[2, 7, 0]).unwrap();
        t.create_index(1).unwrap();
        assert_eq!(t.select(7, 1, &all(&t)).unwrap().len(), 2);

        t.update(2, &[None, Some(8), None]).unwrap();
        assert_eq!(t.select(7, 1, &all(&t)).unwrap()[0].key, 1);
        assert_eq!(t.select(8, 1, &all(&t)).unwrap()[0].key, 2);

        // Updates to other columns leave the entry alone
        t.update(2, &[None, None, Some(3)]).unwrap();
        assert_eq!(t.select(8, 1, &all(&t)).unwrap()[0].key, 2);

        t.delete(2).unwrap();
        assert!(t.select(8, 1, &all(&t)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_create_index_uses_current_values() {
        let t = table(2);
        t.insert(&[1, 5]).unwrap();
        t.update(1, &[None, Some(6)]).unwrap();
        t.create_index(1).unwrap();
        t.create_index(1).unwrap();

        assert!(t.locate(1, 5).is_empty());
        assert_eq!(t.locate(1, 6).len(), 1);
    }

    #[test]
    fn test_drop_index() {
        let t = table(2);
        t.create_index(1).unwrap();
        assert!(t.is_indexed(1));
        t.drop_index(1).unwrap();
        assert!(!t.is_indexed(1));
        t.drop_index(1).unwrap();
        assert!(matches!(
            t.drop_index(0),
            Err(lstore_common::Error::Storage(StorageError::PrimaryIndexRequired(0)))
        ));
    }

    #[test]
    fn test_index_agrees_with_base_rid() {
        let t = table(2);
        for key in 0..20 {
            let rid = t.insert(&[key, 0]).unwrap();
            assert_eq!(t.locate(0, key), vec![rid]);
        }
    }

    #[test]
    fn test_update_queues_merge_at_threshold() {
        let t = small_pages(2, 8);
        t.insert(&[1, 0]).unwrap();
        for v in 1..=3 {
            t.update(1, &[None, Some(v)]).unwrap();
        }
        assert_eq!(t.stats().pending_merges, 0);
        t.update(1, &[None, Some(4)]).unwrap();
        assert_eq!(t.stats().pending_merges, 1);
    }
}
