//! Named table registry

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{error, info};

use lstore_common::config::Config;
use lstore_common::error::{Result, StorageError};

use crate::merge::MergeStats;
use crate::table::Table;
use crate::TableOptions;

/// A set of tables sharing one set of engine options
#[derive(Debug, Default)]
pub struct Database {
    options: TableOptions,
    tables: DashMap<String, Arc<Table>>,
}

impl Database {
    pub fn new(options: TableOptions) -> Self {
        Self {
            options,
            tables: DashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(TableOptions::new(&config.storage, &config.merge))
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    // ========================================================================
    // Table Operations
    // ========================================================================

    /// Create a table. Fails if the name is taken.
    pub fn create_table(
        &self,
        name: &str,
        num_columns: usize,
        key_column: usize,
    ) -> Result<Arc<Table>> {
        match self.tables.entry(name.to_string()) {
            Entry::Occupied(_) => Err(StorageError::TableExists(name.to_string()).into()),
            Entry::Vacant(slot) => {
                let table = Arc::new(Table::new(
                    name,
                    num_columns,
                    key_column,
                    self.options.clone(),
                )?);
                slot.insert(Arc::clone(&table));
                Ok(table)
            }
        }
    }

    pub fn get_table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()).into())
    }

    /// Remove a table. Handles already held by callers keep working.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let (_, table) = self
            .tables
            .remove(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))?;
        info!(table = %name, live_records = table.len(), "dropped table");
        Ok(())
    }

    /// Table names, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge queued rows of every table
    pub fn merge(&self) -> Result<MergeStats> {
        self.merge_each(Table::merge)
    }

    /// Merge every chain of every table
    pub fn merge_all(&self) -> Result<MergeStats> {
        self.merge_each(Table::merge_all)
    }

    /// A failing table does not stop the pass; the first error is returned
    /// after every table has been visited.
    fn merge_each(&self, merge: impl Fn(&Table) -> Result<MergeStats>) -> Result<MergeStats> {
        let mut total = MergeStats::default();
        let mut first_error = None;
        for table in self.snapshot() {
            match merge(&*table) {
                Ok(stats) => total += stats,
                Err(e) => {
                    error!(table = %table.name(), error = %e, "table merge failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    // Clone the handles out so no shard lock is held while merging.
    fn snapshot(&self) -> Vec<Arc<Table>> {
        self.tables.iter().map(|e| Arc::clone(e.value())).collect()
    }
}
