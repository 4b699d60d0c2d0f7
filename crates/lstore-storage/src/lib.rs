//! L-Store Storage Engine
//!
//! Columnar, page-organized record store providing:
//! - Fixed-capacity single-column pages
//! - A page directory mapping record ids to physical locations
//! - Ordered value indexes with a mandatory primary-key index
//! - Append-only tail records chained off each base record for versioned reads
//! - Merge, which folds version chains into fresh base pages

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod index;
pub mod merge;
pub mod page;
pub mod page_directory;
pub mod table;

mod database;
mod version;

pub use database::Database;
pub use index::Index;
pub use merge::{MergeStats, MergeWorker};
pub use page::{Page, PageSet};
pub use page_directory::{Location, PageDirectory};
pub use table::{Table, TableStats};

use lstore_common::config::{MergeConfig, StorageConfig};

/// Per-table engine options
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Records per page
    pub page_capacity: usize,
    /// Chain length at which a row is queued for merge
    pub merge_threshold: usize,
}

impl TableOptions {
    pub fn new(storage: &StorageConfig, merge: &MergeConfig) -> Self {
        Self {
            page_capacity: storage.page_capacity,
            merge_threshold: merge.chain_threshold,
        }
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self::new(&StorageConfig::default(), &MergeConfig::default())
    }
}
