//! Merge: folding version chains back into base pages
//!
//! Merging a row writes its fully resolved current state as a new base
//! generation, repoints the directory at it and discards the row's tail
//! records. Each row is merged under the table write lock, so readers see
//! either the old base plus chain or the new base alone. Pages whose slots
//! have all been superseded are released at the end of a pass.
//!
//! After a merge the row's history is gone: the insert-time state a versioned
//! read falls back to is the merged generation.

use std::ops::AddAssign;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use lstore_common::config::MergeConfig;
use lstore_common::error::{Result, StorageError};
use lstore_common::metrics;
use lstore_common::types::{Projection, RecordId, RelativeVersion, SchemaEncoding};

use crate::database::Database;
use crate::table::Table;
use crate::version::{base_meta, decode_u64, encode_u64, walk_chain};

/// Outcome of a merge pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeStats {
    /// Rows rewritten into a new base generation
    pub rows_merged: usize,
    /// Tail records discarded
    pub tail_records_released: usize,
    /// Page generations (base and tail) released
    pub pages_released: usize,
}

impl MergeStats {
    pub fn is_empty(&self) -> bool {
        self.rows_merged == 0 && self.pages_released == 0
    }
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.rows_merged += other.rows_merged;
        self.tail_records_released += other.tail_records_released;
        self.pages_released += other.pages_released;
    }
}

impl Table {
    /// Merge the rows whose chains reached the merge threshold
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub fn merge(&self) -> Result<MergeStats> {
        let mut rids: Vec<RecordId> = self.merge_queue.iter().map(|rid| *rid).collect();
        rids.sort_unstable();
        self.merge_rows(&rids)
    }

    /// Merge every row that has at least one tail record
    #[instrument(level = "debug", skip(self), fields(table = %self.name))]
    pub fn merge_all(&self) -> Result<MergeStats> {
        debug!(
            table = %self.name,
            tail_records = self.indirection.total_length(),
            "merging all chains"
        );
        let rids = self.indirection.bases();
        self.merge_rows(&rids)
    }

    fn merge_rows(&self, rids: &[RecordId]) -> Result<MergeStats> {
        let start = Instant::now();
        let mut stats = MergeStats::default();

        for &rid in rids {
            match self.merge_row(rid) {
                Ok(Some(released)) => {
                    stats.rows_merged += 1;
                    stats.tail_records_released += released;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(table = %self.name, rid, error = %e, "merge failed");
                    return Err(e.into());
                }
            }
        }

        stats.pages_released = self.release_pages();

        let elapsed = start.elapsed();
        metrics::record_merge(
            &self.name,
            stats.rows_merged as u64,
            stats.tail_records_released as u64,
            stats.pages_released as u64,
            elapsed.as_secs_f64() * 1000.0,
        );
        if !stats.is_empty() {
            info!(
                table = %self.name,
                rows = stats.rows_merged,
                tail_records = stats.tail_records_released,
                pages = stats.pages_released,
                elapsed_ms = elapsed.as_millis(),
                "merge complete"
            );
        }
        Ok(stats)
    }

    /// Merge one row. `None` if the row was deleted or has no chain.
    fn merge_row(&self, rid: RecordId) -> std::result::Result<Option<usize>, StorageError> {
        let _guard = self.write_lock.lock();
        self.merge_queue.remove(&rid);

        let Some(location) = self.directory.get_base(rid) else {
            return Ok(None);
        };
        let Some(head) = self.indirection.head(rid) else {
            return Ok(None);
        };

        let mut base = self.base.write();
        let mut tail = self.tail.write();

        let chain = walk_chain(&tail, &self.directory, rid, head)?;
        let values = self
            .resolve(
                &base,
                &tail,
                rid,
                &Projection::all(self.num_columns),
                RelativeVersion::Latest,
            )?
            .values()
            .ok_or_else(|| StorageError::CorruptData(format!("row {rid} has absent columns")))?;

        let created = base
            .read(location, base_meta::TIMESTAMP)
            .ok_or_else(|| StorageError::missing_slot(rid))?;
        let folded = chain.iter().fold(
            SchemaEncoding::from_bits(
                base.read(location, base_meta::SCHEMA_ENCODING)
                    .map_or(0, decode_u64),
            ),
            |acc, header| acc.union(header.schema),
        );

        let mut row = Vec::with_capacity(base_meta::WIDTH + self.num_columns);
        row.push(Some(encode_u64(rid)));
        row.push(Some(created));
        row.push(Some(encode_u64(folded.bits())));
        row.extend(values.into_iter().map(Some));

        let (merged, opened) = base.append(&row)?;
        if opened {
            metrics::record_page_allocated(&self.name, "base");
        }

        // Repoint first; the old generation and the chain are unreachable after this.
        self.directory.put_base(rid, merged);
        self.indirection.clear(rid);
        base.tombstone(location);
        for header in &chain {
            self.directory.remove_tail(header.rid);
            tail.tombstone(header.location);
        }

        debug!(rid, tail_records = chain.len(), page = merged.page, "merged row");
        Ok(Some(chain.len()))
    }

    fn release_pages(&self) -> usize {
        let mut base = self.base.write();
        let mut tail = self.tail.write();
        base.release_reclaimable() + tail.release_reclaimable()
    }
}

// ============================================================================
// Background Worker
// ============================================================================

/// Periodically merges queued rows of every table in a database
pub struct MergeWorker {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl MergeWorker {
    /// Start the worker on the current tokio runtime. `None` when merging is
    /// disabled in `config`.
    pub fn spawn(database: Arc<Database>, config: &MergeConfig) -> Option<Self> {
        if !config.enabled {
            info!("background merge disabled");
            return None;
        }
        let (shutdown, mut receiver) = broadcast::channel(1);
        let period = Duration::from_millis(config.interval_ms.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_ms = period.as_millis(), "merge worker started");

            loop {
                tokio::select! {
                    _ = receiver.recv() => break,
                    _ = ticker.tick() => {
                        let db = Arc::clone(&database);
                        match tokio::task::spawn_blocking(move || db.merge()).await {
                            Ok(Ok(stats)) if !stats.is_empty() => {
                                debug!(rows = stats.rows_merged, "background merge pass");
                            }
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => warn!(error = %e, "background merge pass failed"),
                            Err(e) => {
                                error!(error = %e, "merge task panicked");
                                break;
                            }
                        }
                    }
                }
            }

            info!("merge worker stopped");
        });

        Some(Self { shutdown, handle })
    }

    /// Signal the worker and wait for it to finish its current pass
    pub async fn shutdown(self) -> Result<()> {
        // A send error means the worker already exited.
        let _ = self.shutdown.send(());
        self.handle
            .await
            .map_err(|e| lstore_common::Error::Internal(format!("merge worker failed: {e}")))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
