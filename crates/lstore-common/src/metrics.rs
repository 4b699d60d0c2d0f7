//! Metrics recorders for the record store
//!
//! Thin wrappers over the `metrics` facade. Nothing is exported unless the
//! embedding process installs a recorder.
#![allow(clippy::cast_precision_loss)]

use metrics::{counter, gauge, histogram};
use std::time::Instant;

// ============================================================================
// Table Operation Metrics
// ============================================================================

/// Record a completed table operation
pub fn record_operation(table: &str, operation: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("lstore_operations_total",
        "table" => table.to_string(),
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record operation latency
pub fn record_operation_latency(operation: &'static str, latency_us: f64) {
    histogram!("lstore_operation_duration_us", "operation" => operation).record(latency_us);
}

/// Record the number of tail records walked to resolve one row
pub fn record_chain_walk(length: usize) {
    histogram!("lstore_chain_walk_length").record(length as f64);
}

/// Update the live record gauge of a table
pub fn set_live_records(table: &str, count: usize) {
    gauge!("lstore_live_records", "table" => table.to_string()).set(count as f64);
}

/// Record a page opened in a page set
pub fn record_page_allocated(table: &str, space: &'static str) {
    counter!("lstore_pages_allocated_total",
        "table" => table.to_string(),
        "space" => space
    )
    .increment(1);
}

// ============================================================================
// Merge Metrics
// ============================================================================

/// Record a merge pass over one table
pub fn record_merge(table: &str, rows: u64, tail_records: u64, pages: u64, duration_ms: f64) {
    counter!("lstore_merge_total", "table" => table.to_string()).increment(1);
    counter!("lstore_merge_rows_total", "table" => table.to_string()).increment(rows);
    counter!("lstore_merge_tail_records_released_total", "table" => table.to_string())
        .increment(tail_records);
    counter!("lstore_merge_pages_released_total", "table" => table.to_string()).increment(pages);
    histogram!("lstore_merge_duration_ms").record(duration_ms);
}

/// Timer guard recording operation latency on drop
pub struct LatencyTimer {
    start: Instant,
    operation: &'static str,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    #[must_use]
    pub fn elapsed_us(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1_000_000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_operation_latency(self.operation, self.elapsed_us());
    }
}
