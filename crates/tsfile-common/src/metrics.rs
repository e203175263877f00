//! Metrics for TsFile sessions
//!
//! Thin wrappers over the `metrics` facade. Nothing is exported unless the
//! embedding application installs a recorder.
#![allow(clippy::cast_precision_loss)]

use metrics::{counter, histogram};

// ============================================================================
// Write Metrics
// ============================================================================

/// Record rows accepted from a tablet or record
pub fn record_rows_written(device: &str, rows: u64) {
    counter!("tsfile_rows_written_total", "device" => device.to_string()).increment(rows);
}

/// Record individual points accepted
pub fn record_points_written(points: u64) {
    counter!("tsfile_points_written_total").increment(points);
}

/// Record a flush of buffered chunk groups
pub fn record_flush(chunk_groups: u64, bytes: u64) {
    counter!("tsfile_flushes_total").increment(1);
    counter!("tsfile_chunk_groups_flushed_total").increment(chunk_groups);
    counter!("tsfile_bytes_flushed_total").increment(bytes);
}

// ============================================================================
// Read Metrics
// ============================================================================

/// Record rows delivered by a result cursor
pub fn record_rows_read(rows: u64) {
    counter!("tsfile_rows_read_total").increment(rows);
}

/// Record the size of a materialized batch
pub fn record_pull(rows: usize) {
    histogram!("tsfile_pull_rows").record(rows as f64);
}
