//! Metrics collection
//!
//! Thin wrapper over the `metrics` facade. Nothing is exported unless the
//! embedding application installs a recorder.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Databases processed, labelled by outcome
pub const DATABASES_TOTAL: &str = "chatdb_extract_databases_total";
/// Chat tables seen, labelled by outcome
pub const TABLES_TOTAL: &str = "chatdb_extract_tables_total";
/// Message records produced
pub const MESSAGES_TOTAL: &str = "chatdb_extract_messages_total";
/// Errors, labelled by kind
pub const ERRORS_TOTAL: &str = "chatdb_extract_errors_total";
/// Time spent extracting one table
pub const TABLE_DURATION: &str = "chatdb_extract_table_duration_seconds";
/// Records held in memory awaiting output
pub const PENDING_RECORDS: &str = "chatdb_extract_pending_records";

/// Records pipeline metrics
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Count a finished database.
    pub fn record_database(&self, status: &'static str) {
        counter!(DATABASES_TOTAL, "status" => status).increment(1);
    }

    /// Count a chat table and its outcome.
    pub fn record_table(&self, status: &'static str, messages: usize, duration: Duration) {
        counter!(TABLES_TOTAL, "status" => status).increment(1);
        counter!(MESSAGES_TOTAL).increment(messages as u64);
        histogram!(TABLE_DURATION).record(duration.as_secs_f64());
    }

    /// Count an error of `kind`.
    pub fn record_error(&self, kind: &'static str) {
        counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    }

    /// Update the size of the in-memory accumulator.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_pending_records(&self, count: usize) {
        gauge!(PENDING_RECORDS).set(count as f64);
    }
}
