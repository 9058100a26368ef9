//! Data models for extracted messages and run reports
//!
//! This module contains the data structures shared by the pipeline: database
//! descriptors read from the key file, raw row values, the canonical message
//! record and the report documents written at the end of a run.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Compatibility mode used when the key file does not say otherwise.
pub const DEFAULT_CIPHER_COMPATIBILITY: i32 = 3;

/// Source type assigned when a path has no directory segment.
pub const UNKNOWN_SOURCE_TYPE: &str = "unknown";

/// One encrypted database and the key that opens it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    /// Absolute path of the database file
    pub path: String,
    /// Key material exactly as it appeared in the key file
    pub key: String,
    /// SQLCipher compatibility mode
    pub cipher_compatibility: i32,
    /// Directory the database lives in, e.g. `Message`
    pub source_type: String,
}

impl DatabaseDescriptor {
    /// Build a descriptor, deriving the source type from the path.
    #[must_use]
    pub fn new(path: &str, key: &str, cipher_compatibility: i32) -> Self {
        Self {
            path: path.to_string(),
            key: key.to_string(),
            cipher_compatibility,
            source_type: source_type_from_path(path),
        }
    }

    /// File name component of the path.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Last non-empty path segment before the file name.
#[must_use]
pub fn source_type_from_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    parts
        .iter()
        .rev()
        .skip(1)
        .find(|segment| !segment.is_empty())
        .map_or_else(|| UNKNOWN_SOURCE_TYPE.to_string(), |segment| (*segment).to_string())
}

/// A single column value as returned by the gateway
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// SQL NULL
    Null,
    /// Integer storage class
    Integer(i64),
    /// Floating point storage class
    Real(f64),
    /// Text storage class
    Text(String),
    /// Binary storage class
    Blob(Vec<u8>),
}

impl FieldValue {
    /// True for SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Field values in the order the columns were requested
pub type RawRow = Vec<FieldValue>;

/// Canonical output record for one message row
///
/// The four provenance fields are always present. Role fields are only
/// populated when the table had a matching column and the row value was
/// not NULL. Remaining columns are kept in `extra` under their column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Path of the database the row came from
    pub database_path: String,
    /// Source type of that database
    pub database_type: String,
    /// Table the row came from
    pub table_name: String,
    /// Moment the row was materialized
    pub extracted_at: DateTime<Local>,
    /// Sender identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Value>,
    /// Normalized timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Timestamp value before normalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_raw: Option<Value>,
    /// Message body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Message identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Value>,
    /// Message type code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<Value>,
    /// Columns without a canonical role
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageRecord {
    /// Field names owned by the record itself; passthrough columns must not reuse them.
    pub const RESERVED_FIELDS: [&'static str; 10] = [
        "database_path",
        "database_type",
        "table_name",
        "extracted_at",
        "sender",
        "timestamp",
        "timestamp_raw",
        "content",
        "message_id",
        "message_type",
    ];

    /// Empty record stamped with the current time.
    #[must_use]
    pub fn new(descriptor: &DatabaseDescriptor, table_name: &str) -> Self {
        Self {
            database_path: descriptor.path.clone(),
            database_type: descriptor.source_type.clone(),
            table_name: table_name.to_string(),
            extracted_at: Local::now(),
            sender: None,
            timestamp: None,
            timestamp_raw: None,
            content: None,
            message_id: None,
            message_type: None,
            extra: Map::new(),
        }
    }

    /// Store a passthrough column under a key no other field uses.
    ///
    /// A name that collides with a record field becomes `column_<name>`; a
    /// key already taken by an earlier column gets a `_2`, `_3`, ... suffix.
    pub fn insert_passthrough(&mut self, column: &str, value: Value) {
        let base = if Self::RESERVED_FIELDS.contains(&column) {
            format!("column_{column}")
        } else {
            column.to_string()
        };

        let mut key = base.clone();
        let mut suffix = 2;
        while self.extra.contains_key(&key) || Self::RESERVED_FIELDS.contains(&key.as_str()) {
            key = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.extra.insert(key, value);
    }
}

/// Metadata block at the top of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// When the report was produced
    pub generated_at: DateTime<Local>,
    /// Number of records in `messages`
    pub total_messages: usize,
    /// Number of usable databases loaded from the key file
    pub total_databases: usize,
    /// Key file the run was driven by
    pub source_key_file: String,
}

/// Primary output artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    /// Run summary
    pub metadata: ReportMetadata,
    /// Records in processing order
    pub messages: Vec<MessageRecord>,
}

impl ExtractionReport {
    /// Wrap extracted records with a freshly stamped metadata block.
    #[must_use]
    pub fn new(messages: Vec<MessageRecord>, total_databases: usize, source_key_file: &str) -> Self {
        Self {
            metadata: ReportMetadata {
                generated_at: Local::now(),
                total_messages: messages.len(),
                total_databases,
                source_key_file: source_key_file.to_string(),
            },
            messages,
        }
    }
}

/// One row of the chat table CSV export
///
/// Carries the database key, so the export is as sensitive as the key file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    /// File name of the database
    pub database_name: String,
    /// Source type of the database
    pub database_type: String,
    /// Full database path
    pub database_path: String,
    /// Database file size in bytes
    pub database_size: u64,
    /// Chat table name
    pub table_name: String,
    /// Table classification, always `chat`
    pub table_type: String,
    /// Rows in the table
    pub row_count: u64,
    /// Number of columns
    pub column_count: usize,
    /// Comma separated column names
    pub columns: String,
    /// Key material used to open the database
    pub key: String,
    /// Compatibility mode used to open the database
    pub cipher_compatibility: i32,
    /// When the row was produced
    pub extracted_at: String,
}
