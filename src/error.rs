//! Error types for the chatdb-extract library.
//!
//! Errors are scoped to the unit of work they affect: a `Config` error aborts
//! the whole run, a `Connection` error skips one database, a `Schema` error
//! skips one table, and an `Extraction` error ends one table early while the
//! rows read before it are kept.

use thiserror::Error;

/// Errors that can occur while discovering and extracting chat tables.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The key file (or another required input) could not be read
    #[error("Configuration error: {0}")]
    Config(String),

    /// A database could not be opened under any key encoding
    #[error("Could not open database {path} after {attempts} key encoding(s): {reason}")]
    Connection {
        /// Database file path
        path: String,
        /// Number of key encodings tried
        attempts: usize,
        /// Failure reported by the last attempt
        reason: String,
    },

    /// Table metadata could not be read
    #[error("Schema error in table {table}: {reason}")]
    Schema {
        /// Table name
        table: String,
        /// Underlying failure
        reason: String,
    },

    /// Row fetch failed part way through a table
    #[error("Extraction error in table {table} at offset {offset}: {reason}")]
    Extraction {
        /// Table name
        table: String,
        /// Row offset of the batch that failed
        offset: u64,
        /// Underlying failure
        reason: String,
    },

    /// The schema rule table is malformed
    #[error("Rule table error: {0}")]
    Rules(String),

    /// A user supplied value was rejected
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV writing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A finished temp file could not be moved into place
    #[error("Could not persist output file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl ExtractError {
    /// Short label used for metrics and log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Connection { .. } => "connection",
            Self::Schema { .. } => "schema",
            Self::Extraction { .. } => "extraction",
            Self::Rules(_) => "rules",
            Self::InvalidInput(_) => "invalid_input",
            Self::Database(_) => "database",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Csv(_) => "csv",
            Self::Persist(_) => "persist",
        }
    }

    /// Whether this error must abort the run instead of skipping a unit.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<serde_yaml::Error> for ExtractError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Rules(err.to_string())
    }
}

/// Convenience type alias for Result with `ExtractError`
pub type Result<T> = std::result::Result<T, ExtractError>;
