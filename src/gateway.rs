//! Database access for encrypted chat stores
//!
//! The pipeline only talks to the [`Gateway`] and [`TableHandle`] traits. The
//! SQLCipher implementation opens databases read-only through `rusqlite` and
//! tries several spellings of the key until one unlocks the file.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::error::{ExtractError, Result};
use crate::models::{DatabaseDescriptor, FieldValue, RawRow};

/// Opens database handles
pub trait Gateway {
    /// Handle type produced by this gateway
    type Handle: TableHandle;

    /// Open the database described by `descriptor`.
    ///
    /// Fails with [`ExtractError::Connection`] once every key encoding failed.
    fn open(&self, descriptor: &DatabaseDescriptor) -> Result<Self::Handle>;
}

/// Read access to one opened database
pub trait TableHandle {
    /// Names of all tables.
    fn list_tables(&self) -> Result<Vec<String>>;

    /// Column names of `table` in declaration order.
    fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Number of rows in `table`.
    fn row_count(&self, table: &str) -> Result<u64>;

    /// Up to `limit` rows of `columns` starting at `offset`.
    fn fetch_rows(&self, table: &str, columns: &[String], offset: u64, limit: u64) -> Result<Vec<RawRow>>;

    /// Release the handle. Calling it again is a no-op.
    fn close(&mut self);
}

/// One way of spelling a key in `PRAGMA key`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// Exactly as read from the key file
    AsGiven,
    /// With surrounding quote characters removed
    Unwrapped,
    /// Wrapped in double quotes
    Quoted,
    /// Hex digits only, or a bare key wrapped as a hex literal
    BareHex,
}

impl KeyEncoding {
    /// Encodings in the order they are attempted.
    pub const ALL: [Self; 4] = [Self::AsGiven, Self::Unwrapped, Self::Quoted, Self::BareHex];

    /// Render `key` in this encoding.
    #[must_use]
    pub fn apply(self, key: &str) -> String {
        let key = key.trim();
        match self {
            Self::AsGiven => key.to_string(),
            Self::Unwrapped => strip_quotes(key).to_string(),
            Self::Quoted => format!("\"{}\"", strip_quotes(key)),
            Self::BareHex => {
                let inner = strip_quotes(key);
                hex_literal_body(inner).map_or_else(|| format!("x'{inner}'"), str::to_string)
            },
        }
    }
}

/// Distinct `PRAGMA key` arguments for `key`, in attempt order.
#[must_use]
pub fn key_candidates(key: &str) -> Vec<(KeyEncoding, String)> {
    let mut candidates: Vec<(KeyEncoding, String)> = Vec::new();
    for encoding in KeyEncoding::ALL {
        let rendered = encoding.apply(key);
        if !rendered.is_empty() && !candidates.iter().any(|(_, existing)| *existing == rendered) {
            candidates.push((encoding, rendered));
        }
    }
    candidates
}

fn strip_quotes(key: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = key.strip_prefix(quote).and_then(|rest| rest.strip_suffix(quote)) {
            return inner;
        }
    }
    key
}

fn hex_literal_body(key: &str) -> Option<&str> {
    key.strip_prefix("x'")
        .or_else(|| key.strip_prefix("X'"))
        .and_then(|rest| rest.strip_suffix('\''))
}

/// Quote an SQL identifier.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl From<ValueRef<'_>> for FieldValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            // invalid UTF-8 in a TEXT cell is kept as bytes and rendered as hex later
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map_or_else(|_| Self::Blob(bytes.to_vec()), |text| Self::Text(text.to_string())),
            ValueRef::Blob(bytes) => Self::Blob(bytes.to_vec()),
        }
    }
}

/// Gateway for SQLCipher encrypted databases
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlCipherGateway;

impl SqlCipherGateway {
    /// Create a gateway.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn try_open(path: &Path, pragma_key: &str, cipher_compatibility: i32) -> rusqlite::Result<(Connection, i64)> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;

        // execute_batch tolerates pragmas that return a status row
        conn.execute_batch(&format!("PRAGMA key = {pragma_key};"))?;
        conn.execute_batch(&format!("PRAGMA cipher_compatibility = {cipher_compatibility};"))?;

        let table_count: i64 =
            conn.query_row("SELECT count(*) FROM sqlite_master WHERE type='table'", [], |row| row.get(0))?;
        Ok((conn, table_count))
    }
}

impl Gateway for SqlCipherGateway {
    type Handle = SqlCipherHandle;

    fn open(&self, descriptor: &DatabaseDescriptor) -> Result<Self::Handle> {
        let path = Path::new(&descriptor.path);
        let candidates = key_candidates(&descriptor.key);
        let mut last_error = String::from("no usable key encoding");

        debug!(
            path = %descriptor.path,
            cipher_compatibility = descriptor.cipher_compatibility,
            attempts = candidates.len(),
            "Connecting to database"
        );

        for (attempt, (encoding, pragma_key)) in candidates.iter().enumerate() {
            match Self::try_open(path, pragma_key, descriptor.cipher_compatibility) {
                Ok((conn, table_count)) => {
                    info!(
                        "Connected to {} with {} table(s) (key encoding {:?}, attempt {})",
                        descriptor.file_name(),
                        table_count,
                        encoding,
                        attempt + 1
                    );
                    return Ok(SqlCipherHandle {
                        conn: Some(conn),
                        path: descriptor.path.clone(),
                    });
                },
                Err(e) => {
                    debug!(encoding = ?encoding, error = %e, "Key encoding rejected");
                    last_error = e.to_string();
                },
            }
        }

        warn!(
            "Could not decrypt {}: {} key encoding(s) failed",
            descriptor.file_name(),
            candidates.len()
        );
        Err(ExtractError::Connection {
            path: descriptor.path.clone(),
            attempts: candidates.len(),
            reason: last_error,
        })
    }
}

/// Open SQLCipher connection, closed on drop
#[derive(Debug)]
pub struct SqlCipherHandle {
    conn: Option<Connection>,
    path: String,
}

impl SqlCipherHandle {
    /// Path of the underlying database.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the connection has been released.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn conn(&self) -> rusqlite::Result<&Connection> {
        self.conn.as_ref().ok_or(rusqlite::Error::InvalidQuery)
    }

    fn schema_error(table: &str, err: &rusqlite::Error) -> ExtractError {
        ExtractError::Schema {
            table: table.to_string(),
            reason: err.to_string(),
        }
    }
}

impl TableHandle for SqlCipherHandle {
    fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let query = || -> rusqlite::Result<Vec<String>> {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
            let columns = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(columns)
        };
        query().map_err(|e| Self::schema_error(table, &e))
    }

    fn row_count(&self, table: &str) -> Result<u64> {
        let count = self
            .conn()
            .and_then(|conn| {
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_identifier(table)), [], |row| {
                    row.get::<_, i64>(0)
                })
            })
            .map_err(|e| Self::schema_error(table, &e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn fetch_rows(&self, table: &str, columns: &[String], offset: u64, limit: u64) -> Result<Vec<RawRow>> {
        let select_list = columns.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", ");
        let sql = format!("SELECT {select_list} FROM {} LIMIT ?1 OFFSET ?2", quote_identifier(table));

        let query = || -> rusqlite::Result<Vec<RawRow>> {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&sql)?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let offset = i64::try_from(offset).unwrap_or(i64::MAX);
            let rows = stmt
                .query_map(params![limit, offset], |row| {
                    (0..columns.len())
                        .map(|i| row.get_ref(i).map(FieldValue::from))
                        .collect::<rusqlite::Result<RawRow>>()
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        };

        query().map_err(|e| ExtractError::Extraction {
            table: table.to_string(),
            offset,
            reason: e.to_string(),
        })
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                warn!(path = %self.path, error = %e, "Error while closing database");
            } else {
                debug!(path = %self.path, "Database closed");
            }
        }
    }
}

impl Drop for SqlCipherHandle {
    fn drop(&mut self) {
        self.close();
    }
}
