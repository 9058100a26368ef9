//! In-memory gateway shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chatdb_extract::error::{ExtractError, Result};
use chatdb_extract::extractor::CancellationFlag;
use chatdb_extract::gateway::{Gateway, TableHandle};
use chatdb_extract::models::{DatabaseDescriptor, FieldValue, RawRow};

/// One table held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Fetches starting at or after this offset fail
    pub fail_fetch_at: Option<u64>,
    /// Metadata reads fail
    pub broken_schema: bool,
}

impl MemoryTable {
    pub fn new(columns: &[&str], rows: Vec<RawRow>) -> Self {
        Self {
            columns: columns.iter().map(ToString::to_string).collect(),
            rows,
            ..Self::default()
        }
    }

    pub fn failing_at(mut self, offset: u64) -> Self {
        self.fail_fetch_at = Some(offset);
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken_schema = true;
        self
    }
}

/// One database held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    pub tables: Vec<(String, MemoryTable)>,
    pub fail_open: bool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            tables: Vec::new(),
            fail_open: true,
        }
    }

    pub fn with_table(mut self, name: &str, table: MemoryTable) -> Self {
        self.tables.push((name.to_string(), table));
        self
    }
}

/// Gateway over in-memory databases, keyed by path
#[derive(Debug, Default)]
pub struct MemoryGateway {
    databases: HashMap<String, MemoryDatabase>,
    events: Arc<Mutex<Vec<String>>>,
    cancel_after: Option<(CancellationFlag, usize)>,
    fetches: Arc<Mutex<usize>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, path: &str, database: MemoryDatabase) -> Self {
        self.databases.insert(path.to_string(), database);
        self
    }

    /// Raise `flag` once `fetches` row fetches have been served
    pub fn cancel_after_fetches(mut self, flag: CancellationFlag, fetches: usize) -> Self {
        self.cancel_after = Some((flag, fetches));
        self
    }

    /// `open:<path>` and `close:<path>` in call order
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

impl Gateway for MemoryGateway {
    type Handle = MemoryHandle;

    fn open(&self, descriptor: &DatabaseDescriptor) -> Result<Self::Handle> {
        let database = self.databases.get(&descriptor.path).filter(|db| !db.fail_open).ok_or_else(|| {
            ExtractError::Connection {
                path: descriptor.path.clone(),
                attempts: 4,
                reason: "file is not a database".to_string(),
            }
        })?;

        self.events.lock().unwrap().push(format!("open:{}", descriptor.path));
        Ok(MemoryHandle {
            path: descriptor.path.clone(),
            database: database.clone(),
            events: Arc::clone(&self.events),
            cancel_after: self.cancel_after.clone(),
            fetches: Arc::clone(&self.fetches),
            closed: false,
        })
    }
}

/// Handle over one cloned in-memory database
#[derive(Debug)]
pub struct MemoryHandle {
    path: String,
    database: MemoryDatabase,
    events: Arc<Mutex<Vec<String>>>,
    cancel_after: Option<(CancellationFlag, usize)>,
    fetches: Arc<Mutex<usize>>,
    closed: bool,
}

impl MemoryHandle {
    fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.database
            .tables
            .iter()
            .find(|(table, _)| table == name)
            .map(|(_, table)| table)
    }

    fn schema_table(&self, name: &str) -> Result<&MemoryTable> {
        self.table(name)
            .filter(|table| !table.broken_schema)
            .ok_or_else(|| ExtractError::Schema {
                table: name.to_string(),
                reason: "no such table".to_string(),
            })
    }
}

impl TableHandle for MemoryHandle {
    fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.database.tables.iter().map(|(name, _)| name.clone()).collect())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.schema_table(table)?.columns.clone())
    }

    fn row_count(&self, table: &str) -> Result<u64> {
        Ok(self.schema_table(table)?.rows.len() as u64)
    }

    fn fetch_rows(&self, table: &str, columns: &[String], offset: u64, limit: u64) -> Result<Vec<RawRow>> {
        {
            let mut fetches = self.fetches.lock().unwrap();
            *fetches += 1;
            if let Some((flag, after)) = &self.cancel_after {
                if *fetches >= *after {
                    flag.raise();
                }
            }
        }

        let data = self.schema_table(table)?;
        if data.fail_fetch_at.is_some_and(|at| offset >= at) {
            return Err(ExtractError::Extraction {
                table: table.to_string(),
                offset,
                reason: "database disk image is malformed".to_string(),
            });
        }

        let indexes: Vec<usize> = columns
            .iter()
            .map(|wanted| {
                data.columns
                    .iter()
                    .position(|column| column.eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| ExtractError::Extraction {
                        table: table.to_string(),
                        offset,
                        reason: format!("no such column: {wanted}"),
                    })
            })
            .collect::<Result<_>>()?;

        Ok(data
            .rows
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
            .collect())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.events.lock().unwrap().push(format!("close:{}", self.path));
        }
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.close();
    }
}

pub fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

pub fn int(value: i64) -> FieldValue {
    FieldValue::Integer(value)
}

/// `count` rows of `(MesLocalID, MsgCreateTime, MsgContent)`
pub fn chat_rows(count: i64) -> Vec<RawRow> {
    (1..=count)
        .map(|i| vec![int(i), int(1_700_000_000 + i), text(&format!("message {i}"))])
        .collect()
}

pub fn chat_table(count: i64) -> MemoryTable {
    MemoryTable::new(&["MesLocalID", "MsgCreateTime", "MsgContent"], chat_rows(count))
}

pub fn descriptor(path: &str) -> DatabaseDescriptor {
    DatabaseDescriptor::new(path, "x'0011'", 3)
}
