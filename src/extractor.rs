//! Extraction orchestration
//!
//! Walks every database, every chat table and every batch of rows in turn.
//! Results flow back up as return values: a table yields its records, a
//! database yields the records of its tables, and the run collects them all.
//! Failures stay inside the unit that raised them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::classifier::{self, TableValidation};
use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::gateway::{Gateway, TableHandle};
use crate::metrics::MetricsCollector;
use crate::models::{DatabaseDescriptor, ExtractionReport, MessageRecord, TableSummary};
use crate::normalizer::build_record;
use crate::resolver::SelectPlan;
use crate::schema::SchemaRules;

/// Shared interrupt flag, checked between databases and between batches
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Fresh, lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop at the next checkpoint.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tunables for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOptions {
    /// Rows fetched per query
    pub batch_size: u64,
    /// Rows between progress log lines
    pub progress_interval: u64,
    /// Source type processed first
    pub priority_database_type: String,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self::from(&ExtractionConfig::default())
    }
}

impl From<&ExtractionConfig> for ExtractionOptions {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            progress_interval: config.progress_interval.max(1),
            priority_database_type: config.priority_database_type.clone(),
        }
    }
}

/// Lifecycle of one database within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    /// Not yet opened
    Pending,
    /// Handle acquired
    Connected,
    /// Table names read
    TablesListed,
    /// No chat tables
    Skipped,
    /// Reading chat tables
    Extracting,
    /// Could not be opened or listed
    Failed,
    /// Handle released
    Closed,
}

/// Final status of one database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseStatus {
    /// Chat tables were processed
    Extracted,
    /// No table name looked like a chat table
    NoChatTables,
    /// The database could not be opened or listed
    Failed,
    /// The run was interrupted while this database was open
    Cancelled,
}

impl DatabaseStatus {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extracted => "extracted",
            Self::NoChatTables => "no_chat_tables",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What happened to one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSummary {
    /// Database path
    pub path: String,
    /// Source type
    pub database_type: String,
    /// Final status
    pub status: DatabaseStatus,
    /// Chat tables that produced records
    pub tables_extracted: usize,
    /// Chat tables that failed validation checks or fetches
    pub tables_failed: usize,
    /// Chat tables rejected by the structural check
    pub tables_skipped: usize,
    /// Records produced
    pub messages: usize,
    /// Reason for a failed database
    pub error: Option<String>,
}

impl DatabaseSummary {
    fn new(descriptor: &DatabaseDescriptor) -> Self {
        Self {
            path: descriptor.path.clone(),
            database_type: descriptor.source_type.clone(),
            status: DatabaseStatus::Extracted,
            tables_extracted: 0,
            tables_failed: 0,
            tables_skipped: 0,
            messages: 0,
            error: None,
        }
    }
}

/// Records of one database plus its summary
#[derive(Debug)]
pub struct DatabaseExtraction {
    /// Records in table order
    pub records: Vec<MessageRecord>,
    /// Summary of the database
    pub summary: DatabaseSummary,
}

/// Records of one table
///
/// When `error` is set the records are the rows read before the failure.
#[derive(Debug, Default)]
pub struct TableExtraction {
    /// Records in fetch order
    pub records: Vec<MessageRecord>,
    /// Fetch failure that ended the table early
    pub error: Option<ExtractError>,
    /// Whether the run was interrupted mid-table
    pub interrupted: bool,
}

/// Result of a whole run
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    /// All records in processing order
    pub messages: Vec<MessageRecord>,
    /// One summary per database visited
    pub databases: Vec<DatabaseSummary>,
    /// Whether the run stopped on an interrupt
    pub cancelled: bool,
}

impl ExtractionOutcome {
    /// Databases that were opened and listed.
    #[must_use]
    pub fn processed_databases(&self) -> usize {
        self.databases
            .iter()
            .filter(|summary| summary.status != DatabaseStatus::Failed)
            .count()
    }

    /// Turn the outcome into the report document.
    #[must_use]
    pub fn into_report(self, total_databases: usize, source_key_file: &str) -> ExtractionReport {
        ExtractionReport::new(self.messages, total_databases, source_key_file)
    }
}

/// Discovery result for one chat table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTableInfo {
    /// Table name
    pub name: String,
    /// Structural check, when requested and readable
    pub validation: Option<TableValidation>,
    /// Metadata failure
    pub error: Option<String>,
}

/// Discovery result for one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDiscovery {
    /// Database that was inspected
    pub descriptor: DatabaseDescriptor,
    /// File size in bytes
    pub size_bytes: Option<u64>,
    /// Whether a key encoding worked
    pub connected: bool,
    /// Connection or listing failure
    pub error: Option<String>,
    /// All table names
    pub tables: Vec<String>,
    /// Chat tables in processing order
    pub chat_tables: Vec<ChatTableInfo>,
}

impl DatabaseDiscovery {
    /// CSV rows for the chat tables that passed validation.
    #[must_use]
    pub fn table_summaries(&self, extracted_at: &str) -> Vec<TableSummary> {
        self.chat_tables
            .iter()
            .filter_map(|table| {
                let validation = table.validation.as_ref().filter(|v| v.valid)?;
                Some(TableSummary {
                    database_name: self.descriptor.file_name().to_string(),
                    database_type: self.descriptor.source_type.clone(),
                    database_path: self.descriptor.path.clone(),
                    database_size: self.size_bytes.unwrap_or(0),
                    table_name: table.name.clone(),
                    table_type: "chat".to_string(),
                    row_count: validation.row_count,
                    column_count: validation.columns.len(),
                    columns: validation.columns.join(", "),
                    key: self.descriptor.key.clone(),
                    cipher_compatibility: self.descriptor.cipher_compatibility,
                    extracted_at: extracted_at.to_string(),
                })
            })
            .collect()
    }
}

/// Databases of `priority_type` first, others after, each in input order.
#[must_use]
pub fn prioritize<'a>(descriptors: &'a [DatabaseDescriptor], priority_type: &str) -> Vec<&'a DatabaseDescriptor> {
    let (mut first, rest): (Vec<_>, Vec<_>) = descriptors.iter().partition(|d| d.source_type == priority_type);
    first.extend(rest);
    first
}

/// Drives discovery and extraction over a gateway
pub struct Extractor<'a, G: Gateway> {
    gateway: &'a G,
    rules: &'a SchemaRules,
    options: ExtractionOptions,
    cancel: CancellationFlag,
    metrics: MetricsCollector,
}

impl<'a, G: Gateway> Extractor<'a, G> {
    /// Extractor with its own, never raised, cancellation flag.
    #[must_use]
    pub fn new(gateway: &'a G, rules: &'a SchemaRules, options: ExtractionOptions) -> Self {
        Self {
            gateway,
            rules,
            options,
            cancel: CancellationFlag::new(),
            metrics: MetricsCollector,
        }
    }

    /// Observe `cancel` at every checkpoint.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Extract every chat table of every database.
    pub fn extract_all(&self, descriptors: &[DatabaseDescriptor]) -> ExtractionOutcome {
        let ordered = prioritize(descriptors, &self.options.priority_database_type);
        info!("Starting extraction over {} database(s)", ordered.len());

        let mut outcome = ExtractionOutcome::default();

        for descriptor in ordered {
            if self.cancel.is_raised() {
                warn!("Interrupted, stopping before {}", descriptor.path);
                outcome.cancelled = true;
                break;
            }

            info!("Processing database: {} (type: {})", descriptor.file_name(), descriptor.source_type);
            let DatabaseExtraction { records, summary } = self.extract_database(descriptor);

            outcome.cancelled = summary.status == DatabaseStatus::Cancelled;
            outcome.messages.extend(records);
            outcome.databases.push(summary);
            self.metrics.set_pending_records(outcome.messages.len());

            if outcome.cancelled {
                warn!("Interrupted, {} record(s) collected so far", outcome.messages.len());
                break;
            }
        }

        info!(
            "Extraction finished: {} database(s) processed, {} message(s) extracted",
            outcome.processed_databases(),
            outcome.messages.len()
        );
        outcome
    }

    /// Extract one database. The handle is released before returning.
    pub fn extract_database(&self, descriptor: &DatabaseDescriptor) -> DatabaseExtraction {
        let mut state = DatabaseState::Pending;
        let mut summary = DatabaseSummary::new(descriptor);

        let mut handle = match self.gateway.open(descriptor) {
            Ok(handle) => {
                Self::advance(descriptor, &mut state, DatabaseState::Connected);
                handle
            },
            Err(e) => {
                warn!("Skipping database {}: {}", descriptor.path, e);
                Self::advance(descriptor, &mut state, DatabaseState::Failed);
                Self::advance(descriptor, &mut state, DatabaseState::Closed);
                self.metrics.record_error(e.kind());
                self.metrics.record_database(DatabaseStatus::Failed.as_str());
                summary.status = DatabaseStatus::Failed;
                summary.error = Some(e.to_string());
                return DatabaseExtraction {
                    records: Vec::new(),
                    summary,
                };
            },
        };

        let records = self.extract_open_database(&handle, descriptor, &mut state, &mut summary);

        handle.close();
        Self::advance(descriptor, &mut state, DatabaseState::Closed);

        summary.messages = records.len();
        self.metrics.record_database(summary.status.as_str());
        DatabaseExtraction { records, summary }
    }

    fn extract_open_database(
        &self,
        handle: &G::Handle,
        descriptor: &DatabaseDescriptor,
        state: &mut DatabaseState,
        summary: &mut DatabaseSummary,
    ) -> Vec<MessageRecord> {
        let tables = match handle.list_tables() {
            Ok(tables) => tables,
            Err(e) => {
                error!("Failed to list tables of {}: {}", descriptor.path, e);
                Self::advance(descriptor, state, DatabaseState::Failed);
                self.metrics.record_error(e.kind());
                summary.status = DatabaseStatus::Failed;
                summary.error = Some(e.to_string());
                return Vec::new();
            },
        };
        Self::advance(descriptor, state, DatabaseState::TablesListed);

        let chat_tables = classifier::find_chat_tables(&tables);
        info!("Found {} chat table(s): {:?}", chat_tables.len(), chat_tables);

        if chat_tables.is_empty() {
            info!("No chat tables in {}", descriptor.file_name());
            Self::advance(descriptor, state, DatabaseState::Skipped);
            summary.status = DatabaseStatus::NoChatTables;
            return Vec::new();
        }
        Self::advance(descriptor, state, DatabaseState::Extracting);

        let mut records = Vec::new();
        for table in &chat_tables {
            if self.cancel.is_raised() {
                summary.status = DatabaseStatus::Cancelled;
                break;
            }

            let validation = match classifier::validate(handle, table, self.rules) {
                Ok(validation) => validation,
                Err(e) => {
                    warn!("Skipping table {} in {}: {}", table, descriptor.path, e);
                    self.metrics.record_error(e.kind());
                    summary.tables_failed += 1;
                    continue;
                },
            };
            if !validation.valid {
                summary.tables_skipped += 1;
                continue;
            }

            let started = Instant::now();
            let extraction = self.extract_table(handle, descriptor, table, &validation.columns);
            let status = match (&extraction.error, extraction.interrupted) {
                (Some(e), _) => {
                    self.metrics.record_error(e.kind());
                    summary.tables_failed += 1;
                    "partial"
                },
                (None, true) => "interrupted",
                (None, false) => {
                    summary.tables_extracted += 1;
                    "extracted"
                },
            };
            self.metrics.record_table(status, extraction.records.len(), started.elapsed());
            records.extend(extraction.records);

            if extraction.interrupted {
                summary.status = DatabaseStatus::Cancelled;
                break;
            }
        }

        records
    }

    /// Page through `table` and normalize every row.
    ///
    /// A fetch failure ends the table; rows read before it are returned with
    /// the error.
    pub fn extract_table(
        &self,
        handle: &G::Handle,
        descriptor: &DatabaseDescriptor,
        table: &str,
        columns: &[String],
    ) -> TableExtraction {
        let plan = SelectPlan::new(columns, self.rules);
        if plan.is_empty() {
            warn!("Table {} has no columns to extract", table);
            return TableExtraction::default();
        }
        debug!(table, roles = ?plan.roles, columns = ?plan.columns, "Resolved column roles");

        let batch_size = self.options.batch_size;
        let mut records = Vec::new();
        let mut offset = 0_u64;
        let mut next_progress = self.options.progress_interval;

        loop {
            if self.cancel.is_raised() {
                info!("Interrupted in table {} after {} row(s)", table, offset);
                return TableExtraction {
                    records,
                    error: None,
                    interrupted: true,
                };
            }

            let rows = match handle.fetch_rows(table, &plan.columns, offset, batch_size) {
                Ok(rows) => rows,
                Err(e) => {
                    error!(
                        "Extraction of table {} in {} stopped after {} row(s): {}",
                        table, descriptor.path, offset, e
                    );
                    return TableExtraction {
                        records,
                        error: Some(e),
                        interrupted: false,
                    };
                },
            };
            if rows.is_empty() {
                break;
            }

            offset += rows.len() as u64;
            records.extend(rows.iter().map(|row| build_record(descriptor, table, &plan, row)));

            if offset >= next_progress {
                info!("Extracted {} row(s) from table {}...", offset, table);
                while next_progress <= offset {
                    next_progress += self.options.progress_interval;
                }
            }
        }

        info!("Table {} done, {} record(s)", table, records.len());
        TableExtraction {
            records,
            error: None,
            interrupted: false,
        }
    }

    /// Inspect databases without reading row data.
    ///
    /// With `validate` set every chat table also gets the structural check.
    pub fn discover(&self, descriptors: &[DatabaseDescriptor], validate: bool) -> Vec<DatabaseDiscovery> {
        let mut discoveries = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if self.cancel.is_raised() {
                warn!("Interrupted, stopping discovery before {}", descriptor.path);
                break;
            }
            discoveries.push(self.discover_database(descriptor, validate));
        }

        discoveries
    }

    fn discover_database(&self, descriptor: &DatabaseDescriptor, validate: bool) -> DatabaseDiscovery {
        let mut discovery = DatabaseDiscovery {
            descriptor: descriptor.clone(),
            size_bytes: std::fs::metadata(&descriptor.path).ok().map(|meta| meta.len()),
            connected: false,
            error: None,
            tables: Vec::new(),
            chat_tables: Vec::new(),
        };

        let mut handle = match self.gateway.open(descriptor) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot connect to {}: {}", descriptor.file_name(), e);
                discovery.error = Some(e.to_string());
                return discovery;
            },
        };
        discovery.connected = true;

        match handle.list_tables() {
            Ok(tables) => {
                discovery.chat_tables = classifier::find_chat_tables(&tables)
                    .into_iter()
                    .map(|name| {
                        let (validation, error) = if validate {
                            match classifier::validate(&handle, &name, self.rules) {
                                Ok(v) => (Some(v), None),
                                Err(e) => (None, Some(e.to_string())),
                            }
                        } else {
                            (None, None)
                        };
                        ChatTableInfo { name, validation, error }
                    })
                    .collect();
                discovery.tables = tables;
            },
            Err(e) => {
                error!("Failed to list tables of {}: {}", descriptor.path, e);
                discovery.error = Some(e.to_string());
            },
        }

        handle.close();
        discovery
    }

    fn advance(descriptor: &DatabaseDescriptor, state: &mut DatabaseState, next: DatabaseState) {
        debug!(path = %descriptor.path, from = ?*state, to = ?next, "Database state change");
        *state = next;
    }
}
