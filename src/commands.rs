//! Command implementations behind the CLI
//!
//! Each command loads descriptors from a key file, drives an [`Extractor`]
//! over the given gateway and decides what gets written. Only
//! [`CommandRunner::extract`] writes the JSON report.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{ExtractError, Result};
use crate::extractor::{CancellationFlag, DatabaseDiscovery, ExtractionOptions, ExtractionOutcome, Extractor};
use crate::file_writer;
use crate::gateway::Gateway;
use crate::keystore::KeyStore;
use crate::logging::OperationTimer;
use crate::models::DatabaseDescriptor;
use crate::schema::SchemaRules;
use crate::validation::InputValidator;

/// Exit status for a run stopped by an interrupt
pub const EXIT_INTERRUPTED: u8 = 130;

/// How a command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every database was visited
    Completed,
    /// The cancellation flag stopped the run
    Interrupted,
}

impl RunStatus {
    /// Process exit status.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::Interrupted => EXIT_INTERRUPTED,
        }
    }

    fn from_flag(cancel: &CancellationFlag) -> Self {
        if cancel.is_raised() {
            Self::Interrupted
        } else {
            Self::Completed
        }
    }
}

/// Result of the extract command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    /// How the run ended
    pub status: RunStatus,
    /// Records collected
    pub messages: usize,
    /// Report path, when one was written
    pub report: Option<PathBuf>,
}

/// Read the key file. An unreadable file or one without usable databases is fatal.
pub fn load_descriptors(config: &AppConfig, key_file: &Path) -> Result<Vec<DatabaseDescriptor>> {
    InputValidator::validate_key_file(key_file)?;
    InputValidator::validate_cipher_compatibility(config.extraction.default_cipher_compatibility)?;

    let descriptors = KeyStore::new(config.extraction.default_cipher_compatibility).load(key_file)?;
    if descriptors.is_empty() {
        return Err(ExtractError::Config(format!(
            "no usable databases found in {}",
            key_file.display()
        )));
    }

    info!("Loaded {} database(s) from {}", descriptors.len(), key_file.display());
    Ok(descriptors)
}

/// Configured rule table, or the built-in one.
pub fn load_rules(config: &AppConfig) -> Result<SchemaRules> {
    match config.rules_path() {
        Some(path) => {
            info!("Using rule table {}", path.display());
            SchemaRules::from_path(&path)
        },
        None => SchemaRules::builtin(),
    }
}

/// Runs CLI commands over a gateway
pub struct CommandRunner<'a, G: Gateway> {
    gateway: &'a G,
    config: &'a AppConfig,
    cancel: CancellationFlag,
}

impl<'a, G: Gateway> CommandRunner<'a, G> {
    /// Runner observing `cancel`.
    #[must_use]
    pub const fn new(gateway: &'a G, config: &'a AppConfig, cancel: CancellationFlag) -> Self {
        Self { gateway, config, cancel }
    }

    /// Extract every database and write the JSON report to `output`.
    ///
    /// An interrupted run writes nothing unless `keep_partial` is set. A run
    /// that finds no records still writes an empty report.
    pub fn extract(&self, key_file: &Path, output: &Path, keep_partial: bool) -> Result<ExtractSummary> {
        let timer = OperationTimer::new("extract");

        InputValidator::validate_output_path(output)?;
        InputValidator::validate_batch_size(self.config.extraction.batch_size)?;

        let descriptors = load_descriptors(self.config, key_file)?;
        let rules = load_rules(self.config)?;
        let outcome = self.extractor(&rules).extract_all(&descriptors);
        log_outcome(&outcome);

        let status = if outcome.cancelled { RunStatus::Interrupted } else { RunStatus::Completed };
        let messages = outcome.messages.len();

        if status == RunStatus::Interrupted && !keep_partial {
            warn!("Interrupted, no report written ({} collected record(s) discarded)", messages);
            return Ok(ExtractSummary {
                status,
                messages,
                report: None,
            });
        }

        if messages == 0 {
            warn!("No messages were extracted");
        }

        let report = outcome.into_report(descriptors.len(), &key_file.to_string_lossy());
        file_writer::write_report(&report, output)?;

        timer.finish();
        Ok(ExtractSummary {
            status,
            messages,
            report: Some(output.to_path_buf()),
        })
    }

    /// Dump connection details of every database to `out`.
    pub fn connection_info<W: Write>(&self, key_file: &Path, out: &mut W) -> Result<RunStatus> {
        let descriptors = load_descriptors(self.config, key_file)?;
        file_writer::write_connection_info(out, &descriptors)?;
        out.flush()?;
        Ok(RunStatus::Completed)
    }

    /// Dump the chat tables of every database to `out`.
    pub fn show_tables<W: Write>(&self, key_file: &Path, all: bool, out: &mut W) -> Result<RunStatus> {
        let timer = OperationTimer::new("show-tables");

        let discoveries = self.discover(key_file)?;
        file_writer::write_table_overview(out, &discoveries, all)?;
        out.flush()?;

        timer.finish();
        Ok(RunStatus::from_flag(&self.cancel))
    }

    /// Write a CSV row for every valid chat table to `csv`.
    ///
    /// Nothing is written when interrupted or when no table qualifies.
    pub fn export_tables(&self, key_file: &Path, csv: &Path) -> Result<RunStatus> {
        let timer = OperationTimer::new("export-tables");

        InputValidator::validate_output_path(csv)?;
        let discoveries = self.discover(key_file)?;

        if self.cancel.is_raised() {
            warn!("Interrupted, no table export written");
            return Ok(RunStatus::Interrupted);
        }

        let extracted_at = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        let rows: Vec<_> = discoveries
            .iter()
            .flat_map(|discovery| discovery.table_summaries(&extracted_at))
            .collect();

        if rows.is_empty() {
            warn!("No valid chat tables found, nothing exported");
        } else {
            file_writer::write_table_summaries(&rows, csv)?;
            warn!("{} contains database keys, store it accordingly", csv.display());
        }

        timer.finish();
        Ok(RunStatus::Completed)
    }

    fn discover(&self, key_file: &Path) -> Result<Vec<DatabaseDiscovery>> {
        let descriptors = load_descriptors(self.config, key_file)?;
        let rules = load_rules(self.config)?;
        Ok(self.extractor(&rules).discover(&descriptors, true))
    }

    fn extractor<'r>(&'r self, rules: &'r SchemaRules) -> Extractor<'r, G> {
        Extractor::new(self.gateway, rules, ExtractionOptions::from(&self.config.extraction))
            .with_cancellation(self.cancel.clone())
    }
}

fn log_outcome(outcome: &ExtractionOutcome) {
    for summary in &outcome.databases {
        debug!(
            path = %summary.path,
            status = summary.status.as_str(),
            tables_extracted = summary.tables_extracted,
            tables_failed = summary.tables_failed,
            tables_skipped = summary.tables_skipped,
            messages = summary.messages,
            "Database summary"
        );
    }
    info!(
        "Processed {} of {} visited database(s), {} message(s)",
        outcome.processed_databases(),
        outcome.databases.len(),
        outcome.messages.len()
    );
}
