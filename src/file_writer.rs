//! File writing utilities for reports and dumps.
//!
//! Files are written to a temporary sibling first and moved into place once
//! complete, so an interrupted run never leaves a truncated report behind.
//! The plain text dumps write to any `Write` so the CLI can point them at
//! stdout.

use std::fs::{self, File, create_dir_all};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::Result;
use crate::extractor::DatabaseDiscovery;
use crate::models::{DatabaseDescriptor, ExtractionReport, TableSummary};

const RULE: &str = "# ============================================================";

/// Write `path` through a temp file in the same directory.
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    create_dir_all(directory)?;

    let mut temp = NamedTempFile::new_in(directory)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}

/// Write the report as pretty-printed UTF-8 JSON.
///
/// Non-ASCII text is written as-is, not escaped.
pub fn write_report(report: &ExtractionReport, path: &Path) -> Result<()> {
    write_atomically(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, report)?;
        writeln!(writer)?;
        Ok(())
    })?;

    let size = fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
    info!(
        "Wrote {} message(s) to {} ({} bytes)",
        report.metadata.total_messages,
        path.display(),
        size
    );
    Ok(())
}

/// Read a report written by [`write_report`].
pub fn read_report(path: &Path) -> Result<ExtractionReport> {
    let file = File::open(path)?;
    let report = serde_json::from_reader(BufReader::new(file))?;
    Ok(report)
}

/// Write chat table summaries as CSV with a header row.
pub fn write_table_summaries(rows: &[TableSummary], path: &Path) -> Result<()> {
    write_atomically(path, |writer| {
        let mut csv = csv::Writer::from_writer(writer);
        for row in rows {
            csv.serialize(row)?;
        }
        csv.flush()?;
        Ok(())
    })?;

    info!("Exported {} chat table(s) to {}", rows.len(), path.display());
    Ok(())
}

/// Dump path, key and compatibility mode of every descriptor.
pub fn write_connection_info<W: Write>(writer: &mut W, descriptors: &[DatabaseDescriptor]) -> Result<()> {
    writeln!(writer, "# Database connection info")?;
    writeln!(writer, "# Format: path | key | cipher_compatibility")?;
    writeln!(writer, "{RULE}")?;
    writeln!(writer)?;

    for descriptor in descriptors {
        writeln!(writer, "Path: {}", descriptor.path)?;
        writeln!(writer, "Key: {}", descriptor.key)?;
        writeln!(writer, "cipher_compatibility: {}", descriptor.cipher_compatibility)?;
        writeln!(writer, "{}", "-".repeat(60))?;
    }

    Ok(())
}

/// Human readable overview of discovered databases and their chat tables.
pub fn write_table_overview<W: Write>(writer: &mut W, discoveries: &[DatabaseDiscovery], show_all: bool) -> Result<()> {
    writeln!(writer, "# Database tables")?;
    writeln!(writer, "{RULE}")?;

    for discovery in discoveries {
        let descriptor = &discovery.descriptor;
        writeln!(writer)?;
        writeln!(writer, "Database: {}", descriptor.file_name())?;
        writeln!(writer, "   Type: {}", descriptor.source_type)?;
        writeln!(writer, "   Path: {}", descriptor.path)?;
        match discovery.size_bytes {
            Some(size) => writeln!(writer, "   Size: {} bytes", group_thousands(size))?,
            None => writeln!(writer, "   Size: unknown")?,
        }

        if !discovery.connected {
            writeln!(
                writer,
                "   Connection failed: {}",
                discovery.error.as_deref().unwrap_or("unknown error")
            )?;
            continue;
        }
        if let Some(error) = &discovery.error {
            writeln!(writer, "   Error: {error}")?;
        }

        writeln!(writer, "   Tables: {}", discovery.tables.len())?;
        writeln!(writer, "   Chat tables: {}", discovery.chat_tables.len())?;
        for table in &discovery.chat_tables {
            match (&table.validation, &table.error) {
                (Some(validation), _) => writeln!(
                    writer,
                    "     - {} ({} rows, {} columns{})",
                    table.name,
                    group_thousands(validation.row_count),
                    validation.columns.len(),
                    if validation.valid { "" } else { ", not a message table" }
                )?,
                (None, Some(error)) => writeln!(writer, "     - {} (error: {error})", table.name)?,
                (None, None) => writeln!(writer, "     - {}", table.name)?,
            }
        }

        if show_all {
            writeln!(writer, "   All tables ({}):", discovery.tables.len())?;
            for table in &discovery.tables {
                writeln!(writer, "     * {table}")?;
            }
        }
    }

    Ok(())
}

/// `1234567` -> `1,234,567`
fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
