use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use chatdb_extract::commands::{CommandRunner, RunStatus};
use chatdb_extract::config::AppConfig;
use chatdb_extract::extractor::CancellationFlag;
use chatdb_extract::gateway::SqlCipherGateway;
use chatdb_extract::logging::init_logging;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file layered over config/default and config/local
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level, overriding RUST_LOG and logging.level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract chat messages from every database in the key file
    Extract {
        /// Key file listing database paths and keys
        key_file: PathBuf,

        /// Report path (defaults to output.default_path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the records collected so far when interrupted
        #[arg(long)]
        keep_partial: bool,
    },
    /// Print path, key and compatibility mode of every database
    ConnectionInfo {
        /// Key file listing database paths and keys
        key_file: PathBuf,
    },
    /// Print the chat tables found in every database
    ShowTables {
        /// Key file listing database paths and keys
        key_file: PathBuf,

        /// Also list tables that are not chat tables
        #[arg(long)]
        all: bool,
    },
    /// Export a CSV summary of every valid chat table
    ExportTables {
        /// Key file listing database paths and keys
        key_file: PathBuf,

        /// CSV output path
        csv: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load(cli.config.as_deref())?;

    // Initialize logging
    let level = config.log_filter(cli.verbose);
    let log_file = config.logging.file_path.as_deref().map(Path::new);
    let _guard = init_logging(Some(&level), log_file, config.logging.format == "json")?;

    info!("Starting chatdb-extract");

    let cancel = CancellationFlag::new();
    let listener = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next checkpoint");
            listener.raise();
        }
    });

    let command = cli.command;
    let status = tokio::task::spawn_blocking(move || run(command, &config, cancel))
        .await
        .context("Pipeline task failed")??;

    Ok(ExitCode::from(status.exit_code()))
}

fn run(command: Commands, config: &AppConfig, cancel: CancellationFlag) -> Result<RunStatus> {
    let gateway = SqlCipherGateway::new();
    let runner = CommandRunner::new(&gateway, config, cancel);

    match command {
        Commands::Extract {
            key_file,
            output,
            keep_partial,
        } => {
            let output = output.unwrap_or_else(|| PathBuf::from(&config.output.default_path));
            let summary = runner
                .extract(&key_file, &output, keep_partial)
                .with_context(|| format!("Extraction from {} failed", key_file.display()))?;
            if let Some(report) = &summary.report {
                info!("Wrote {} message(s) to {}", summary.messages, report.display());
            }
            Ok(summary.status)
        },
        Commands::ConnectionInfo { key_file } => runner
            .connection_info(&key_file, &mut io::stdout().lock())
            .with_context(|| format!("Connection dump for {} failed", key_file.display())),
        Commands::ShowTables { key_file, all } => runner
            .show_tables(&key_file, all, &mut io::stdout().lock())
            .with_context(|| format!("Table dump for {} failed", key_file.display())),
        Commands::ExportTables { key_file, csv } => runner
            .export_tables(&key_file, &csv)
            .with_context(|| format!("Table export to {} failed", csv.display())),
    }
}
