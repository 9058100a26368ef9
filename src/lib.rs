//! chatdb-extract - Chat table discovery and export for SQLCipher stores
//!
//! A Rust library for opening a set of SQLCipher-encrypted chat databases
//! described by a key file, finding the tables that hold chat messages and
//! exporting their rows as normalized message records.
//!
//! # Features
//!
//! - Key file parsing into database descriptors
//! - Read-only SQLCipher access with key encoding fallbacks
//! - Name and structure based chat table detection
//! - Column role resolution from a YAML rule table
//! - Timestamp normalization and a JSON report with provenance metadata
//! - Connection and table overview dumps plus a CSV table export

/// Chat table detection and validation
pub mod classifier;
/// CLI command implementations
pub mod commands;
/// Configuration management
pub mod config;
/// Error types
pub mod error;
/// Extraction orchestration
pub mod extractor;
/// Report and dump writers
pub mod file_writer;
/// Encrypted database access
pub mod gateway;
/// Key file parsing
pub mod keystore;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Row to record conversion
pub mod normalizer;
/// Column role resolution
pub mod resolver;
/// Schema rule table
pub mod schema;
/// Input validation
pub mod validation;

// Re-export key components for easier access
pub use error::{ExtractError, Result};
pub use extractor::{CancellationFlag, ExtractionOptions, ExtractionOutcome, Extractor};
pub use gateway::{Gateway, SqlCipherGateway, TableHandle};
pub use keystore::KeyStore;
pub use models::{DatabaseDescriptor, ExtractionReport, FieldValue, MessageRecord, RawRow};
pub use schema::SchemaRules;
