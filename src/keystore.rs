//! Key file parsing
//!
//! A key file lists databases and the keys that open them as pairs of lines:
//!
//! ```text
//! sqlcipher db path: '/path/to/Message/msg_0.db'
//! PRAGMA key = "x'0a1b2c...'"
//! ```
//!
//! Anything else in the file is ignored.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{ExtractError, Result};
use crate::models::{DatabaseDescriptor, DEFAULT_CIPHER_COMPATIBILITY};

#[allow(clippy::expect_used)]
static PATH_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sqlcipher db path: '([^']+)'").expect("path pattern is valid"));
#[allow(clippy::expect_used)]
static KEY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^PRAGMA key = "([^"]+)""#).expect("key pattern is valid"));

/// Reads database descriptors from key files
#[derive(Debug, Clone, Copy)]
pub struct KeyStore {
    cipher_compatibility: i32,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new(DEFAULT_CIPHER_COMPATIBILITY)
    }
}

impl KeyStore {
    /// Key store stamping `cipher_compatibility` on every descriptor.
    #[must_use]
    pub const fn new(cipher_compatibility: i32) -> Self {
        Self { cipher_compatibility }
    }

    /// Parse key file text into descriptors.
    ///
    /// A key line pairs with the most recent path line that has not been
    /// paired yet. Keys without a pending path, and paths replaced by another
    /// path before any key appears, yield nothing.
    #[must_use]
    pub fn parse(&self, content: &str) -> Vec<DatabaseDescriptor> {
        let mut descriptors = Vec::new();
        let mut current_path: Option<String> = None;

        for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if let Some(caps) = PATH_LINE.captures(line) {
                if let Some(dropped) = current_path.replace(caps[1].to_string()) {
                    debug!(path = %dropped, "Path line without a key, skipping");
                }
                continue;
            }

            if let Some(caps) = KEY_LINE.captures(line) {
                match current_path.take() {
                    Some(path) => descriptors.push(DatabaseDescriptor::new(&path, &caps[1], self.cipher_compatibility)),
                    None => debug!("Key line without a preceding path, skipping"),
                }
            }
        }

        if let Some(dropped) = current_path {
            debug!(path = %dropped, "Trailing path line without a key, skipping");
        }

        descriptors
    }

    /// Read a key file and keep the descriptors whose database exists.
    ///
    /// Duplicate paths keep their first entry. Fails only when the file
    /// itself cannot be read.
    pub fn load(&self, key_file: &Path) -> Result<Vec<DatabaseDescriptor>> {
        let bytes = std::fs::read(key_file)
            .map_err(|e| ExtractError::Config(format!("cannot read key file {}: {e}", key_file.display())))?;
        // dumps may carry binary noise between the pairs
        let content = String::from_utf8_lossy(&bytes);
        info!("Loaded key file: {}", key_file.display());

        let mut seen = HashSet::new();
        let mut databases = Vec::new();

        for descriptor in self.parse(&content) {
            if !seen.insert(descriptor.path.clone()) {
                debug!(path = %descriptor.path, "Duplicate database entry, keeping the first");
                continue;
            }

            match std::fs::metadata(&descriptor.path) {
                Ok(meta) if meta.is_file() => {
                    info!(
                        "Found database: {} - {} ({} bytes)",
                        descriptor.source_type,
                        descriptor.file_name(),
                        meta.len()
                    );
                    debug!(
                        path = %descriptor.path,
                        key = %descriptor.key,
                        cipher_compatibility = descriptor.cipher_compatibility,
                        "Database descriptor"
                    );
                    databases.push(descriptor);
                },
                _ => warn!("Database file does not exist: {}", descriptor.path),
            }
        }

        info!("Loaded {} usable database(s)", databases.len());
        Ok(databases)
    }
}
