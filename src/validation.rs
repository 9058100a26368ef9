use std::path::Path;

use crate::error::{ExtractError, Result};

/// Validation utilities for command line input
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate the key file path
    ///
    /// A missing or unreadable key file is a configuration error and ends
    /// the run.
    pub fn validate_key_file(path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(ExtractError::Config("Key file path cannot be empty".to_string()));
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| ExtractError::Config(format!("Key file {} is not accessible: {e}", path.display())))?;

        if !metadata.is_file() {
            return Err(ExtractError::Config(format!("Key file {} is not a file", path.display())));
        }

        Ok(())
    }

    /// Validate an output file path
    pub fn validate_output_path(path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        if path_str.trim().is_empty() {
            return Err(ExtractError::InvalidInput("Output path cannot be empty".to_string()));
        }

        if path_str.len() > 4096 {
            return Err(ExtractError::InvalidInput("Output path too long (max 4096 characters)".to_string()));
        }

        if path.is_dir() {
            return Err(ExtractError::InvalidInput(format!(
                "Output path {} is a directory",
                path.display()
            )));
        }

        Ok(())
    }

    /// Validate batch size for row fetching
    pub fn validate_batch_size(batch_size: u64) -> Result<()> {
        if batch_size == 0 {
            return Err(ExtractError::InvalidInput("Batch size must be greater than 0".to_string()));
        }

        if batch_size > 100_000 {
            return Err(ExtractError::InvalidInput("Batch size too large (max 100,000)".to_string()));
        }

        Ok(())
    }

    /// Validate a SQLCipher compatibility mode
    pub fn validate_cipher_compatibility(mode: i32) -> Result<()> {
        if !(1..=4).contains(&mode) {
            return Err(ExtractError::InvalidInput(format!(
                "Cipher compatibility must be between 1 and 4, got {mode}"
            )));
        }

        Ok(())
    }
}
