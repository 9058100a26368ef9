//! Unit tests for validation.rs module

use std::fs;

use chatdb_extract::error::ExtractError;
use chatdb_extract::validation::InputValidator;
use tempfile::TempDir;

#[test]
fn test_validate_key_file_existing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keys.txt");
    fs::write(&path, "sqlcipher db path: '/x/Message/a.db'\n").unwrap();

    assert!(InputValidator::validate_key_file(&path).is_ok());
}

#[test]
fn test_validate_key_file_missing_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = InputValidator::validate_key_file(&dir.path().join("nope.txt")).unwrap_err();

    assert!(matches!(err, ExtractError::Config(_)));
}

#[test]
fn test_validate_key_file_directory() {
    let dir = TempDir::new().unwrap();
    assert!(InputValidator::validate_key_file(dir.path()).is_err());
}

#[test]
fn test_validate_output_path_valid() {
    let dir = TempDir::new().unwrap();
    assert!(InputValidator::validate_output_path(&dir.path().join("out.json")).is_ok());
}

#[test]
fn test_validate_output_path_empty() {
    assert!(InputValidator::validate_output_path(std::path::Path::new("")).is_err());
}

#[test]
fn test_validate_output_path_directory() {
    let dir = TempDir::new().unwrap();
    assert!(InputValidator::validate_output_path(dir.path()).is_err());
}

#[test]
fn test_validate_output_path_too_long() {
    let long = "a".repeat(4097);
    assert!(InputValidator::validate_output_path(std::path::Path::new(&long)).is_err());
}

#[test]
fn test_validate_batch_size_bounds() {
    assert!(InputValidator::validate_batch_size(0).is_err());
    assert!(InputValidator::validate_batch_size(1).is_ok());
    assert!(InputValidator::validate_batch_size(100_000).is_ok());
    assert!(InputValidator::validate_batch_size(100_001).is_err());
}

#[test]
fn test_validate_cipher_compatibility() {
    assert!(InputValidator::validate_cipher_compatibility(0).is_err());
    for mode in 1..=4 {
        assert!(InputValidator::validate_cipher_compatibility(mode).is_ok());
    }
    assert!(InputValidator::validate_cipher_compatibility(5).is_err());
}
