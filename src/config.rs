use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::DEFAULT_CIPHER_COMPATIBILITY;

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Logging settings
    pub logging: LoggingConfig,
    /// Pipeline settings
    pub extraction: ExtractionConfig,
    /// Output settings
    pub output: OutputConfig,
    /// Rule table settings
    pub rules: RulesConfig,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Optional rolling log file
    pub file_path: Option<String>,
    /// Console format, "text" or "json"
    pub format: String,
}

/// Pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Rows fetched per query
    pub batch_size: u64,
    /// Rows between progress log lines
    pub progress_interval: u64,
    /// Source type processed before all others
    pub priority_database_type: String,
    /// Compatibility mode stamped on parsed descriptors
    pub default_cipher_compatibility: i32,
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Report path used when `--output` is not given
    pub default_path: String,
}

/// Rule table settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// YAML rule table replacing the built-in one
    pub path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            format: "text".to_string(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            progress_interval: 10_000,
            priority_database_type: "Message".to_string(),
            default_cipher_compatibility: DEFAULT_CIPHER_COMPATIBILITY,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_path: "chat_export.json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    ///
    /// Later sources win: `config/default`, `config/local`, the explicit
    /// file (if any), then `CHATDB_EXTRACT_*` environment variables using
    /// `__` between section and key.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("CHATDB_EXTRACT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate extraction config
        if self.extraction.batch_size == 0 {
            return Err(anyhow::anyhow!("batch_size must be greater than 0"));
        }
        if self.extraction.progress_interval == 0 {
            return Err(anyhow::anyhow!("progress_interval must be greater than 0"));
        }
        if !(1..=4).contains(&self.extraction.default_cipher_compatibility) {
            return Err(anyhow::anyhow!(
                "default_cipher_compatibility must be between 1 and 4, got {}",
                self.extraction.default_cipher_compatibility
            ));
        }

        // Validate output config
        if self.output.default_path.trim().is_empty() {
            return Err(anyhow::anyhow!("output.default_path cannot be empty"));
        }

        Ok(())
    }

    /// Filter directive for the subscriber. `verbose` wins over `RUST_LOG`,
    /// which wins over `logging.level`.
    #[must_use]
    pub fn log_filter(&self, verbose: bool) -> String {
        resolve_log_filter(verbose, std::env::var("RUST_LOG").ok(), &self.logging.level)
    }

    /// Rule table path, if one is configured
    #[must_use]
    pub fn rules_path(&self) -> Option<PathBuf> {
        self.rules.path.as_ref().map(PathBuf::from)
    }
}

fn resolve_log_filter(verbose: bool, env_filter: Option<String>, configured: &str) -> String {
    if verbose {
        return "debug".to_string();
    }
    env_filter
        .filter(|filter| !filter.trim().is_empty())
        .unwrap_or_else(|| configured.to_string())
}
