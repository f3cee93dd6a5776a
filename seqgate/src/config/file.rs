//! Configuration file handling for ~/.seqgate/config.ini.

use ini::Ini;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use super::settings::ConfigFile;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Loads configuration from the default path (~/.seqgate/config.ini).
    ///
    /// A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Saves configuration to the default path.
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }
        std::fs::write(path, self.to_config_string())
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Creates the default config file if it doesn't exist; returns its path.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }

    fn to_config_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[server]");
        let _ = writeln!(out, "mapping_keyspace = {}", self.server.mapping_keyspace);
        let _ = writeln!(
            out,
            "configuration_domain = {}",
            self.server.configuration_domain
        );
        let _ = writeln!(
            out,
            "request_timeout_sec = {}",
            self.server.request_timeout_sec
        );
        let _ = writeln!(
            out,
            "processor_max_concurrency = {}",
            self.server.processor_max_concurrency
        );
        let _ = writeln!(out, "worker_threads = {}", self.server.worker_threads);
        let _ = writeln!(out);
        let _ = writeln!(out, "[cassandra]");
        let _ = writeln!(out, "service = {}", self.cassandra.service);
        let _ = writeln!(
            out,
            "connect_timeout_ms = {}",
            self.cassandra.connect_timeout_ms
        );
        let _ = writeln!(out, "query_timeout_ms = {}", self.cassandra.query_timeout_ms);
        let _ = writeln!(out, "max_retries = {}", self.cassandra.max_retries);
        let _ = writeln!(
            out,
            "consistency = {}",
            self.cassandra.consistency.to_string().to_lowercase()
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "[statistics]");
        let _ = writeln!(out, "tick_span_sec = {}", self.statistics.tick_span_sec);
        let _ = writeln!(
            out,
            "momentary_sample_sec = {}",
            self.statistics.momentary_sample_sec
        );
        for (name, family) in &self.processors {
            let _ = writeln!(out);
            let _ = writeln!(out, "[{name}]");
            let _ = writeln!(out, "enabled = {}", family.enabled);
            let _ = writeln!(out, "max_concurrency = {}", family.max_concurrency);
        }
        out
    }
}

/// Path to the config directory (~/.seqgate).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".seqgate")
}

/// Path to the config file (~/.seqgate/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
