//! Configuration for the seqgate core.
//!
//! Settings live in an INI file at `~/.seqgate/config.ini`. Use
//! [`ConfigFile::load()`] to read it (a missing file falls back to
//! defaults) or [`ConfigFile::ensure_exists()`] to create one. Settings
//! structs are in `settings`, defaults in `defaults`, INI parsing in
//! `parser`, file handling in `file`.

mod defaults;
mod file;
mod parser;
mod settings;

pub use defaults::{
    default_worker_threads, num_cpus, DEFAULT_CONFIGURATION_DOMAIN, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_MAPPING_KEYSPACE, DEFAULT_MOMENTARY_SAMPLE_SEC, DEFAULT_PROCESSOR_MAX_CONCURRENCY,
    DEFAULT_QUERY_MAX_RETRIES, DEFAULT_QUERY_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_SEC,
    DEFAULT_STAT_TICK_SPAN_SEC,
};
pub use file::{config_directory, config_file_path, ConfigFile, ConfigFileError};
pub use settings::{
    CassandraSettings, ProcessorFamilySettings, ServerSettings, StatisticsSettings,
};
