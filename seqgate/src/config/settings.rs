//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file. These
//! are pure data types; parsing lives in `parser`, defaults in `defaults`.

use crate::cassandra::Consistency;
use std::collections::BTreeMap;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Server-wide settings
    pub server: ServerSettings,
    /// Cassandra connection defaults for the session factory
    pub cassandra: CassandraSettings,
    /// Statistics collection settings
    pub statistics: StatisticsSettings,
    /// Per-processor-family settings, keyed by family id
    /// (e.g. "cassandra_processor")
    pub processors: BTreeMap<String, ProcessorFamilySettings>,
}

impl ConfigFile {
    /// Effective concurrency limit for one processor family: the family's
    /// own `max_concurrency` unless it is absent or zero, in which case the
    /// server-wide default applies.
    pub fn processor_max_concurrency(&self, processor_id: &str) -> usize {
        match self.processors.get(processor_id) {
            Some(family) if family.max_concurrency > 0 => family.max_concurrency,
            _ => self.server.processor_max_concurrency,
        }
    }

    /// Whether a processor family is enabled; unknown families are.
    pub fn processor_enabled(&self, processor_id: &str) -> bool {
        self.processors
            .get(processor_id)
            .map(|family| family.enabled)
            .unwrap_or(true)
    }
}

/// `[server]` section.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Meta-keyspace holding `sat2keyspace` and `messages`. Empty means
    /// undefined; schema refresh then fails with KeyspaceUndefined.
    pub mapping_keyspace: String,
    /// Value of the `domain` column the meta tables are filtered by.
    pub configuration_domain: String,
    /// Per-request deadline in seconds.
    pub request_timeout_sec: u64,
    /// Server-wide fallback limit for concurrently working processors of
    /// one family.
    pub processor_max_concurrency: usize,
    /// Worker loop threads processors are pinned to.
    pub worker_threads: usize,
}

/// `[cassandra]` section: defaults the session factory builds with.
#[derive(Debug, Clone)]
pub struct CassandraSettings {
    /// Load-balancer service name or explicit host list for the bootstrap
    /// cluster; empty leaves the choice to the embedder.
    pub service: String,
    pub connect_timeout_ms: u64,
    pub query_timeout_ms: u64,
    /// Retry budget for transient query failures.
    pub max_retries: u32,
    pub consistency: Consistency,
}

/// `[statistics]` section.
#[derive(Debug, Clone)]
pub struct StatisticsSettings {
    /// Seconds between rotation ticks of the per-minute rings.
    pub tick_span_sec: u64,
    /// Seconds between samples fed into the momentary series.
    pub momentary_sample_sec: u64,
}

/// One `[<family>_processor]` section.
#[derive(Debug, Clone)]
pub struct ProcessorFamilySettings {
    pub enabled: bool,
    /// 0 means "use the server-wide default".
    pub max_concurrency: usize,
}
