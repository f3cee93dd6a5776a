//! Default values and constants for all configuration settings.

use super::settings::*;
use crate::cassandra::Consistency;
use std::collections::BTreeMap;

pub const DEFAULT_MAPPING_KEYSPACE: &str = "sat_info";
pub const DEFAULT_CONFIGURATION_DOMAIN: &str = "PSG";
pub const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 30;
pub const DEFAULT_PROCESSOR_MAX_CONCURRENCY: usize = 1200;

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 2_500;
pub const DEFAULT_QUERY_MAX_RETRIES: u32 = 5;

pub const DEFAULT_STAT_TICK_SPAN_SEC: u64 = 10;
pub const DEFAULT_MOMENTARY_SAMPLE_SEC: u64 = 5;

/// Number of available CPU cores.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Default worker loop count: one per core, at least two so a stalled
/// processor cannot starve the whole dispatch plane.
pub fn default_worker_threads() -> usize {
    num_cpus().max(2)
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            mapping_keyspace: DEFAULT_MAPPING_KEYSPACE.to_string(),
            configuration_domain: DEFAULT_CONFIGURATION_DOMAIN.to_string(),
            request_timeout_sec: DEFAULT_REQUEST_TIMEOUT_SEC,
            processor_max_concurrency: DEFAULT_PROCESSOR_MAX_CONCURRENCY,
            worker_threads: default_worker_threads(),
        }
    }
}

impl Default for CassandraSettings {
    fn default() -> Self {
        Self {
            service: String::new(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            max_retries: DEFAULT_QUERY_MAX_RETRIES,
            consistency: Consistency::LocalQuorum,
        }
    }
}

impl Default for StatisticsSettings {
    fn default() -> Self {
        Self {
            tick_span_sec: DEFAULT_STAT_TICK_SPAN_SEC,
            momentary_sample_sec: DEFAULT_MOMENTARY_SAMPLE_SEC,
        }
    }
}

impl Default for ProcessorFamilySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrency: 0,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let mut processors = BTreeMap::new();
        processors.insert(
            "cassandra_processor".to_string(),
            ProcessorFamilySettings::default(),
        );
        Self {
            server: ServerSettings::default(),
            cassandra: CassandraSettings::default(),
            statistics: StatisticsSettings::default(),
            processors,
        }
    }
}
