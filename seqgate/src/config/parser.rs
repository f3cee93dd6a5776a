//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields.

use super::file::ConfigFileError;
use super::settings::{ConfigFile, ProcessorFamilySettings};
use crate::cassandra::Consistency;
use ini::Ini;

/// Parses an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("server")) {
        if let Some(v) = section.get("mapping_keyspace") {
            config.server.mapping_keyspace = v.trim().to_string();
        }
        if let Some(v) = section.get("configuration_domain") {
            config.server.configuration_domain = v.trim().to_string();
        }
        if let Some(v) = section.get("request_timeout_sec") {
            config.server.request_timeout_sec = parse_number("server", "request_timeout_sec", v)?;
        }
        if let Some(v) = section.get("processor_max_concurrency") {
            config.server.processor_max_concurrency =
                parse_number("server", "processor_max_concurrency", v)?;
        }
        if let Some(v) = section.get("worker_threads") {
            let threads: usize = parse_number("server", "worker_threads", v)?;
            if threads == 0 {
                return Err(ConfigFileError::InvalidValue {
                    section: "server".to_string(),
                    key: "worker_threads".to_string(),
                    value: v.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.server.worker_threads = threads;
        }
    }

    if let Some(section) = ini.section(Some("cassandra")) {
        if let Some(v) = section.get("service") {
            config.cassandra.service = v.trim().to_string();
        }
        if let Some(v) = section.get("connect_timeout_ms") {
            config.cassandra.connect_timeout_ms =
                parse_number("cassandra", "connect_timeout_ms", v)?;
        }
        if let Some(v) = section.get("query_timeout_ms") {
            config.cassandra.query_timeout_ms = parse_number("cassandra", "query_timeout_ms", v)?;
        }
        if let Some(v) = section.get("max_retries") {
            config.cassandra.max_retries = parse_number("cassandra", "max_retries", v)?;
        }
        if let Some(v) = section.get("consistency") {
            config.cassandra.consistency = parse_consistency(v)?;
        }
    }

    if let Some(section) = ini.section(Some("statistics")) {
        if let Some(v) = section.get("tick_span_sec") {
            config.statistics.tick_span_sec = parse_number("statistics", "tick_span_sec", v)?;
        }
        if let Some(v) = section.get("momentary_sample_sec") {
            config.statistics.momentary_sample_sec =
                parse_number("statistics", "momentary_sample_sec", v)?;
        }
    }

    // Any [<family>_processor] section enables/limits one processor family.
    for (section_name, properties) in ini.iter() {
        let Some(name) = section_name else { continue };
        if !name.ends_with("_processor") {
            continue;
        }
        let mut family = ProcessorFamilySettings::default();
        if let Some(v) = properties.get("enabled") {
            family.enabled = parse_bool(name, "enabled", v)?;
        }
        if let Some(v) = properties.get("max_concurrency") {
            family.max_concurrency = parse_number(name, "max_concurrency", v)?;
        }
        config.processors.insert(name.to_string(), family);
    }

    Ok(config)
}

fn parse_number<T: std::str::FromStr>(
    section: &str,
    key: &str,
    value: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a non-negative integer".to_string(),
        })
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected true/false".to_string(),
        }),
    }
}

fn parse_consistency(value: &str) -> Result<Consistency, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "one" => Ok(Consistency::One),
        "local_one" => Ok(Consistency::LocalOne),
        "local_quorum" => Ok(Consistency::LocalQuorum),
        "quorum" => Ok(Consistency::Quorum),
        _ => Err(ConfigFileError::InvalidValue {
            section: "cassandra".to_string(),
            key: "consistency".to_string(),
            value: value.to_string(),
            reason: "must be one of: one, local_one, local_quorum, quorum".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        parse_ini(&Ini::load_from_str(text).unwrap())
    }

    #[test]
    fn test_empty_ini_yields_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.server.mapping_keyspace, "sat_info");
        assert_eq!(config.cassandra.consistency, Consistency::LocalQuorum);
        assert!(config.processor_enabled("cassandra_processor"));
    }

    #[test]
    fn test_overlay_of_known_keys() {
        let config = parse(
            "[server]\n\
             mapping_keyspace = sat_info_prod\n\
             request_timeout_sec = 12\n\
             [cassandra]\n\
             service = ID_CASS\n\
             consistency = local_one\n",
        )
        .unwrap();
        assert_eq!(config.server.mapping_keyspace, "sat_info_prod");
        assert_eq!(config.server.request_timeout_sec, 12);
        assert_eq!(config.cassandra.service, "ID_CASS");
        assert_eq!(config.cassandra.consistency, Consistency::LocalOne);
    }

    #[test]
    fn test_processor_sections_are_discovered() {
        let config = parse(
            "[wgs_processor]\n\
             enabled = false\n\
             [cassandra_processor]\n\
             max_concurrency = 48\n",
        )
        .unwrap();
        assert!(!config.processor_enabled("wgs_processor"));
        assert_eq!(config.processor_max_concurrency("cassandra_processor"), 48);
        // Absent or zeroed limits fall back to the server default.
        assert_eq!(
            config.processor_max_concurrency("wgs_processor"),
            config.server.processor_max_concurrency
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(parse("[server]\nrequest_timeout_sec = soon\n").is_err());
        assert!(parse("[server]\nworker_threads = 0\n").is_err());
        assert!(parse("[cassandra]\nconsistency = all\n").is_err());
        assert!(parse("[cassandra_processor]\nenabled = maybe\n").is_err());
    }
}
