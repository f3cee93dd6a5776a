//! Service-name resolution and connection-point normalization.
//!
//! A `service` column value is either a load-balancer service name (no
//! delimiter characters) or an explicit host list. Both forms normalize to
//! `"host:port"` connection points: the load balancer is asked through the
//! [`ServiceResolver`] seam, host lists are split locally and hostnames
//! resolved through [`HostLookup`].

use crate::cassandra::DEFAULT_CASSANDRA_PORT;
use std::net::{IpAddr, ToSocketAddrs};
use tracing::{debug, info};

/// Resolves a load-balanced service name to a comma-separated host list.
///
/// The resolver itself (LBSM or equivalent) is an external collaborator;
/// tests script it.
pub trait ServiceResolver: Send + Sync {
    /// `None` (or `Some("")`) means the name did not resolve.
    fn resolve(&self, service: &str) -> Option<String>;
}

/// Resolves a hostname to its dotted-quad form.
pub trait HostLookup: Send + Sync {
    fn lookup(&self, host: &str) -> Option<String>;
}

/// Production [`HostLookup`] backed by the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsHostLookup;

impl HostLookup for DnsHostLookup {
    fn lookup(&self, host: &str) -> Option<String> {
        if host.parse::<IpAddr>().is_ok() {
            return Some(host.to_string());
        }
        (host, 0)
            .to_socket_addrs()
            .ok()?
            .next()
            .map(|addr| addr.ip().to_string())
    }
}

/// True when `service` is an explicit host list rather than an LB name.
pub fn is_host_list(service: &str) -> bool {
    service.contains(':') || service.contains(',') || service.contains(' ')
}

/// Normalizes `service` to a list of `"host:port"` connection points.
///
/// Returns `None` when the service name does not resolve or a listed host
/// cannot be looked up; the caller reports that as an unresolved service.
pub fn connection_points(
    service: &str,
    resolver: &dyn ServiceResolver,
    lookup: &dyn HostLookup,
) -> Option<Vec<String>> {
    let host_list = is_host_list(service);
    let hosts = if host_list {
        debug!(service, "using explicit host list");
        service.to_string()
    } else {
        info!(service, "resolving load-balanced service name");
        let resolved = resolver.resolve(service).unwrap_or_default();
        if resolved.is_empty() {
            info!(service, "failed to resolve load-balanced service name");
            return None;
        }
        info!(service, hosts = %resolved, "resolved service name");
        resolved
    };

    let mut points = Vec::new();
    for item in hosts
        .split([',', ' '])
        .map(str::trim)
        .filter(|item| !item.is_empty())
    {
        let (host, port) = match item.split_once(':') {
            Some((host, port_text)) => {
                // A malformed port falls back to the default, matching the
                // tolerant parsing of operator-supplied host lists.
                let port = port_text
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .unwrap_or(DEFAULT_CASSANDRA_PORT);
                (host, port)
            }
            None => (item, DEFAULT_CASSANDRA_PORT),
        };
        // Only operator-listed hosts go through DNS; the load balancer
        // already hands back addresses.
        let address = if host_list {
            lookup.lookup(host)?
        } else {
            host.to_string()
        };
        points.push(format!("{address}:{port}"));
    }
    Some(points)
}
