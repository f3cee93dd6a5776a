//! Session construction seam.

use super::error::CassError;
use super::session::CassSession;
use std::sync::Arc;

/// Port used when a host list entry does not name one.
pub const DEFAULT_CASSANDRA_PORT: u16 = 9042;

/// Creates cluster sessions for endpoints discovered during a schema build.
///
/// The production implementation wraps the external driver and carries the
/// `[cassandra]` settings section (timeouts, consistency, credentials) as
/// its construction defaults; see [`crate::config::CassandraSettings`].
/// A schema build only reaches the factory for endpoints that neither the
/// schema under construction nor the previously published schema already
/// has a session for.
pub trait SessionFactory: Send + Sync {
    /// Opens and connects a new session bound to `contact_points`
    /// (`"host:port"` entries, already normalized).
    fn create(&self, contact_points: &[String]) -> Result<Arc<dyn CassSession>, CassError>;
}
