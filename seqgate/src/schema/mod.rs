//! Sat → keyspace schema resolution and refresh.
//!
//! The meta-keyspace's `sat2keyspace` table maps every satellite id to the
//! Cassandra keyspace (and cluster) its blobs live in. This module owns the
//! process-wide view of that table: an immutable [`SatInfoSchema`] snapshot
//! published through an atomic slot and rebuilt periodically by
//! [`SchemaProvider::refresh_schema`]. Readers load the snapshot once per
//! operation and keep it for the duration; the previous snapshot stays alive
//! until its last reader drops it.
//!
//! The companion `messages` table (operator-editable message texts) follows
//! the same publish/refresh discipline via [`Messages`].

mod entry;
mod messages;
mod provider;
mod resolve;
mod snapshot;

pub use entry::{SatInfoEntry, SchemaType};
pub use messages::Messages;
pub use provider::{RefreshMessagesResult, RefreshSchemaResult, SchemaProvider};
pub use resolve::{connection_points, is_host_list, DnsHostLookup, HostLookup, ServiceResolver};
pub use snapshot::{SatInfoSchema, SchemaBuildError};
