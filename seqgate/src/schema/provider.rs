//! The process-wide schema/messages provider and its refresh protocol.

use super::entry::{SatInfoEntry, SchemaType};
use super::messages::Messages;
use super::resolve::{DnsHostLookup, HostLookup, ServiceResolver};
use super::snapshot::{SatInfoSchema, SchemaBuildError, SchemaBuilder};
use crate::cassandra::{CassError, CassSession, Consistency, SessionFactory, Statement};
use arc_swap::{ArcSwap, ArcSwapOption};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Bootstrap reads go out at LOCAL_QUORUM and retry this many extra times
/// on transient failures.
const SAT_INFO_READ_RETRY: usize = 5;

/// Outcome of [`SchemaProvider::refresh_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSchemaResult {
    /// Row content hash matches the applied schema; nothing to do.
    Unchanged,
    /// Content differs; with `apply` the new snapshot was published.
    Updated,
    /// The provider has no meta-keyspace name configured.
    KeyspaceUndefined,
    /// `sat2keyspace` returned no rows for the domain.
    Sat2KeyspaceEmpty,
    ResolverKeyspaceUndefined,
    ResolverKeyspaceDuplicated,
    BlobKeyspacesEmpty,
    ServiceNotResolved,
}

/// Outcome of [`SchemaProvider::refresh_messages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMessagesResult {
    Unchanged,
    Updated,
    KeyspaceUndefined,
    MessagesEmpty,
}

// ArcSwap needs a sized payload; Arc<dyn CassSession> is wrapped once more.
struct SessionSlot(Arc<dyn CassSession>);

/// Owns the published [`SatInfoSchema`] and [`Messages`] snapshots.
///
/// Readers call [`get_schema`](Self::get_schema) /
/// [`get_messages`](Self::get_messages), which are single atomic loads; a
/// loaded snapshot stays valid for as long as the caller holds it,
/// refreshes notwithstanding. All refresh failures are also recorded in
/// [`last_refresh_error`](Self::last_refresh_error) for operators.
pub struct SchemaProvider {
    meta_keyspace: String,
    domain: String,
    bootstrap: ArcSwap<SessionSlot>,
    schema: ArcSwapOption<SatInfoSchema>,
    messages: ArcSwapOption<Messages>,
    refresh_error: ArcSwapOption<String>,
    sat_info_hash: AtomicU64,
    resolver_required: AtomicBool,
    resolver: Arc<dyn ServiceResolver>,
    host_lookup: Arc<dyn HostLookup>,
    factory: Arc<dyn SessionFactory>,
}

impl SchemaProvider {
    /// `meta_keyspace` names the keyspace holding `sat2keyspace` and
    /// `messages`; `bootstrap` is the session those tables are read
    /// through and doubles as the default cluster for rows with an empty
    /// service.
    pub fn new(
        meta_keyspace: impl Into<String>,
        domain: impl Into<String>,
        bootstrap: Arc<dyn CassSession>,
        factory: Arc<dyn SessionFactory>,
        resolver: Arc<dyn ServiceResolver>,
    ) -> Self {
        Self {
            meta_keyspace: meta_keyspace.into(),
            domain: domain.into(),
            bootstrap: ArcSwap::from_pointee(SessionSlot(bootstrap)),
            schema: ArcSwapOption::empty(),
            messages: ArcSwapOption::empty(),
            refresh_error: ArcSwapOption::empty(),
            sat_info_hash: AtomicU64::new(0),
            resolver_required: AtomicBool::new(false),
            resolver,
            host_lookup: Arc::new(DnsHostLookup),
            factory,
        }
    }

    /// Replaces the system host lookup (tests script it).
    pub fn with_host_lookup(mut self, lookup: Arc<dyn HostLookup>) -> Self {
        self.host_lookup = lookup;
        self
    }

    /// When set, a schema without a resolver keyspace fails validation.
    pub fn set_resolver_required(&self, required: bool) {
        self.resolver_required.store(required, Ordering::Relaxed);
    }

    /// Atomically replaces the bootstrap session.
    pub fn set_bootstrap_session(&self, session: Arc<dyn CassSession>) {
        self.bootstrap.store(Arc::new(SessionSlot(session)));
    }

    fn bootstrap_session(&self) -> Arc<dyn CassSession> {
        self.bootstrap.load().0.clone()
    }

    // === Snapshot access ===

    /// Current schema snapshot; `None` before the first applied refresh.
    pub fn get_schema(&self) -> Option<Arc<SatInfoSchema>> {
        self.schema.load_full()
    }

    /// Current messages snapshot; `None` before the first applied refresh.
    pub fn get_messages(&self) -> Option<Arc<Messages>> {
        self.messages.load_full()
    }

    /// Last refresh failure text, empty when none was recorded.
    pub fn last_refresh_error(&self) -> String {
        self.refresh_error
            .load_full()
            .map(|s| s.as_ref().clone())
            .unwrap_or_default()
    }

    pub fn blob_keyspace(&self, sat: i32) -> Option<SatInfoEntry> {
        self.get_schema().and_then(|s| s.blob_keyspace(sat))
    }

    pub fn na_keyspaces(&self) -> Vec<SatInfoEntry> {
        self.get_schema()
            .map(|s| s.na_keyspaces().to_vec())
            .unwrap_or_default()
    }

    pub fn resolver_keyspace(&self) -> Option<SatInfoEntry> {
        self.get_schema()
            .and_then(|s| s.resolver_keyspace().cloned())
    }

    pub fn ipg_keyspace(&self) -> Option<SatInfoEntry> {
        self.get_schema().and_then(|s| s.ipg_keyspace().cloned())
    }

    pub fn max_blob_keyspace_sat(&self) -> Option<i32> {
        self.get_schema().and_then(|s| s.max_blob_keyspace_sat())
    }

    /// Message text by name; empty when unset or no snapshot yet.
    pub fn message(&self, name: &str) -> String {
        self.get_messages()
            .map(|m| m.get(name).to_string())
            .unwrap_or_default()
    }

    // === Refresh protocol ===

    /// Re-reads `sat2keyspace` and, when `apply` is set and content
    /// changed, builds and publishes a new snapshot.
    ///
    /// With `apply == false` this is a dry run: neither the published
    /// pointer nor the content hash moves. `Err` carries driver failures
    /// that survived the bounded retry; the previous snapshot stays live in
    /// every failure mode.
    pub fn refresh_schema(&self, apply: bool) -> Result<RefreshSchemaResult, CassError> {
        if self.meta_keyspace.is_empty() {
            self.set_refresh_error("mapping_keyspace is not specified");
            return Ok(RefreshSchemaResult::KeyspaceUndefined);
        }
        let rows = match self.read_sat_info() {
            Ok(rows) => rows,
            Err(e) => {
                self.set_refresh_error(e.message());
                return Err(e);
            }
        };
        if rows.is_empty() {
            self.set_refresh_error(format!("{}.sat2keyspace info is empty", self.meta_keyspace));
            return Ok(RefreshSchemaResult::Sat2KeyspaceEmpty);
        }
        let rows_hash = hash_sat_info(&rows);
        if rows_hash == self.sat_info_hash.load(Ordering::Acquire) {
            return Ok(RefreshSchemaResult::Unchanged);
        }
        if !apply {
            return Ok(RefreshSchemaResult::Updated);
        }

        let old_schema = self.get_schema();
        let schema = match self.build_schema(rows, old_schema.as_deref()) {
            Ok(schema) => schema,
            Err(SchemaBuildError::Session(e)) => {
                self.set_refresh_error(e.message());
                return Err(e);
            }
            Err(e) => {
                let (result, message) = self.map_build_error(&e);
                self.set_refresh_error(message);
                return Ok(result);
            }
        };
        self.schema.store(Some(Arc::new(schema)));
        self.sat_info_hash.store(rows_hash, Ordering::Release);
        info!(
            meta_keyspace = %self.meta_keyspace,
            domain = %self.domain,
            "published new sat-info schema"
        );
        Ok(RefreshSchemaResult::Updated)
    }

    /// Re-reads the `messages` table; analogous to
    /// [`refresh_schema`](Self::refresh_schema) with elementwise equality
    /// in place of the content hash.
    pub fn refresh_messages(&self, apply: bool) -> Result<RefreshMessagesResult, CassError> {
        if self.meta_keyspace.is_empty() {
            self.set_refresh_error("mapping_keyspace is not specified");
            return Ok(RefreshMessagesResult::KeyspaceUndefined);
        }
        let messages = match self.read_messages() {
            Ok(messages) => messages,
            Err(e) => {
                self.set_refresh_error(e.message());
                return Err(e);
            }
        };
        if messages.is_empty() {
            self.set_refresh_error(format!("{}.messages info is empty", self.meta_keyspace));
            return Ok(RefreshMessagesResult::MessagesEmpty);
        }
        if let Some(old) = self.get_messages() {
            if *old == messages {
                return Ok(RefreshMessagesResult::Unchanged);
            }
        }
        if !apply {
            return Ok(RefreshMessagesResult::Updated);
        }
        self.messages.store(Some(Arc::new(messages)));
        Ok(RefreshMessagesResult::Updated)
    }

    fn build_schema(
        &self,
        rows: Vec<SatInfoEntry>,
        old_schema: Option<&SatInfoSchema>,
    ) -> Result<SatInfoSchema, SchemaBuildError> {
        let mut builder = SchemaBuilder::new(
            self.bootstrap_session(),
            old_schema,
            self.resolver.as_ref(),
            self.host_lookup.as_ref(),
            self.factory.as_ref(),
        );
        for row in rows {
            builder.add_entry(row)?;
        }
        builder.finish(self.resolver_required.load(Ordering::Relaxed))
    }

    fn map_build_error(&self, error: &SchemaBuildError) -> (RefreshSchemaResult, String) {
        match error {
            SchemaBuildError::ResolverKeyspaceDuplicated => (
                RefreshSchemaResult::ResolverKeyspaceDuplicated,
                format!(
                    "more than one resolver keyspace in the {}.sat2keyspace table",
                    self.meta_keyspace
                ),
            ),
            SchemaBuildError::ServiceNotResolved { service } => (
                RefreshSchemaResult::ServiceNotResolved,
                format!("cannot resolve service name: '{service}'"),
            ),
            SchemaBuildError::ResolverKeyspaceUndefined => (
                RefreshSchemaResult::ResolverKeyspaceUndefined,
                "resolver schema is not found in sat2keyspace".to_string(),
            ),
            SchemaBuildError::BlobKeyspacesEmpty => (
                RefreshSchemaResult::BlobKeyspacesEmpty,
                "sat2keyspace is incomplete".to_string(),
            ),
            SchemaBuildError::Session(e) => {
                // Handled by the caller before mapping; kept for totality.
                (RefreshSchemaResult::BlobKeyspacesEmpty, e.to_string())
            }
        }
    }

    fn read_sat_info(&self) -> Result<Vec<SatInfoEntry>, CassError> {
        let statement = Statement::new(format!(
            "SELECT sat, keyspace_name, schema_type, service FROM {}.sat2keyspace WHERE domain = ?",
            self.meta_keyspace
        ))
        .bind(self.domain.as_str())
        .with_consistency(Consistency::LocalQuorum);

        let rows = self.fetch_with_retry(statement)?;
        let mut entries: Vec<SatInfoEntry> = rows
            .into_iter()
            .filter_map(|row| {
                let schema_type = SchemaType::from_code(row.i32_or(2, 0));
                schema_type.is_known().then(|| {
                    SatInfoEntry::new(row.i32_or(0, -1), row.str_or(1, ""), schema_type)
                        .with_service(row.str_or(3, ""))
                })
            })
            .collect();
        entries.sort_by_key(|entry| entry.sat);
        Ok(entries)
    }

    fn read_messages(&self) -> Result<Messages, CassError> {
        let statement = Statement::new(format!(
            "SELECT name, value FROM {}.messages WHERE domain = ?",
            self.meta_keyspace
        ))
        .bind(self.domain.as_str())
        .with_consistency(Consistency::LocalQuorum);

        let rows = self.fetch_with_retry(statement)?;
        let mut messages = Messages::new();
        for row in rows {
            messages.set(row.str_or(0, ""), row.str_or(1, ""));
        }
        Ok(messages)
    }

    // The whole query is re-issued inside the retry scope; a transient
    // failure must not reuse a half-drained result.
    fn fetch_with_retry(&self, statement: Statement) -> Result<Vec<crate::cassandra::Row>, CassError> {
        let session = self.bootstrap_session();
        let mut retries_left = SAT_INFO_READ_RETRY;
        loop {
            match session.fetch_all(statement.clone()) {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_retryable() && retries_left > 0 => {
                    retries_left -= 1;
                    warn!(
                        error = %e,
                        retries_left,
                        "transient failure reading {}, retrying",
                        self.meta_keyspace
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn set_refresh_error(&self, message: impl Into<String>) {
        self.refresh_error.store(Some(Arc::new(message.into())));
    }
}

fn hash_one<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn hash_combine(seed: &mut u64, hashed: u64) {
    *seed ^= hashed
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(*seed << 6)
        .wrapping_add(*seed >> 2);
}

/// Position-sensitive content hash over sat-sorted rows.
///
/// Rows must already be sorted by sat; the mix is order-dependent, and an
/// unsorted sequence would make identical content hash differently.
fn hash_sat_info(rows: &[SatInfoEntry]) -> u64 {
    let mut seed = 0u64;
    for row in rows {
        hash_combine(&mut seed, hash_one(&row.sat));
        hash_combine(&mut seed, hash_one(row.keyspace.as_str()));
        hash_combine(&mut seed, hash_one(&row.schema_type.code()));
        hash_combine(&mut seed, hash_one(row.service.as_str()));
    }
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_for_identical_content() {
        let rows = vec![
            SatInfoEntry::new(4, "satold01", SchemaType::BlobVer2),
            SatInfoEntry::new(23, "nannotg3", SchemaType::NamedAnnotations),
        ];
        assert_eq!(hash_sat_info(&rows), hash_sat_info(&rows.clone()));
    }

    #[test]
    fn test_hash_depends_on_position() {
        let a = vec![
            SatInfoEntry::new(4, "satold01", SchemaType::BlobVer2),
            SatInfoEntry::new(23, "nannotg3", SchemaType::NamedAnnotations),
        ];
        let b = vec![a[1].clone(), a[0].clone()];
        assert_ne!(hash_sat_info(&a), hash_sat_info(&b));
    }

    #[test]
    fn test_hash_sees_every_field() {
        let base = vec![SatInfoEntry::new(4, "satold01", SchemaType::BlobVer2)];
        let mut other = base.clone();
        other[0].service = "ID_CASS".to_string();
        assert_ne!(hash_sat_info(&base), hash_sat_info(&other));

        let mut other = base.clone();
        other[0].keyspace = "satold02".to_string();
        assert_ne!(hash_sat_info(&base), hash_sat_info(&other));
    }

    #[test]
    fn test_empty_rows_hash_to_seed() {
        assert_eq!(hash_sat_info(&[]), 0);
    }
}
