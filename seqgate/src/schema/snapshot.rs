//! The immutable sat-info snapshot and its single-threaded builder.

use super::entry::{SatInfoEntry, SchemaType};
use super::resolve::{connection_points, HostLookup, ServiceResolver};
use crate::cassandra::{CassError, CassSession, SessionFactory};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Why a schema build was abandoned.
///
/// Build failures never replace the published snapshot; the provider maps
/// them onto refresh results and the operator-visible error string.
#[derive(Debug, Error)]
pub enum SchemaBuildError {
    #[error("more than one resolver keyspace")]
    ResolverKeyspaceDuplicated,
    #[error("cannot resolve service name: '{service}'")]
    ServiceNotResolved { service: String },
    #[error("resolver schema is not found")]
    ResolverKeyspaceUndefined,
    #[error("no blob keyspaces")]
    BlobKeyspacesEmpty,
    #[error("session construction failed: {0}")]
    Session(#[from] CassError),
}

/// Complete, read-only view of `sat2keyspace` with live cluster sessions.
///
/// Built in full before publication and never mutated afterwards; any
/// number of readers share one snapshot concurrently.
pub struct SatInfoSchema {
    blob_keyspaces: BTreeMap<i32, SatInfoEntry>,
    /// NamedAnnotations entries in `sat2keyspace` row order (ascending sat);
    /// the migration aggregator relies on that order.
    na_keyspaces: Vec<SatInfoEntry>,
    resolver_keyspace: Option<SatInfoEntry>,
    ipg_keyspace: Option<SatInfoEntry>,
    service_sessions: HashMap<String, Arc<dyn CassSession>>,
    endpoint_sessions: HashMap<String, Arc<dyn CassSession>>,
    default_session: Arc<dyn CassSession>,
}

impl SatInfoSchema {
    /// Blob keyspace for `sat`.
    ///
    /// Only `BlobVer2` and `NamedAnnotations` keyspaces are served blobs
    /// from; other schema types are invisible here.
    pub fn blob_keyspace(&self, sat: i32) -> Option<SatInfoEntry> {
        self.blob_keyspaces.get(&sat).and_then(|entry| {
            matches!(
                entry.schema_type,
                SchemaType::BlobVer2 | SchemaType::NamedAnnotations
            )
            .then(|| entry.clone())
        })
    }

    /// Highest sat with any blob keyspace entry.
    pub fn max_blob_keyspace_sat(&self) -> Option<i32> {
        self.blob_keyspaces.keys().next_back().copied()
    }

    pub fn na_keyspaces(&self) -> &[SatInfoEntry] {
        &self.na_keyspaces
    }

    pub fn resolver_keyspace(&self) -> Option<&SatInfoEntry> {
        self.resolver_keyspace.as_ref()
    }

    pub fn ipg_keyspace(&self) -> Option<&SatInfoEntry> {
        self.ipg_keyspace.as_ref()
    }

    pub fn default_session(&self) -> Arc<dyn CassSession> {
        self.default_session.clone()
    }

    pub(crate) fn session_by_service(&self, service: &str) -> Option<Arc<dyn CassSession>> {
        self.service_sessions.get(service).cloned()
    }

    pub(crate) fn session_by_endpoint(&self, endpoint: &str) -> Option<Arc<dyn CassSession>> {
        self.endpoint_sessions.get(endpoint).cloned()
    }
}

/// Accumulates one schema; consumed by `finish`.
///
/// The build runs single-threaded inside a refresh. Cluster sessions are
/// found in this order: already attached to the schema under construction,
/// carried over from the previously published schema (same service name or
/// same endpoint), and only then newly created through the factory.
pub(crate) struct SchemaBuilder<'a> {
    schema: SatInfoSchema,
    old_schema: Option<&'a SatInfoSchema>,
    resolver: &'a dyn ServiceResolver,
    lookup: &'a dyn HostLookup,
    factory: &'a dyn SessionFactory,
}

impl<'a> SchemaBuilder<'a> {
    pub(crate) fn new(
        default_session: Arc<dyn CassSession>,
        old_schema: Option<&'a SatInfoSchema>,
        resolver: &'a dyn ServiceResolver,
        lookup: &'a dyn HostLookup,
        factory: &'a dyn SessionFactory,
    ) -> Self {
        let mut schema = SatInfoSchema {
            blob_keyspaces: BTreeMap::new(),
            na_keyspaces: Vec::new(),
            resolver_keyspace: None,
            ipg_keyspace: None,
            service_sessions: HashMap::new(),
            endpoint_sessions: HashMap::new(),
            default_session: default_session.clone(),
        };
        register_endpoints(&mut schema.endpoint_sessions, &default_session);
        Self {
            schema,
            old_schema,
            resolver,
            lookup,
            factory,
        }
    }

    /// Attaches a session to `entry` and files it under its schema type.
    pub(crate) fn add_entry(&mut self, mut entry: SatInfoEntry) -> Result<(), SchemaBuildError> {
        let session = self.session_for_service(&entry.service)?;
        entry.attach_session(session);
        match entry.schema_type {
            SchemaType::Resolver => {
                if self.schema.resolver_keyspace.is_some() {
                    return Err(SchemaBuildError::ResolverKeyspaceDuplicated);
                }
                self.schema.resolver_keyspace = Some(entry);
            }
            SchemaType::NamedAnnotations => {
                self.schema
                    .blob_keyspaces
                    .entry(entry.sat)
                    .or_insert_with(|| entry.clone());
                self.schema.na_keyspaces.push(entry);
            }
            SchemaType::BlobVer1 | SchemaType::BlobVer2 => {
                self.schema.blob_keyspaces.entry(entry.sat).or_insert(entry);
            }
            SchemaType::Ipg => {
                self.schema.ipg_keyspace = Some(entry);
            }
            SchemaType::Unknown => {}
        }
        Ok(())
    }

    /// Final validation; on success the snapshot is ready to publish.
    pub(crate) fn finish(self, resolver_required: bool) -> Result<SatInfoSchema, SchemaBuildError> {
        let resolver_usable = self
            .schema
            .resolver_keyspace
            .as_ref()
            .is_some_and(|entry| !entry.keyspace.is_empty() && entry.session().is_some());
        if resolver_required && !resolver_usable {
            return Err(SchemaBuildError::ResolverKeyspaceUndefined);
        }
        if self.schema.blob_keyspaces.is_empty() {
            return Err(SchemaBuildError::BlobKeyspacesEmpty);
        }
        Ok(self.schema)
    }

    fn session_for_service(
        &mut self,
        service: &str,
    ) -> Result<Arc<dyn CassSession>, SchemaBuildError> {
        if service.is_empty() {
            return Ok(self.schema.default_session.clone());
        }
        if let Some(session) = self.schema.session_by_service(service) {
            return Ok(session);
        }

        let points = connection_points(service, self.resolver, self.lookup).ok_or_else(|| {
            SchemaBuildError::ServiceNotResolved {
                service: service.to_string(),
            }
        })?;

        // Another service name in this build may already have connected to
        // the same endpoints.
        for point in &points {
            if let Some(session) = self.schema.session_by_endpoint(point) {
                return Ok(self.adopt(service, session));
            }
        }

        // Reuse the previous snapshot's sessions so an unchanged cluster is
        // not reconnected on every refresh.
        if let Some(old) = self.old_schema {
            if let Some(session) = old.session_by_service(service) {
                return Ok(self.adopt(service, session));
            }
            for point in &points {
                if let Some(session) = old.session_by_endpoint(point) {
                    return Ok(self.adopt(service, session));
                }
            }
        }

        let session = self.factory.create(&points)?;
        Ok(self.adopt(service, session))
    }

    fn adopt(&mut self, service: &str, session: Arc<dyn CassSession>) -> Arc<dyn CassSession> {
        self.schema
            .service_sessions
            .insert(service.to_string(), session.clone());
        register_endpoints(&mut self.schema.endpoint_sessions, &session);
        session
    }
}

fn register_endpoints(
    endpoints: &mut HashMap<String, Arc<dyn CassSession>>,
    session: &Arc<dyn CassSession>,
) {
    for point in session.contact_points() {
        endpoints.insert(point, session.clone());
    }
}
