//! One row of `sat2keyspace`, before and after connection attachment.

use crate::cassandra::CassSession;
use std::fmt;
use std::sync::Arc;

/// Keyspace schema type, as stored in the `schema_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    Unknown,
    Resolver,
    BlobVer1,
    BlobVer2,
    NamedAnnotations,
    Ipg,
}

impl SchemaType {
    /// Maps the integer column value; anything out of range is `Unknown`
    /// and gets filtered before the schema build.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => SchemaType::Resolver,
            2 => SchemaType::BlobVer1,
            3 => SchemaType::BlobVer2,
            4 => SchemaType::NamedAnnotations,
            5 => SchemaType::Ipg,
            _ => SchemaType::Unknown,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            SchemaType::Unknown => 0,
            SchemaType::Resolver => 1,
            SchemaType::BlobVer1 => 2,
            SchemaType::BlobVer2 => 3,
            SchemaType::NamedAnnotations => 4,
            SchemaType::Ipg => 5,
        }
    }

    pub fn is_known(self) -> bool {
        self != SchemaType::Unknown
    }
}

impl Default for SchemaType {
    fn default() -> Self {
        SchemaType::Unknown
    }
}

/// A satellite's keyspace assignment.
///
/// Rows come out of `sat2keyspace` with `session` unset; the schema build
/// attaches the (shared) cluster session the keyspace is served from.
/// Equality ignores the session handle.
#[derive(Clone, Default)]
pub struct SatInfoEntry {
    pub sat: i32,
    pub keyspace: String,
    pub schema_type: SchemaType,
    /// Empty for the default cluster, otherwise a load-balancer service
    /// name or an explicit host list.
    pub service: String,
    session: Option<Arc<dyn CassSession>>,
}

impl SatInfoEntry {
    pub fn new(sat: i32, keyspace: impl Into<String>, schema_type: SchemaType) -> Self {
        Self {
            sat,
            keyspace: keyspace.into(),
            schema_type,
            service: String::new(),
            session: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// The cluster session this keyspace is served from.
    ///
    /// `None` only before the schema build has attached one; published
    /// snapshots always carry a session.
    pub fn session(&self) -> Option<Arc<dyn CassSession>> {
        self.session.clone()
    }

    pub(crate) fn attach_session(&mut self, session: Arc<dyn CassSession>) {
        self.session = Some(session);
    }
}

impl PartialEq for SatInfoEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sat == other.sat
            && self.keyspace == other.keyspace
            && self.schema_type == other.schema_type
            && self.service == other.service
    }
}

impl Eq for SatInfoEntry {}

// `Arc<dyn CassSession>` has no `Debug`; render whether one is attached.
impl fmt::Debug for SatInfoEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SatInfoEntry")
            .field("sat", &self.sat)
            .field("keyspace", &self.keyspace)
            .field("schema_type", &self.schema_type)
            .field("service", &self.service)
            .field("session", &self.session.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_type_codes_round_trip() {
        for code in 1..=5 {
            let st = SchemaType::from_code(code);
            assert!(st.is_known());
            assert_eq!(st.code(), code);
        }
    }

    #[test]
    fn test_out_of_range_codes_are_unknown() {
        assert_eq!(SchemaType::from_code(0), SchemaType::Unknown);
        assert_eq!(SchemaType::from_code(6), SchemaType::Unknown);
        assert_eq!(SchemaType::from_code(-3), SchemaType::Unknown);
    }

    #[test]
    fn test_entry_equality_ignores_session() {
        let a = SatInfoEntry::new(4, "satold01", SchemaType::BlobVer2);
        let b = SatInfoEntry::new(4, "satold01", SchemaType::BlobVer2);
        assert_eq!(a, b);
        assert_ne!(a, a.clone().with_service("ID_CASS"));
    }
}
