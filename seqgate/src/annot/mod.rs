//! Named-annotation aggregation across migrating keyspaces.
//!
//! While a NAnnot storage migration is in progress the same logical
//! annotation can exist in two keyspaces at once; the keyspace with the
//! larger sat carries the newer copy. Per request, annotation rows from
//! every participating keyspace are collected here, and once all keyspaces
//! have finished streaming each annotation is released exactly once, taken
//! from the highest sat that supplied it.
//!
//! The whole component exists for the duration of the migration and can be
//! deleted once the keyspaces converge.

mod filter;

pub use filter::AnnotFilter;

/// One named-annotation row, as delivered by a NAnnot keyspace.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotRecord {
    /// Annotation name; the deduplication key.
    pub annot_name: String,
    pub sat_key: i32,
    pub last_modified: i64,
    /// Annotated range on the sequence.
    pub start: i32,
    pub stop: i32,
}

impl AnnotRecord {
    pub fn new(annot_name: impl Into<String>, sat_key: i32) -> Self {
        Self {
            annot_name: annot_name.into(),
            sat_key,
            last_modified: 0,
            start: 0,
            stop: 0,
        }
    }
}
