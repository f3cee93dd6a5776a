//! The `sat.sat_key` blob identifier.

use crate::schema::{SatInfoEntry, SatInfoSchema};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Malformed textual blob id.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("bad blob identifier '{input}': {reason}")]
pub struct BlobIdError {
    pub input: String,
    pub reason: &'static str,
}

impl BlobIdError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Cassandra blob identifier.
///
/// The sat eventually resolves to a keyspace; the resolved entry and the
/// secure-keyspace flag appear later in the request lifecycle, once
/// [`BlobId::map_sat_to_keyspace`] has consulted a schema snapshot. Equality
/// and ordering consider only the `(sat, sat_key)` pair.
#[derive(Debug, Clone, Default)]
pub struct BlobId {
    pub sat: i32,
    pub sat_key: i32,
    /// Filled by `map_sat_to_keyspace`.
    pub keyspace: Option<SatInfoEntry>,
    /// Filled together with `keyspace`; the policy deciding it is supplied
    /// by the caller.
    pub secure_keyspace: Option<bool>,
}

impl BlobId {
    pub fn new(sat: i32, sat_key: i32) -> Self {
        Self {
            sat,
            sat_key,
            keyspace: None,
            secure_keyspace: None,
        }
    }

    /// Parses the canonical `"sat.sat_key"` form.
    ///
    /// Both components must be decimal integers (a leading `-` is accepted
    /// here; range validity is a separate [`BlobId::is_valid`] check).
    pub fn parse(text: &str) -> Result<Self, BlobIdError> {
        let (sat_text, key_text) = text
            .split_once('.')
            .ok_or_else(|| BlobIdError::new(text, "missing '.' separator"))?;
        let sat = parse_component(sat_text)
            .ok_or_else(|| BlobIdError::new(text, "sat is not a number"))?;
        let sat_key = parse_component(key_text)
            .ok_or_else(|| BlobIdError::new(text, "sat_key is not a number"))?;
        Ok(Self::new(sat, sat_key))
    }

    /// True when both components are in the valid `[0, 2^31)` range.
    pub fn is_valid(&self) -> bool {
        self.sat >= 0 && self.sat_key >= 0
    }

    /// Looks the sat up in `schema` and attaches the keyspace entry.
    ///
    /// `is_secure` is the keyspace naming policy; the mapping records its
    /// verdict but does not interpret it. Returns `false` without touching
    /// `self` when the sat has no blob keyspace in the snapshot.
    pub fn map_sat_to_keyspace<F>(&mut self, schema: &SatInfoSchema, is_secure: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        match schema.blob_keyspace(self.sat) {
            Some(entry) => {
                self.secure_keyspace = Some(is_secure(&entry.keyspace));
                self.keyspace = Some(entry);
                true
            }
            None => false,
        }
    }
}

fn parse_component(text: &str) -> Option<i32> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.sat, self.sat_key)
    }
}

impl PartialEq for BlobId {
    fn eq(&self, other: &Self) -> bool {
        self.sat == other.sat && self.sat_key == other.sat_key
    }
}

impl Eq for BlobId {}

impl PartialOrd for BlobId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlobId {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.sat, self.sat_key).cmp(&(other.sat, other.sat_key))
    }
}
