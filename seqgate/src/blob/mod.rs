//! Blob identity and record types.
//!
//! A blob is addressed by two integers: the satellite id (`sat`), which
//! selects a keyspace, and the key (`sat_key`), which selects a row within
//! it. [`BlobId`] carries the pair plus, once resolution has run, the
//! keyspace entry the sat mapped to.

mod id;
mod record;

pub use id::{BlobId, BlobIdError};
pub use record::{
    is_blob_suppressed, is_blob_withdrawn, is_history_suppressed, same_withdrawn, BlobRecord,
    StatusHistoryRow, BLOB_FLAG_CHECK_FAILED, BLOB_FLAG_DEAD, BLOB_FLAG_GZIP, BLOB_FLAG_NOT4GBU,
    BLOB_FLAG_SUPPRESS, BLOB_FLAG_WITHDRAWN, STATUS_FLAG_SUPPRESS_PERMANENTLY,
    STATUS_FLAG_WITHDRAWN, STATUS_FLAG_WITHDRAWN_PERMANENTLY, WITHDRAWN_MASK,
};
