//! Session and row-stream traits.

use super::error::CassError;
use super::types::{Row, Statement};
use std::sync::Arc;

/// Callback re-armed by a [`RowStream`] when the driver delivers more data.
///
/// Task state machines hand the stream a closure that re-schedules their
/// `advance()` on the owning worker loop.
pub type DataReadyFn = Arc<dyn Fn() + Send + Sync>;

/// Outcome of polling a streaming result.
#[derive(Debug, Clone, PartialEq)]
pub enum RowState {
    /// A row is available and has been taken off the stream.
    Ready(Row),
    /// No row buffered yet; the data-ready callback fires when there is one.
    Pending,
    /// The result set is exhausted.
    Eof,
}

/// A streaming result set consumed one row per poll.
///
/// Streams are single-consumer and are dropped to cancel: an in-flight
/// page is allowed to complete inside the driver, its rows discarded.
pub trait RowStream: Send {
    /// Takes the next buffered row, or reports `Pending`/`Eof`.
    fn poll_row(&mut self) -> Result<RowState, CassError>;

    /// Registers the callback invoked when a `Pending` stream gains data.
    ///
    /// Re-registering replaces the previous callback.
    fn set_data_ready(&mut self, callback: DataReadyFn);
}

/// One cluster connection, shared by every task that reaches its endpoints.
///
/// Implementations wrap the external driver; the crate never sees hosts or
/// sockets directly. Sessions are cheap to clone via `Arc` and are reused
/// across schema refreshes whenever their endpoints are unchanged.
pub trait CassSession: Send + Sync {
    /// Executes `statement` and buffers the full result.
    ///
    /// Used by the bootstrap/refresh paths only; those wrap it in a bounded
    /// retry loop keyed off [`CassError::is_retryable`].
    fn fetch_all(&self, statement: Statement) -> Result<Vec<Row>, CassError>;

    /// Executes `statement` and returns a stream for cooperative draining.
    fn query(&self, statement: Statement) -> Result<Box<dyn RowStream>, CassError>;

    /// The `"host:port"` endpoints this session is bound to.
    ///
    /// Keyed on by the schema builder to avoid opening a second session to a
    /// cluster an earlier refresh already connected.
    fn contact_points(&self) -> Vec<String>;
}
