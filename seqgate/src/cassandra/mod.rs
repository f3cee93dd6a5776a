//! Seam between seqgate and the Cassandra driver.
//!
//! The driver itself (connection pooling, wire protocol, paging) lives
//! outside this crate. Everything seqgate needs from it is expressed as two
//! traits: [`CassSession`] for issuing statements against one cluster and
//! [`RowStream`] for consuming a streaming result page by page. Production
//! code binds them to the real driver; tests bind them to scripted mocks.
//!
//! Two access styles are deliberately kept apart:
//! - `fetch_all` buffers a whole result set and is used only by the cold
//!   bootstrap paths (schema and message refresh), which retry around it.
//! - `query` returns a [`RowStream`] that a task state machine polls from
//!   its `advance()` tick; the stream's data-ready callback is what re-arms
//!   the tick when the driver delivers another page.

mod error;
mod factory;
mod session;
mod types;

pub use error::{CassError, CassErrorKind};
pub use factory::{SessionFactory, DEFAULT_CASSANDRA_PORT};
pub use session::{CassSession, DataReadyFn, RowState, RowStream};
pub use types::{Consistency, Row, Statement, Value};
