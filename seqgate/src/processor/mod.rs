//! Request processors and their dispatch machinery.
//!
//! Every data source is wrapped in a processor variant. One prototype
//! factory per variant is registered at startup ([`Registry`]); for each
//! incoming request the [`Dispatcher`] asks every factory whether it wants
//! the request, instantiates the willing ones and races them: the first
//! processor to claim authoritative data via
//! [`ProcessorContext::signal_start_processing`] proceeds, everyone else is
//! cancelled. A request is complete when every processor has signalled
//! finish.
//!
//! Processors are cooperative and thread-pinned: `process()` is invoked on
//! one worker loop ([`WorkerPool`]) and every later callback for that
//! processor runs on the same thread, so processor internals need no
//! locking.

mod dispatcher;
mod registry;
mod worker;

pub use dispatcher::{Dispatcher, ProcessorContext, ProcessorSlot, RequestGroup};
pub use registry::{Registry, RegistryError};
pub use worker::{SocketCallbacks, SocketEvent, WorkerHandle, WorkerPool};

use crate::blob::BlobId;
use std::sync::Arc;
use std::time::Instant;

/// Processor status, ordered so that the worst status wins aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessorStatus {
    /// Still working.
    InProgress,
    /// Finished and found what was needed.
    Done,
    /// Finished without finding anything.
    NotFound,
    /// Finished because it was cancelled.
    Canceled,
    /// Finished because a backend deadline expired.
    Timeout,
    /// Finished with an error.
    Error,
    /// Finished with an authorization failure.
    Unauthorized,
}

impl ProcessorStatus {
    /// Name used in logs and traces.
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessorStatus::InProgress => "inprogress",
            ProcessorStatus::Done => "done",
            ProcessorStatus::NotFound => "not_found",
            ProcessorStatus::Canceled => "canceled",
            ProcessorStatus::Timeout => "timeout",
            ProcessorStatus::Error => "error",
            ProcessorStatus::Unauthorized => "unauthorized",
        }
    }

    /// Name used in protocol progress messages (currently the same set of
    /// words; kept separate because the protocol vocabulary is frozen
    /// independently of the log vocabulary).
    pub fn progress_message(self) -> &'static str {
        self.as_str()
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            ProcessorStatus::InProgress => 0,
            ProcessorStatus::Done => 1,
            ProcessorStatus::NotFound => 2,
            ProcessorStatus::Canceled => 3,
            ProcessorStatus::Timeout => 4,
            ProcessorStatus::Error => 5,
            ProcessorStatus::Unauthorized => 6,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ProcessorStatus::InProgress,
            1 => ProcessorStatus::Done,
            2 => ProcessorStatus::NotFound,
            3 => ProcessorStatus::Canceled,
            4 => ProcessorStatus::Timeout,
            5 => ProcessorStatus::Error,
            _ => ProcessorStatus::Unauthorized,
        }
    }

    /// Anything but `InProgress`.
    pub fn is_terminal(self) -> bool {
        self != ProcessorStatus::InProgress
    }
}

/// Worst-wins rollup across a request's processors.
pub fn aggregate_status(statuses: impl IntoIterator<Item = ProcessorStatus>) -> ProcessorStatus {
    statuses
        .into_iter()
        .max()
        .unwrap_or(ProcessorStatus::Done)
}

/// Verdict handed back from `signal_start_processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartProcessing {
    /// This processor won the race; carry on.
    Proceed,
    /// Another processor already claimed the request; wind down.
    Cancel,
}

/// What a request asks for. Only the shapes the core dispatches on are
/// modelled; everything else rides in `Other`.
#[derive(Debug, Clone)]
pub enum RequestKind {
    BlobBySatSatKey { blob_id: BlobId },
    NamedAnnotation { names: Vec<String> },
    Other,
}

/// One client request as seen by the dispatch core.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: u64,
    pub kind: RequestKind,
    /// Absolute deadline; processors still live past it are timed out.
    pub deadline: Option<Instant>,
}

impl Request {
    pub fn new(id: u64, kind: RequestKind) -> Self {
        Self {
            id,
            kind,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// The reply channel back to the client.
///
/// Chunk encoding is owned by the HTTP layer; processors only hand bytes
/// and a final status across this seam.
pub trait Reply: Send + Sync {
    fn send_chunk(&self, chunk: &[u8]);
    fn send_trailer(&self, status: ProcessorStatus);
}

/// Lifecycle timestamps of one processor, for observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessorTimestamps {
    pub process_invoked_at: Option<Instant>,
    pub signal_start_at: Option<Instant>,
    pub signal_finish_at: Option<Instant>,
}

/// A per-request worker retrieving data from one source.
///
/// `process()` runs on the worker thread the processor gets pinned to;
/// `cancel()` and `process_event()` arrive on the same thread. `cancel()`
/// is cooperative: implementations flip their own flag and wind down at the
/// next advance, letting in-flight queries complete and discarding their
/// results. Implementations must signal finish exactly once, whatever path
/// they exit through.
pub trait Processor: Send {
    fn process(&mut self, ctx: &ProcessorContext);

    fn cancel(&mut self, ctx: &ProcessorContext);

    fn status(&self) -> ProcessorStatus;

    fn name(&self) -> &str;

    /// Processors hitting the same backend share a group name; the group
    /// is what concurrency limits apply to.
    fn group_name(&self) -> &str;

    /// Periodic nudge (timer or data-ready); default does nothing.
    fn process_event(&mut self, _ctx: &ProcessorContext) {}
}

/// Per-variant prototype: screens requests and mints processors.
pub trait ProcessorFactory: Send + Sync {
    fn name(&self) -> &str;

    fn can_process(&self, _request: &Request, _reply: &dyn Reply) -> bool {
        true
    }

    /// For named-annotation requests: which of the requested annotations
    /// this variant could serve.
    fn what_can_process(&self, _request: &Request, _reply: &dyn Reply) -> Vec<String> {
        Vec::new()
    }

    /// `None` means the variant bows out of this particular request even
    /// though `can_process` said yes.
    fn create(
        &self,
        request: Arc<Request>,
        reply: Arc<dyn Reply>,
        priority: i32,
    ) -> Option<Box<dyn Processor>>;
}
