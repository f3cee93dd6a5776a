//! Resolves the public comment of a suppressed or withdrawn blob.
//!
//! Blob-prop flags only say *that* a blob is suppressed/withdrawn; the
//! comment shown to clients lives in the keyspace's `blob_status_history`
//! table. The scan walks that history looking for a row whose status
//! matches the blob's, following `replaces` links to superseding records a
//! bounded number of times. When no row carries a comment, the configured
//! default message for the status is used instead.

use super::{CassTask, DataErrorCallback, RequestStatus, Severity};
use crate::blob::{
    is_blob_suppressed, is_blob_withdrawn, is_history_suppressed, same_withdrawn, BlobRecord,
};
use crate::cassandra::{
    CassError, CassErrorKind, CassSession, DataReadyFn, RowState, RowStream, Statement,
};
use crate::schema::Messages;
use std::sync::Arc;
use tracing::debug;

/// How many `replaces` links one resolution is allowed to follow.
pub const MAX_REPLACES_RETRIES: i64 = 5;

const DEFAULT_SUPPRESSED_MESSAGE: &str = "BLOB_STATUS_SUPPRESSED";
const DEFAULT_WITHDRAWN_MESSAGE: &str = "BLOB_STATUS_WITHDRAWN";

/// Invoked exactly once with `(comment, found)`.
pub type CommentCallback = Box<dyn FnOnce(String, bool) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    StartReading,
    ReadingHistory,
    ReturnResult,
    Done,
    Error,
}

/// Public-comment resolution task; see the module docs for the protocol.
pub struct GetPublicCommentTask {
    session: Arc<dyn CassSession>,
    keyspace: String,
    state: State,
    blob_flags: u64,
    key: i32,
    current_key: i32,
    replaces_retries: i64,
    // blob_prop lacks the full withdrawn detail, so the first history row's
    // flags stand in for the blob's own status bits
    first_history_flags: Option<i64>,
    matching_row_found: bool,
    public_comment: String,
    messages: Option<Arc<Messages>>,
    comment_cb: Option<CommentCallback>,
    error_cb: DataErrorCallback,
    data_ready: Option<DataReadyFn>,
    query: Option<Box<dyn RowStream>>,
}

impl GetPublicCommentTask {
    pub fn new(
        session: Arc<dyn CassSession>,
        keyspace: impl Into<String>,
        blob: &BlobRecord,
        error_cb: DataErrorCallback,
    ) -> Self {
        Self {
            session,
            keyspace: keyspace.into(),
            state: State::Init,
            blob_flags: blob.flags,
            key: blob.sat_key,
            current_key: blob.sat_key,
            replaces_retries: MAX_REPLACES_RETRIES,
            first_history_flags: None,
            matching_row_found: false,
            public_comment: String::new(),
            messages: None,
            comment_cb: None,
            error_cb,
            data_ready: None,
            query: None,
        }
    }

    /// Messages snapshot supplying default comments; optional, but without
    /// one a blob with no history comment fails with `MissData`.
    pub fn set_messages(&mut self, messages: Option<Arc<Messages>>) {
        self.messages = messages;
    }

    pub fn set_comment_callback(&mut self, callback: CommentCallback) {
        self.comment_cb = Some(callback);
    }

    /// Registers the loop re-entry callback; legal only before the machine
    /// has left `Init`.
    pub fn set_data_ready(&mut self, callback: DataReadyFn) -> Result<(), CassError> {
        if self.state != State::Init {
            return Err(CassError::new(
                CassErrorKind::SeqFailed,
                "data-ready callback can't be assigned after the loading process has started",
            ));
        }
        self.data_ready = Some(callback);
        Ok(())
    }

    fn close_all(&mut self) {
        self.query = None;
    }

    fn fail(&mut self, status: RequestStatus, kind: CassErrorKind, message: &str) {
        self.state = State::Error;
        (self.error_cb)(status, kind, Severity::Error, message);
    }

    fn jump_to_replaced(&mut self, replaces: i32) {
        debug!(
            keyspace = %self.keyspace,
            from = self.current_key,
            to = replaces,
            "following status-history replaces link"
        );
        self.replaces_retries -= 1;
        self.current_key = replaces;
        self.matching_row_found = false;
        self.state = State::StartReading;
        self.public_comment.clear();
    }

    /// Handles one history row; returns true when the caller must re-enter
    /// the state switch without waiting for I/O.
    fn on_history_row(&mut self, flags: i64, comment: &str, replaces: i32) -> bool {
        if self.first_history_flags.is_none() {
            self.first_history_flags = Some(flags);
        }
        let row_matches = if is_blob_withdrawn(self.blob_flags) {
            same_withdrawn(flags, self.first_history_flags.unwrap_or(flags))
        } else {
            is_history_suppressed(flags)
        };
        if row_matches {
            self.matching_row_found = true;
            self.public_comment = comment.to_string();
            return false;
        }
        if self.matching_row_found {
            self.state = State::ReturnResult;
        } else if replaces > 0 && self.replaces_retries > 0 {
            self.jump_to_replaced(replaces);
        } else {
            self.state = State::ReturnResult;
        }
        true
    }

    fn start_reading(&mut self) -> Result<(), CassError> {
        self.close_all();
        let statement = Statement::new(format!(
            "SELECT flags, public_comment, replaces FROM {}.blob_status_history WHERE sat_key = ?",
            self.keyspace
        ))
        .bind(self.current_key);
        let mut stream = self.session.query(statement)?;
        if let Some(cb) = &self.data_ready {
            stream.set_data_ready(cb.clone());
        }
        self.query = Some(stream);
        Ok(())
    }

    fn read_history(&mut self) -> bool {
        let mut stream = match self.query.take() {
            Some(stream) => stream,
            None => {
                let message = format!(
                    "failed to get public comment for record (key={}.{}) unexpected state (reading-history)",
                    self.keyspace, self.key
                );
                self.fail(RequestStatus::BadGateway, CassErrorKind::QueryFailed, &message);
                return false;
            }
        };
        let mut need_repeat = false;
        while self.state == State::ReadingHistory {
            match stream.poll_row() {
                Ok(RowState::Ready(row)) => {
                    let flags = row.i64_or(0, 0);
                    let comment = row.str_or(1, "").to_string();
                    let replaces = row.i32_or(2, 0);
                    need_repeat |= self.on_history_row(flags, &comment, replaces);
                }
                Ok(RowState::Pending) => break,
                Ok(RowState::Eof) => {
                    self.state = State::ReturnResult;
                    need_repeat = true;
                }
                Err(e) => {
                    let status = match e.kind() {
                        CassErrorKind::QueryTimeout => RequestStatus::ServiceUnavailable,
                        _ => RequestStatus::BadGateway,
                    };
                    self.fail(status, e.kind(), e.message());
                    return false;
                }
            }
        }
        // Jumps and result transitions dropped the stream's relevance; only
        // a pending read keeps it.
        if self.state == State::ReadingHistory {
            self.query = Some(stream);
        }
        need_repeat
    }

    fn return_result(&mut self) {
        self.close_all();
        if self.comment_cb.is_some() {
            if self.public_comment.is_empty() {
                match self.messages.clone() {
                    Some(messages) => {
                        let message_key = if is_blob_suppressed(self.blob_flags) {
                            Some(DEFAULT_SUPPRESSED_MESSAGE)
                        } else if is_blob_withdrawn(self.blob_flags) {
                            Some(DEFAULT_WITHDRAWN_MESSAGE)
                        } else {
                            None
                        };
                        let comment = message_key
                            .map(|key| messages.get(key).to_string())
                            .unwrap_or_default();
                        match message_key {
                            Some(key) if comment.is_empty() => {
                                let message = format!("Message is empty for ({key})");
                                self.fail(
                                    RequestStatus::BadGateway,
                                    CassErrorKind::MissData,
                                    &message,
                                );
                            }
                            _ => {
                                if let Some(cb) = self.comment_cb.take() {
                                    cb(comment, true);
                                }
                            }
                        }
                    }
                    None => {
                        self.fail(
                            RequestStatus::BadGateway,
                            CassErrorKind::MissData,
                            "Messages provider not configured for Public Comment retrieval",
                        );
                    }
                }
            } else if let Some(cb) = self.comment_cb.take() {
                cb(std::mem::take(&mut self.public_comment), true);
            }
        }
        self.state = State::Done;
    }
}

impl CassTask for GetPublicCommentTask {
    fn advance(&mut self) {
        loop {
            let mut need_repeat = false;
            match self.state {
                State::Done | State::Error => return,
                State::Init => {
                    if !is_blob_suppressed(self.blob_flags) && !is_blob_withdrawn(self.blob_flags)
                    {
                        if let Some(cb) = self.comment_cb.take() {
                            cb(String::new(), false);
                        }
                        self.state = State::Done;
                    } else {
                        self.state = State::StartReading;
                        need_repeat = true;
                    }
                }
                State::StartReading => {
                    match self.start_reading() {
                        Ok(()) => {
                            self.state = State::ReadingHistory;
                            // Rows may already be buffered.
                            need_repeat = true;
                        }
                        Err(e) => self.fail(RequestStatus::BadGateway, e.kind(), e.message()),
                    }
                }
                State::ReadingHistory => {
                    need_repeat = self.read_history();
                }
                State::ReturnResult => {
                    self.return_result();
                }
            }
            if !need_repeat {
                return;
            }
        }
    }

    fn finished(&self) -> bool {
        matches!(self.state, State::Done | State::Error)
    }

    fn state_label(&self) -> &'static str {
        match self.state {
            State::Init => "init",
            State::StartReading => "start-reading",
            State::ReadingHistory => "reading-history",
            State::ReturnResult => "return-result",
            State::Done => "done",
            State::Error => "error",
        }
    }
}
