//! End-to-end: a processor drives the public-comment task on its pinned
//! worker loop, with the stream's data-ready callback re-entering the task
//! through `postpone_event`.

use seqgate::blob::{BlobRecord, BLOB_FLAG_SUPPRESS, STATUS_FLAG_SUPPRESS_PERMANENTLY};
use seqgate::cassandra::{
    CassError, CassSession, DataReadyFn, Row, RowState, RowStream, Statement, Value,
};
use seqgate::processor::{
    Dispatcher, Processor, ProcessorContext, ProcessorFactory, ProcessorStatus, Registry, Reply,
    Request, RequestKind, WorkerPool,
};
use seqgate::task::{CassTask, GetPublicCommentTask};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Returns `Pending` on the first poll and fires the data-ready callback,
/// exactly like a driver delivering the first page asynchronously.
struct PendingOnceStream {
    rows: Vec<Row>,
    polled: bool,
    ready: Option<DataReadyFn>,
}

impl RowStream for PendingOnceStream {
    fn poll_row(&mut self) -> Result<RowState, CassError> {
        if !self.polled {
            self.polled = true;
            if let Some(ready) = &self.ready {
                ready();
            }
            return Ok(RowState::Pending);
        }
        Ok(match self.rows.pop() {
            Some(row) => RowState::Ready(row),
            None => RowState::Eof,
        })
    }

    fn set_data_ready(&mut self, callback: DataReadyFn) {
        self.ready = Some(callback);
    }
}

struct HistorySession {
    rows: Vec<Row>,
}

impl CassSession for HistorySession {
    fn fetch_all(&self, _statement: Statement) -> Result<Vec<Row>, CassError> {
        unimplemented!("tasks stream their results")
    }

    fn query(&self, _statement: Statement) -> Result<Box<dyn RowStream>, CassError> {
        Ok(Box::new(PendingOnceStream {
            rows: self.rows.clone(),
            polled: false,
            ready: None,
        }))
    }

    fn contact_points(&self) -> Vec<String> {
        vec!["10.0.0.1:9042".to_string()]
    }
}

struct NullReply;

impl Reply for NullReply {
    fn send_chunk(&self, _chunk: &[u8]) {}
    fn send_trailer(&self, _status: ProcessorStatus) {}
}

struct CommentProcessor {
    session: Arc<dyn CassSession>,
    comments: Arc<Mutex<Vec<(String, bool)>>>,
    task: Option<GetPublicCommentTask>,
    status: ProcessorStatus,
    finished: bool,
}

impl CommentProcessor {
    fn reap(&mut self, ctx: &ProcessorContext) {
        if self.finished {
            return;
        }
        if let Some(task) = &mut self.task {
            task.advance();
            if task.finished() {
                self.finished = true;
                self.status = ProcessorStatus::Done;
                ctx.signal_finish_processing();
            }
        }
    }
}

impl Processor for CommentProcessor {
    fn process(&mut self, ctx: &ProcessorContext) {
        let blob = BlobRecord::new(10).with_flags(BLOB_FLAG_SUPPRESS);
        let mut task = GetPublicCommentTask::new(
            Arc::clone(&self.session),
            "satold01",
            &blob,
            Box::new(|_status, _kind, _severity, message| {
                panic!("unexpected task error: {message}");
            }),
        );
        let sink = Arc::clone(&self.comments);
        task.set_comment_callback(Box::new(move |comment, found| {
            sink.lock().unwrap().push((comment, found));
        }));
        // Data-ready re-enters this processor on its own loop.
        let tick = ctx.clone();
        task.set_data_ready(Arc::new(move || tick.postpone_event()))
            .unwrap();
        self.task = Some(task);
        self.reap(ctx);
    }

    fn cancel(&mut self, ctx: &ProcessorContext) {
        if !self.finished {
            self.finished = true;
            self.status = ProcessorStatus::Canceled;
            ctx.signal_finish_processing();
        }
    }

    fn status(&self) -> ProcessorStatus {
        self.status
    }

    fn name(&self) -> &str {
        "cassandra-public-comment"
    }

    fn group_name(&self) -> &str {
        "cassandra"
    }

    fn process_event(&mut self, ctx: &ProcessorContext) {
        self.reap(ctx);
    }
}

struct CommentFactory {
    session: Arc<dyn CassSession>,
    comments: Arc<Mutex<Vec<(String, bool)>>>,
}

impl ProcessorFactory for CommentFactory {
    fn name(&self) -> &str {
        "cassandra-public-comment"
    }

    fn create(
        &self,
        _request: Arc<Request>,
        _reply: Arc<dyn Reply>,
        _priority: i32,
    ) -> Option<Box<dyn Processor>> {
        Some(Box::new(CommentProcessor {
            session: Arc::clone(&self.session),
            comments: Arc::clone(&self.comments),
            task: None,
            status: ProcessorStatus::InProgress,
            finished: false,
        }))
    }
}

#[test]
fn test_public_comment_resolves_through_the_worker_loop() {
    let rows = vec![Row::new(vec![
        Value::BigInt(STATUS_FLAG_SUPPRESS_PERMANENTLY),
        Value::Text("hidden for review".to_string()),
        Value::Int(0),
    ])];
    let session: Arc<dyn CassSession> = Arc::new(HistorySession { rows });
    let comments = Arc::new(Mutex::new(Vec::new()));

    let mut registry = Registry::new();
    registry
        .register(Arc::new(CommentFactory {
            session,
            comments: Arc::clone(&comments),
        }))
        .unwrap();
    let dispatcher = Dispatcher::new(registry.freeze(), WorkerPool::new(1).unwrap());

    let group = dispatcher
        .dispatch(Request::new(1, RequestKind::Other), Arc::new(NullReply))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !group.is_complete() {
        assert!(Instant::now() < deadline, "pipeline did not finish");
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(group.status(), ProcessorStatus::Done);
    assert_eq!(
        &*comments.lock().unwrap(),
        &[("hidden for review".to_string(), true)]
    );
}
