//! Integration tests for processor dispatch: the start race, cancellation
//! fan-out, finish accounting, status rollup, deadlines and loop pinning.

use seqgate::processor::{
    aggregate_status, Dispatcher, Processor, ProcessorContext, ProcessorFactory, ProcessorStatus,
    Registry, Reply, Request, RequestGroup, RequestKind, StartProcessing, WorkerPool,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

struct TestReply {
    chunks: Mutex<Vec<Vec<u8>>>,
    trailer: Mutex<Option<ProcessorStatus>>,
}

impl TestReply {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            chunks: Mutex::new(Vec::new()),
            trailer: Mutex::new(None),
        })
    }
}

impl Reply for TestReply {
    fn send_chunk(&self, chunk: &[u8]) {
        self.chunks.lock().unwrap().push(chunk.to_vec());
    }

    fn send_trailer(&self, status: ProcessorStatus) {
        *self.trailer.lock().unwrap() = Some(status);
    }
}

/// Shared scripting surface for the test processors.
#[derive(Default)]
struct Journal {
    start_verdicts: Mutex<Vec<(String, StartProcessing)>>,
    process_threads: Mutex<Vec<ThreadId>>,
    invoke_threads: Mutex<Vec<ThreadId>>,
}

enum Behavior {
    /// Claims the request, sends a chunk, finishes Done.
    ClaimAndFinish,
    /// Claims the request too (races), finishing Done or Canceled by verdict.
    ClaimOrYield,
    /// Does nothing until cancelled; finishes Canceled from cancel().
    WaitForCancel,
    /// Records thread ids, posts a closure to its own loop, finishes Done.
    RecordThreads,
}

struct TestProcessor {
    name: &'static str,
    behavior: Behavior,
    journal: Arc<Journal>,
    status: ProcessorStatus,
    finished: bool,
}

impl TestProcessor {
    fn finish(&mut self, ctx: &ProcessorContext, status: ProcessorStatus) {
        if !self.finished {
            self.finished = true;
            self.status = status;
            ctx.signal_finish_processing();
        }
    }
}

impl Processor for TestProcessor {
    fn process(&mut self, ctx: &ProcessorContext) {
        match self.behavior {
            Behavior::ClaimAndFinish => {
                let verdict = ctx.signal_start_processing();
                self.journal
                    .start_verdicts
                    .lock()
                    .unwrap()
                    .push((self.name.to_string(), verdict));
                assert_eq!(verdict, StartProcessing::Proceed);
                ctx.reply().send_chunk(b"blob-bytes");
                ctx.reply().send_trailer(ProcessorStatus::Done);
                self.finish(ctx, ProcessorStatus::Done);
            }
            Behavior::ClaimOrYield => {
                let verdict = ctx.signal_start_processing();
                self.journal
                    .start_verdicts
                    .lock()
                    .unwrap()
                    .push((self.name.to_string(), verdict));
                match verdict {
                    StartProcessing::Proceed => self.finish(ctx, ProcessorStatus::Done),
                    StartProcessing::Cancel => self.finish(ctx, ProcessorStatus::Canceled),
                }
            }
            Behavior::WaitForCancel => {
                // Stays in progress; the dispatcher (race or deadline) must
                // cancel it.
            }
            Behavior::RecordThreads => {
                self.journal
                    .process_threads
                    .lock()
                    .unwrap()
                    .push(std::thread::current().id());
                let journal = Arc::clone(&self.journal);
                ctx.postpone_invoke(Box::new(move || {
                    journal
                        .invoke_threads
                        .lock()
                        .unwrap()
                        .push(std::thread::current().id());
                }));
                self.finish(ctx, ProcessorStatus::Done);
            }
        }
    }

    fn cancel(&mut self, ctx: &ProcessorContext) {
        self.finish(ctx, ProcessorStatus::Canceled);
    }

    fn status(&self) -> ProcessorStatus {
        self.status
    }

    fn name(&self) -> &str {
        self.name
    }

    fn group_name(&self) -> &str {
        "cassandra"
    }
}

struct TestFactory {
    name: &'static str,
    behavior: fn() -> Behavior,
    journal: Arc<Journal>,
}

impl ProcessorFactory for TestFactory {
    fn name(&self) -> &str {
        self.name
    }

    fn create(
        &self,
        _request: Arc<Request>,
        _reply: Arc<dyn Reply>,
        _priority: i32,
    ) -> Option<Box<dyn Processor>> {
        Some(Box::new(TestProcessor {
            name: self.name,
            behavior: (self.behavior)(),
            journal: Arc::clone(&self.journal),
            status: ProcessorStatus::InProgress,
            finished: false,
        }))
    }
}

fn dispatcher_with(
    journal: &Arc<Journal>,
    factories: &[(&'static str, fn() -> Behavior)],
) -> Arc<Dispatcher> {
    let mut registry = Registry::new();
    for (name, behavior) in factories {
        registry
            .register(Arc::new(TestFactory {
                name,
                behavior: *behavior,
                journal: Arc::clone(journal),
            }))
            .unwrap();
    }
    Arc::new(Dispatcher::new(
        registry.freeze(),
        WorkerPool::new(2).unwrap(),
    ))
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn request() -> Request {
    Request::new(
        NEXT_REQUEST_ID.fetch_add(1, Ordering::SeqCst),
        RequestKind::Other,
    )
}

fn wait_complete(group: &Arc<RequestGroup>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !group.is_complete() {
        assert!(Instant::now() < deadline, "request did not complete in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_winner_claims_and_losers_are_cancelled() {
    let journal = Arc::new(Journal::default());
    let dispatcher = dispatcher_with(
        &journal,
        &[
            ("claimer", || Behavior::ClaimAndFinish),
            ("bystander", || Behavior::WaitForCancel),
        ],
    );
    let reply = TestReply::new();
    let group = dispatcher.dispatch(request(), reply.clone()).unwrap();
    wait_complete(&group);

    assert_eq!(group.winner(), Some(0));
    assert_eq!(reply.chunks.lock().unwrap().len(), 1);
    let statuses: Vec<ProcessorStatus> = group.slots().iter().map(|s| s.status()).collect();
    assert_eq!(statuses[0], ProcessorStatus::Done);
    assert_eq!(statuses[1], ProcessorStatus::Canceled);
    // Worst-wins rollup over the full group.
    assert_eq!(group.status(), ProcessorStatus::Canceled);

    // A tick reaps the completed group.
    dispatcher.tick();
    assert_eq!(dispatcher.live_requests(), 0);
}

#[test]
fn test_start_race_has_exactly_one_winner() {
    let journal = Arc::new(Journal::default());
    let dispatcher = dispatcher_with(
        &journal,
        &[
            ("racer-a", || Behavior::ClaimOrYield),
            ("racer-b", || Behavior::ClaimOrYield),
        ],
    );
    let group = dispatcher.dispatch(request(), TestReply::new()).unwrap();
    wait_complete(&group);

    let verdicts = journal.start_verdicts.lock().unwrap();
    assert_eq!(verdicts.len(), 2);
    let proceeds = verdicts
        .iter()
        .filter(|(_, v)| *v == StartProcessing::Proceed)
        .count();
    assert_eq!(proceeds, 1, "exactly one processor may win the race");
    assert!(group.winner().is_some());
}

#[test]
fn test_aggregated_status_is_worst_wins() {
    let journal = Arc::new(Journal::default());
    let dispatcher = dispatcher_with(
        &journal,
        &[
            ("claimer", || Behavior::ClaimAndFinish),
            ("bystander", || Behavior::WaitForCancel),
        ],
    );
    let group = dispatcher.dispatch(request(), TestReply::new()).unwrap();
    wait_complete(&group);
    assert_eq!(
        group.status(),
        aggregate_status(group.slots().iter().map(|s| s.status()))
    );
}

#[test]
fn test_expired_deadline_times_processors_out() {
    let journal = Arc::new(Journal::default());
    let dispatcher = dispatcher_with(&journal, &[("sleeper", || Behavior::WaitForCancel)]);
    let request = request().with_deadline(Instant::now() - Duration::from_millis(1));
    let group = dispatcher.dispatch(request, TestReply::new()).unwrap();
    // The event tick notices the expired deadline and cancels.
    dispatcher.tick();
    wait_complete(&group);
    assert_eq!(group.slots()[0].status(), ProcessorStatus::Timeout);
    assert_eq!(group.status(), ProcessorStatus::Timeout);
}

#[test]
fn test_explicit_request_cancellation() {
    let journal = Arc::new(Journal::default());
    let dispatcher = dispatcher_with(&journal, &[("sleeper", || Behavior::WaitForCancel)]);
    let req = request();
    let id = req.id;
    let group = dispatcher.dispatch(req, TestReply::new()).unwrap();
    dispatcher.cancel_request(id);
    wait_complete(&group);
    assert_eq!(group.status(), ProcessorStatus::Canceled);
}

#[test]
fn test_callbacks_run_on_the_processor_thread() {
    let journal = Arc::new(Journal::default());
    let dispatcher = dispatcher_with(&journal, &[("pinned", || Behavior::RecordThreads)]);
    let group = dispatcher.dispatch(request(), TestReply::new()).unwrap();
    wait_complete(&group);

    // The postponed closure may still be queued behind the finish; give the
    // loop a moment to drain.
    let deadline = Instant::now() + Duration::from_secs(5);
    while journal.invoke_threads.lock().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "postponed closure never ran");
        std::thread::sleep(Duration::from_millis(5));
    }

    let process_thread = journal.process_threads.lock().unwrap()[0];
    let invoke_thread = journal.invoke_threads.lock().unwrap()[0];
    assert_eq!(process_thread, invoke_thread);
    assert_eq!(group.slots()[0].worker().thread_id(), Some(process_thread));
}

#[test]
fn test_unclaimed_request_yields_no_group() {
    struct DecliningFactory;
    impl ProcessorFactory for DecliningFactory {
        fn name(&self) -> &str {
            "decliner"
        }
        fn can_process(&self, _request: &Request, _reply: &dyn Reply) -> bool {
            false
        }
        fn create(
            &self,
            _request: Arc<Request>,
            _reply: Arc<dyn Reply>,
            _priority: i32,
        ) -> Option<Box<dyn Processor>> {
            None
        }
    }
    let mut registry = Registry::new();
    registry.register(Arc::new(DecliningFactory)).unwrap();
    let dispatcher = Dispatcher::new(registry.freeze(), WorkerPool::new(1).unwrap());
    assert!(dispatcher.dispatch(request(), TestReply::new()).is_none());
    assert_eq!(dispatcher.live_requests(), 0);
}

#[test]
fn test_processor_timestamps_are_recorded() {
    let journal = Arc::new(Journal::default());
    let dispatcher = dispatcher_with(&journal, &[("claimer", || Behavior::ClaimAndFinish)]);
    let group = dispatcher.dispatch(request(), TestReply::new()).unwrap();
    wait_complete(&group);
    let stamps = group.slots()[0].timestamps();
    assert!(stamps.process_invoked_at.is_some());
    assert!(stamps.signal_start_at.is_some());
    assert!(stamps.signal_finish_at.is_some());
}
