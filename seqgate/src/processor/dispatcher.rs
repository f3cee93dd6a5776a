//! Per-request processor groups: creation fan-out, the start race,
//! cancellation, finish accounting and status rollup.

use super::worker::{SocketCallbacks, SocketEvent, WorkerCommand, WorkerHandle, WorkerPool};
use super::{
    aggregate_status, ProcessorStatus, ProcessorTimestamps, Registry, Reply, Request,
    StartProcessing,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Dispatcher-side state of one processor: status mirror, race/finish
/// flags, lifecycle timestamps and the worker address everything for this
/// processor is posted to.
pub struct ProcessorSlot {
    id: u64,
    name: String,
    group_name: String,
    priority: i32,
    worker: WorkerHandle,
    status: AtomicU8,
    finish_signalled: AtomicBool,
    timed_out: AtomicBool,
    canceled: CancellationToken,
    timestamps: Mutex<ProcessorTimestamps>,
}

impl ProcessorSlot {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn worker(&self) -> &WorkerHandle {
        &self.worker
    }

    /// Effective status: a processor past its deadline reports `Timeout`
    /// until (and instead of) the plain cancel outcome.
    pub fn status(&self) -> ProcessorStatus {
        let status = ProcessorStatus::from_u8(self.status.load(Ordering::Acquire));
        if self.timed_out.load(Ordering::Relaxed)
            && matches!(
                status,
                ProcessorStatus::InProgress | ProcessorStatus::Canceled
            )
        {
            return ProcessorStatus::Timeout;
        }
        status
    }

    pub fn is_finished(&self) -> bool {
        self.finish_signalled.load(Ordering::Acquire)
    }

    /// Cooperative cancellation flag; processor internals clone or child
    /// this token for their own async work.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.canceled
    }

    pub fn timestamps(&self) -> ProcessorTimestamps {
        *self.timestamps.lock()
    }

    pub(crate) fn mirror_status(&self, status: ProcessorStatus) {
        self.status.store(status.to_u8(), Ordering::Release);
    }

    pub(crate) fn mark_process_invoked(&self) {
        let mut stamps = self.timestamps.lock();
        if stamps.process_invoked_at.is_none() {
            stamps.process_invoked_at = Some(Instant::now());
        }
    }
}

/// All processors racing one request.
pub struct RequestGroup {
    request: Arc<Request>,
    slots: Vec<Arc<ProcessorSlot>>,
    /// Index of the start-race winner; `usize::MAX` until decided.
    winner: AtomicUsize,
    finished: AtomicUsize,
}

impl RequestGroup {
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    pub fn slots(&self) -> &[Arc<ProcessorSlot>] {
        &self.slots
    }

    pub fn winner(&self) -> Option<usize> {
        let winner = self.winner.load(Ordering::Acquire);
        (winner != usize::MAX).then_some(winner)
    }

    /// Worst-wins rollup over the group.
    pub fn status(&self) -> ProcessorStatus {
        aggregate_status(self.slots.iter().map(|slot| slot.status()))
    }

    /// True once every processor has signalled finish.
    pub fn is_complete(&self) -> bool {
        self.finished.load(Ordering::Acquire) == self.slots.len()
    }

    fn signal_start(&self, index: usize) -> StartProcessing {
        match self.winner.compare_exchange(
            usize::MAX,
            index,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                let slot = &self.slots[index];
                slot.timestamps.lock().signal_start_at = Some(Instant::now());
                debug!(
                    request = self.request.id,
                    processor = %slot.name,
                    "processor won the start race"
                );
                for (other_index, other) in self.slots.iter().enumerate() {
                    if other_index != index && !other.is_finished() {
                        other.worker.post(WorkerCommand::Cancel { id: other.id });
                    }
                }
                StartProcessing::Proceed
            }
            Err(_) => StartProcessing::Cancel,
        }
    }

    fn signal_finish(&self, index: usize) {
        let slot = &self.slots[index];
        if slot.finish_signalled.swap(true, Ordering::AcqRel) {
            warn!(
                request = self.request.id,
                processor = %slot.name,
                "duplicate finish signal ignored"
            );
            return;
        }
        slot.timestamps.lock().signal_finish_at = Some(Instant::now());
        self.finished.fetch_add(1, Ordering::AcqRel);
    }
}

/// Everything a processor needs from the framework while it runs.
///
/// Cloneable; clones posted from other threads still route every callback
/// to the processor's own worker loop.
#[derive(Clone)]
pub struct ProcessorContext {
    request: Arc<Request>,
    reply: Arc<dyn Reply>,
    group: Arc<RequestGroup>,
    slot: Arc<ProcessorSlot>,
    index: usize,
}

impl ProcessorContext {
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    pub fn reply(&self) -> &Arc<dyn Reply> {
        &self.reply
    }

    pub fn priority(&self) -> i32 {
        self.slot.priority()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.slot.cancellation()
    }

    /// Claims the request. The first processor of the group to call this
    /// gets `Proceed` and every other live processor is cancelled; later
    /// callers get `Cancel` and must wind down.
    pub fn signal_start_processing(&self) -> StartProcessing {
        self.group.signal_start(self.index)
    }

    /// Declares this processor done with the request (exactly once).
    pub fn signal_finish_processing(&self) {
        self.group.signal_finish(self.index)
    }

    /// Runs `callback` on this processor's worker thread.
    pub fn postpone_invoke(&self, callback: Box<dyn FnOnce() + Send>) {
        self.slot.worker().post(WorkerCommand::Invoke { callback });
    }

    /// Schedules a `process_event` tick for this processor on its own
    /// thread; the re-entry point for task data-ready callbacks.
    pub fn postpone_event(&self) {
        self.slot
            .worker()
            .post(WorkerCommand::ProcessEvent { id: self.slot.id() });
    }

    /// Watches `fd` for `event` on this processor's loop, with a timeout.
    /// The processor must keep the socket valid until a callback fires.
    pub fn set_socket_callback(
        &self,
        fd: RawFd,
        event: SocketEvent,
        timeout: Duration,
        callbacks: SocketCallbacks,
    ) {
        self.slot.worker().post(WorkerCommand::WatchSocket {
            fd,
            event,
            timeout,
            callbacks,
        });
    }

    pub(crate) fn slot(&self) -> &ProcessorSlot {
        &self.slot
    }
}

/// Routes requests to processors and supervises their lifecycle.
pub struct Dispatcher {
    registry: Arc<Registry>,
    workers: WorkerPool,
    groups: DashMap<u64, Arc<RequestGroup>>,
    next_worker: AtomicUsize,
    next_processor_id: AtomicU64,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, workers: WorkerPool) -> Self {
        Self {
            registry,
            workers,
            groups: DashMap::new(),
            next_worker: AtomicUsize::new(0),
            next_processor_id: AtomicU64::new(1),
        }
    }

    /// Offers `request` to every registered factory and schedules the
    /// resulting processors. Returns `None` when no factory takes it.
    pub fn dispatch(&self, request: Request, reply: Arc<dyn Reply>) -> Option<Arc<RequestGroup>> {
        let request = Arc::new(request);
        let mut created: Vec<(Box<dyn super::Processor>, String, String)> = Vec::new();
        let mut priority: i32 = 0;
        let mut priorities = Vec::new();
        for factory in self.registry.factories() {
            if !factory.can_process(&request, reply.as_ref()) {
                continue;
            }
            priority += 1;
            if let Some(processor) =
                factory.create(Arc::clone(&request), Arc::clone(&reply), priority)
            {
                let name = processor.name().to_string();
                let group_name = processor.group_name().to_string();
                created.push((processor, name, group_name));
                priorities.push(priority);
            }
        }
        if created.is_empty() {
            debug!(request = request.id, "no processor accepted the request");
            return None;
        }

        let mut slots = Vec::with_capacity(created.len());
        for ((_, name, group_name), priority) in created.iter().zip(&priorities) {
            let worker_index =
                self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
            slots.push(Arc::new(ProcessorSlot {
                id: self.next_processor_id.fetch_add(1, Ordering::Relaxed),
                name: name.clone(),
                group_name: group_name.clone(),
                priority: *priority,
                worker: self.workers.handles()[worker_index].clone(),
                status: AtomicU8::new(ProcessorStatus::InProgress.to_u8()),
                finish_signalled: AtomicBool::new(false),
                timed_out: AtomicBool::new(false),
                canceled: CancellationToken::new(),
                timestamps: Mutex::new(ProcessorTimestamps::default()),
            }));
        }

        let group = Arc::new(RequestGroup {
            request: Arc::clone(&request),
            slots,
            winner: AtomicUsize::new(usize::MAX),
            finished: AtomicUsize::new(0),
        });
        self.groups.insert(request.id, Arc::clone(&group));

        info!(
            request = request.id,
            processors = group.slots.len(),
            "request dispatched"
        );
        for (index, (processor, _, _)) in created.into_iter().enumerate() {
            let slot = Arc::clone(&group.slots[index]);
            let ctx = ProcessorContext {
                request: Arc::clone(&request),
                reply: Arc::clone(&reply),
                group: Arc::clone(&group),
                slot: Arc::clone(&slot),
                index,
            };
            slot.worker.post(WorkerCommand::Register {
                id: slot.id,
                processor,
                ctx,
            });
            slot.worker.post(WorkerCommand::Process { id: slot.id });
        }
        Some(group)
    }

    pub fn group(&self, request_id: u64) -> Option<Arc<RequestGroup>> {
        self.groups
            .get(&request_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Rolled-up status of a live request.
    pub fn request_status(&self, request_id: u64) -> Option<ProcessorStatus> {
        self.group(request_id).map(|group| group.status())
    }

    pub fn live_requests(&self) -> usize {
        self.groups.len()
    }

    /// Cancels every unfinished processor of `request_id`.
    pub fn cancel_request(&self, request_id: u64) {
        if let Some(group) = self.group(request_id) {
            for slot in group.slots() {
                if !slot.is_finished() {
                    slot.worker.post(WorkerCommand::Cancel { id: slot.id });
                }
            }
        }
    }

    /// Periodic supervision: reaps completed groups, times out overdue
    /// processors and delivers the event tick to the live ones.
    pub fn tick(&self) {
        let now = Instant::now();
        let mut completed = Vec::new();
        for entry in self.groups.iter() {
            let group = entry.value();
            if group.is_complete() {
                completed.push(*entry.key());
                continue;
            }
            let overdue = group
                .request
                .deadline
                .is_some_and(|deadline| now >= deadline);
            for slot in group.slots() {
                if slot.is_finished() {
                    continue;
                }
                if overdue {
                    // First tick past the deadline cancels; later ticks
                    // leave the processor to wind down.
                    if !slot.timed_out.swap(true, Ordering::AcqRel) {
                        warn!(
                            request = group.request.id,
                            processor = %slot.name,
                            "request deadline expired, timing processor out"
                        );
                        slot.worker.post(WorkerCommand::Cancel { id: slot.id });
                    }
                } else {
                    slot.worker.post(WorkerCommand::ProcessEvent { id: slot.id });
                }
            }
        }
        for request_id in completed {
            if let Some((_, group)) = self.groups.remove(&request_id) {
                debug!(
                    request = request_id,
                    status = group.status().as_str(),
                    "request complete"
                );
                for slot in group.slots() {
                    slot.worker.post(WorkerCommand::Remove { id: slot.id });
                }
            }
        }
    }

    /// Runs `tick()` every `interval` on a dedicated thread until
    /// `shutdown` fires.
    pub fn start_event_timer(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> std::thread::JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        std::thread::Builder::new()
            .name("seqgate-dispatch-timer".to_string())
            .spawn(move || {
                while !shutdown.is_cancelled() {
                    std::thread::sleep(interval);
                    dispatcher.tick();
                }
            })
            .expect("failed to spawn dispatch timer thread")
    }

    /// Tears the worker pool down; call once every request has drained.
    pub fn shutdown(self) {
        self.workers.shutdown();
    }
}
