//! Pinned worker loops.
//!
//! Each worker owns one OS thread running a current-thread tokio runtime
//! and a `LocalSet`. A processor is registered with exactly one worker and
//! every command for it (process, cancel, event ticks, postponed closures,
//! socket readiness callbacks) executes on that thread, in arrival order.
//! Within a worker the model is single-threaded cooperative: nothing
//! preempts a running callback.

use super::dispatcher::ProcessorContext;
use super::Processor;
use std::collections::HashMap;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, OnceLock};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{debug, warn};

/// Socket condition a processor can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketEvent {
    Readable,
    Writable,
}

/// Single-shot callbacks for one socket watch.
pub struct SocketCallbacks {
    pub on_event: Box<dyn FnOnce() + Send>,
    pub on_timeout: Box<dyn FnOnce() + Send>,
    pub on_error: Box<dyn FnOnce(String) + Send>,
}

pub(crate) enum WorkerCommand {
    Register {
        id: u64,
        processor: Box<dyn Processor>,
        ctx: ProcessorContext,
    },
    Process {
        id: u64,
    },
    Cancel {
        id: u64,
    },
    ProcessEvent {
        id: u64,
    },
    Remove {
        id: u64,
    },
    Invoke {
        callback: Box<dyn FnOnce() + Send>,
    },
    WatchSocket {
        fd: RawFd,
        event: SocketEvent,
        timeout: Duration,
        callbacks: SocketCallbacks,
    },
    Shutdown,
}

/// Cheap, cloneable address of one worker loop.
#[derive(Clone)]
pub struct WorkerHandle {
    index: usize,
    sender: mpsc::UnboundedSender<WorkerCommand>,
    thread_id: Arc<OnceLock<ThreadId>>,
}

impl WorkerHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    /// The worker's OS thread id, once the loop has started.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.thread_id.get().copied()
    }

    pub(crate) fn post(&self, command: WorkerCommand) {
        if self.sender.send(command).is_err() {
            warn!(worker = self.index, "worker loop is gone, command dropped");
        }
    }
}

/// Fixed set of worker loops; processors are spread across them
/// round-robin at dispatch time.
pub struct WorkerPool {
    handles: Vec<WorkerHandle>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> io::Result<Self> {
        let mut handles = Vec::with_capacity(worker_count);
        let mut threads = Vec::with_capacity(worker_count);
        for index in 0..worker_count.max(1) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let (sender, receiver) = mpsc::unbounded_channel();
            let thread_id = Arc::new(OnceLock::new());
            let thread_id_slot = Arc::clone(&thread_id);
            let thread = std::thread::Builder::new()
                .name(format!("seqgate-worker-{index}"))
                .spawn(move || {
                    let _ = thread_id_slot.set(std::thread::current().id());
                    let local = LocalSet::new();
                    local.block_on(&runtime, worker_main(index, receiver));
                })?;
            handles.push(WorkerHandle {
                index,
                sender,
                thread_id,
            });
            threads.push(thread);
        }
        Ok(Self { handles, threads })
    }

    pub fn handles(&self) -> &[WorkerHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stops every loop and joins the threads. Commands already queued run
    /// before the shutdown marker is reached.
    pub fn shutdown(self) {
        for handle in &self.handles {
            handle.post(WorkerCommand::Shutdown);
        }
        for thread in self.threads {
            if thread.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
    }
}

struct WorkerEntry {
    processor: Box<dyn Processor>,
    ctx: ProcessorContext,
}

async fn worker_main(index: usize, mut receiver: mpsc::UnboundedReceiver<WorkerCommand>) {
    let mut processors: HashMap<u64, WorkerEntry> = HashMap::new();
    while let Some(command) = receiver.recv().await {
        match command {
            WorkerCommand::Register { id, processor, ctx } => {
                processors.insert(id, WorkerEntry { processor, ctx });
            }
            WorkerCommand::Process { id } => {
                if let Some(WorkerEntry { processor, ctx }) = processors.get_mut(&id) {
                    ctx.slot().mark_process_invoked();
                    processor.process(ctx);
                    ctx.slot().mirror_status(processor.status());
                }
            }
            WorkerCommand::Cancel { id } => {
                if let Some(WorkerEntry { processor, ctx }) = processors.get_mut(&id) {
                    ctx.slot().cancellation().cancel();
                    processor.cancel(ctx);
                    ctx.slot().mirror_status(processor.status());
                }
            }
            WorkerCommand::ProcessEvent { id } => {
                if let Some(WorkerEntry { processor, ctx }) = processors.get_mut(&id) {
                    processor.process_event(ctx);
                    ctx.slot().mirror_status(processor.status());
                }
            }
            WorkerCommand::Remove { id } => {
                if processors.remove(&id).is_some() {
                    debug!(worker = index, processor = id, "processor retired");
                }
            }
            WorkerCommand::Invoke { callback } => callback(),
            WorkerCommand::WatchSocket {
                fd,
                event,
                timeout,
                callbacks,
            } => {
                tokio::task::spawn_local(watch_socket(fd, event, timeout, callbacks));
            }
            WorkerCommand::Shutdown => break,
        }
    }
    debug!(worker = index, "worker loop stopped");
}

// AsyncFd wants an AsRawFd owner; this one borrows the caller's fd and
// must not close it.
struct BorrowedSocket(RawFd);

impl AsRawFd for BorrowedSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

async fn watch_socket(
    fd: RawFd,
    event: SocketEvent,
    timeout: Duration,
    callbacks: SocketCallbacks,
) {
    let interest = match event {
        SocketEvent::Readable => Interest::READABLE,
        SocketEvent::Writable => Interest::WRITABLE,
    };
    let async_fd = match AsyncFd::with_interest(BorrowedSocket(fd), interest) {
        Ok(async_fd) => async_fd,
        Err(e) => {
            (callbacks.on_error)(e.to_string());
            return;
        }
    };
    let wait = async {
        match event {
            SocketEvent::Readable => async_fd.readable().await.map(|_guard| ()),
            SocketEvent::Writable => async_fd.writable().await.map(|_guard| ()),
        }
    };
    match tokio::time::timeout(timeout, wait).await {
        Ok(Ok(())) => (callbacks.on_event)(),
        Ok(Err(e)) => (callbacks.on_error)(e.to_string()),
        Err(_) => (callbacks.on_timeout)(),
    }
}
