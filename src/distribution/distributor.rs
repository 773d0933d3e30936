//! Distributor Worker
//!
//! The single writer of a peer. Every mutation request, local or remote, is
//! handed to the distributor's queues and processed on one background thread,
//! which is also the only thread sending outbound modifier messages.
//!
//! ## Cycle
//! 1. **Wait**: Block until a queue is non-empty, the outbound buffer holds
//!    undelivered entries, or the inbound buffer awaits a merge.
//! 2. **Drain**: Process every queued request (FIFO per queue) through the
//!    modifier engines.
//! 3. **Retry**: Re-send each non-empty outbound buffer as a bulk file.
//! 4. **Merge**: Move the inbound buffer into the canonical store.
//!
//! The wait predicate is level-triggered: it is re-evaluated after every cycle
//! and on a periodic timeout, so work that arrives mid-cycle is never lost.

use super::modifier::{EntryModifier, FileModifier, ModifierContext};
use super::types::{DistributionRequest, Operation, Origin, Payload};
use crate::index::keys::KeyRegistry;
use crate::index::local::LocalIndex;
use crate::routing::Router;
use crate::routing::peer::LocalPeer;

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Queues {
    local_entries: VecDeque<DistributionRequest>,
    local_files: VecDeque<DistributionRequest>,
    remote_entries: VecDeque<DistributionRequest>,
    remote_files: VecDeque<DistributionRequest>,
}

impl Queues {
    fn is_empty(&self) -> bool {
        self.local_entries.is_empty()
            && self.local_files.is_empty()
            && self.remote_entries.is_empty()
            && self.remote_files.is_empty()
    }

    fn len(&self) -> usize {
        self.local_entries.len()
            + self.local_files.len()
            + self.remote_entries.len()
            + self.remote_files.len()
    }
}

/// The four request queues plus the signalling used to wake the worker.
#[derive(Default)]
pub struct WorkQueues {
    queues: Mutex<Queues>,
    signal: Condvar,
    paused: AtomicBool,
    shutdown: AtomicBool,
}

impl WorkQueues {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Non-blocking hand-off of a request to the worker.
    pub fn push(&self, request: DistributionRequest) {
        {
            let mut queues = self.queues.lock();
            let queue = match (&request.origin, &request.payload) {
                (Origin::Local, Payload::Entries(_)) => &mut queues.local_entries,
                (Origin::Local, Payload::File(_)) => &mut queues.local_files,
                (Origin::Remote { .. }, Payload::Entries(_)) => &mut queues.remote_entries,
                (Origin::Remote { .. }, Payload::File(_)) => &mut queues.remote_files,
            };
            queue.push_back(request);
        }
        self.signal.notify_all();
    }

    /// Wakes the worker so it re-evaluates its predicate.
    pub fn wake(&self) {
        self.signal.notify_all();
    }

    pub fn len(&self) -> usize {
        self.queues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.lock().is_empty()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn take_all(&self) -> Queues {
        std::mem::take(&mut *self.queues.lock())
    }
}

pub struct Distributor {
    queues: Arc<WorkQueues>,
    index: Arc<LocalIndex>,
    entries: Arc<EntryModifier>,
    files: Arc<FileModifier>,
    idle_poll: Duration,
    last_retry: Mutex<Option<Instant>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Distributor {
    /// Builds the distributor and both modifier engines. The worker thread is
    /// not started until [`Distributor::start`].
    pub fn new(
        peer: Arc<LocalPeer>,
        router: Arc<dyn Router>,
        index: Arc<LocalIndex>,
        keys: Arc<KeyRegistry>,
        idle_poll: Duration,
    ) -> Arc<Self> {
        let queues = WorkQueues::new();
        let ctx = ModifierContext {
            peer,
            router,
            index: index.clone(),
            keys,
            queues: queues.clone(),
        };

        Arc::new(Self {
            queues,
            index,
            entries: EntryModifier::new(ctx.clone()),
            files: FileModifier::new(ctx),
            idle_poll,
            last_retry: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    pub fn queues(&self) -> &Arc<WorkQueues> {
        &self.queues
    }

    pub fn entry_modifier(&self) -> &Arc<EntryModifier> {
        &self.entries
    }

    pub fn file_modifier(&self) -> &Arc<FileModifier> {
        &self.files
    }

    pub fn submit(&self, request: DistributionRequest) {
        tracing::trace!(
            "Queued {} request {} (local={})",
            request.operation,
            request.id.0,
            request.is_local()
        );
        self.queues.push(request);
    }

    /// Spawns the worker thread. Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) -> std::io::Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        self.queues.shutdown.store(false, Ordering::Release);
        let distributor = self.clone();
        let handle = std::thread::Builder::new()
            .name("distributor".to_string())
            .spawn(move || distributor.run())?;
        *worker = Some(handle);

        tracing::info!("Distributor started");
        Ok(())
    }

    /// Keeps queued work but stops the worker from picking it up.
    pub fn pause(&self) {
        self.queues.paused.store(true, Ordering::Release);
        tracing::info!("Distributor paused");
    }

    pub fn resume(&self) {
        self.queues.paused.store(false, Ordering::Release);
        self.queues.wake();
        tracing::info!("Distributor resumed");
    }

    /// Interrupts the wait and joins the worker. Queued requests are kept.
    pub fn shutdown(&self) {
        self.queues.shutdown.store(true, Ordering::Release);
        self.queues.wake();

        if let Some(handle) = self.worker.lock().take()
            && handle.join().is_err()
        {
            tracing::error!("Distributor thread panicked");
        }
        tracing::info!("Distributor stopped ({} requests left queued)", self.queues.len());
    }

    pub fn has_work(&self) -> bool {
        !self.queues.is_paused()
            && (!self.queues.is_empty() || self.retry_due() || self.index.has_inbound())
    }

    /// Undelivered entries are re-sent at most once per idle poll interval, so
    /// an unreachable subtree does not turn the worker into a busy loop.
    fn retry_due(&self) -> bool {
        let recent = matches!(*self.last_retry.lock(), Some(at) if at.elapsed() < self.idle_poll);
        !recent && self.index.has_outbound()
    }

    fn run(self: Arc<Self>) {
        tracing::info!("Distributor worker running");

        while self.wait_for_work() {
            self.run_cycle();
        }

        tracing::info!("Distributor worker exiting");
    }

    /// Blocks until there is work (`true`) or shutdown was requested (`false`).
    fn wait_for_work(&self) -> bool {
        loop {
            if self.queues.shutdown.load(Ordering::Acquire) {
                return false;
            }
            // Buffer checks may scan files; keep them off the queue lock so
            // `push` never waits on disk.
            let buffered =
                !self.queues.is_paused() && (self.retry_due() || self.index.has_inbound());

            let mut queues = self.queues.queues.lock();
            if self.queues.shutdown.load(Ordering::Acquire) {
                return false;
            }
            if !self.queues.is_paused() && (buffered || !queues.is_empty()) {
                return true;
            }
            self.queues.signal.wait_for(&mut queues, self.idle_poll);
        }
    }

    /// Runs one full cycle synchronously on the calling thread.
    pub fn run_cycle(&self) {
        let mut drained = self.queues.take_all();
        let count = drained.len();
        if count > 0 {
            tracing::debug!("Distributor draining {} requests", count);
        }

        for request in drained.local_entries.drain(..) {
            self.process(request);
        }
        for request in drained.local_files.drain(..) {
            self.process(request);
        }
        for request in drained.remote_entries.drain(..) {
            self.process(request);
        }
        for request in drained.remote_files.drain(..) {
            self.process(request);
        }

        self.send_outbound();
        self.merge_inbound();
    }

    fn process(&self, request: DistributionRequest) {
        let DistributionRequest {
            id,
            operation,
            payload,
            origin,
        } = request;

        // Messages spawned by a remote request keep the parent reference of
        // the request that started the chain.
        let parent = match &origin {
            Origin::Local => id,
            Origin::Remote {
                message_id,
                parent_id,
                via_replica,
            } => {
                tracing::debug!(
                    "Processing {} message {} as request {} (parent {}, replica={})",
                    operation,
                    message_id,
                    id,
                    parent_id,
                    via_replica
                );
                parent_id.clone()
            }
        };

        match (origin, payload) {
            (Origin::Local, Payload::Entries(entries)) => {
                self.entries.local_process(&parent, operation, entries)
            }
            (Origin::Local, Payload::File(file)) => {
                self.files.local_process(&parent, operation, file)
            }
            (Origin::Remote { via_replica, .. }, Payload::Entries(entries)) => {
                self.entries
                    .remote_process(&parent, operation, entries, via_replica)
            }
            (Origin::Remote { via_replica, .. }, Payload::File(file)) => {
                self.files
                    .remote_process(&parent, operation, file, via_replica)
            }
        }
    }

    fn send_outbound(&self) {
        if !self.retry_due() {
            return;
        }
        *self.last_retry.lock() = Some(Instant::now());

        for operation in Operation::ALL {
            match self.index.take_outbound(operation) {
                Ok(Some(file)) => {
                    tracing::debug!("Retrying outbound {} buffer", operation);
                    let request = DistributionRequest::local(operation, Payload::File(file));
                    self.process(request);
                }
                Ok(None) => {}
                Err(e) => tracing::error!("Failed to package outbound {} buffer: {}", operation, e),
            }
        }
    }

    fn merge_inbound(&self) {
        if !self.index.has_inbound() {
            return;
        }
        if let Err(e) = self.index.merge_inbound() {
            tracing::error!("Failed to merge inbound buffer: {}", e);
        }
    }
}
