//! # Dispatcher
//!
//! Owns the handler pair and the bounded inbound queue.
//!
//! Adapters push packets from their own threads via [`Dispatcher::enqueue_packet`].
//! Packets are decoded on the way in, so only well-formed requests and
//! responses ever reach the queue. Draining depends on the delivery model:
//!
//! - **Threaded:** a dispatch thread started by [`Dispatcher::start`] drains
//!   the queue and runs callbacks.
//! - **Cooperative:** the queue is drained only by [`Dispatcher::pump`].
//!
//! A full queue drops the incoming event (tail drop) with a warning.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::codec;
use crate::domain::{CaError, CaResult, DeliveryModel, Message, RemoteEndpoint};
use crate::ports::{ReceivedPacket, RequestHandler, ResponseHandler, TaskSpawner};

/// Name given to the dispatch thread.
pub const DISPATCH_TASK_NAME: &str = "ca-dispatch";

/// A decoded inbound message with its origin.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub endpoint: RemoteEndpoint,
    pub message: Message,
}

enum DispatchItem {
    Event(InboundEvent),
    Stop,
}

#[derive(Clone)]
struct Handlers {
    request: RequestHandler,
    response: ResponseHandler,
}

/// Counters describing what happened to inbound packets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub queued: u64,
    pub delivered: u64,
    pub dropped_queue_full: u64,
    pub dropped_malformed: u64,
    pub dropped_unhandled: u64,
    /// Queued events that arrived on a multicast server.
    pub multicast_received: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    delivered: AtomicU64,
    dropped_queue_full: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_unhandled: AtomicU64,
    multicast_received: AtomicU64,
}

/// Handle on a running dispatch thread.
struct DispatchThread {
    thread_id: Arc<Mutex<Option<ThreadId>>>,
    done: oneshot::Receiver<()>,
}

pub struct Dispatcher {
    model: DeliveryModel,
    capacity: usize,
    handlers: RwLock<Option<Handlers>>,
    tx: mpsc::Sender<DispatchItem>,
    /// Present in cooperative mode, and in threaded mode until started.
    rx: Mutex<Option<mpsc::Receiver<DispatchItem>>>,
    worker: Mutex<Option<DispatchThread>>,
    stopped: AtomicBool,
    counters: Counters,
}

impl Dispatcher {
    #[must_use]
    pub fn new(model: DeliveryModel, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            model,
            capacity: capacity.max(1),
            handlers: RwLock::new(None),
            tx,
            rx: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
            stopped: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    #[must_use]
    pub fn delivery_model(&self) -> DeliveryModel {
        self.model
    }

    /// Start the dispatch thread. No-op in cooperative mode.
    ///
    /// # Errors
    ///
    /// `Failed` if already started or if the spawner refuses the task.
    pub fn start(self: &Arc<Self>, spawner: &dyn TaskSpawner) -> CaResult<()> {
        if self.model == DeliveryModel::Cooperative {
            return Ok(());
        }
        let mut rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| CaError::failed("dispatcher already started"))?;
        let (done_tx, done_rx) = oneshot::channel();
        let thread_id = Arc::new(Mutex::new(None));

        let dispatcher = Arc::clone(self);
        let id_slot = Arc::clone(&thread_id);
        spawner.spawn(
            DISPATCH_TASK_NAME,
            Box::new(move || {
                *id_slot.lock() = Some(thread::current().id());
                debug!("dispatch thread running");
                while let Some(item) = rx.blocking_recv() {
                    match item {
                        DispatchItem::Stop => break,
                        DispatchItem::Event(_) if dispatcher.is_stopped() => break,
                        DispatchItem::Event(event) => {
                            dispatcher.deliver(event);
                        }
                    }
                }
                debug!("dispatch thread exiting");
                let _ = done_tx.send(());
            }),
        )?;

        *self.worker.lock() = Some(DispatchThread {
            thread_id,
            done: done_rx,
        });
        Ok(())
    }

    /// Install the handler pair, replacing any earlier one.
    pub fn set_handlers(&self, request: RequestHandler, response: ResponseHandler) {
        let replaced = self
            .handlers
            .write()
            .replace(Handlers { request, response })
            .is_some();
        debug!(replaced, "handlers registered");
    }

    #[must_use]
    pub fn has_handlers(&self) -> bool {
        self.handlers.read().is_some()
    }

    /// Decode a packet and queue it for delivery.
    ///
    /// Malformed packets and packets arriving at a full queue are dropped
    /// and counted.
    pub fn enqueue_packet(&self, packet: ReceivedPacket) {
        if self.is_stopped() {
            return;
        }

        let frame = match codec::decode(&packet.data) {
            Ok(frame) => frame,
            Err(e) => {
                self.counters.dropped_malformed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    transport = %packet.connectivity_type,
                    source = %packet.source,
                    multicast = packet.multicast,
                    len = packet.data.len(),
                    error = %e,
                    "dropping undecodable packet"
                );
                return;
            }
        };

        let endpoint = match RemoteEndpoint::new(packet.connectivity_type, packet.source) {
            Ok(ep) => ep.with_resource_uri(frame.resource_uri),
            Err(e) => {
                self.counters.dropped_malformed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "dropping packet with mismatched source address");
                return;
            }
        };

        trace!(source = %endpoint.address, multicast = packet.multicast, "packet decoded");
        if self.enqueue(InboundEvent {
            endpoint,
            message: frame.message,
        }) && packet.multicast
        {
            self.counters.multicast_received.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Queue an already decoded event. Returns false if it was dropped.
    pub fn enqueue(&self, event: InboundEvent) -> bool {
        match self.tx.try_send(DispatchItem::Event(event)) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(DispatchItem::Event(event))) => {
                let dropped = self.counters.dropped_queue_full.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    capacity = self.capacity,
                    dropped_total = dropped,
                    source = %event.endpoint.address,
                    "event queue full, dropping inbound event"
                );
                false
            }
            Err(_) => {
                debug!("event queue closed, dropping inbound event");
                false
            }
        }
    }

    /// Drain queued events synchronously (cooperative mode).
    ///
    /// Delivers at most one queue's worth of events so callbacks that feed
    /// the same queue cannot keep the pump spinning. Returns 0 in threaded
    /// mode and when called from inside a callback of a running pump.
    pub fn pump(&self) -> usize {
        if self.model == DeliveryModel::Threaded {
            return 0;
        }
        let Some(mut guard) = self.rx.try_lock() else {
            return 0;
        };
        let Some(rx) = guard.as_mut() else {
            return 0;
        };

        let mut delivered = 0;
        for _ in 0..self.capacity {
            match rx.try_recv() {
                Ok(DispatchItem::Event(event)) => {
                    if self.deliver(event) {
                        delivered += 1;
                    }
                }
                Ok(DispatchItem::Stop) | Err(_) => break,
            }
        }
        delivered
    }

    /// Invoke the matching callback. Returns false if no handler was set.
    fn deliver(&self, event: InboundEvent) -> bool {
        // Clone the handlers out so a callback may re-register.
        let handlers = self.handlers.read().clone();
        let Some(handlers) = handlers else {
            self.counters.dropped_unhandled.fetch_add(1, Ordering::Relaxed);
            warn!(source = %event.endpoint.address, "no handler registered, dropping event");
            return false;
        };
        match &event.message {
            Message::Request(request) => (handlers.request)(&event.endpoint, request),
            Message::Response(response) => (handlers.response)(&event.endpoint, response),
        }
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        true
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop delivery and wait for the dispatch thread to exit.
    ///
    /// Skips the wait when called from the dispatch thread itself or from a
    /// current-thread tokio runtime, which must not block.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        // A full queue rejects Stop; the thread then exits on its next event.
        let _ = self.tx.try_send(DispatchItem::Stop);

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let on_dispatch_thread = *worker.thread_id.lock() == Some(thread::current().id());
        if on_dispatch_thread {
            debug!("shutdown requested from dispatch thread");
            return;
        }
        let acknowledged = match Handle::try_current() {
            Err(_) => worker.done.blocking_recv(),
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| worker.done.blocking_recv())
            }
            Ok(_) => {
                debug!("inside a current-thread runtime, not waiting for dispatch thread");
                return;
            }
        };
        if acknowledged.is_err() {
            warn!("dispatch thread ended without acknowledging shutdown");
        }
    }

    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped_queue_full: self.counters.dropped_queue_full.load(Ordering::Relaxed),
            dropped_malformed: self.counters.dropped_malformed.load(Ordering::Relaxed),
            dropped_unhandled: self.counters.dropped_unhandled.load(Ordering::Relaxed),
            multicast_received: self.counters.multicast_received.load(Ordering::Relaxed),
        }
    }
}
