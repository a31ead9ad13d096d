//! Moving decoded packets onto the thread that owns the world.
//!
//! Every connection gets its own FIFO queue. The connection's reader is the
//! only producer and the simulation thread, through [`MainThreadExecutor`], the
//! only consumer, so packets from one connection run in arrival order. Queues
//! of different connections are drained one after another with no ordering
//! between them.

use crate::envelope::Envelope;
use crate::packet::ThreadAffinity;
use crate::relay::PacketRelay;
use mts_types::{Flow, Origin};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Where and for which direction a packet runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    pub flow: Flow,
    pub affinity: ThreadAffinity,
}

/// What happened to a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Waiting for the simulation thread.
    Queued,
    /// Ran on the calling thread.
    Handled,
    /// The target world is not loaded; the packet was skipped.
    NoWorld,
    /// The simulation thread is gone; the packet was dropped.
    Dropped,
}

type Attach = (Origin, mpsc::UnboundedReceiver<Envelope>);

/// Network-side handle that opens per-connection queues.
#[derive(Clone)]
pub(crate) struct WorkQueues {
    attach_tx: mpsc::UnboundedSender<Attach>,
}

impl WorkQueues {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Attach>) {
        let (attach_tx, attach_rx) = mpsc::unbounded_channel();
        (Self { attach_tx }, attach_rx)
    }

    /// Open the queue for one connection. The executor learns about it before
    /// it can see any of its packets.
    pub(crate) fn open(&self, origin: Origin) -> WorkSender {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.attach_tx.send((origin, rx)).is_err() {
            debug!("Simulation thread gone, queue for {} is detached", origin);
        }
        WorkSender { tx }
    }
}

/// Producer end of one connection's main-thread queue.
pub(crate) struct WorkSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl WorkSender {
    /// Returns false if nobody will ever run the packet.
    pub(crate) fn push(&self, envelope: Envelope) -> bool {
        self.tx.send(envelope).is_ok()
    }
}

struct ConnectionQueue {
    origin: Origin,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

/// Runs queued main-thread packets. Owned by the simulation thread.
pub struct MainThreadExecutor {
    relay: Arc<PacketRelay>,
    attach_rx: mpsc::UnboundedReceiver<Attach>,
    queues: Vec<ConnectionQueue>,
}

impl MainThreadExecutor {
    pub(crate) fn new(relay: Arc<PacketRelay>, attach_rx: mpsc::UnboundedReceiver<Attach>) -> Self {
        Self {
            relay,
            attach_rx,
            queues: Vec::new(),
        }
    }

    /// Run every packet queued so far, each exactly once. Call once per tick.
    /// Returns the number of packets run.
    pub fn run_pending(&mut self) -> usize {
        while let Ok((origin, rx)) = self.attach_rx.try_recv() {
            debug!("Attached main-thread queue for {}", origin);
            self.queues.push(ConnectionQueue { origin, rx });
        }

        let relay = &self.relay;
        let mut ran = 0;
        self.queues.retain_mut(|queue| loop {
            match queue.rx.try_recv() {
                Ok(envelope) => {
                    relay.execute(queue.origin, envelope);
                    ran += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    debug!("Detached main-thread queue for {}", queue.origin);
                    return false;
                }
            }
        });
        ran
    }

    /// Number of connections with an open queue.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }
}
