use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;
use tracing::warn;

use crate::packet::PacketRef;

/// Receives packets taken off the RX ring.
pub trait PacketSink {
    fn deliver(&mut self, packet: PacketRef<'_>);
}

impl<F> PacketSink for F
where
    F: FnMut(PacketRef<'_>),
{
    fn deliver(&mut self, packet: PacketRef<'_>) {
        self(packet)
    }
}

/// Supplies outbound payloads.
///
/// `produce` writes one payload into `frame` and returns its length, or
/// returns `None` when nothing is pending. It is only called once a frame
/// and a TX slot are secured, so a pending payload is never lost to
/// backpressure; it waits for the next step.
pub trait PacketSource {
    fn produce(&mut self, frame: &mut [u8]) -> Option<usize>;
}

impl<F> PacketSource for F
where
    F: FnMut(&mut [u8]) -> Option<usize>,
{
    fn produce(&mut self, frame: &mut [u8]) -> Option<usize> {
        self(frame)
    }
}

/// Sink that ignores every packet.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl PacketSink for Discard {
    fn deliver(&mut self, _packet: PacketRef<'_>) {}
}

/// Source with nothing to send.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOutbound;

impl PacketSource for NoOutbound {
    fn produce(&mut self, _frame: &mut [u8]) -> Option<usize> {
        None
    }
}

/// Bounded lock-free queue of outbound payloads.
///
/// Any thread may push; the engine thread drains it through `&OutboundQueue`
/// as a [`PacketSource`]. Payloads larger than a frame are dropped.
#[derive(Debug)]
pub struct OutboundQueue {
    queue: ArrayQueue<Vec<u8>>,
    dropped: AtomicU64,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queues `payload`, handing it back when the queue is full.
    pub fn push(&self, payload: Vec<u8>) -> Result<(), Vec<u8>> {
        self.queue.push(payload)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Payloads discarded for not fitting in a frame.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl PacketSource for &OutboundQueue {
    fn produce(&mut self, frame: &mut [u8]) -> Option<usize> {
        loop {
            let payload = self.queue.pop()?;
            if payload.len() > frame.len() {
                warn!(
                    "dropping {} byte payload, frame holds {}",
                    payload.len(),
                    frame.len()
                );
                self.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            frame[..payload.len()].copy_from_slice(&payload);
            return Some(payload.len());
        }
    }
}
