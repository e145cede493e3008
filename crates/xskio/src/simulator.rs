//! An in-process stand-in for the kernel side of an AF_XDP socket.
//!
//! [`SimBackend`] hands the engine heap-backed rings; the matching
//! [`SimPeer`] holds the other ends and plays the NIC, so tests can inject
//! and collect packets without privileges or a real interface.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::trace;
use xskio_core::ring::{ConsumerRing, ProducerRing, RingMemory, XdpDesc};
use xskio_core::umem::UmemRegion;

use crate::binding::{Backend, BindTarget, RingSet};
use crate::config::XskConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("Simulated socket is not bound")]
    NotBound,

    #[error("RX ring full, packet dropped")]
    RxRingFull,

    #[error("No buffers in fill ring, packet dropped")]
    FillRingEmpty,

    #[error("Payload of {len} bytes does not fit in {room} bytes of frame")]
    PayloadTooLarge { len: usize, room: usize },

    #[error("Fill ring handed out address {0:#x}, which is not a frame")]
    BadFillAddress(u64),
}

/// Descriptors sitting in each ring, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RingSnapshot {
    pub fill: Vec<u64>,
    pub comp: Vec<u64>,
    pub rx: Vec<XdpDesc>,
    pub tx: Vec<XdpDesc>,
}

struct PeerState {
    umem: Arc<UmemRegion>,
    headroom: usize,

    fill: ConsumerRing<u64>,
    comp: ProducerRing<u64>,
    rx: ProducerRing<XdpDesc>,
    tx: ConsumerRing<XdpDesc>,

    fill_mem: Arc<RingMemory<u64>>,
    comp_mem: Arc<RingMemory<u64>>,
    rx_mem: Arc<RingMemory<XdpDesc>>,
    tx_mem: Arc<RingMemory<XdpDesc>>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<Option<PeerState>>,
    kicks: AtomicU64,
    rx_wakeups: AtomicU64,
}

/// Kernel-side handle of a simulated socket. Cheap to clone and safe to move
/// to another thread.
#[derive(Clone, Default)]
pub struct SimPeer {
    shared: Arc<Shared>,
}

impl SimPeer {
    fn lock(&self) -> MutexGuard<'_, Option<PeerState>> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_bound(&self) -> bool {
        self.lock().is_some()
    }

    /// A packet arrives from the wire: takes a frame off the fill ring,
    /// copies `payload` in after the configured headroom and publishes it on
    /// the RX ring. Returns the descriptor address.
    ///
    /// Nothing is consumed when the packet is dropped.
    pub fn deliver(&self, payload: &[u8]) -> Result<u64, SimError> {
        let mut guard = self.lock();
        let state = guard.as_mut().ok_or(SimError::NotBound)?;

        let layout = state.umem.layout();
        let room = layout.frame_size as usize - state.headroom;
        if payload.len() > room {
            return Err(SimError::PayloadTooLarge {
                len: payload.len(),
                room,
            });
        }
        if state.rx.free_slots() == 0 {
            return Err(SimError::RxRingFull);
        }
        if state.fill.peek(1) == 0 {
            return Err(SimError::FillRingEmpty);
        }

        let frame = state.fill.read(0);
        if layout.frame_base(frame) != Some(frame) {
            state.fill.release(0);
            return Err(SimError::BadFillAddress(frame));
        }
        state.fill.release(1);

        let addr = frame + state.headroom as u64;
        // SAFETY: the frame came off the fill ring, so the engine gave it up.
        if let Some(buf) = unsafe { state.umem.slice_mut(addr, payload.len()) } {
            buf.copy_from_slice(payload);
        }

        state.rx.reserve(1);
        state.rx.write(
            0,
            XdpDesc {
                addr,
                len: payload.len() as u32,
                options: 0,
            },
        );
        state.rx.submit(1);

        trace!("sim: delivered {} bytes at {addr:#x}", payload.len());
        Ok(addr)
    }

    /// The NIC sends up to `max` packets: consumes TX descriptors, returns
    /// copies of their payloads and hands the frames back on the completion
    /// ring. Stops early when the completion ring is full.
    pub fn transmit(&self, max: u32) -> Vec<Vec<u8>> {
        let mut guard = self.lock();
        let Some(state) = guard.as_mut() else {
            return Vec::new();
        };

        let room = state.comp.free_slots();
        let count = state.tx.peek(max.min(room));
        let granted = state.comp.reserve(count);
        debug_assert_eq!(granted, count);

        let mut sent = Vec::with_capacity(count as usize);
        for slot in 0..count {
            let desc = state.tx.read(slot);
            // SAFETY: the frame sits in the TX ring, so the engine will not
            // touch it until it comes back on the completion ring.
            let data = unsafe { state.umem.slice(desc.addr, desc.len as usize) };
            sent.push(data.map(<[u8]>::to_vec).unwrap_or_default());
            state.comp.write(slot, desc.addr);
        }
        state.comp.submit(count);
        state.tx.release(count);

        sent
    }

    /// Sets or clears the need-wakeup flag on the fill and TX rings, as the
    /// kernel does when it parks the queue.
    pub fn set_need_wakeup(&self, on: bool) {
        if let Some(state) = self.lock().as_ref() {
            state.fill_mem.set_need_wakeup(on);
            state.tx_mem.set_need_wakeup(on);
        }
    }

    /// TX kicks seen so far.
    pub fn kicks(&self) -> u64 {
        self.shared.kicks.load(Ordering::Relaxed)
    }

    /// RX wake-ups seen so far.
    pub fn rx_wakeups(&self) -> u64 {
        self.shared.rx_wakeups.load(Ordering::Relaxed)
    }

    /// Every descriptor currently queued in the four rings. Only consistent
    /// while the engine is not stepping.
    pub fn snapshot(&self) -> RingSnapshot {
        match self.lock().as_ref() {
            Some(state) => RingSnapshot {
                fill: state.fill_mem.snapshot(),
                comp: state.comp_mem.snapshot(),
                rx: state.rx_mem.snapshot(),
                tx: state.tx_mem.snapshot(),
            },
            None => RingSnapshot::default(),
        }
    }
}

/// [`Backend`] whose counterparty is a [`SimPeer`].
pub struct SimBackend {
    peer: SimPeer,
    need_wakeup: bool,
    fail_with: Option<io::ErrorKind>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            peer: SimPeer::default(),
            need_wakeup: false,
            fail_with: None,
        }
    }

    /// A backend that honours ring need-wakeup flags, like a socket bound
    /// with `XDP_USE_NEED_WAKEUP`.
    pub fn with_need_wakeup() -> Self {
        let mut backend = Self::new();
        backend.need_wakeup = true;
        backend
    }

    /// A backend whose registration fails with `kind`, like a driver that
    /// refuses the socket.
    pub fn failing(kind: io::ErrorKind) -> Self {
        let mut backend = Self::new();
        backend.fail_with = Some(kind);
        backend
    }

    pub fn peer(&self) -> SimPeer {
        self.peer.clone()
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SimBackend {
    fn register(
        &mut self,
        target: &BindTarget,
        umem: &Arc<UmemRegion>,
        config: &XskConfig,
    ) -> io::Result<RingSet> {
        if let Some(kind) = self.fail_with {
            return Err(io::Error::new(
                kind,
                format!("simulated bind failure on {} queue {}", target.interface, target.queue_id),
            ));
        }

        let mut state = self.peer.lock();
        if state.is_some() {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "simulated socket already registered"));
        }

        let fill_mem = RingMemory::<u64>::new(config.fill_size);
        let comp_mem = RingMemory::<u64>::new(config.comp_size);
        let rx_mem = RingMemory::<XdpDesc>::new(config.rx_size);
        let tx_mem = RingMemory::<XdpDesc>::new(config.tx_size);

        let rings = RingSet {
            fill: fill_mem.producer(),
            comp: comp_mem.consumer(),
            rx: rx_mem.consumer(),
            tx: tx_mem.producer(),
        };

        *state = Some(PeerState {
            umem: Arc::clone(umem),
            headroom: config.headroom as usize,
            fill: fill_mem.consumer(),
            comp: comp_mem.producer(),
            rx: rx_mem.producer(),
            tx: tx_mem.consumer(),
            fill_mem,
            comp_mem,
            rx_mem,
            tx_mem,
        });

        Ok(rings)
    }

    fn kick_tx(&self) -> io::Result<()> {
        self.peer.shared.kicks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wakeup_rx(&self) -> io::Result<()> {
        self.peer.shared.rx_wakeups.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn uses_need_wakeup(&self) -> bool {
        self.need_wakeup
    }
}

impl Drop for SimBackend {
    fn drop(&mut self) {
        // Closing the socket detaches the peer from the rings.
        self.peer.lock().take();
    }
}
