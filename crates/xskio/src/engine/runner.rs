use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};
use xskio_core::ring::XdpDesc;
use xskio_core::umem::FramePool;
use xskio_core::PoolError;

use crate::binding::{Backend, QueueBinding};
use crate::config::{Poller, XskConfig};
use crate::engine::io::{PacketSink, PacketSource};
use crate::engine::stats::{EngineStats, StepStats};
use crate::error::XskError;
use crate::packet::PacketRef;

/// Frames unaccounted for when an engine shut down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeakReport {
    /// Frames drained from the completion and RX rings during shutdown.
    pub reclaimed: usize,
    /// Frames never returned to the pool.
    pub leaked: usize,
    /// Of those, how many sat in the fill ring.
    pub in_fill: u32,
    /// And how many in the TX ring.
    pub in_tx: u32,
}

/// Drives one binding: the only owner of its frame pool and the only
/// userspace actor on its four rings.
pub struct Engine<B: Backend> {
    binding: QueueBinding<B>,
    pool: FramePool,
    batch_size: u32,
    poller: Poller,
    stats: EngineStats,
}

fn frame_error(ring: &'static str, err: PoolError) -> XskError {
    match err {
        PoolError::InvalidFrame(addr) => XskError::RingCorruption { ring, addr },
        double_free => XskError::Pool(double_free),
    }
}

impl<B: Backend> Engine<B> {
    pub fn new(binding: QueueBinding<B>, config: &XskConfig) -> Self {
        let pool = FramePool::new(binding.umem.layout());
        let mut engine = Self {
            binding,
            pool,
            batch_size: config.batch_size.max(1),
            poller: config.poller,
            stats: EngineStats::default(),
        };

        // Hand the counterparty empty frames before the first packet arrives.
        let filled = engine.replenish_fill();
        engine.stats.fill_submitted += u64::from(filled);
        debug!("primed fill ring with {filled} frames");

        engine
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn binding(&self) -> &QueueBinding<B> {
        &self.binding
    }

    /// One non-blocking pass over the four rings.
    ///
    /// Completions are reclaimed first so the frames they free are available
    /// to the TX and fill steps of the same pass.
    pub fn step<S, P>(&mut self, sink: &mut S, source: &mut P) -> Result<StepStats, XskError>
    where
        S: PacketSink + ?Sized,
        P: PacketSource + ?Sized,
    {
        let mut step = StepStats {
            completed: self.reclaim_completions()?,
            ..Default::default()
        };

        let (received, recycled) = self.reclaim_receives(sink)?;
        step.received = received;
        step.recycled = recycled;

        let (transmitted, exhausted) = self.submit_outbound(source)?;
        step.transmitted = transmitted;
        step.pool_exhausted = exhausted;

        step.filled = self.replenish_fill();

        if step.pool_exhausted {
            trace!("frame pool exhausted, outbound deferred");
        }
        self.stats.record(&step);
        Ok(step)
    }

    /// Steps until `stop` is set, idling between empty steps as the poller
    /// says. `stop` is checked once per step.
    pub fn run<S, P>(&mut self, stop: &AtomicBool, sink: &mut S, source: &mut P) -> Result<(), XskError>
    where
        S: PacketSink + ?Sized,
        P: PacketSource + ?Sized,
    {
        match self.poller {
            Poller::Busy => loop {
                if stop.load(Ordering::Relaxed) {
                    break Ok(());
                }
                self.step(sink, source)?;
            },
            Poller::Wait => loop {
                if stop.load(Ordering::Relaxed) {
                    break Ok(());
                }
                if self.step(sink, source)?.is_idle() {
                    std::thread::sleep(Duration::from_millis(1));
                }
            },
            Poller::Adaptive => {
                let mut last_packet_time = Instant::now();
                let spin_duration = Duration::from_micros(50);

                loop {
                    if stop.load(Ordering::Relaxed) {
                        break Ok(());
                    }
                    if !self.step(sink, source)?.is_idle() {
                        last_packet_time = Instant::now();
                    } else if last_packet_time.elapsed() > spin_duration {
                        std::thread::sleep(Duration::from_millis(1));
                    } else {
                        std::thread::yield_now();
                    }
                }
            }
        }
    }

    fn reclaim_completions(&mut self) -> Result<u32, XskError> {
        let comp = &mut self.binding.rings.comp;
        let count = comp.peek(comp.capacity());

        for slot in 0..count {
            let addr = comp.read(slot);
            if let Err(err) = self.pool.release(addr) {
                comp.release(slot);
                return Err(frame_error("completion", err));
            }
        }
        comp.release(count);
        Ok(count)
    }

    fn reclaim_receives<S>(&mut self, sink: &mut S) -> Result<(u32, u32), XskError>
    where
        S: PacketSink + ?Sized,
    {
        let rings = &mut self.binding.rings;
        let umem = &self.binding.umem;
        let layout = umem.layout();

        let count = rings.rx.peek(self.batch_size);
        if count == 0 {
            return Ok((0, 0));
        }

        // Received frames go straight back to the fill ring where it has
        // room; the rest return to the pool.
        let recycle = rings.fill.reserve(count);
        let mut recycled = 0;
        let mut bytes = 0u64;

        for slot in 0..count {
            let desc = rings.rx.read(slot);
            let len = desc.len as usize;

            let frame = match layout.frame_base(desc.addr) {
                Some(frame) if layout.contains(desc.addr, len) => frame,
                _ => {
                    rings.fill.submit(recycled);
                    rings.rx.release(slot);
                    return Err(XskError::RingCorruption { ring: "rx", addr: desc.addr });
                }
            };

            // A frame still in the pool was never handed to the kernel.
            if self.pool.is_free(frame) {
                rings.fill.submit(recycled);
                rings.rx.release(slot + 1);
                return Err(XskError::Pool(PoolError::DoubleFree(frame)));
            }

            // SAFETY: the frame came off the RX ring, so nobody else touches
            // it until it is handed back below.
            if let Some(data) = unsafe { umem.slice(desc.addr, len) } {
                sink.deliver(PacketRef::new(frame, desc.addr, data));
            }
            bytes += desc.len as u64;

            if recycled < recycle {
                rings.fill.write(recycled, frame);
                recycled += 1;
            } else if let Err(err) = self.pool.release(frame) {
                rings.fill.submit(recycled);
                rings.rx.release(slot + 1);
                return Err(frame_error("rx", err));
            }
        }

        rings.fill.submit(recycled);
        rings.rx.release(count);

        self.stats.rx_bytes += bytes;
        Ok((count, recycled))
    }

    fn submit_outbound<P>(&mut self, source: &mut P) -> Result<(u32, bool), XskError>
    where
        P: PacketSource + ?Sized,
    {
        let rings = &mut self.binding.rings;
        let umem = &self.binding.umem;
        let frame_size = umem.layout().frame_size as usize;

        let granted = rings.tx.reserve(self.batch_size);
        let mut written = 0;
        let mut exhausted = false;

        while written < granted {
            let Some(frame) = self.pool.allocate() else {
                exhausted = true;
                break;
            };

            // SAFETY: a frame fresh out of the pool belongs to no ring.
            let Some(buf) = (unsafe { umem.slice_mut(frame, frame_size) }) else {
                rings.tx.submit(written);
                return Err(XskError::Pool(PoolError::InvalidFrame(frame)));
            };

            match source.produce(buf) {
                Some(len) if len <= frame_size => {
                    rings.tx.write(
                        written,
                        XdpDesc {
                            addr: frame,
                            len: len as u32,
                            options: 0,
                        },
                    );
                    written += 1;
                    self.stats.tx_bytes += len as u64;
                }
                Some(len) => {
                    warn!("source wrote {len} bytes into a {frame_size} byte frame, dropping");
                    self.stats.tx_oversize += 1;
                    self.pool.release(frame).map_err(|e| frame_error("tx", e))?;
                }
                None => {
                    self.pool.release(frame).map_err(|e| frame_error("tx", e))?;
                    break;
                }
            }
        }
        rings.tx.submit(written);

        if rings.tx.outstanding() > 0
            && (!self.binding.backend.uses_need_wakeup() || rings.tx.needs_wakeup())
        {
            if let Err(err) = self.binding.backend.kick_tx() {
                self.stats.kick_errors += 1;
                debug!("tx kick failed: {err}");
            }
        }

        Ok((written, exhausted))
    }

    fn replenish_fill(&mut self) -> u32 {
        let fill = &mut self.binding.rings.fill;

        let wanted = fill.free_slots().min(self.pool.available() as u32);
        let granted = fill.reserve(wanted);
        let mut filled = 0;
        while filled < granted {
            let Some(frame) = self.pool.allocate() else {
                break;
            };
            fill.write(filled, frame);
            filled += 1;
        }
        fill.submit(filled);

        if self.binding.backend.uses_need_wakeup() && fill.needs_wakeup() {
            if let Err(err) = self.binding.backend.wakeup_rx() {
                debug!("rx wakeup failed: {err}");
            }
        }

        filled
    }

    /// Drains what can still be drained, reports what cannot, and unbinds.
    ///
    /// Frames sitting in the fill and TX rings belong to the counterparty and
    /// are not recovered. Received data still queued is discarded.
    pub fn shutdown(mut self) -> LeakReport {
        let mut reclaimed = 0;

        let comp = &mut self.binding.rings.comp;
        let count = comp.peek(comp.capacity());
        for slot in 0..count {
            match self.pool.release(comp.read(slot)) {
                Ok(()) => reclaimed += 1,
                Err(err) => warn!("completion ring during shutdown: {err}"),
            }
        }
        comp.release(count);

        let layout = self.binding.umem.layout();
        let rx = &mut self.binding.rings.rx;
        let count = rx.peek(rx.capacity());
        for slot in 0..count {
            let addr = rx.read(slot).addr;
            match layout.frame_base(addr).map(|frame| self.pool.release(frame)) {
                Some(Ok(())) => reclaimed += 1,
                Some(Err(err)) => warn!("rx ring during shutdown: {err}"),
                None => warn!("rx ring during shutdown: address {addr:#x} outside umem"),
            }
        }
        rx.release(count);

        let report = LeakReport {
            reclaimed,
            leaked: self.pool.capacity() - self.pool.available(),
            in_fill: self.binding.rings.fill.outstanding(),
            in_tx: self.binding.rings.tx.outstanding(),
        };

        if report.leaked > 0 {
            warn!(
                "{} of {} frames still held by the counterparty at shutdown ({} in fill, {} in tx)",
                report.leaked,
                self.pool.capacity(),
                report.in_fill,
                report.in_tx
            );
        } else {
            debug!("all {} frames back in the pool", self.pool.capacity());
        }

        self.binding.unbind();
        report
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use tracing_test::traced_test;
    use xskio_core::ring::{RingMemory, XdpDesc};
    use xskio_core::umem::UmemRegion;

    use super::*;
    use crate::binding::{BindTarget, BindingRegistry, RingSet};
    use crate::engine::io::{Discard, NoOutbound};

    /// Counterparty whose ring memory the test drives by hand.
    struct RawBackend {
        fill: Arc<RingMemory<u64>>,
        comp: Arc<RingMemory<u64>>,
        rx: Arc<RingMemory<XdpDesc>>,
        tx: Arc<RingMemory<XdpDesc>>,
    }

    impl RawBackend {
        fn new(size: u32) -> Self {
            Self {
                fill: RingMemory::new(size),
                comp: RingMemory::new(size),
                rx: RingMemory::new(size),
                tx: RingMemory::new(size),
            }
        }
    }

    impl Backend for RawBackend {
        fn register(
            &mut self,
            _target: &BindTarget,
            _umem: &Arc<UmemRegion>,
            _config: &XskConfig,
        ) -> io::Result<RingSet> {
            Ok(RingSet {
                fill: self.fill.producer(),
                comp: self.comp.consumer(),
                rx: self.rx.consumer(),
                tx: self.tx.producer(),
            })
        }

        fn kick_tx(&self) -> io::Result<()> {
            Ok(())
        }
    }

    fn config() -> XskConfig {
        XskConfig {
            frame_size: 2048,
            frame_count: 16,
            fill_size: 4,
            comp_size: 4,
            rx_size: 4,
            tx_size: 4,
            batch_size: 4,
            ..Default::default()
        }
    }

    fn engine(backend: RawBackend) -> Engine<RawBackend> {
        let config = config();
        let umem = Arc::new(UmemRegion::new(config.layout().unwrap()).unwrap());
        let binding = QueueBinding::bind(
            &BindingRegistry::new(),
            BindTarget::new("raw0", 1, 0),
            umem,
            backend,
            &config,
        )
        .unwrap();
        Engine::new(binding, &config)
    }

    #[test]
    fn test_new_engine_primes_fill() {
        let backend = RawBackend::new(4);
        let fill = Arc::clone(&backend.fill);
        let engine = engine(backend);

        assert_eq!(fill.snapshot(), vec![0, 2048, 4096, 6144]);
        assert_eq!(engine.pool().available(), 12);
        assert_eq!(engine.stats().fill_submitted, 4);
    }

    #[test]
    fn test_rx_descriptor_outside_umem_is_corruption() {
        let backend = RawBackend::new(4);
        let mut rx = backend.rx.producer();
        let mut engine = engine(backend);

        let bogus = 16 * 2048 + 64;
        rx.reserve(1);
        rx.write(0, XdpDesc { addr: bogus, len: 60, options: 0 });
        rx.submit(1);

        let err = engine.step(&mut Discard, &mut NoOutbound).unwrap_err();
        assert!(matches!(err, XskError::RingCorruption { ring: "rx", addr } if addr == bogus));
    }

    #[test]
    fn test_rx_descriptor_crossing_frame_is_corruption() {
        let backend = RawBackend::new(4);
        let mut rx = backend.rx.producer();
        let mut engine = engine(backend);

        rx.reserve(1);
        rx.write(0, XdpDesc { addr: 2048 + 100, len: 2000, options: 0 });
        rx.submit(1);

        assert!(matches!(
            engine.step(&mut Discard, &mut NoOutbound),
            Err(XskError::RingCorruption { ring: "rx", .. })
        ));
    }

    #[test]
    fn test_completion_of_free_frame_is_fatal() {
        let backend = RawBackend::new(4);
        let mut comp = backend.comp.producer();
        let mut engine = engine(backend);

        // Frame 15 never left the pool.
        comp.reserve(1);
        comp.write(0, 15 * 2048);
        comp.submit(1);

        let err = engine.step(&mut Discard, &mut NoOutbound).unwrap_err();
        assert!(matches!(err, XskError::Pool(PoolError::DoubleFree(addr)) if addr == 15 * 2048));
        assert_eq!(engine.pool().available(), 12);
    }

    #[test]
    fn test_rx_of_free_frame_is_fatal() {
        let backend = RawBackend::new(4);
        let fill = Arc::clone(&backend.fill);
        let mut fill_cons = backend.fill.consumer();
        let mut rx = backend.rx.producer();
        let mut engine = engine(backend);

        // The NIC takes one fill frame but reports frame 15, which never
        // left the pool.
        assert_eq!(fill_cons.peek(1), 1);
        assert_eq!(fill_cons.read(0), 0);
        fill_cons.release(1);
        rx.reserve(1);
        rx.write(0, XdpDesc { addr: 15 * 2048, len: 64, options: 0 });
        rx.submit(1);

        let err = engine.step(&mut Discard, &mut NoOutbound).unwrap_err();
        assert!(matches!(err, XskError::Pool(PoolError::DoubleFree(addr)) if addr == 15 * 2048));
        assert!(!fill.snapshot().contains(&(15 * 2048)));
        assert!(engine.pool().is_free(15 * 2048));
        assert_eq!(engine.pool().available(), 12);
    }

    #[test]
    fn test_unaligned_completion_is_corruption() {
        let backend = RawBackend::new(4);
        let mut comp = backend.comp.producer();
        let mut engine = engine(backend);

        comp.reserve(1);
        comp.write(0, 100);
        comp.submit(1);

        assert!(matches!(
            engine.step(&mut Discard, &mut NoOutbound),
            Err(XskError::RingCorruption { ring: "completion", addr: 100 })
        ));
    }

    #[test]
    fn test_received_frames_go_back_to_fill() {
        let backend = RawBackend::new(4);
        let fill = Arc::clone(&backend.fill);
        let mut fill_cons = backend.fill.consumer();
        let mut rx = backend.rx.producer();
        let mut engine = engine(backend);

        // Act as the NIC: take two fill frames and hand them back as packets.
        assert_eq!(fill_cons.peek(2), 2);
        let frames = [fill_cons.read(0), fill_cons.read(1)];
        fill_cons.release(2);

        rx.reserve(2);
        for (slot, frame) in frames.iter().enumerate() {
            rx.write(slot as u32, XdpDesc { addr: frame + 32, len: 64, options: 0 });
        }
        rx.submit(2);

        let mut seen = Vec::new();
        let mut sink = |packet: PacketRef<'_>| seen.push((packet.frame(), packet.addr(), packet.len()));
        let step = engine.step(&mut sink, &mut NoOutbound).unwrap();

        assert_eq!(step.received, 2);
        assert_eq!(step.recycled, 2);
        assert_eq!(seen, vec![(0, 32, 64), (2048, 2080, 64)]);
        assert_eq!(fill.snapshot(), vec![4096, 6144, 0, 2048]);
        assert_eq!(engine.stats().rx_bytes, 128);
    }

    #[test]
    #[traced_test]
    fn test_shutdown_reports_kernel_held_frames() {
        let backend = RawBackend::new(4);
        let mut tx = backend.tx.consumer();
        let mut comp = backend.comp.producer();
        let mut engine = engine(backend);
        let mut payloads = vec![vec![1u8; 100], vec![2u8; 100]];
        let mut source = |frame: &mut [u8]| {
            let payload = payloads.pop()?;
            frame[..payload.len()].copy_from_slice(&payload);
            Some(payload.len())
        };
        assert_eq!(engine.step(&mut Discard, &mut source).unwrap().transmitted, 2);

        // One packet goes out and completes; the other stays queued.
        assert_eq!(tx.peek(1), 1);
        let sent = tx.read(0);
        tx.release(1);
        comp.reserve(1);
        comp.write(0, sent.addr);
        comp.submit(1);

        let report = engine.shutdown();
        assert_eq!(
            report,
            LeakReport {
                reclaimed: 1,
                leaked: 5,
                in_fill: 4,
                in_tx: 1,
            }
        );
        assert!(logs_contain("5 of 16 frames still held by the counterparty"));
    }
}
