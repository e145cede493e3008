use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[cfg(target_os = "linux")]
use crate::sys::mmap::MmapArea;

use super::{ConsumerRing, ProducerRing};

/// Set by the kernel in a ring's flags word when it wants a syscall to make
/// progress on that ring.
pub const XDP_RING_NEED_WAKEUP: u32 = 1 << 0;

/// Pointers into one ring's shared memory.
pub(crate) struct RawRing<T> {
    pub(crate) producer: *const AtomicU32,
    pub(crate) consumer: *const AtomicU32,
    pub(crate) flags: *const AtomicU32,
    pub(crate) descriptors: *mut T,
}

/// Keeps the memory behind a ring alive for as long as the ring exists.
pub(crate) enum Backing<T> {
    Heap(#[allow(dead_code)] Arc<RingMemory<T>>),
    #[cfg(target_os = "linux")]
    Mapped(#[allow(dead_code)] MmapArea),
}

/// Ring memory on the heap, shaped like a kernel ring mapping.
///
/// Hands out one producer view and one consumer view, so both ends of a ring
/// can run inside one process: the simulated counterparty holds one side and
/// the engine the other. Handing out two views of the same role breaks the
/// single-producer/single-consumer contract and is not checked.
pub struct RingMemory<T> {
    producer: AtomicU32,
    consumer: AtomicU32,
    flags: AtomicU32,
    descriptors: Box<[UnsafeCell<T>]>,
}

unsafe impl<T: Send> Send for RingMemory<T> {}
unsafe impl<T: Send> Sync for RingMemory<T> {}

impl<T: Copy + Default> RingMemory<T> {
    pub fn new(size: u32) -> Arc<Self> {
        assert!(size.is_power_of_two(), "Ring size must be power of 2");

        let descriptors = (0..size).map(|_| UnsafeCell::new(T::default())).collect();
        Arc::new(Self {
            producer: AtomicU32::new(0),
            consumer: AtomicU32::new(0),
            flags: AtomicU32::new(0),
            descriptors,
        })
    }

    /// Memory whose indices start at `index` instead of zero.
    #[cfg(test)]
    pub(crate) fn starting_at(size: u32, index: u32) -> Arc<Self> {
        let mem = Self::new(size);
        mem.producer.store(index, Ordering::Relaxed);
        mem.consumer.store(index, Ordering::Relaxed);
        mem
    }

    pub fn size(&self) -> u32 {
        self.descriptors.len() as u32
    }

    pub fn producer(self: &Arc<Self>) -> ProducerRing<T> {
        // SAFETY: the ring keeps an Arc to this memory, so the pointers
        // outlive it.
        unsafe { ProducerRing::from_raw(self.raw(), self.size(), Backing::Heap(Arc::clone(self))) }
    }

    pub fn consumer(self: &Arc<Self>) -> ConsumerRing<T> {
        // SAFETY: as above.
        unsafe { ConsumerRing::from_raw(self.raw(), self.size(), Backing::Heap(Arc::clone(self))) }
    }

    pub fn set_need_wakeup(&self, on: bool) {
        if on {
            self.flags.fetch_or(XDP_RING_NEED_WAKEUP, Ordering::Release);
        } else {
            self.flags.fetch_and(!XDP_RING_NEED_WAKEUP, Ordering::Release);
        }
    }

    pub fn producer_idx(&self) -> u32 {
        self.producer.load(Ordering::Acquire)
    }

    pub fn consumer_idx(&self) -> u32 {
        self.consumer.load(Ordering::Acquire)
    }

    /// Descriptors published but not yet released, oldest first.
    ///
    /// Only meaningful while neither side is moving the ring.
    pub fn snapshot(&self) -> Vec<T> {
        let consumer = self.consumer.load(Ordering::Acquire);
        let producer = self.producer.load(Ordering::Acquire);
        let mask = self.size() - 1;

        (0..producer.wrapping_sub(consumer))
            .map(|i| {
                let slot = (consumer.wrapping_add(i) & mask) as usize;
                // SAFETY: slots between consumer and producer were written
                // before the producer index was published.
                unsafe { *self.descriptors[slot].get() }
            })
            .collect()
    }

    fn raw(&self) -> RawRing<T> {
        RawRing {
            producer: &self.producer,
            consumer: &self.consumer,
            flags: &self.flags,
            descriptors: UnsafeCell::raw_get(self.descriptors.as_ptr()),
        }
    }
}
