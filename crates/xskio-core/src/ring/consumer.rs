use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use super::memory::{Backing, RawRing, XDP_RING_NEED_WAKEUP};

/// The side of a ring this process reads from (Completion and Receive).
pub struct ConsumerRing<T> {
    producer: *const AtomicU32,
    consumer: *const AtomicU32,
    flags: *const AtomicU32,
    descriptors: *const T,
    mask: u32,
    size: u32,
    cached_consumer: u32,
    peeked: u32,
    _backing: Backing<T>,
}

unsafe impl<T: Send> Send for ConsumerRing<T> {}

impl<T: Copy> ConsumerRing<T> {
    /// # Safety
    /// Same contract as [`ProducerRing::from_raw`](super::ProducerRing).
    pub(crate) unsafe fn from_raw(raw: RawRing<T>, size: u32, backing: Backing<T>) -> Self {
        let cached_consumer = (*raw.consumer).load(Ordering::Relaxed);
        Self {
            producer: raw.producer,
            consumer: raw.consumer,
            flags: raw.flags,
            descriptors: raw.descriptors,
            mask: size - 1,
            size,
            cached_consumer,
            peeked: 0,
            _backing: backing,
        }
    }

    /// # Safety
    /// `map` must be the kernel mapping of a ring of `size` entries of `T`,
    /// laid out as `off` describes.
    #[cfg(target_os = "linux")]
    pub unsafe fn from_mapping(
        map: crate::sys::mmap::MmapArea,
        off: &crate::sys::if_xdp::XdpRingOffset,
        size: u32,
    ) -> Self {
        let base = map.as_ptr();
        let raw = RawRing {
            producer: base.add(off.producer as usize) as *const AtomicU32,
            consumer: base.add(off.consumer as usize) as *const AtomicU32,
            flags: base.add(off.flags as usize) as *const AtomicU32,
            descriptors: base.add(off.desc as usize) as *mut T,
        };
        Self::from_raw(raw, size, Backing::Mapped(map))
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.size
    }

    /// Descriptors published by the producer and not yet released here.
    #[inline]
    pub fn pending(&self) -> u32 {
        let producer_idx = unsafe { (*self.producer).load(Ordering::Acquire) };
        producer_idx.wrapping_sub(self.cached_consumer)
    }

    /// Returns how many descriptors can be read, at most `max`. Never blocks.
    #[inline]
    pub fn peek(&mut self, max: u32) -> u32 {
        let available = max.min(self.pending());
        self.peeked = available;
        available
    }

    /// Reads slot `slot` of the latest peek.
    #[inline]
    pub fn read(&self, slot: u32) -> T {
        assert!(slot < self.peeked, "slot {slot} outside peek of {}", self.peeked);
        let offset = (self.cached_consumer.wrapping_add(slot) & self.mask) as usize;
        unsafe { ptr::read(self.descriptors.add(offset)) }
    }

    /// Hands `count` peeked slots back to the producer. Must follow every
    /// read of those slots.
    #[inline]
    pub fn release(&mut self, count: u32) {
        assert!(
            count <= self.peeked,
            "release of {count} exceeds peek of {}",
            self.peeked
        );
        self.cached_consumer = self.cached_consumer.wrapping_add(count);
        unsafe { (*self.consumer).store(self.cached_consumer, Ordering::Release) };
        self.peeked = 0;
    }

    #[inline]
    pub fn needs_wakeup(&self) -> bool {
        unsafe { (*self.flags).load(Ordering::Acquire) & XDP_RING_NEED_WAKEUP != 0 }
    }
}
