use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use super::memory::{Backing, RawRing, XDP_RING_NEED_WAKEUP};

/// The side of a ring this process writes to (Fill and Transmit).
pub struct ProducerRing<T> {
    producer: *const AtomicU32,
    consumer: *const AtomicU32,
    flags: *const AtomicU32,
    descriptors: *mut T,
    mask: u32,
    size: u32,
    // Local copy of the producer index; only this side ever moves it.
    cached_producer: u32,
    reserved: u32,
    _backing: Backing<T>,
}

unsafe impl<T: Send> Send for ProducerRing<T> {}

impl<T: Copy> ProducerRing<T> {
    /// # Safety
    /// The pointers in `raw` must stay valid for the lifetime of the ring,
    /// which `backing` is expected to guarantee, and `descriptors` must have
    /// room for `size` entries.
    pub(crate) unsafe fn from_raw(raw: RawRing<T>, size: u32, backing: Backing<T>) -> Self {
        let cached_producer = (*raw.producer).load(Ordering::Relaxed);
        Self {
            producer: raw.producer,
            consumer: raw.consumer,
            flags: raw.flags,
            descriptors: raw.descriptors,
            mask: size - 1,
            size,
            cached_producer,
            reserved: 0,
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

    /// Slots published and not yet consumed by the other side.
    #[inline]
    pub fn outstanding(&self) -> u32 {
        let consumer_idx = unsafe { (*self.consumer).load(Ordering::Acquire) };
        self.cached_producer.wrapping_sub(consumer_idx)
    }

    #[inline]
    pub fn free_slots(&self) -> u32 {
        self.size - self.outstanding()
    }

    /// Reserves up to `count` slots and returns how many were granted.
    ///
    /// Never blocks. A full ring grants 0; callers must cope with any
    /// value below `count`. A new reservation replaces an unsubmitted one.
    #[inline]
    pub fn reserve(&mut self, count: u32) -> u32 {
        let granted = count.min(self.free_slots());
        self.reserved = granted;
        granted
    }

    /// Writes slot `slot` of the current reservation.
    #[inline]
    pub fn write(&mut self, slot: u32, item: T) {
        assert!(
            slot < self.reserved,
            "slot {slot} outside reservation of {}",
            self.reserved
        );
        let offset = (self.cached_producer.wrapping_add(slot) & self.mask) as usize;
        unsafe { ptr::write(self.descriptors.add(offset), item) };
    }

    /// Publishes the first `count` written slots of the reservation.
    ///
    /// The release store pairs with the consumer's acquire load of the
    /// producer index, so the slot contents are visible before the index.
    #[inline]
    pub fn submit(&mut self, count: u32) {
        assert!(
            count <= self.reserved,
            "submit of {count} exceeds reservation of {}",
            self.reserved
        );
        self.cached_producer = self.cached_producer.wrapping_add(count);
        unsafe { (*self.producer).store(self.cached_producer, Ordering::Release) };
        self.reserved = 0;
    }

    /// Whether the consumer asked to be woken up with a syscall.
    #[inline]
    pub fn needs_wakeup(&self) -> bool {
        unsafe { (*self.flags).load(Ordering::Acquire) & XDP_RING_NEED_WAKEUP != 0 }
    }
}
