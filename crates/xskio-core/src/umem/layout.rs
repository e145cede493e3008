use crate::error::LayoutError;

/// Geometry of the UMEM: `frame_count` frames of `frame_size` bytes each,
/// frame `i` starting at byte `i * frame_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UmemLayout {
    pub frame_size: u32,
    pub frame_count: u32,
}

impl UmemLayout {
    pub fn new(frame_size: u32, frame_count: u32) -> Result<Self, LayoutError> {
        // The kernel wants power of 2 chunks of at least 2048 in aligned mode.
        if !frame_size.is_power_of_two() || frame_size < 2048 {
            return Err(LayoutError::FrameSize(frame_size));
        }
        if frame_count == 0 {
            return Err(LayoutError::EmptyPool);
        }
        if (frame_size as u64) * (frame_count as u64) > isize::MAX as u64 {
            return Err(LayoutError::TooLarge { frame_size, frame_count });
        }

        Ok(Self {
            frame_size,
            frame_count,
        })
    }

    pub fn size(&self) -> usize {
        (self.frame_size as usize) * (self.frame_count as usize)
    }

    /// Index of the frame starting exactly at `addr`.
    #[inline]
    pub fn addr_to_idx(&self, addr: u64) -> Option<u32> {
        if addr >= (self.size() as u64) || addr % self.frame_size as u64 != 0 {
            return None;
        }
        Some((addr / self.frame_size as u64) as u32)
    }

    #[inline]
    pub fn idx_to_addr(&self, idx: u32) -> Option<u64> {
        if idx >= self.frame_count {
            return None;
        }
        Some((idx as u64) * (self.frame_size as u64))
    }

    /// Start of the frame containing `addr`. Receive descriptors point past
    /// the kernel headroom, not at the frame start.
    #[inline]
    pub fn frame_base(&self, addr: u64) -> Option<u64> {
        if addr >= (self.size() as u64) {
            return None;
        }
        Some(addr & !(self.frame_size as u64 - 1))
    }

    /// Whether `len` bytes at `addr` stay inside one frame.
    #[inline]
    pub fn contains(&self, addr: u64, len: usize) -> bool {
        match self.frame_base(addr) {
            Some(base) => (addr - base) + len as u64 <= self.frame_size as u64,
            None => false,
        }
    }
}
