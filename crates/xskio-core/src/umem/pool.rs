use crate::error::PoolError;
use crate::umem::layout::UmemLayout;

/// Frames currently owned by userspace and not handed to any ring.
///
/// A frame's state is where it sits: in this free set, or in one of the four
/// rings. The pool only tracks the free set, plus one flag per frame so a
/// second release of the same frame is caught instead of corrupting the set.
pub struct FramePool {
    free_frames: Vec<u64>,
    is_free: Vec<bool>,
    layout: UmemLayout,
}

impl FramePool {
    pub fn new(layout: UmemLayout) -> Self {
        let count = layout.frame_count as usize;
        let mut free_frames = Vec::with_capacity(count);
        // Highest address first so the first allocation hands out frame 0.
        for i in (0..layout.frame_count).rev() {
            if let Some(addr) = layout.idx_to_addr(i) {
                free_frames.push(addr);
            }
        }

        Self {
            free_frames,
            is_free: vec![true; count],
            layout,
        }
    }

    /// Takes a free frame, or `None` when the pool is exhausted.
    #[inline]
    pub fn allocate(&mut self) -> Option<u64> {
        let addr = self.free_frames.pop()?;
        if let Some(idx) = self.layout.addr_to_idx(addr) {
            self.is_free[idx as usize] = false;
        }
        Some(addr)
    }

    /// Returns `addr` to the free set.
    ///
    /// A rejected release leaves the free set untouched.
    #[inline]
    pub fn release(&mut self, addr: u64) -> Result<(), PoolError> {
        let idx = self
            .layout
            .addr_to_idx(addr)
            .ok_or(PoolError::InvalidFrame(addr))? as usize;
        if self.is_free[idx] {
            return Err(PoolError::DoubleFree(addr));
        }
        self.is_free[idx] = true;
        self.free_frames.push(addr);
        Ok(())
    }

    pub fn available(&self) -> usize {
        self.free_frames.len()
    }

    pub fn capacity(&self) -> usize {
        self.layout.frame_count as usize
    }

    pub fn is_free(&self, addr: u64) -> bool {
        self.layout
            .addr_to_idx(addr)
            .is_some_and(|idx| self.is_free[idx as usize])
    }

    pub fn free_frames(&self) -> impl Iterator<Item = u64> + '_ {
        self.free_frames.iter().copied()
    }

    pub fn layout(&self) -> UmemLayout {
        self.layout
    }
}
