use std::io;
use std::ptr::NonNull;
use std::slice;

use memmap2::{MmapMut, MmapOptions};

use crate::umem::layout::UmemLayout;

/// The contiguous buffer backing every frame.
///
/// Frames are shared with the kernel, so handing out slices is `unsafe`: the
/// caller must own the frame under the ring protocol while the slice lives.
pub struct UmemRegion {
    _mmap: MmapMut,
    ptr: NonNull<u8>,
    layout: UmemLayout,
}

unsafe impl Send for UmemRegion {}
unsafe impl Sync for UmemRegion {}

impl UmemRegion {
    pub fn new(layout: UmemLayout) -> io::Result<Self> {
        let len = layout.size();
        let mut mmap = MmapOptions::new().len(len).map_anon()?;
        let ptr = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "anonymous mapping returned null"))?;

        Ok(Self {
            _mmap: mmap,
            ptr,
            layout,
        })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn layout(&self) -> UmemLayout {
        self.layout
    }

    /// `len` bytes at `addr`, or `None` if they cross a frame boundary.
    ///
    /// # Safety
    /// The frame must not be written by anyone else while the slice lives.
    pub unsafe fn slice(&self, addr: u64, len: usize) -> Option<&[u8]> {
        if !self.layout.contains(addr, len) {
            return None;
        }
        Some(slice::from_raw_parts(self.as_ptr().add(addr as usize), len))
    }

    /// # Safety
    /// The caller must own the frame exclusively while the slice lives.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, addr: u64, len: usize) -> Option<&mut [u8]> {
        if !self.layout.contains(addr, len) {
            return None;
        }
        Some(slice::from_raw_parts_mut(self.as_ptr().add(addr as usize), len))
    }
}
