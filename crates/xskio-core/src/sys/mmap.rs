use std::io;
use std::ptr::NonNull;

use crate::sys::socket::munmap;

/// A kernel ring mapping, unmapped on drop.
pub struct MmapArea {
    ptr: NonNull<u8>,
    len: usize,
}

unsafe impl Send for MmapArea {}
unsafe impl Sync for MmapArea {}

impl MmapArea {
    /// # Safety
    /// `ptr` must be a live mapping of `len` bytes; ownership of the mapping
    /// moves to the returned value.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> io::Result<Self> {
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;
        Ok(Self { ptr, len })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MmapArea {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr.as_ptr(), self.len);
        }
    }
}
