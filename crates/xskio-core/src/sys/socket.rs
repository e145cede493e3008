use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
pub use std::os::unix::io::RawFd;

use libc::{
    bind, c_void, mmap, poll, pollfd, sendto, setsockopt, sockaddr, socket, socklen_t, AF_XDP,
    MAP_FAILED, MAP_POPULATE, MAP_SHARED, MSG_DONTWAIT, POLLIN, PROT_READ, PROT_WRITE, SOCK_RAW,
    SOL_XDP,
};

use crate::sys::if_xdp::*;

pub fn create_xsk_socket() -> io::Result<OwnedFd> {
    let fd = unsafe { socket(AF_XDP, SOCK_RAW, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fresh descriptor, owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub fn bind_socket(fd: &OwnedFd, ifindex: u32, queue_id: u32, bind_flags: u16) -> io::Result<()> {
    let mut sa: SockaddrXdp = unsafe { mem::zeroed() };
    sa.sxdp_family = AF_XDP as u16;
    sa.sxdp_ifindex = ifindex;
    sa.sxdp_queue_id = queue_id;
    sa.sxdp_flags = bind_flags;

    let ret = unsafe {
        bind(
            fd.as_raw_fd(),
            &sa as *const _ as *const sockaddr,
            mem::size_of::<SockaddrXdp>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn set_umem_reg(fd: &OwnedFd, umem_addr: u64, len: u64, chunk_size: u32, headroom: u32) -> io::Result<()> {
    let mr = XdpUmemReg {
        addr: umem_addr,
        len,
        chunk_size,
        headroom,
        flags: 0,
    };

    let ret = unsafe {
        setsockopt(
            fd.as_raw_fd(),
            SOL_XDP,
            XDP_UMEM_REG,
            &mr as *const _ as *const c_void,
            mem::size_of::<XdpUmemReg>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn set_ring_size(fd: &OwnedFd, ring_type: i32, size: u32) -> io::Result<()> {
    let ret = unsafe {
        setsockopt(
            fd.as_raw_fd(),
            SOL_XDP,
            ring_type,
            &size as *const _ as *const c_void,
            mem::size_of::<u32>() as socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn get_mmap_offsets(fd: &OwnedFd) -> io::Result<XdpMmapOffsets> {
    let mut off = XdpMmapOffsets::default();
    let mut len = mem::size_of::<XdpMmapOffsets>() as socklen_t;

    let ret = unsafe {
        libc::getsockopt(
            fd.as_raw_fd(),
            SOL_XDP,
            XDP_MMAP_OFFSETS,
            &mut off as *mut _ as *mut c_void,
            &mut len,
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(off)
}

/// # Safety
/// `offset` must be one of the `XDP_*PGOFF_*` ring offsets for `fd`.
pub unsafe fn mmap_range(fd: &OwnedFd, len: usize, offset: u64) -> io::Result<*mut u8> {
    let ptr = mmap(
        std::ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_SHARED | MAP_POPULATE,
        fd.as_raw_fd(),
        offset as libc::off_t,
    );

    if ptr == MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    Ok(ptr as *mut u8)
}

/// # Safety
/// `ptr` and `len` must describe a live mapping created by [`mmap_range`].
pub unsafe fn munmap(ptr: *mut u8, len: usize) -> io::Result<()> {
    let ret = libc::munmap(ptr as *mut c_void, len);
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Tells the kernel the TX ring has work. Non-blocking; a busy or
/// backlogged device is not an error.
pub fn kick_tx(fd: &OwnedFd) -> io::Result<()> {
    let ret = unsafe {
        sendto(fd.as_raw_fd(), std::ptr::null(), 0, MSG_DONTWAIT, std::ptr::null(), 0)
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::EBUSY) | Some(libc::ENOBUFS) => {}
            _ => return Err(err),
        }
    }
    Ok(())
}

/// Polls for readability; with `timeout_ms == 0` this only nudges the
/// kernel to process the fill ring.
pub fn poll_rx(fd: &OwnedFd, timeout_ms: i32) -> io::Result<bool> {
    let mut pfd = pollfd {
        fd: fd.as_raw_fd(),
        events: POLLIN,
        revents: 0,
    };

    let ret = unsafe { poll(&mut pfd, 1, timeout_ms) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret > 0)
}
