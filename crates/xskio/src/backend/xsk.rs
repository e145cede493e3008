use std::io;
use std::mem;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::Arc;

use tracing::debug;
use xskio_core::ring::{ConsumerRing, ProducerRing, XdpDesc};
use xskio_core::sys::if_xdp::*;
use xskio_core::sys::mmap::MmapArea;
use xskio_core::sys::socket::{
    bind_socket, create_xsk_socket, get_mmap_offsets, kick_tx, mmap_range, poll_rx, set_ring_size,
    set_umem_reg, RawFd,
};
use xskio_core::umem::UmemRegion;

use crate::binding::{BindTarget, Backend, RingSet};
use crate::config::XskConfig;

/// An AF_XDP socket: the kernel is the counterparty.
pub struct XskBackend {
    fd: OwnedFd,
    need_wakeup: bool,
}

impl XskBackend {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            fd: create_xsk_socket()?,
            need_wakeup: false,
        })
    }

    /// The socket descriptor, for registering in the XSKS map.
    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// # Safety
/// `pgoff` must be the mmap offset of a ring whose entries are `T`.
unsafe fn map_ring<T>(fd: &OwnedFd, off: &XdpRingOffset, size: u32, pgoff: u64) -> io::Result<MmapArea> {
    let len = off.desc as usize + (size as usize) * mem::size_of::<T>();
    let ptr = mmap_range(fd, len, pgoff)?;
    MmapArea::from_raw(ptr, len)
}

impl Backend for XskBackend {
    fn register(
        &mut self,
        target: &BindTarget,
        umem: &Arc<UmemRegion>,
        config: &XskConfig,
    ) -> io::Result<RingSet> {
        let fd = &self.fd;

        set_umem_reg(
            fd,
            umem.as_ptr() as u64,
            umem.len() as u64,
            config.frame_size,
            config.headroom,
        )?;

        set_ring_size(fd, XDP_UMEM_FILL_RING, config.fill_size)?;
        set_ring_size(fd, XDP_UMEM_COMPLETION_RING, config.comp_size)?;
        set_ring_size(fd, XDP_RX_RING, config.rx_size)?;
        set_ring_size(fd, XDP_TX_RING, config.tx_size)?;

        let off = get_mmap_offsets(fd)?;
        debug!("ring offsets for fd {}: {:?}", fd.as_raw_fd(), off);

        let rings = unsafe {
            let fill_map = map_ring::<u64>(fd, &off.fr, config.fill_size, XDP_UMEM_PGOFF_FILL_RING)?;
            let comp_map = map_ring::<u64>(fd, &off.cr, config.comp_size, XDP_UMEM_PGOFF_COMPLETION_RING)?;
            let rx_map = map_ring::<XdpDesc>(fd, &off.rx, config.rx_size, XDP_PGOFF_RX_RING)?;
            let tx_map = map_ring::<XdpDesc>(fd, &off.tx, config.tx_size, XDP_PGOFF_TX_RING)?;

            RingSet {
                fill: ProducerRing::from_mapping(fill_map, &off.fr, config.fill_size),
                comp: ConsumerRing::from_mapping(comp_map, &off.cr, config.comp_size),
                rx: ConsumerRing::from_mapping(rx_map, &off.rx, config.rx_size),
                tx: ProducerRing::from_mapping(tx_map, &off.tx, config.tx_size),
            }
        };

        bind_socket(fd, target.ifindex, target.queue_id, config.bind_flags)?;
        self.need_wakeup = config.bind_flags & XDP_USE_NEED_WAKEUP != 0;

        Ok(rings)
    }

    fn kick_tx(&self) -> io::Result<()> {
        kick_tx(&self.fd)
    }

    fn wakeup_rx(&self) -> io::Result<()> {
        poll_rx(&self.fd, 0).map(|_| ())
    }

    fn uses_need_wakeup(&self) -> bool {
        self.need_wakeup
    }
}
