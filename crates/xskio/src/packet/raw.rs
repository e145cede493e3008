/// A zero-copy view of one received packet in UMEM.
///
/// Borrowed for the duration of a delivery only: the frame goes back to the
/// fill ring or the pool as soon as the sink returns.
#[derive(Debug, Clone, Copy)]
pub struct PacketRef<'a> {
    frame: u64,
    addr: u64,
    data: &'a [u8],
}

impl<'a> PacketRef<'a> {
    pub(crate) fn new(frame: u64, addr: u64, data: &'a [u8]) -> Self {
        Self { frame, addr, data }
    }

    /// UMEM offset of the frame holding the packet.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// UMEM offset of the first packet byte (frame plus headroom).
    #[inline]
    pub fn addr(&self) -> u64 {
        self.addr
    }

    #[inline(always)]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
