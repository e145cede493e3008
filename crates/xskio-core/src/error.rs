use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The frame was already in the free set. Releasing it again would hand
    /// the same frame to two owners.
    #[error("double free of frame at {0:#x}")]
    DoubleFree(u64),

    #[error("address {0:#x} does not name a frame in this pool")]
    InvalidFrame(u64),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    #[error("frame size {0} must be a power of two and at least 2048")]
    FrameSize(u32),

    #[error("frame count must be non-zero")]
    EmptyPool,

    #[error("{frame_count} frames of {frame_size} bytes overflow the address space")]
    TooLarge { frame_size: u32, frame_count: u32 },
}
