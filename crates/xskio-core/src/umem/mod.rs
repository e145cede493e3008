pub mod layout;
pub mod mmap;
pub mod pool;

pub use layout::UmemLayout;
pub use mmap::UmemRegion;
pub use pool::FramePool;
