//! Building blocks for AF_XDP packet I/O: the four descriptor rings, the UMEM
//! frame layout and the frame pool that tracks which frames userspace owns.

pub mod error;
pub mod ring;
pub mod umem;

#[cfg(target_os = "linux")]
pub mod sys;

pub use error::{LayoutError, PoolError};
