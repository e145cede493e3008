use std::io;

use thiserror::Error;
use xskio_core::{LayoutError, PoolError};

#[derive(Error, Debug)]
pub enum XskError {
    #[error("Interface {0} not found")]
    InterfaceNotFound(String),

    #[error("Permission denied (requires CAP_NET_RAW and CAP_BPF)")]
    PermissionDenied,

    #[error("Queue {queue_id} of interface {ifindex} is already bound")]
    AlreadyBound { ifindex: u32, queue_id: u32 },

    #[error("Binding rejected by the driver: {0}")]
    BindFailed(#[source] io::Error),

    #[error("Ring buffer corruption: {ring} ring returned address {addr:#x}")]
    RingCorruption { ring: &'static str, addr: u64 },

    #[error("Frame pool: {0}")]
    Pool(#[from] PoolError),

    #[error("XDP program: {0}")]
    XdpProgram(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}

impl From<LayoutError> for XskError {
    fn from(err: LayoutError) -> Self {
        XskError::InvalidConfiguration(err.to_string())
    }
}
