//! Zero-copy packet I/O over AF_XDP.
//!
//! A [`QueueBinding`](binding::QueueBinding) ties a UMEM and its four rings
//! to one interface queue through a [`Backend`](binding::Backend); the
//! [`Engine`](engine::Engine) moves frames between the rings and the frame
//! pool, one non-blocking step at a time.

pub mod backend;
pub mod binding;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod packet;

#[cfg(feature = "simulator")]
pub mod simulator;

#[cfg(target_os = "linux")]
pub mod xdp;

pub use binding::{BindTarget, BindingRegistry, QueueBinding};
pub use builder::XskBuilder;
pub use config::{Poller, XskConfig};
pub use engine::{Engine, EngineStats, LeakReport, OutboundQueue, PacketSink, PacketSource, StepStats};
pub use error::XskError;
pub use packet::PacketRef;
