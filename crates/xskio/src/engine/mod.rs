pub mod io;
pub mod runner;
pub mod stats;

pub use io::{Discard, NoOutbound, OutboundQueue, PacketSink, PacketSource};
pub use runner::{Engine, LeakReport};
pub use stats::{EngineStats, StepStats};
