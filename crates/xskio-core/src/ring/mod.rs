pub mod consumer;
pub mod desc;
pub mod memory;
pub mod producer;

pub use consumer::ConsumerRing;
pub use desc::XdpDesc;
pub use memory::{RingMemory, XDP_RING_NEED_WAKEUP};
pub use producer::ProducerRing;
