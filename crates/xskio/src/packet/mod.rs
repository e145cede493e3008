pub mod raw;

pub use raw::PacketRef;
