#[cfg(target_os = "linux")]
pub mod xsk;

#[cfg(target_os = "linux")]
pub use xsk::XskBackend;
