use std::sync::Arc;

use tracing::warn;
use xskio_core::umem::UmemRegion;

use crate::binding::{Backend, BindTarget, BindingRegistry, QueueBinding};
use crate::config::{Poller, XskConfig};
use crate::engine::Engine;
use crate::error::XskError;

pub struct XskBuilder {
    interface: String,
    queue_id: u32,
    ifindex: Option<u32>,
    config: XskConfig,
    registry: Option<BindingRegistry>,
}

impl XskBuilder {
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
            queue_id: 0,
            ifindex: None,
            config: XskConfig::default(),
            registry: None,
        }
    }

    pub fn queue_id(mut self, id: u32) -> Self {
        self.queue_id = id;
        self
    }

    /// Skips the interface name lookup. Needed for simulated interfaces.
    pub fn ifindex(mut self, ifindex: u32) -> Self {
        self.ifindex = Some(ifindex);
        self
    }

    pub fn frame_count(mut self, count: u32) -> Self {
        self.config.frame_count = count;
        self
    }

    pub fn frame_size(mut self, size: u32) -> Self {
        self.config.frame_size = size;
        self
    }

    /// Sets all four ring sizes at once.
    pub fn ring_size(mut self, size: u32) -> Self {
        self.config.fill_size = size;
        self.config.comp_size = size;
        self.config.rx_size = size;
        self.config.tx_size = size;
        self
    }

    pub fn fill_size(mut self, size: u32) -> Self {
        self.config.fill_size = size;
        self
    }

    pub fn tx_size(mut self, size: u32) -> Self {
        self.config.tx_size = size;
        self
    }

    pub fn batch_size(mut self, size: u32) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn poller(mut self, poller: Poller) -> Self {
        self.config.poller = poller;
        self
    }

    pub fn headroom(mut self, headroom: u32) -> Self {
        self.config.headroom = headroom;
        self
    }

    pub fn bind_flags(mut self, flags: u16) -> Self {
        self.config.bind_flags = flags;
        self
    }

    /// Binds against a private registry instead of the process-wide one.
    pub fn registry(mut self, registry: BindingRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &XskConfig {
        &self.config
    }

    fn target(&self) -> Result<BindTarget, XskError> {
        match self.ifindex {
            Some(ifindex) => Ok(BindTarget::new(&self.interface, ifindex, self.queue_id)),
            None => BindTarget::resolve(&self.interface, self.queue_id),
        }
    }

    pub fn build_binding<B: Backend>(&self, backend: B) -> Result<QueueBinding<B>, XskError> {
        self.config.validate()?;
        if self.config.fill_size >= self.config.frame_count {
            warn!(
                "fill ring of {} can hold all {} frames, TX may starve",
                self.config.fill_size, self.config.frame_count
            );
        }

        let target = self.target()?;
        let umem = Arc::new(UmemRegion::new(self.config.layout()?)?);
        let registry = self.registry.clone().unwrap_or_else(BindingRegistry::global);

        QueueBinding::bind(&registry, target, umem, backend, &self.config)
    }

    pub fn build_engine<B: Backend>(&self, backend: B) -> Result<Engine<B>, XskError> {
        let binding = self.build_binding(backend)?;
        Ok(Engine::new(binding, &self.config))
    }

    /// Binds a real AF_XDP socket. Needs `CAP_NET_RAW` and an XDP program
    /// redirecting the queue into the socket.
    #[cfg(target_os = "linux")]
    pub fn build_xsk_engine(&self) -> Result<Engine<crate::backend::XskBackend>, XskError> {
        let backend = crate::backend::XskBackend::new().map_err(|err| {
            if err.kind() == std::io::ErrorKind::PermissionDenied {
                XskError::PermissionDenied
            } else {
                XskError::Io(err)
            }
        })?;
        self.build_engine(backend)
    }
}

#[cfg(all(test, feature = "simulator"))]
mod tests {
    use super::*;
    use crate::simulator::SimBackend;

    #[test]
    fn test_builder_sets_config() {
        let builder = XskBuilder::new("sim0")
            .frame_count(64)
            .frame_size(2048)
            .ring_size(32)
            .tx_size(16)
            .batch_size(8)
            .poller(Poller::Busy);

        let config = builder.config();
        assert_eq!(config.frame_count, 64);
        assert_eq!(config.fill_size, 32);
        assert_eq!(config.tx_size, 16);
        assert_eq!(config.poller, Poller::Busy);
    }

    #[test]
    fn test_invalid_config_never_binds() {
        let registry = BindingRegistry::new();
        let result = XskBuilder::new("sim0")
            .ifindex(7)
            .ring_size(30)
            .registry(registry.clone())
            .build_binding(SimBackend::new());

        assert!(matches!(result, Err(XskError::InvalidConfiguration(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_engine_primes_fill_ring() {
        let backend = SimBackend::new();
        let peer = backend.peer();
        let engine = XskBuilder::new("sim0")
            .ifindex(7)
            .frame_count(64)
            .ring_size(32)
            .registry(BindingRegistry::new())
            .build_engine(backend)
            .unwrap();

        assert_eq!(peer.snapshot().fill.len(), 32);
        assert_eq!(engine.pool().available(), 32);
    }
}
