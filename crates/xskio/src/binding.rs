use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use lazy_static::lazy_static;
use tracing::debug;
use xskio_core::ring::{ConsumerRing, ProducerRing, XdpDesc};
use xskio_core::umem::UmemRegion;

use crate::config::XskConfig;
use crate::error::XskError;

/// One hardware queue of one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindTarget {
    pub interface: String,
    pub ifindex: u32,
    pub queue_id: u32,
}

impl BindTarget {
    pub fn new(interface: &str, ifindex: u32, queue_id: u32) -> Self {
        Self {
            interface: interface.to_string(),
            ifindex,
            queue_id,
        }
    }

    #[cfg(target_os = "linux")]
    pub fn resolve(interface: &str, queue_id: u32) -> Result<Self, XskError> {
        let ifindex = xskio_core::sys::utils::if_nametoindex(interface)
            .map_err(|_| XskError::InterfaceNotFound(interface.to_string()))?;
        Ok(Self::new(interface, ifindex, queue_id))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn resolve(interface: &str, _queue_id: u32) -> Result<Self, XskError> {
        Err(XskError::InterfaceNotFound(interface.to_string()))
    }

    fn key(&self) -> (u32, u32) {
        (self.ifindex, self.queue_id)
    }
}

/// The four rings of a binding, seen from this process.
pub struct RingSet {
    pub fill: ProducerRing<u64>,
    pub comp: ConsumerRing<u64>,
    pub rx: ConsumerRing<XdpDesc>,
    pub tx: ProducerRing<XdpDesc>,
}

/// The party on the other side of the rings: the kernel, or a stand-in.
pub trait Backend: Send {
    /// Registers `umem` and creates the four rings for `target`. Called once.
    fn register(
        &mut self,
        target: &BindTarget,
        umem: &Arc<UmemRegion>,
        config: &XskConfig,
    ) -> io::Result<RingSet>;

    /// Non-blocking nudge that the TX ring has work. Harmless when it has none.
    fn kick_tx(&self) -> io::Result<()>;

    /// Non-blocking nudge that the fill ring has been restocked.
    fn wakeup_rx(&self) -> io::Result<()> {
        Ok(())
    }

    /// Whether the counterparty sets ring need-wakeup flags. Without them
    /// every pending TX batch gets a kick.
    fn uses_need_wakeup(&self) -> bool {
        false
    }
}

lazy_static! {
    static ref GLOBAL_REGISTRY: BindingRegistry = BindingRegistry::new();
}

/// Active `(ifindex, queue_id)` pairs. At most one binding per pair.
#[derive(Debug, Clone, Default)]
pub struct BindingRegistry {
    active: Arc<Mutex<HashSet<(u32, u32)>>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every binding in this process.
    pub fn global() -> Self {
        GLOBAL_REGISTRY.clone()
    }

    pub fn is_bound(&self, ifindex: u32, queue_id: u32) -> bool {
        self.lock().contains(&(ifindex, queue_id))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn claim(&self, target: &BindTarget) -> Result<Claim, XskError> {
        let key = target.key();
        if !self.lock().insert(key) {
            return Err(XskError::AlreadyBound {
                ifindex: target.ifindex,
                queue_id: target.queue_id,
            });
        }
        Ok(Claim {
            registry: self.clone(),
            key,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<(u32, u32)>> {
        // The set stays consistent even if a holder panicked.
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug)]
struct Claim {
    registry: BindingRegistry,
    key: (u32, u32),
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.key);
    }
}

/// A UMEM and its rings attached to one interface queue.
pub struct QueueBinding<B: Backend> {
    // Field order is drop order: unmap the rings, close the backend, then
    // free the registry slot.
    pub(crate) rings: RingSet,
    pub(crate) backend: B,
    pub(crate) umem: Arc<UmemRegion>,
    target: BindTarget,
    _claim: Claim,
}

impl<B: Backend> QueueBinding<B> {
    pub fn bind(
        registry: &BindingRegistry,
        target: BindTarget,
        umem: Arc<UmemRegion>,
        mut backend: B,
        config: &XskConfig,
    ) -> Result<Self, XskError> {
        let claim = registry.claim(&target)?;
        let rings = backend
            .register(&target, &umem, config)
            .map_err(XskError::BindFailed)?;

        debug!(
            "bound {} queue {} ({} frames of {} bytes)",
            target.interface,
            target.queue_id,
            umem.layout().frame_count,
            umem.layout().frame_size
        );

        Ok(Self {
            rings,
            backend,
            umem,
            target,
            _claim: claim,
        })
    }

    /// Releases the binding. Frames the counterparty still holds in the fill
    /// or TX ring are gone with it.
    pub fn unbind(self) {
        debug!("unbinding {} queue {}", self.target.interface, self.target.queue_id);
    }

    pub fn target(&self) -> &BindTarget {
        &self.target
    }

    pub fn umem(&self) -> &Arc<UmemRegion> {
        &self.umem
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn rings(&self) -> &RingSet {
        &self.rings
    }
}
