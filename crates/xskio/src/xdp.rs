//! Loading the redirect program that steers a queue's packets into its
//! socket.

use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use aya::maps::XskMap;
use aya::programs::{Xdp, XdpFlags};
use aya::Ebpf;
use tracing::{debug, info, warn};

use crate::error::XskError;

const PROGRAM_NAME: &str = "xskio";
const SOCKET_MAP: &str = "XSKS_MAP";

/// An attached XDP program. Detached when dropped.
pub struct XdpProgram {
    ebpf: Ebpf,
    interface: String,
}

impl XdpProgram {
    /// Loads the object at `path` and attaches it to `interface`, in driver
    /// mode when the NIC supports it, generic SKB mode otherwise. `skb_mode`
    /// skips the driver attempt.
    pub fn load_and_attach(path: &Path, interface: &str, skb_mode: bool) -> Result<Self, XskError> {
        debug!("loading XDP program from {}", path.display());
        let mut ebpf = Ebpf::load_file(path).map_err(|e| XskError::XdpProgram(e.to_string()))?;

        let program: &mut Xdp = ebpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| XskError::XdpProgram(format!("no program named {PROGRAM_NAME}")))?
            .try_into()
            .map_err(|e: aya::programs::ProgramError| XskError::XdpProgram(e.to_string()))?;
        program.load().map_err(|e| XskError::XdpProgram(e.to_string()))?;

        let attached = if skb_mode {
            program.attach(interface, XdpFlags::SKB_MODE)
        } else {
            program.attach(interface, XdpFlags::DRV_MODE).or_else(|err| {
                warn!("driver mode attach on {interface} failed ({err}), falling back to SKB mode");
                program.attach(interface, XdpFlags::SKB_MODE)
            })
        };
        attached.map_err(|e| XskError::XdpProgram(format!("attach to {interface}: {e}")))?;

        info!("XDP program attached to {interface}");
        Ok(Self {
            ebpf,
            interface: interface.to_string(),
        })
    }

    /// Routes packets arriving on `queue_id` to the socket `fd`.
    pub fn register_socket(&mut self, queue_id: u32, fd: RawFd) -> Result<(), XskError> {
        let map = self
            .ebpf
            .map_mut(SOCKET_MAP)
            .ok_or_else(|| XskError::XdpProgram(format!("no map named {SOCKET_MAP}")))?;
        let mut sockets = XskMap::try_from(map).map_err(|e| XskError::XdpProgram(e.to_string()))?;
        sockets
            .set(queue_id, fd, 0)
            .map_err(|e| XskError::XdpProgram(e.to_string()))?;

        debug!("queue {queue_id} of {} redirected to fd {fd}", self.interface);
        Ok(())
    }

    /// Looks for the built BPF object under `target_dir`.
    pub fn find_object(target_dir: &Path) -> Option<PathBuf> {
        let suffix = format!("bpfel-unknown-none/release/{PROGRAM_NAME}");
        walkdir::WalkDir::new(target_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .find(|entry| entry.path().to_string_lossy().ends_with(&suffix))
            .map(|entry| entry.into_path())
    }
}
