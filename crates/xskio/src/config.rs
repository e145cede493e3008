use std::str::FromStr;

use xskio_core::umem::UmemLayout;

use crate::error::XskError;

/// What the run loop does when a step moved no packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Poller {
    /// Burns 100% CPU. Latency: <10us.
    Busy,
    /// Sleeps immediately. Latency: >50us. Saves Power.
    Wait,
    /// Spins for a short duration, then sleeps. Best general-purpose balance.
    #[default]
    Adaptive,
}

impl FromStr for Poller {
    type Err = XskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "busy" => Ok(Poller::Busy),
            "wait" => Ok(Poller::Wait),
            "adaptive" => Ok(Poller::Adaptive),
            other => Err(XskError::InvalidConfiguration(format!("unknown poller '{other}'"))),
        }
    }
}

/// Sizes fixed for the lifetime of a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XskConfig {
    pub frame_size: u32,
    pub frame_count: u32,
    pub fill_size: u32,
    pub comp_size: u32,
    pub rx_size: u32,
    pub tx_size: u32,
    /// Most descriptors moved per ring per step.
    pub batch_size: u32,
    pub headroom: u32,
    pub bind_flags: u16,
    pub poller: Poller,
}

impl Default for XskConfig {
    fn default() -> Self {
        Self {
            frame_size: 4096,
            frame_count: 4096,
            fill_size: 2048,
            comp_size: 2048,
            rx_size: 2048,
            tx_size: 2048,
            batch_size: 64,
            headroom: 0,
            bind_flags: 0,
            poller: Poller::Adaptive,
        }
    }
}

impl XskConfig {
    pub fn validate(&self) -> Result<(), XskError> {
        self.layout()?;

        for (name, size) in [
            ("fill", self.fill_size),
            ("completion", self.comp_size),
            ("rx", self.rx_size),
            ("tx", self.tx_size),
        ] {
            if !size.is_power_of_two() {
                return Err(XskError::InvalidConfiguration(format!(
                    "{name} ring size {size} is not a power of two"
                )));
            }
        }

        if self.batch_size == 0 {
            return Err(XskError::InvalidConfiguration("batch size must be non-zero".into()));
        }
        if self.headroom >= self.frame_size {
            return Err(XskError::InvalidConfiguration(format!(
                "headroom {} leaves no room in a {} byte frame",
                self.headroom, self.frame_size
            )));
        }
        Ok(())
    }

    pub fn layout(&self) -> Result<UmemLayout, XskError> {
        Ok(UmemLayout::new(self.frame_size, self.frame_count)?)
    }
}
