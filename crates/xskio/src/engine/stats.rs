/// What one [`Engine::step`](super::Engine::step) moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Frames reclaimed from the completion ring.
    pub completed: u32,
    /// Packets taken off the RX ring and delivered.
    pub received: u32,
    /// Received frames put straight back on the fill ring.
    pub recycled: u32,
    /// Packets submitted to the TX ring.
    pub transmitted: u32,
    /// Frames moved from the pool to the fill ring.
    pub filled: u32,
    /// The TX ring had a free slot but the pool had no frame for it. The
    /// source is only asked once a frame is in hand, so this is set whether
    /// or not a payload was waiting.
    pub pool_exhausted: bool,
}

impl StepStats {
    /// Whether any packet moved in or out.
    pub fn is_idle(&self) -> bool {
        self.completed == 0 && self.received == 0 && self.transmitted == 0
    }
}

/// Running totals since the engine started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub steps: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub completions: u64,
    pub fill_submitted: u64,
    /// Steps that ended with a free TX slot and an empty pool. Counts idle
    /// steps too when the fill ring holds every frame.
    pub tx_starved: u64,
    /// Payloads the source reported longer than a frame.
    pub tx_oversize: u64,
    pub kick_errors: u64,
}

impl EngineStats {
    pub(crate) fn record(&mut self, step: &StepStats) {
        self.steps += 1;
        self.rx_packets += u64::from(step.received);
        self.tx_packets += u64::from(step.transmitted);
        self.completions += u64::from(step.completed);
        self.fill_submitted += u64::from(step.filled) + u64::from(step.recycled);
        if step.pool_exhausted {
            self.tx_starved += 1;
        }
    }
}
