//! Engine observability counters.

/// Counts of the engine's terminal decisions.
///
/// Every datagram leaving the pipeline bumps exactly one of the outcome
/// counters (`forwarded` also counts datagrams that subsequently fan out as
/// fragments).
#[derive(Debug, Clone, Default)]
pub struct EngineCounters {
    /// Datagrams routed toward an egress interface.
    pub forwarded: u64,
    /// Payloads delivered to a higher-layer protocol.
    pub local_delivered: u64,
    /// Multicast datagrams handled (originated or considered for
    /// forwarding).
    pub multicast: u64,
    /// Datagrams dropped (forwarding off, TTL exhausted, DF violation,
    /// no broadcast target).
    pub dropped: u64,
    /// Datagrams with no usable route.
    pub unroutable: u64,
}

impl EngineCounters {
    /// Resets all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
