//! Protocol demultiplexing table.
//!
//! Maps an 8-bit transport protocol number to the higher-layer egress slot
//! that registered for it. The protocol space is dense, so a fixed array
//! gives O(1) lookup without hashing.

use crate::control::ProtocolRegistration;

/// Mapping from protocol number to higher-layer egress slot.
#[derive(Debug)]
pub struct ProtocolDemux {
    slots: [Option<u32>; 256],
}

impl ProtocolDemux {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self { slots: [None; 256] }
    }

    /// Records a protocol to slot mapping. Registering a protocol twice
    /// replaces the earlier slot.
    pub fn register(&mut self, protocol: u8, slot: u32) {
        self.slots[protocol as usize] = Some(slot);
    }

    /// Applies a registration message.
    pub fn apply(&mut self, registration: ProtocolRegistration) {
        self.register(registration.protocol, registration.egress_slot);
    }

    /// Returns the egress slot registered for `protocol`, if any.
    pub fn lookup(&self, protocol: u8) -> Option<u32> {
        self.slots[protocol as usize]
    }

    /// Removes the mapping for `protocol`.
    pub fn unregister(&mut self, protocol: u8) {
        self.slots[protocol as usize] = None;
    }
}

impl Default for ProtocolDemux {
    fn default() -> Self {
        Self::new()
    }
}
