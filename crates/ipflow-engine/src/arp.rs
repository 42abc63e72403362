//! Address-resolution collaborator seam.
//!
//! The ARP cache itself (learning, aging, request retransmission) is an
//! external collaborator. The engine only asks for an already-known mapping;
//! unknown next hops are handed out through
//! [`EngineSink::request_arp`](crate::sink::EngineSink::request_arp) and come
//! back later as a separate event.

use std::net::Ipv4Addr;

use ipflow_proto::MacAddress;

/// Synchronous lookup into the ARP cache.
pub trait ArpCache {
    /// Returns the MAC address for `next_hop` if the cache already knows it.
    fn resolve(&self, next_hop: Ipv4Addr) -> Option<MacAddress>;
}
