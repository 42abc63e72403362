//! The IPv4 packet-processing engine.
//!
//! One [`Ipv4Engine`] models the network layer of a single node. It owns the
//! interface table, the reassembly buffer, and the protocol demux, consults
//! the routing table and ARP cache synchronously, and emits every externally
//! visible effect through an [`EngineSink`].
//!
//! All entry points run to completion. Loopback emission and tunnel
//! decapsulation re-enter the ingress path through an internal work queue
//! rather than recursion, so a looping tunneled datagram cannot blow the
//! stack.

use std::collections::VecDeque;
use std::time::Instant;

use ipflow_core::config::Config;
use ipflow_core::error::{ErrorKind, Result};
use ipflow_proto::control::InterfaceId;
use ipflow_proto::{Datagram, LinkFrame, ProtocolDemux, ProtocolRegistration};

use crate::arp::ArpCache;
use crate::counters::EngineCounters;
use crate::interfaces::InterfaceTable;
use crate::reassembly::ReassemblyBuffer;
use crate::routes::RoutingTable;
use crate::sink::{EngineSink, OutboundFrame};

mod egress;
mod fragmenter;
mod hl;
mod ingress;
mod multicast;

/// The packet-processing engine of one simulated node.
pub struct Ipv4Engine<R: RoutingTable, A: ArpCache> {
    config: Config,
    interfaces: InterfaceTable,
    routes: R,
    arp: A,
    demux: ProtocolDemux,
    reassembly: ReassemblyBuffer,
    counters: EngineCounters,
    /// Identification stamped on the next originated datagram; wraps.
    next_identification: u16,
    up: bool,
    /// Last opportunistic sweep of the reassembly buffer.
    last_sweep: Option<Instant>,
    /// Datagrams re-entering ingress (loopback emission, tunnel
    /// decapsulation), drained iteratively.
    pending: VecDeque<(Datagram, InterfaceId)>,
}

impl<R: RoutingTable, A: ArpCache> Ipv4Engine<R, A> {
    /// Creates an engine over the given tables and collaborators. The engine
    /// starts up.
    pub fn new(config: Config, interfaces: InterfaceTable, routes: R, arp: A) -> Self {
        Self {
            config,
            interfaces,
            routes,
            arp,
            demux: ProtocolDemux::new(),
            reassembly: ReassemblyBuffer::new(),
            counters: EngineCounters::default(),
            next_identification: 0,
            up: true,
            last_sweep: None,
            pending: VecDeque::new(),
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The interface table.
    pub fn interfaces(&self) -> &InterfaceTable {
        &self.interfaces
    }

    /// Mutable access to the interface table (lifecycle, group membership).
    pub fn interfaces_mut(&mut self) -> &mut InterfaceTable {
        &mut self.interfaces
    }

    /// The routing table collaborator.
    pub fn routes(&self) -> &R {
        &self.routes
    }

    /// Mutable access to the routing table collaborator.
    pub fn routes_mut(&mut self) -> &mut R {
        &mut self.routes
    }

    /// Decision counters.
    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    /// Number of datagrams awaiting reassembly.
    pub fn reassembly_backlog(&self) -> usize {
        self.reassembly.len()
    }

    // ===== Protocol registration =====

    /// Maps a transport protocol number to a higher-layer egress slot.
    /// Registrations take effect immediately; re-registering replaces the
    /// previous slot.
    pub fn register_protocol(&mut self, registration: ProtocolRegistration) {
        tracing::debug!(
            protocol = registration.protocol,
            slot = registration.egress_slot,
            "registering higher-layer protocol"
        );
        self.demux.apply(registration);
    }

    // ===== Lifecycle =====

    /// True while the engine accepts traffic.
    pub fn is_up(&self) -> bool {
        self.up
    }

    /// Brings the engine up. The work queue must be empty.
    pub fn start(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            return Err(ErrorKind::QueueNotEmpty);
        }
        self.up = true;
        Ok(())
    }

    /// Takes the engine down gracefully: subsequent messages are discarded
    /// and queued work is flushed.
    pub fn stop(&mut self) {
        self.up = false;
        self.flush();
    }

    /// Takes the engine down as by a crash. Same externally visible effect
    /// as [`stop`](Self::stop).
    pub fn crash(&mut self) {
        self.up = false;
        self.flush();
    }

    fn flush(&mut self) {
        self.pending.clear();
    }

    // ===== Ingress entry points =====

    /// Handles a datagram arriving from a link interface.
    pub fn datagram_from_link(
        &mut self,
        datagram: Datagram,
        from: InterfaceId,
        now: Instant,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        if !self.up {
            tracing::trace!("engine is down, discarding datagram");
            return Ok(());
        }
        self.ingress(datagram, from, now, sink)?;
        self.drain_pending(now, sink)
    }

    /// Handles a datagram coming back from the ARP collaborator with its
    /// next hop resolved; it goes straight to the interface egress.
    pub fn datagram_from_arp(
        &mut self,
        datagram: Datagram,
        interface: InterfaceId,
        link: LinkFrame,
        _now: Instant,
        sink: &mut dyn EngineSink,
    ) {
        if !self.up {
            tracing::trace!("engine is down, discarding resolved datagram");
            return;
        }
        tracing::trace!(interface, "address resolved, sending out datagram");
        sink.emit_to_interface(interface, OutboundFrame { datagram, link: Some(link) });
    }

    /// Drains the reentry queue: each datagram runs the full ingress path,
    /// possibly enqueueing more work (bounded by TTL, not by stack depth).
    fn drain_pending(&mut self, now: Instant, sink: &mut dyn EngineSink) -> Result<()> {
        while let Some((datagram, from)) = self.pending.pop_front() {
            self.ingress(datagram, from, now, sink)?;
        }
        Ok(())
    }

    /// Allocates the identification for an originated datagram.
    fn allocate_identification(&mut self) -> u16 {
        let id = self.next_identification;
        self.next_identification = self.next_identification.wrapping_add(1);
        id
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Minimal collaborator doubles for engine unit tests. Scenario-level
    //! tests use the richer implementations from `ipflow-host`.

    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    use ipflow_core::addr;
    use ipflow_proto::control::InterfaceId;
    use ipflow_proto::{Datagram, DeliveryInfo, IcmpError, MacAddress, Payload};

    use crate::arp::ArpCache;
    use crate::routes::{MulticastRoute, RoutingTable, UnicastRoute};
    use crate::sink::{EngineSink, OutboundFrame};

    /// Records every sink call for assertions.
    #[derive(Default)]
    pub struct TestSink {
        pub frames: Vec<(InterfaceId, OutboundFrame)>,
        pub deliveries: Vec<(u32, Payload, DeliveryInfo)>,
        pub icmp: Vec<(IcmpError, Datagram)>,
        pub arp_requests: Vec<(InterfaceId, Ipv4Addr, Datagram)>,
    }

    impl EngineSink for TestSink {
        fn emit_to_interface(&mut self, interface: InterfaceId, frame: OutboundFrame) {
            self.frames.push((interface, frame));
        }

        fn emit_to_transport(&mut self, slot: u32, payload: Payload, info: DeliveryInfo) {
            self.deliveries.push((slot, payload, info));
        }

        fn emit_icmp(&mut self, error: IcmpError, datagram: Datagram) {
            self.icmp.push((error, datagram));
        }

        fn request_arp(&mut self, interface: InterfaceId, next_hop: Ipv4Addr, datagram: Datagram) {
            self.arp_requests.push((interface, next_hop, datagram));
        }
    }

    /// Hand-populated routing table.
    #[derive(Default)]
    pub struct TestRoutes {
        pub unicast: Vec<(Ipv4Addr, Ipv4Addr, UnicastRoute)>,
        pub multicast: Vec<(Ipv4Addr, MulticastRoute)>,
        pub local_addrs: Vec<Ipv4Addr>,
        pub local_broadcasts: Vec<(Ipv4Addr, InterfaceId)>,
        pub ip_forwarding: bool,
        pub multicast_forwarding: bool,
    }

    impl RoutingTable for TestRoutes {
        fn best_unicast_route(&self, dest: Ipv4Addr) -> Option<UnicastRoute> {
            self.unicast
                .iter()
                .filter(|(net, mask, _)| addr::same_subnet(dest, *net, *mask))
                .max_by_key(|(_, mask, _)| u32::from(*mask))
                .map(|(_, _, route)| *route)
        }

        fn best_multicast_route(
            &self,
            _origin: Ipv4Addr,
            group: Ipv4Addr,
        ) -> Option<MulticastRoute> {
            self.multicast
                .iter()
                .find(|(g, _)| *g == group)
                .map(|(_, route)| route.clone())
        }

        fn is_local_address(&self, addr: Ipv4Addr) -> bool {
            self.local_addrs.contains(&addr)
        }

        fn interface_for_local_broadcast(&self, addr: Ipv4Addr) -> Option<InterfaceId> {
            self.local_broadcasts
                .iter()
                .find(|(a, _)| *a == addr)
                .map(|(_, id)| *id)
        }

        fn is_multicast_forwarding_enabled(&self) -> bool {
            self.multicast_forwarding
        }

        fn is_ip_forwarding_enabled(&self) -> bool {
            self.ip_forwarding
        }
    }

    /// Fixed ARP mappings.
    #[derive(Default)]
    pub struct TestArp {
        pub entries: HashMap<Ipv4Addr, MacAddress>,
    }

    impl ArpCache for TestArp {
        fn resolve(&self, next_hop: Ipv4Addr) -> Option<MacAddress> {
            self.entries.get(&next_hop).copied()
        }
    }
}
