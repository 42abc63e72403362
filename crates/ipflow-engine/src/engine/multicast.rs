//! Multicast forwarding and egress interface selection.

use ipflow_core::error::Result;
use ipflow_proto::control::InterfaceId;
use ipflow_proto::Datagram;

use super::Ipv4Engine;
use crate::arp::ArpCache;
use crate::routes::RoutingTable;
use crate::sink::EngineSink;

impl<R: RoutingTable, A: ArpCache> Ipv4Engine<R, A> {
    /// Forwards a multicast datagram along its route's children. The
    /// original is consumed; each passing child receives a duplicate.
    pub(super) fn forward_multicast(
        &mut self,
        datagram: Datagram,
        from: InterfaceId,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        let origin = datagram.src();
        let group = datagram.dst();
        tracing::trace!(%origin, %group, "forwarding multicast datagram");

        self.counters.multicast += 1;

        let route = match self.routes.best_multicast_route(origin, group) {
            Some(route) => route,
            None => {
                tracing::debug!(%group, "no multicast route, dropping");
                self.counters.unroutable += 1;
                return Ok(());
            }
        };

        // Reverse-path check: the datagram must arrive on the route's
        // parent, or on the shortest-path interface toward the source when
        // no parent is declared.
        let reverse_path_ok = match route.parent {
            Some(parent) => from == parent,
            None => self.routes.interface_toward(origin) == Some(from),
        };
        if !reverse_path_ok {
            tracing::debug!(interface = from, "did not arrive on the reverse path, dropping");
            self.counters.dropped += 1;
            return Ok(());
        }

        self.counters.forwarded += 1;
        for child in &route.children {
            if child.interface == from {
                continue;
            }
            let (threshold, listener) = match self.interfaces.get(child.interface) {
                Some(ie) => (ie.multicast_ttl_threshold, ie.is_joined(group)),
                None => {
                    tracing::warn!(interface = child.interface, "multicast child interface unknown");
                    continue;
                }
            };
            if datagram.ttl() <= threshold {
                tracing::trace!(
                    interface = child.interface,
                    threshold,
                    "not forwarding, hop limit at or under threshold"
                );
                continue;
            }
            if child.leaf && !listener {
                tracing::trace!(interface = child.interface, "not forwarding, no listeners");
                continue;
            }
            tracing::trace!(interface = child.interface, "forwarding to child");
            self.fragment_and_send(datagram.duplicate(), child.interface, Some(group), sink)?;
        }
        Ok(())
    }

    /// Egress interface for a locally originated multicast datagram, in
    /// preference order: the socket-style hint, the routing table, the
    /// interface owning the source address, the first multicast-capable
    /// interface.
    pub(super) fn multicast_egress_interface(
        &self,
        datagram: &Datagram,
        hint: Option<InterfaceId>,
    ) -> Option<InterfaceId> {
        if let Some(interface) = hint {
            tracing::trace!(interface, "multicast egress chosen by hint");
            return Some(interface);
        }
        if let Some(route) = self.routes.best_unicast_route(datagram.dst()) {
            tracing::trace!(interface = route.interface, "multicast egress chosen by route");
            return Some(route.interface);
        }
        if let Some(interface) = self.interfaces.by_address(datagram.src()) {
            tracing::trace!(interface, "multicast egress chosen by source address");
            return Some(interface);
        }
        let first = self.interfaces.first_multicast_capable();
        if let Some(interface) = first {
            tracing::trace!(interface, "multicast egress defaulted to first capable interface");
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Instant;

    use ipflow_core::config::Config;
    use ipflow_core::constants::PROTO_UDP;
    use ipflow_proto::{Datagram, MacAddress};

    use super::super::testutil::{TestArp, TestRoutes, TestSink};
    use crate::engine::Ipv4Engine;
    use crate::interfaces::{Interface, InterfaceTable};
    use crate::routes::{MulticastChild, MulticastRoute};

    const UPSTREAM: u32 = 1;
    const DOWN_A: u32 = 2;
    const DOWN_B: u32 = 3;

    fn group() -> Ipv4Addr {
        Ipv4Addr::new(224, 1, 2, 3)
    }

    fn interface(id: u32, name: &str, last_octet: u8) -> Interface {
        Interface::ethernet(
            id,
            name,
            1500,
            MacAddress([0, 0, 0, 0, 0, id as u8]),
            Ipv4Addr::new(10, id as u8, 0, last_octet),
            Ipv4Addr::new(255, 255, 255, 0),
        )
    }

    fn router(route: MulticastRoute) -> Ipv4Engine<TestRoutes, TestArp> {
        let mut interfaces = InterfaceTable::new();
        interfaces.add(interface(UPSTREAM, "eth0", 1));
        interfaces.add(interface(DOWN_A, "eth1", 1));
        interfaces.add(interface(DOWN_B, "eth2", 1));
        let routes = TestRoutes {
            multicast: vec![(group(), route)],
            ip_forwarding: true,
            multicast_forwarding: true,
            ..TestRoutes::default()
        };
        Ipv4Engine::new(Config::default(), interfaces, routes, TestArp::default())
    }

    fn multicast_datagram(ttl: u8) -> Datagram {
        let mut dgram = Datagram::new(Ipv4Addr::new(10, 1, 0, 99), group(), PROTO_UDP);
        dgram.set_ttl(ttl);
        dgram.encapsulate(vec![0; 100].into());
        dgram
    }

    #[test]
    fn test_fanout_respects_ttl_threshold_and_listeners() {
        let route = MulticastRoute {
            parent: Some(UPSTREAM),
            children: vec![
                MulticastChild { interface: DOWN_A, leaf: true },
                MulticastChild { interface: DOWN_B, leaf: true },
            ],
        };
        let mut engine = router(route);
        engine.interfaces_mut().get_mut(DOWN_A).unwrap().multicast_ttl_threshold = 3;
        engine.interfaces_mut().get_mut(DOWN_A).unwrap().join_group(group());
        engine.interfaces_mut().get_mut(DOWN_B).unwrap().multicast_ttl_threshold = 10;
        engine.interfaces_mut().get_mut(DOWN_B).unwrap().join_group(group());
        let mut sink = TestSink::default();

        engine
            .datagram_from_link(multicast_datagram(5), UPSTREAM, Instant::now(), &mut sink)
            .unwrap();

        // Only DOWN_A passes the threshold (5 > 3); DOWN_B is 5 <= 10.
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].0, DOWN_A);
        assert_eq!(sink.frames[0].1.datagram.ttl(), 4);
        // Group MAC on the egress frame.
        assert_eq!(
            sink.frames[0].1.link.unwrap().dst_mac,
            MacAddress::for_multicast(group())
        );
        assert_eq!(engine.counters().multicast, 1);
        assert_eq!(engine.counters().forwarded, 1);
    }

    #[test]
    fn test_non_parent_arrival_is_dropped() {
        let route = MulticastRoute {
            parent: Some(UPSTREAM),
            children: vec![MulticastChild { interface: DOWN_B, leaf: false }],
        };
        let mut engine = router(route);
        let mut sink = TestSink::default();

        engine
            .datagram_from_link(multicast_datagram(5), DOWN_A, Instant::now(), &mut sink)
            .unwrap();

        assert!(sink.frames.is_empty());
        assert_eq!(engine.counters().dropped, 1);
        assert_eq!(engine.counters().forwarded, 0);
    }

    #[test]
    fn test_leaf_without_listener_is_skipped() {
        let route = MulticastRoute {
            parent: Some(UPSTREAM),
            children: vec![
                MulticastChild { interface: DOWN_A, leaf: true },
                MulticastChild { interface: DOWN_B, leaf: false },
            ],
        };
        let mut engine = router(route);
        let mut sink = TestSink::default();

        engine
            .datagram_from_link(multicast_datagram(8), UPSTREAM, Instant::now(), &mut sink)
            .unwrap();

        // DOWN_A is a leaf with nobody joined; DOWN_B is a transit branch
        // and forwards regardless.
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].0, DOWN_B);
    }

    #[test]
    fn test_no_route_counts_unroutable() {
        let route = MulticastRoute { parent: Some(UPSTREAM), children: vec![] };
        let mut engine = router(route);
        let mut sink = TestSink::default();

        let mut dgram = multicast_datagram(5);
        dgram.set_dst(Ipv4Addr::new(239, 9, 9, 9));
        engine
            .datagram_from_link(dgram, UPSTREAM, Instant::now(), &mut sink)
            .unwrap();

        assert!(sink.frames.is_empty());
        assert_eq!(engine.counters().unroutable, 1);
    }

    #[test]
    fn test_arrival_interface_excluded_from_fanout() {
        let route = MulticastRoute {
            parent: None,
            children: vec![
                MulticastChild { interface: UPSTREAM, leaf: false },
                MulticastChild { interface: DOWN_A, leaf: false },
            ],
        };
        let mut engine = router(route);
        // No parent declared: reverse path falls back to the unicast route
        // toward the source.
        engine.routes_mut().unicast.push((
            Ipv4Addr::new(10, 1, 0, 0),
            Ipv4Addr::new(255, 255, 255, 0),
            crate::routes::UnicastRoute { interface: UPSTREAM, gateway: None },
        ));
        let mut sink = TestSink::default();

        engine
            .datagram_from_link(multicast_datagram(5), UPSTREAM, Instant::now(), &mut sink)
            .unwrap();

        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].0, DOWN_A);
    }

    #[test]
    fn test_link_local_group_never_forwarded() {
        let route = MulticastRoute {
            parent: Some(UPSTREAM),
            children: vec![MulticastChild { interface: DOWN_A, leaf: false }],
        };
        let mut engine = router(route);
        let mut sink = TestSink::default();

        let mut dgram = multicast_datagram(5);
        dgram.set_dst(Ipv4Addr::new(224, 0, 0, 5));
        engine
            .datagram_from_link(dgram, UPSTREAM, Instant::now(), &mut sink)
            .unwrap();

        assert!(sink.frames.is_empty());
        assert_eq!(engine.counters().multicast, 0);
    }
}
