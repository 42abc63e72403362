//! Unicast routing and the interface egress path.

use std::net::Ipv4Addr;

use ipflow_core::addr;
use ipflow_core::constants::ETHERTYPE_IPV4;
use ipflow_core::error::{ErrorKind, Result};
use ipflow_proto::control::InterfaceId;
use ipflow_proto::icmp::DEST_UNREACHABLE_HOST;
use ipflow_proto::{Datagram, IcmpError, LinkFrame, MacAddress};

use super::Ipv4Engine;
use crate::arp::ArpCache;
use crate::routes::RoutingTable;
use crate::sink::{EngineSink, OutboundFrame};

impl<R: RoutingTable, A: ArpCache> Ipv4Engine<R, A> {
    /// Routes a unicast datagram. An interface hint pins the egress; an
    /// explicit next-hop hint overrides the gateway lookup.
    pub(super) fn route_unicast(
        &mut self,
        datagram: Datagram,
        interface_hint: Option<InterfaceId>,
        next_hop_hint: Option<Ipv4Addr>,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        let dest = datagram.dst();

        let (egress, next_hop) = if let Some(hint) = interface_hint {
            tracing::trace!(interface = hint, "using requested egress interface");
            if next_hop_hint.is_some() {
                (Some(hint), next_hop_hint)
            } else if self.interfaces.get(hint).map_or(false, |ie| ie.broadcast) {
                // A broadcast-capable egress still needs a gateway; adopt
                // the routed one when it agrees with the hint.
                let gateway = self
                    .routes
                    .best_unicast_route(dest)
                    .filter(|route| route.interface == hint)
                    .and_then(|route| route.gateway);
                (Some(hint), gateway)
            } else {
                (Some(hint), None)
            }
        } else {
            match self.routes.best_unicast_route(dest) {
                Some(route) => (Some(route.interface), route.gateway),
                None => (None, None),
            }
        };

        match egress {
            None => {
                tracing::debug!(%dest, "unroutable, requesting destination-unreachable");
                self.counters.unroutable += 1;
                sink.emit_icmp(
                    IcmpError::DestinationUnreachable(DEST_UNREACHABLE_HOST),
                    datagram,
                );
                Ok(())
            }
            Some(interface) => {
                tracing::trace!(interface, next_hop = ?next_hop, "routed");
                self.counters.forwarded += 1;
                self.fragment_and_send(datagram, interface, next_hop, sink)
            }
        }
    }

    /// Sends a limited or subnet broadcast. The next hop is always
    /// 255.255.255.255, which address resolution maps to the broadcast MAC.
    pub(super) fn route_local_broadcast(
        &mut self,
        datagram: Datagram,
        interface_hint: Option<InterfaceId>,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        if let Some(interface) = interface_hint {
            self.fragment_and_send(datagram, interface, Some(addr::LIMITED_BROADCAST), sink)
        } else if self.config.force_broadcast {
            for interface in self.interfaces.ids() {
                self.fragment_and_send(
                    datagram.duplicate(),
                    interface,
                    Some(addr::LIMITED_BROADCAST),
                    sink,
                )?;
            }
            Ok(())
        } else {
            tracing::debug!("broadcast without a target interface, dropping");
            self.counters.dropped += 1;
            Ok(())
        }
    }

    /// Final egress step. Loopback re-enters ingress through the work
    /// queue; interfaces without ARP emit directly; IEEE 802 interfaces
    /// resolve the next hop first.
    pub(super) fn send_to_interface(
        &mut self,
        datagram: Datagram,
        interface: InterfaceId,
        next_hop: Option<Ipv4Addr>,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        let (loopback, ieee802) = match self.interfaces.get(interface) {
            Some(ie) => (ie.loopback, ie.is_ieee802()),
            None => {
                tracing::warn!(interface, "egress to unknown interface, dropping");
                self.counters.dropped += 1;
                return Ok(());
            }
        };

        if loopback {
            self.pending.push_back((datagram, interface));
            return Ok(());
        }

        if !ieee802 {
            sink.emit_to_interface(interface, OutboundFrame { datagram, link: None });
            return Ok(());
        }

        let next_hop = match next_hop {
            Some(next_hop) => next_hop,
            None => {
                if self.config.use_proxy_arp {
                    let next_hop = datagram.dst();
                    tracing::trace!(
                        %next_hop,
                        "no next-hop address, resolving the destination directly"
                    );
                    next_hop
                } else {
                    return Err(ErrorKind::NoNextHop(datagram.dst()));
                }
            }
        };

        match self.resolve_next_hop_mac(interface, next_hop) {
            Some(mac) => {
                let link = LinkFrame { dst_mac: mac, ethertype: ETHERTYPE_IPV4 };
                sink.emit_to_interface(interface, OutboundFrame { datagram, link: Some(link) });
            }
            None => {
                tracing::trace!(%next_hop, "address unknown, handing to resolution");
                sink.request_arp(interface, next_hop, datagram);
            }
        }
        Ok(())
    }

    /// Broadcast and multicast targets have fixed MAC mappings; everything
    /// else asks the ARP cache.
    fn resolve_next_hop_mac(
        &self,
        interface: InterfaceId,
        next_hop: Ipv4Addr,
    ) -> Option<MacAddress> {
        let network_broadcast = self
            .interfaces
            .get(interface)
            .and_then(|ie| ie.network_broadcast());

        if addr::is_limited_broadcast(next_hop) || Some(next_hop) == network_broadcast {
            tracing::trace!("next hop is broadcast, using the broadcast MAC");
            Some(MacAddress::BROADCAST)
        } else if next_hop.is_multicast() {
            Some(MacAddress::for_multicast(next_hop))
        } else {
            self.arp.resolve(next_hop)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Instant;

    use ipflow_core::config::Config;
    use ipflow_core::constants::{ETHERTYPE_IPV4, PROTO_UDP};
    use ipflow_proto::icmp::DEST_UNREACHABLE_HOST;
    use ipflow_proto::{Datagram, IcmpError, MacAddress};

    use super::super::testutil::{TestArp, TestRoutes, TestSink};
    use crate::engine::Ipv4Engine;
    use crate::interfaces::{Interface, InterfaceTable};
    use crate::routes::UnicastRoute;

    const ETH0: u32 = 1;
    const PPP0: u32 = 2;

    fn engine_with(
        routes: TestRoutes,
        arp: TestArp,
        config: Config,
    ) -> Ipv4Engine<TestRoutes, TestArp> {
        let mut interfaces = InterfaceTable::new();
        interfaces.add(Interface::loopback(0));
        interfaces.add(Interface::ethernet(
            ETH0,
            "eth0",
            1500,
            MacAddress([0, 0, 0, 0, 0, 1]),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(255, 255, 255, 0),
        ));
        interfaces.add(Interface::point_to_point(
            PPP0,
            "ppp0",
            1400,
            Ipv4Addr::new(10, 1, 1, 1),
        ));
        Ipv4Engine::new(config, interfaces, routes, arp)
    }

    fn transit_routes() -> TestRoutes {
        TestRoutes {
            unicast: vec![(
                Ipv4Addr::new(10, 2, 0, 0),
                Ipv4Addr::new(255, 255, 0, 0),
                UnicastRoute {
                    interface: ETH0,
                    gateway: Some(Ipv4Addr::new(192, 168, 1, 254)),
                },
            )],
            local_addrs: vec![Ipv4Addr::new(192, 168, 1, 1)],
            ip_forwarding: true,
            ..TestRoutes::default()
        }
    }

    fn outbound(dest: Ipv4Addr) -> Datagram {
        let mut dgram = Datagram::new(Ipv4Addr::new(192, 168, 1, 2), dest, PROTO_UDP);
        dgram.set_ttl(16);
        dgram.encapsulate(vec![0; 64].into());
        dgram
    }

    #[test]
    fn test_known_next_hop_gets_link_frame() {
        let gateway_mac = MacAddress([0xde, 0xad, 0, 0, 0, 1]);
        let mut arp = TestArp::default();
        arp.entries.insert(Ipv4Addr::new(192, 168, 1, 254), gateway_mac);
        let mut engine = engine_with(transit_routes(), arp, Config::default());
        let mut sink = TestSink::default();

        engine
            .datagram_from_link(
                outbound(Ipv4Addr::new(10, 2, 3, 4)),
                PPP0,
                Instant::now(),
                &mut sink,
            )
            .unwrap();

        assert_eq!(sink.frames.len(), 1);
        let (interface, frame) = &sink.frames[0];
        assert_eq!(*interface, ETH0);
        let link = frame.link.expect("IEEE 802 egress carries link control");
        assert_eq!(link.dst_mac, gateway_mac);
        assert_eq!(link.ethertype, ETHERTYPE_IPV4);
        assert_eq!(frame.datagram.ttl(), 15);
        assert_eq!(engine.counters().forwarded, 1);
    }

    #[test]
    fn test_unknown_next_hop_goes_to_arp_and_back() {
        let mut engine = engine_with(transit_routes(), TestArp::default(), Config::default());
        let mut sink = TestSink::default();
        let now = Instant::now();

        engine
            .datagram_from_link(outbound(Ipv4Addr::new(10, 2, 3, 4)), PPP0, now, &mut sink)
            .unwrap();

        assert!(sink.frames.is_empty());
        assert_eq!(sink.arp_requests.len(), 1);
        let (interface, next_hop, datagram) = sink.arp_requests.remove(0);
        assert_eq!(interface, ETH0);
        assert_eq!(next_hop, Ipv4Addr::new(192, 168, 1, 254));

        // Resolution reply: the datagram goes straight to the egress queue.
        let link = ipflow_proto::LinkFrame {
            dst_mac: MacAddress([2; 6]),
            ethertype: ETHERTYPE_IPV4,
        };
        engine.datagram_from_arp(datagram, interface, link, now, &mut sink);
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].1.link, Some(link));
    }

    #[test]
    fn test_unroutable_requests_destination_unreachable() {
        let mut engine = engine_with(transit_routes(), TestArp::default(), Config::default());
        let mut sink = TestSink::default();

        engine
            .datagram_from_link(
                outbound(Ipv4Addr::new(172, 16, 0, 1)),
                PPP0,
                Instant::now(),
                &mut sink,
            )
            .unwrap();

        assert_eq!(sink.icmp.len(), 1);
        assert_eq!(
            sink.icmp[0].0,
            IcmpError::DestinationUnreachable(DEST_UNREACHABLE_HOST)
        );
        assert_eq!(engine.counters().unroutable, 1);
    }

    #[test]
    fn test_non_ieee802_interface_emits_without_link_control() {
        let mut routes = transit_routes();
        routes.unicast[0].2 = UnicastRoute { interface: PPP0, gateway: None };
        let mut engine = engine_with(routes, TestArp::default(), Config::default());
        let mut sink = TestSink::default();

        engine
            .datagram_from_link(
                outbound(Ipv4Addr::new(10, 2, 3, 4)),
                ETH0,
                Instant::now(),
                &mut sink,
            )
            .unwrap();

        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].0, PPP0);
        assert!(sink.frames[0].1.link.is_none());
        assert!(sink.arp_requests.is_empty());
    }

    #[test]
    fn test_proxy_arp_resolves_destination_directly() {
        // Directly attached subnet: route with no gateway.
        let mut routes = transit_routes();
        routes.unicast[0].2 = UnicastRoute { interface: ETH0, gateway: None };
        let mut engine = engine_with(routes, TestArp::default(), Config::default());
        let mut sink = TestSink::default();

        engine
            .datagram_from_link(
                outbound(Ipv4Addr::new(10, 2, 3, 4)),
                PPP0,
                Instant::now(),
                &mut sink,
            )
            .unwrap();

        assert_eq!(sink.arp_requests.len(), 1);
        assert_eq!(sink.arp_requests[0].1, Ipv4Addr::new(10, 2, 3, 4));
    }

    #[test]
    fn test_proxy_arp_disabled_is_a_configuration_error() {
        let mut routes = transit_routes();
        routes.unicast[0].2 = UnicastRoute { interface: ETH0, gateway: None };
        let config = Config { use_proxy_arp: false, ..Config::default() };
        let mut engine = engine_with(routes, TestArp::default(), config);
        let mut sink = TestSink::default();

        let result = engine.datagram_from_link(
            outbound(Ipv4Addr::new(10, 2, 3, 4)),
            PPP0,
            Instant::now(),
            &mut sink,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_broadcast_next_hop_uses_broadcast_mac() {
        let mut engine = engine_with(transit_routes(), TestArp::default(), Config::default());
        let mut sink = TestSink::default();

        let mut dgram = outbound(Ipv4Addr::new(255, 255, 255, 255));
        dgram.set_ttl(2);
        engine
            .route_local_broadcast(dgram, Some(ETH0), &mut sink)
            .unwrap();

        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].1.link.unwrap().dst_mac, MacAddress::BROADCAST);
    }
}
