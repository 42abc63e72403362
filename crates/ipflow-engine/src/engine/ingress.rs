//! Link ingress: corruption check, dispatch, and local delivery.

use std::time::Instant;

use rand::Rng;

use ipflow_core::addr;
use ipflow_core::constants::{PROTO_ICMP, PROTO_IGMP, PROTO_IPIP};
use ipflow_core::error::{ErrorKind, Result};
use ipflow_proto::control::InterfaceId;
use ipflow_proto::{Datagram, DeliveryInfo, IcmpError, Payload};

use super::Ipv4Engine;
use crate::arp::ArpCache;
use crate::routes::RoutingTable;
use crate::sink::EngineSink;

impl<R: RoutingTable, A: ArpCache> Ipv4Engine<R, A> {
    /// Runs one datagram through the ingress pipeline. Loopback and tunnel
    /// reentry go through the work queue, never recursion.
    pub(super) fn ingress(
        &mut self,
        mut datagram: Datagram,
        from: InterfaceId,
        now: Instant,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        // A corrupted bit lands in the header with probability
        // header/total; payload corruption is the transport's problem.
        if datagram.has_bit_error() {
            let relative_header_length =
                f64::from(datagram.header_length()) / f64::from(datagram.total_length());
            if rand::rng().random::<f64>() <= relative_header_length {
                tracing::debug!("bit error in header, requesting parameter-problem");
                sink.emit_icmp(IcmpError::ParameterProblem, datagram);
                return Ok(());
            }
        }

        let (from_loopback, from_addr) = match self.interfaces.get(from) {
            Some(ie) => (ie.loopback, ie.addr),
            None => {
                tracing::warn!(interface = from, "datagram from unknown interface, dropping");
                self.counters.dropped += 1;
                return Ok(());
            }
        };

        let dest = datagram.dst();
        tracing::trace!(%dest, protocol = datagram.protocol(), "received datagram");

        if from_loopback {
            return self.deliver_local(datagram, Some(from), now, sink);
        }

        if dest.is_multicast() {
            // Multicast routers see IGMP even on interfaces that have not
            // joined the group.
            let joined = self
                .interfaces
                .get(from)
                .map_or(false, |ie| ie.is_joined(dest));
            if joined
                || (self.routes.is_multicast_forwarding_enabled()
                    && datagram.protocol() == PROTO_IGMP)
            {
                self.deliver_local(datagram.duplicate(), Some(from), now, sink)?;
            }

            if !self.routes.is_ip_forwarding_enabled() || addr::is_link_local_multicast(dest) {
                tracing::trace!(%dest, "multicast not forwarded off-link");
            } else if datagram.ttl() == 0 {
                tracing::debug!("hop limit reached zero, dropping multicast datagram");
            } else {
                self.forward_multicast(datagram, from, sink)?;
            }
            return Ok(());
        }

        // Accept datagrams for our own addresses, and anything arriving on
        // an interface that has no address yet (DHCP in progress).
        if self.routes.is_local_address(dest) || from_addr.is_none() {
            return self.deliver_local(datagram, Some(from), now, sink);
        }

        let broadcast_interface = self.routes.interface_for_local_broadcast(dest);
        if addr::is_limited_broadcast(dest) || broadcast_interface.is_some() {
            // Routers rebroadcast a subnet-directed broadcast onto its
            // target subnet before picking it up locally.
            if let Some(target) = broadcast_interface {
                if target != from && self.routes.is_ip_forwarding_enabled() {
                    self.fragment_and_send(
                        datagram.duplicate(),
                        target,
                        Some(addr::LIMITED_BROADCAST),
                        sink,
                    )?;
                }
            }
            tracing::trace!("broadcast received");
            return self.deliver_local(datagram, Some(from), now, sink);
        }

        if !self.routes.is_ip_forwarding_enabled() {
            tracing::debug!("forwarding off, dropping datagram");
            self.counters.dropped += 1;
            return Ok(());
        }

        // Transit traffic burns a hop; with one hop or less left it cannot
        // reach another node.
        if datagram.ttl() <= 1 {
            tracing::debug!("hop limit exhausted in transit, requesting time-exceeded");
            self.counters.dropped += 1;
            datagram.set_ttl(datagram.ttl().saturating_sub(1));
            sink.emit_icmp(IcmpError::TimeExceeded, datagram);
            return Ok(());
        }

        self.route_unicast(datagram, None, None, sink)
    }

    /// Local delivery: reassemble if fragmented, then demultiplex to the
    /// higher layer.
    pub(super) fn deliver_local(
        &mut self,
        mut datagram: Datagram,
        from: Option<InterfaceId>,
        now: Instant,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        tracing::trace!("local delivery");

        if datagram.src().is_unspecified() {
            tracing::debug!("delivering datagram without a source address filled in");
        }

        if datagram.is_fragment() {
            tracing::trace!(
                offset = datagram.fragment_offset(),
                more = datagram.more_fragments(),
                "datagram fragment"
            );

            // Sweep expired entries opportunistically, at most once per
            // sweep interval.
            let due = self
                .last_sweep
                .map_or(true, |last| now.duration_since(last) >= self.config.reassembly_sweep_interval);
            if due {
                self.last_sweep = Some(now);
                self.reassembly.purge_stale(now, self.config.fragment_timeout);
            }

            datagram = match self.reassembly.add_fragment(datagram, now) {
                Some(complete) => {
                    tracing::trace!("fragment completes the datagram");
                    complete
                }
                None => {
                    tracing::trace!("no complete datagram yet");
                    return Ok(());
                }
            };
        }

        match datagram.protocol() {
            PROTO_ICMP => self.deliver_icmp(datagram, from, sink),
            PROTO_IPIP => self.reinject_tunneled(datagram, from),
            _ => {
                self.deliver_transport(datagram, from, sink);
                Ok(())
            }
        }
    }

    /// ICMP is demultiplexed specially: error-class messages go to the
    /// egress of the protocol inside the offending datagram, so the failing
    /// transport hears about its own traffic; everything else goes to the
    /// ICMP egress.
    fn deliver_icmp(
        &mut self,
        mut datagram: Datagram,
        from: Option<InterfaceId>,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        let message = match datagram.decapsulate() {
            Some(Payload::Icmp(message)) => message,
            other => {
                tracing::warn!(?other, "ICMP datagram without an ICMP payload, dropping");
                self.counters.dropped += 1;
                return Ok(());
            }
        };

        let slot = if message.kind.is_error() {
            let enclosed_protocol = message.body.as_ref().map(|bogus| bogus.protocol());
            match enclosed_protocol {
                Some(protocol) => self.demux.lookup(protocol),
                None => {
                    tracing::warn!("error ICMP without an enclosed datagram, dropping");
                    self.counters.dropped += 1;
                    return Ok(());
                }
            }
        } else {
            self.demux.lookup(PROTO_ICMP)
        };

        match slot {
            Some(slot) => {
                let info = DeliveryInfo::from_datagram(datagram, from);
                sink.emit_to_transport(slot, Payload::Icmp(message), info);
                self.counters.local_delivered += 1;
            }
            None => {
                tracing::debug!("no egress for ICMP delivery, dropping");
                self.counters.dropped += 1;
            }
        }
        Ok(())
    }

    /// IPv4-in-IPv4: unwrap and run the inner datagram through ingress as if
    /// it had just arrived on the same interface.
    fn reinject_tunneled(&mut self, mut datagram: Datagram, from: Option<InterfaceId>) -> Result<()> {
        match datagram.decapsulate() {
            Some(Payload::Datagram(inner)) => {
                let reentry = match from.or_else(|| self.interfaces.first_loopback()) {
                    Some(interface) => interface,
                    None => return Err(ErrorKind::NoLoopbackInterface),
                };
                tracing::trace!(interface = reentry, "reinjecting tunneled datagram");
                self.pending.push_back((*inner, reentry));
                Ok(())
            }
            other => {
                tracing::warn!(?other, "tunnel datagram without an inner datagram, dropping");
                self.counters.dropped += 1;
                Ok(())
            }
        }
    }

    /// Ordinary transports go through the demux table; an unregistered
    /// protocol is answered with protocol-unreachable.
    fn deliver_transport(
        &mut self,
        mut datagram: Datagram,
        from: Option<InterfaceId>,
        sink: &mut dyn EngineSink,
    ) {
        match self.demux.lookup(datagram.protocol()) {
            Some(slot) => {
                let payload = match datagram.decapsulate() {
                    Some(payload) => payload,
                    None => {
                        tracing::warn!("datagram without a payload at local delivery, dropping");
                        self.counters.dropped += 1;
                        return;
                    }
                };
                let info = DeliveryInfo::from_datagram(datagram, from);
                sink.emit_to_transport(slot, payload, info);
                self.counters.local_delivered += 1;
            }
            None => {
                tracing::debug!(
                    protocol = datagram.protocol(),
                    "protocol not registered, requesting protocol-unreachable"
                );
                sink.emit_icmp(
                    IcmpError::DestinationUnreachable(
                        ipflow_proto::icmp::DEST_UNREACHABLE_PROTOCOL,
                    ),
                    datagram,
                );
            }
        }
    }
}
