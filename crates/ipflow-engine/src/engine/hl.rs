//! Higher-layer ingress: encapsulation and outbound dispatch.

use std::net::Ipv4Addr;
use std::time::Instant;

use ipflow_core::addr;
use ipflow_core::error::{ErrorKind, Result};
use ipflow_proto::control::InterfaceId;
use ipflow_proto::{Datagram, Payload, SendOptions};

use super::Ipv4Engine;
use crate::arp::ArpCache;
use crate::routes::RoutingTable;
use crate::sink::EngineSink;

impl<R: RoutingTable, A: ArpCache> Ipv4Engine<R, A> {
    /// Accepts a transport payload from the higher layer, encapsulates it,
    /// and dispatches the datagram.
    pub fn transport_send(
        &mut self,
        payload: Payload,
        options: SendOptions,
        now: Instant,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        if !self.up {
            tracing::trace!("engine is down, discarding send request");
            return Ok(());
        }
        if self.interfaces.is_empty() {
            tracing::debug!("no interfaces exist, dropping send request");
            self.counters.dropped += 1;
            return Ok(());
        }

        let datagram = self.encapsulate_transport(payload, &options)?;
        tracing::trace!(dest = %datagram.dst(), "sending datagram from higher layer");

        self.dispatch_outbound(
            datagram,
            options.interface,
            options.next_hop,
            options.multicast_loop,
            sink,
        )?;
        self.drain_pending(now, sink)
    }

    /// Accepts a pre-built datagram from the higher layer (source-routing
    /// protocols hand these down) and routes it as-is.
    pub fn transport_send_datagram(
        &mut self,
        datagram: Datagram,
        now: Instant,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        if !self.up {
            tracing::trace!("engine is down, discarding send request");
            return Ok(());
        }
        if self.interfaces.is_empty() {
            tracing::debug!("no interfaces exist, dropping datagram");
            self.counters.dropped += 1;
            return Ok(());
        }

        self.dispatch_outbound(datagram, None, None, true, sink)?;
        self.drain_pending(now, sink)
    }

    /// Builds the datagram for a raw higher-layer payload: identification,
    /// DSCP, DF, and the TTL ladder.
    fn encapsulate_transport(
        &mut self,
        payload: Payload,
        options: &SendOptions,
    ) -> Result<Datagram> {
        let mut datagram = Datagram::new(addr::UNSPECIFIED, options.dest, options.protocol);

        // An explicit source must belong to this node; an unspecified one is
        // filled in from the egress interface after routing.
        if let Some(src) = options.src {
            if !src.is_unspecified() {
                if self.interfaces.by_address(src).is_none() {
                    return Err(ErrorKind::SourceAddressNotOwned(src));
                }
                datagram.set_src(src);
            }
        }

        datagram.set_tos(options.tos);
        datagram.set_identification(self.allocate_identification());
        datagram.set_dont_fragment(options.dont_fragment);

        let ttl = match options.ttl {
            Some(ttl) if ttl > 0 => ttl,
            _ => {
                if addr::is_link_local_multicast(options.dest) {
                    1
                } else if options.dest.is_multicast() {
                    self.config.multicast_time_to_live
                } else {
                    self.config.time_to_live
                }
            }
        };
        datagram.set_ttl(ttl);

        datagram.encapsulate(payload);
        Ok(datagram)
    }

    /// Dispatches an outbound datagram by destination class.
    fn dispatch_outbound(
        &mut self,
        datagram: Datagram,
        interface_hint: Option<InterfaceId>,
        next_hop_hint: Option<Ipv4Addr>,
        multicast_loop: bool,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        let dest = datagram.dst();

        if dest.is_multicast() {
            let egress = self.multicast_egress_interface(&datagram, interface_hint);

            // Loop a copy back to local listeners unless the egress itself
            // is loopback.
            let egress_is_loopback = egress
                .and_then(|id| self.interfaces.get(id))
                .map_or(false, |ie| ie.loopback);
            if multicast_loop && !egress_is_loopback {
                if let Some(loopback) = self.interfaces.first_loopback() {
                    tracing::trace!("looping back a multicast copy");
                    self.fragment_and_send(datagram.duplicate(), loopback, Some(dest), sink)?;
                }
            }

            return match egress {
                Some(interface) => {
                    self.counters.multicast += 1;
                    self.fragment_and_send(datagram, interface, Some(dest), sink)
                }
                None => {
                    tracing::debug!("no multicast egress interface, dropping");
                    self.counters.unroutable += 1;
                    Ok(())
                }
            };
        }

        if self.routes.is_local_address(dest) {
            tracing::trace!("destination is local, delivering through loopback");
            if interface_hint.is_some() {
                tracing::trace!("ignoring interface hint for a local destination");
            }
            let loopback = self
                .interfaces
                .first_loopback()
                .ok_or(ErrorKind::NoLoopbackInterface)?;
            return self.fragment_and_send(datagram, loopback, Some(dest), sink);
        }

        if addr::is_limited_broadcast(dest)
            || self.routes.interface_for_local_broadcast(dest).is_some()
        {
            return self.route_local_broadcast(datagram, interface_hint, sink);
        }

        self.route_unicast(datagram, interface_hint, next_hop_hint, sink)
    }
}
