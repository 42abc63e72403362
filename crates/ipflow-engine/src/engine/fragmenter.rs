//! Outbound fragmentation.

use std::net::Ipv4Addr;
use std::sync::Arc;

use ipflow_core::constants::FRAGMENT_OFFSET_UNIT;
use ipflow_core::error::Result;
use ipflow_proto::control::InterfaceId;
use ipflow_proto::icmp::DEST_UNREACHABLE_FRAGMENTATION;
use ipflow_proto::{Datagram, IcmpError, Payload};

use super::Ipv4Engine;
use crate::arp::ArpCache;
use crate::routes::RoutingTable;
use crate::sink::EngineSink;

impl<R: RoutingTable, A: ArpCache> Ipv4Engine<R, A> {
    /// Fills in the source address, spends a hop, and emits the datagram to
    /// the interface, splitting it into MTU-sized fragments if needed.
    /// The original is consumed either way.
    pub(super) fn fragment_and_send(
        &mut self,
        mut datagram: Datagram,
        interface: InterfaceId,
        next_hop: Option<Ipv4Addr>,
        sink: &mut dyn EngineSink,
    ) -> Result<()> {
        let (mtu, loopback, interface_addr) = match self.interfaces.get(interface) {
            Some(ie) => (ie.mtu, ie.loopback, ie.addr),
            None => {
                tracing::warn!(interface, "egress to unknown interface, dropping");
                self.counters.dropped += 1;
                return Ok(());
            }
        };

        // An unspecified source becomes the egress interface's address.
        if datagram.src().is_unspecified() {
            if let Some(own) = interface_addr {
                datagram.set_src(own);
            }
        }

        // Locally delivered datagrams do not spend a hop.
        if !loopback {
            if datagram.ttl() == 0 {
                tracing::debug!("hop limit exhausted, requesting time-exceeded");
                self.counters.dropped += 1;
                sink.emit_icmp(IcmpError::TimeExceeded, datagram);
                return Ok(());
            }
            datagram.set_ttl(datagram.ttl() - 1);
        }

        if datagram.total_length() <= mtu {
            return self.send_to_interface(datagram, interface, next_hop, sink);
        }

        if datagram.dont_fragment() {
            tracing::debug!(
                length = datagram.total_length(),
                mtu,
                "datagram over MTU with DF set, requesting destination-unreachable"
            );
            self.counters.dropped += 1;
            sink.emit_icmp(
                IcmpError::DestinationUnreachable(DEST_UNREACHABLE_FRAGMENTATION),
                datagram,
            );
            return Ok(());
        }

        // Loopback never fragments; the datagram is consumed locally.
        if loopback {
            return self.send_to_interface(datagram, interface, next_hop, sink);
        }

        let header_length = datagram.header_length();
        let payload_length = u32::from(datagram.total_length() - header_length);
        let fragment_length = u32::from(
            (mtu.saturating_sub(header_length) / FRAGMENT_OFFSET_UNIT) * FRAGMENT_OFFSET_UNIT,
        );
        if fragment_length == 0 {
            tracing::error!(mtu, header_length, "MTU too small to carry any fragment payload");
            self.counters.dropped += 1;
            return Ok(());
        }

        // Re-fragmenting a fragment keeps offsets relative to the original
        // datagram.
        let offset_base_units = datagram.fragment_offset();
        let original_more_fragments = datagram.more_fragments();

        tracing::trace!(
            payload_length,
            fragment_length,
            fragments = payload_length.div_ceil(fragment_length),
            "breaking datagram into fragments"
        );

        let payload = match datagram.decapsulate() {
            Some(payload) => payload,
            None => {
                tracing::warn!("oversize datagram without a payload, dropping");
                self.counters.dropped += 1;
                return Ok(());
            }
        };

        let mut offset = 0u32;
        while offset < payload_length {
            let last = payload_length - offset <= fragment_length;
            let this_fragment_length = if last { payload_length - offset } else { fragment_length };

            let mut fragment = datagram.duplicate();
            fragment.encapsulate(self.fragment_payload(&payload, offset, this_fragment_length));
            fragment.set_total_length(header_length + this_fragment_length as u16);
            fragment.set_fragment_offset(
                offset_base_units + (offset / u32::from(FRAGMENT_OFFSET_UNIT)) as u16,
            );
            // The original MF bit survives only on the last fragment.
            fragment.set_more_fragments(!last || original_more_fragments);

            self.send_to_interface(fragment, interface, next_hop, sink)?;
            offset += fragment_length;
        }
        Ok(())
    }

    /// Payload carried by one fragment. Byte payloads are sliced unless the
    /// legacy whole-payload mode is configured; typed payloads cannot be
    /// sliced and always travel whole.
    fn fragment_payload(&self, payload: &Payload, offset: u32, length: u32) -> Payload {
        match payload {
            Payload::Transport(bytes) if !self.config.copy_full_payload_in_fragments => {
                let start = offset as usize;
                let end = (offset + length) as usize;
                Payload::Transport(Arc::from(&bytes[start..end]))
            }
            other => other.clone(),
        }
    }
}
