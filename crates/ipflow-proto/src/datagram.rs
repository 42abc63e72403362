//! The IPv4 datagram as a typed value.
//!
//! The engine never serializes or parses header bytes; a [`Datagram`] carries
//! the header fields directly and encapsulates its payload as a typed
//! [`Payload`]. Fragment offsets are stored in 8-byte units, as on the wire.

use std::net::Ipv4Addr;
use std::sync::Arc;

use ipflow_core::constants::{FRAGMENT_OFFSET_UNIT, MIN_HEADER_BYTES};

use crate::icmp::IcmpMessage;

/// The message encapsulated in a datagram.
///
/// Keeping the payload typed lets local delivery inspect ICMP messages and
/// unwrap tunneled datagrams without a byte codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// An opaque transport-layer segment. The bytes are shared, never
    /// mutated, so duplicating a datagram stays cheap.
    Transport(Arc<[u8]>),
    /// An ICMP message, possibly enclosing the datagram that caused it.
    Icmp(IcmpMessage),
    /// A tunneled IPv4 datagram (IPv4-in-IPv4).
    Datagram(Box<Datagram>),
}

impl Payload {
    /// Returns the byte length this payload contributes to the datagram.
    pub fn byte_len(&self) -> u16 {
        match self {
            Payload::Transport(bytes) => bytes.len() as u16,
            Payload::Icmp(msg) => msg.byte_len(),
            Payload::Datagram(inner) => inner.total_length(),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Transport(Arc::from(bytes.into_boxed_slice()))
    }
}

/// An IPv4 datagram: header fields as a typed value plus an optional
/// encapsulated payload.
///
/// Invariants upheld by the constructors and mutators:
/// - `header_length >= 20`
/// - `fragment_offset` counts 8-byte units
/// - outside the full-payload fragment mode, `total_length - header_length`
///   equals the payload byte length
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Datagram {
    src: Ipv4Addr,
    dst: Ipv4Addr,
    tos: u8,
    identification: u16,
    dont_fragment: bool,
    more_fragments: bool,
    fragment_offset: u16,
    ttl: u8,
    protocol: u8,
    header_length: u16,
    total_length: u16,
    has_bit_error: bool,
    payload: Option<Payload>,
}

impl Datagram {
    /// Creates an empty datagram with a minimum-size header and everything
    /// else zeroed.
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8) -> Self {
        Self {
            src,
            dst,
            tos: 0,
            identification: 0,
            dont_fragment: false,
            more_fragments: false,
            fragment_offset: 0,
            ttl: 0,
            protocol,
            header_length: MIN_HEADER_BYTES,
            total_length: MIN_HEADER_BYTES,
            has_bit_error: false,
            payload: None,
        }
    }

    /// Takes ownership of `payload` and recomputes the total length from the
    /// header length and the payload's byte length.
    pub fn encapsulate(&mut self, payload: Payload) {
        self.total_length = self.header_length + payload.byte_len();
        self.payload = Some(payload);
    }

    /// Releases the encapsulated payload, if any.
    pub fn decapsulate(&mut self) -> Option<Payload> {
        self.payload.take()
    }

    /// Deep copy of the header and payload. Shared transport bytes are
    /// reference-counted rather than copied; they are immutable either way.
    pub fn duplicate(&self) -> Datagram {
        self.clone()
    }

    /// Returns a reference to the encapsulated payload.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Source address.
    pub fn src(&self) -> Ipv4Addr {
        self.src
    }

    /// Sets the source address.
    pub fn set_src(&mut self, src: Ipv4Addr) {
        self.src = src;
    }

    /// Destination address.
    pub fn dst(&self) -> Ipv4Addr {
        self.dst
    }

    /// Sets the destination address.
    pub fn set_dst(&mut self, dst: Ipv4Addr) {
        self.dst = dst;
    }

    /// Type-of-service / DSCP byte.
    pub fn tos(&self) -> u8 {
        self.tos
    }

    /// Sets the type-of-service byte.
    pub fn set_tos(&mut self, tos: u8) {
        self.tos = tos;
    }

    /// The 16-bit identification assigned at origination. Fragmentation
    /// never changes it.
    pub fn identification(&self) -> u16 {
        self.identification
    }

    /// Sets the identification field.
    pub fn set_identification(&mut self, id: u16) {
        self.identification = id;
    }

    /// Don't-fragment flag.
    pub fn dont_fragment(&self) -> bool {
        self.dont_fragment
    }

    /// Sets the don't-fragment flag.
    pub fn set_dont_fragment(&mut self, df: bool) {
        self.dont_fragment = df;
    }

    /// More-fragments flag.
    pub fn more_fragments(&self) -> bool {
        self.more_fragments
    }

    /// Sets the more-fragments flag.
    pub fn set_more_fragments(&mut self, mf: bool) {
        self.more_fragments = mf;
    }

    /// Fragment offset in 8-byte units.
    pub fn fragment_offset(&self) -> u16 {
        self.fragment_offset
    }

    /// Sets the fragment offset, in 8-byte units.
    pub fn set_fragment_offset(&mut self, offset_units: u16) {
        self.fragment_offset = offset_units;
    }

    /// Fragment offset converted to bytes.
    pub fn fragment_offset_bytes(&self) -> u32 {
        u32::from(self.fragment_offset) * u32::from(FRAGMENT_OFFSET_UNIT)
    }

    /// Time to live.
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    /// Sets the time to live.
    pub fn set_ttl(&mut self, ttl: u8) {
        self.ttl = ttl;
    }

    /// Transport protocol number.
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Sets the transport protocol number.
    pub fn set_protocol(&mut self, protocol: u8) {
        self.protocol = protocol;
    }

    /// Header length in bytes.
    pub fn header_length(&self) -> u16 {
        self.header_length
    }

    /// Total datagram length in bytes (header plus payload).
    pub fn total_length(&self) -> u16 {
        self.total_length
    }

    /// Overrides the total length. The fragmenter uses this to declare a
    /// fragment's true size; otherwise `encapsulate` keeps it consistent.
    pub fn set_total_length(&mut self, bytes: u16) {
        self.total_length = bytes;
    }

    /// Payload length in bytes as declared by the header.
    pub fn payload_length(&self) -> u16 {
        self.total_length - self.header_length
    }

    /// Simulation-kernel corruption flag.
    pub fn has_bit_error(&self) -> bool {
        self.has_bit_error
    }

    /// Sets the corruption flag.
    pub fn set_bit_error(&mut self, corrupted: bool) {
        self.has_bit_error = corrupted;
    }

    /// Returns true if this datagram is one fragment of a larger one.
    pub fn is_fragment(&self) -> bool {
        self.fragment_offset != 0 || self.more_fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn test_encapsulate_sets_total_length() {
        let mut dgram = Datagram::new(addr(1), addr(2), 17);
        dgram.encapsulate(vec![0u8; 100].into());
        assert_eq!(dgram.total_length(), 120);
        assert_eq!(dgram.payload_length(), 100);
    }

    #[test]
    fn test_decapsulate_releases_payload() {
        let mut dgram = Datagram::new(addr(1), addr(2), 17);
        let payload: Payload = vec![1, 2, 3].into();
        dgram.encapsulate(payload.clone());

        let released = dgram.decapsulate().unwrap();
        assert_eq!(released, payload);
        assert!(dgram.payload().is_none());
    }

    #[test]
    fn test_duplicate_is_independent() {
        let mut dgram = Datagram::new(addr(1), addr(2), 6);
        dgram.encapsulate(vec![9u8; 8].into());
        dgram.set_ttl(7);

        let mut copy = dgram.duplicate();
        copy.set_ttl(1);
        copy.decapsulate();

        assert_eq!(dgram.ttl(), 7);
        assert!(dgram.payload().is_some());
    }

    #[test]
    fn test_fragment_offset_units() {
        let mut dgram = Datagram::new(addr(1), addr(2), 17);
        dgram.set_fragment_offset(185);
        assert_eq!(dgram.fragment_offset_bytes(), 1480);
        assert!(dgram.is_fragment());
    }

    #[test]
    fn test_tunneled_payload_length() {
        let mut inner = Datagram::new(addr(1), addr(2), 17);
        inner.encapsulate(vec![0u8; 30].into());

        let mut outer = Datagram::new(addr(3), addr(4), 4);
        outer.encapsulate(Payload::Datagram(Box::new(inner)));
        assert_eq!(outer.total_length(), 20 + 50);
    }
}
