#![warn(missing_docs)]

//! ipflow-core: foundational types and utilities.
//!
//! This crate provides the minimal set of core items shared across all layers:
//! - Configuration types
//! - Error handling
//! - Protocol constants
//! - IPv4 address helpers
//!
//! Engine-specific logic lives in specialized crates:
//! - `ipflow-proto`: datagram value type, control info, protocol demux
//! - `ipflow-engine`: the packet-processing pipeline
//! - `ipflow-host`: sinks, static tables, and clock for host integration

/// Protocol constants shared across layers.
pub mod constants {
    /// Minimum (and, without options, only) IPv4 header size in bytes.
    pub const MIN_HEADER_BYTES: u16 = 20;
    /// Fragment offsets are expressed in units of this many bytes.
    pub const FRAGMENT_OFFSET_UNIT: u16 = 8;
    /// Protocol number of ICMP.
    pub const PROTO_ICMP: u8 = 1;
    /// Protocol number of IGMP.
    pub const PROTO_IGMP: u8 = 2;
    /// Protocol number of IPv4-in-IPv4 tunneling.
    pub const PROTO_IPIP: u8 = 4;
    /// Protocol number of TCP.
    pub const PROTO_TCP: u8 = 6;
    /// Protocol number of UDP.
    pub const PROTO_UDP: u8 = 17;
    /// Ethertype carried on link frames for IPv4 payloads.
    pub const ETHERTYPE_IPV4: u16 = 0x0800;
}

/// IPv4 address predicates and helpers.
pub mod addr;
/// Configuration options for the engine.
pub mod config;
/// Error types and results.
pub mod error;
