#![warn(missing_docs)]

//! ipflow-proto: the typed IPv4 datagram and its surrounding message types.
//!
//! This crate holds everything that travels between the engine and its
//! collaborators:
//! - `Datagram`: the IPv4 header as a typed value plus an encapsulated payload
//! - `IcmpMessage` / `IcmpError`: inbound ICMP inspection and outbound error
//!   requests toward the ICMP collaborator
//! - Control info split by direction (`SendOptions`, `DeliveryInfo`,
//!   `LinkFrame`, `ProtocolRegistration`)
//! - `ProtocolDemux`: protocol number to higher-layer egress slot mapping
//! - `MacAddress`: link-layer addressing for egress frames

/// Direction-specific control info exchanged with the higher layer and link.
pub mod control;
/// The IPv4 datagram value type and payload variants.
pub mod datagram;
/// Protocol number to egress slot mapping.
pub mod demux;
/// ICMP message inspection and error request types.
pub mod icmp;
/// Link-layer MAC addresses.
pub mod mac;

pub use control::{DeliveryInfo, LinkFrame, ProtocolRegistration, SendOptions};
pub use datagram::{Datagram, Payload};
pub use demux::ProtocolDemux;
pub use icmp::{IcmpError, IcmpKind, IcmpMessage};
pub use mac::MacAddress;
