#![warn(missing_docs)]

//! ipflow: a small public API facade for the workspace.
//!
//! This crate provides a clean, stable surface that re-exports the most
//! commonly used types to simulate an IPv4 network layer:
//!
//! - The engine and its collaborator seams (`Ipv4Engine`, `RoutingTable`,
//!   `ArpCache`, `EngineSink`)
//! - The datagram and control types (`Datagram`, `Payload`, `SendOptions`,
//!   `DeliveryInfo`)
//! - Host integration (`RecordingSink`, `ChannelSink`, `StaticRoutes`,
//!   `StaticArp`)
//! - Core configuration (`Config`)
//!
//! Example
//! ```
//! use std::net::Ipv4Addr;
//! use std::time::Instant;
//! use ipflow::prelude::*;
//!
//! // A host with a loopback interface and one Ethernet interface.
//! let mut interfaces = InterfaceTable::new();
//! interfaces.add(Interface::loopback(0));
//! interfaces.add(Interface::ethernet(
//!     1,
//!     "eth0",
//!     1500,
//!     MacAddress([0, 0, 0, 0, 0, 1]),
//!     Ipv4Addr::new(192, 168, 1, 1),
//!     Ipv4Addr::new(255, 255, 255, 0),
//! ));
//!
//! let mut routes = StaticRoutes::new();
//! routes.add_local_address(Ipv4Addr::new(192, 168, 1, 1));
//! routes.add_local_address(Ipv4Addr::new(127, 0, 0, 1));
//!
//! let mut engine = Ipv4Engine::new(Config::default(), interfaces, routes, StaticArp::new());
//! engine.register_protocol(ProtocolRegistration { protocol: 17, egress_slot: 0 });
//!
//! // Send a UDP payload to ourselves and watch it come back up.
//! let mut sink = RecordingSink::new();
//! let options = SendOptions::to(Ipv4Addr::new(192, 168, 1, 1), 17);
//! engine
//!     .transport_send(vec![1, 2, 3].into(), options, Instant::now(), &mut sink)
//!     .unwrap();
//!
//! assert_eq!(sink.deliveries().count(), 1);
//! ```

// Core config and errors
pub use ipflow_core::config::Config;
pub use ipflow_core::error::ErrorKind;
// Engine, tables, and seams
pub use ipflow_engine::{
    ArpCache, EngineCounters, EngineSink, Interface, InterfaceTable, Ipv4Engine, MulticastChild,
    MulticastRoute, OutboundFrame, ReassemblyBuffer, RoutingTable, UnicastRoute,
};
// Host integration
pub use ipflow_host::{ChannelSink, Clock, EngineEvent, RecordingSink, StaticArp, StaticRoutes, SystemClock};
// Datagram and control types
pub use ipflow_proto::{
    Datagram, DeliveryInfo, IcmpError, IcmpKind, IcmpMessage, LinkFrame, MacAddress, Payload,
    ProtocolRegistration, SendOptions,
};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        Config, Datagram, DeliveryInfo, EngineEvent, EngineSink, IcmpError, IcmpKind, Interface,
        InterfaceTable, Ipv4Engine, MacAddress, MulticastChild, MulticastRoute, Payload,
        ProtocolRegistration, RecordingSink, SendOptions, StaticArp, StaticRoutes,
    };
}
