#![warn(missing_docs)]

//! ipflow-host: host-side integration for the engine.
//!
//! The engine emits through the [`ipflow_engine::EngineSink`] seam; this
//! crate provides the standard implementations plus the table types a host
//! wires the engine up with:
//! - [`RecordingSink`]: captures every emission for inspection in tests
//! - [`ChannelSink`]: forwards emissions into a crossbeam channel for an
//!   event-driven host loop
//! - [`StaticRoutes`] / [`StaticArp`]: hand-populated routing and ARP tables
//! - [`Clock`]: time source abstraction

/// Engine emissions as an event enum.
pub mod event_types;
/// Sink implementations.
pub mod sinks;
/// Hand-populated routing and ARP tables.
pub mod static_tables;
/// Time utilities for the host.
pub mod time;

pub use event_types::EngineEvent;
pub use sinks::{ChannelSink, RecordingSink};
pub use static_tables::{StaticArp, StaticRoutes};
pub use time::{Clock, SystemClock};
