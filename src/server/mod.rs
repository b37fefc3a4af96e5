//! # Broker Components
//!
//! ## Broker ([`broker`])
//! Accept loop; spawns one session task per connection.
//!
//! ## Broker Session ([`session`])
//! Handshake, message relay and LED command handling for one client.
//!
//! ## Client Registry ([`registry`])
//! Locked membership set used for fan-out.
//!
//! ## LED Output ([`pattern`], [`actuator`])
//! Thermometer encoding and the serialised port to the LED device.

pub mod actuator;
pub mod broker;
pub mod config;
pub mod pattern;
pub mod registry;
pub mod session;

// Re-export for convenience
pub use actuator::{ActuationPort, LedDriver, SimulatedLeds};
pub use broker::Broker;
pub use config::BrokerConfig;
pub use registry::ClientRegistry;
