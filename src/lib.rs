//! Value relay between hand-tracking producers and an LED broker.
//!
//! - [`client`]: producer side, a bounded queue feeding a self-healing sender
//! - [`server`]: broker side, sessions, fan-out and LED actuation
//! - [`common`]: wire protocol, connection wrapper, config, errors

pub mod client;
pub mod common;
pub mod server;

pub use client::{OutboundQueue, SenderHandle, SenderSession};
pub use common::error::{RelayError, Result};
pub use common::value::{Producer, Value};
pub use server::{Broker, BrokerConfig};
