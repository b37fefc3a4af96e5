//! # Sender Components
//!
//! The producer side of the relay:
//!
//! ## Outbound Queue ([`queue`])
//! Bounded drop-oldest buffer between the producer and the network.
//!
//! ## Backoff ([`backoff`])
//! Reconnect delay policy: 200ms doubling to a 3s cap, reset on success.
//!
//! ## Sender Session ([`sender`])
//! Owns the one outbound connection: connect, handshake, deliver, reconnect.

pub mod backoff;
pub mod queue;
pub mod sender;

// Re-export for convenience
pub use queue::OutboundQueue;
pub use sender::{SenderConfig, SenderHandle, SenderSession, SenderState};
