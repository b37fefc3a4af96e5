//! # Relay Errors
//!
//! Every failure in the relay falls into one of a handful of categories, and
//! none of them is allowed to take the process down:
//!
//! - **Network** failures tear down the affected session. The sender backs off
//!   and reconnects; the broker simply ends the session and waits for the peer
//!   to come back.
//! - **Protocol** failures (malformed credentials, bad `LED@` tokens) are
//!   recovered where they happen by falling back to a default or skipping.
//! - **Actuation** failures are logged; messaging carries on.
//!
//! A full outbound queue is not an error at all: the oldest pending value is
//! evicted silently.

use thiserror::Error;

/// Errors produced by the relay library.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connect, read or write failure on a TCP stream.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// The credential frame could not be written in one piece.
    #[error("handshake failed: wrote {written} of {expected} bytes")]
    Handshake { written: usize, expected: usize },

    /// A frame, credential or LED token could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The LED device rejected a write.
    #[error("actuation failed: {0}")]
    Actuation(String),

    /// Configuration file missing or invalid.
    #[error("config error: {0}")]
    Config(String),

    /// The broker already serves its maximum number of clients.
    #[error("client registry full ({capacity} clients)")]
    RegistryFull { capacity: usize },
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, RelayError>;
