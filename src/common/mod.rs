//! # Common Components
//!
//! Shared utilities and data structures used by both the sender and the broker.
//!
//! ## Modules
//!
//! - [`frame`]: Wire protocol definitions (handshake, frames, LED commands)
//! - [`connection`]: TCP connection abstraction with chunk reads and whole-frame writes
//! - [`config`]: Configuration loading
//! - [`error`]: Error taxonomy shared by every component
//! - [`value`]: The clamped 0..=255 value and the producer interface
//! - [`logging`]: Logger initialisation for the binaries

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod logging;
pub mod value;
