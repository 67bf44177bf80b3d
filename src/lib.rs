//! A reliable, optionally confidential, message-oriented transport
//! layered over a best-effort datagram service.
//!
//! The transport moves one message at a time through three phases: a
//! SYNC handshake (and, in secure mode, a Diffie-Hellman key exchange),
//! a BULK fragment transfer, and a receiver-driven REPAIR loop that
//! closes gaps until the receiver has every fragment.

pub mod cipher;
pub mod config;
pub mod core;
pub mod dh;
pub mod endpoint;
pub mod error;
pub mod receiver;
pub mod sender;
pub mod session;

pub use error::{Error, Result};
pub use session::Session;
