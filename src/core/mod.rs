//! Core wire-level building blocks for the transfer protocol.
//!
//! This module contains the fundamental units of the wire format:
//! - [`checksum`]: the MD5-backed 16-byte digest used for corruption detection.
//! - [`frame`]: data and control frame encoding/decoding.

pub mod checksum;
pub mod frame;

pub use checksum::digest16;
pub use frame::{ControlFrame, ControlTag, DataFrame};
