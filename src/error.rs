//! Error types for the transfer protocol.
//!
//! This module defines every terminal condition that can be surfaced
//! to a caller. Conditions the protocol recovers from on its own
//! (a bad checksum, a clamped `d_max`) never reach this type.

use std::fmt;
use std::io;

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Terminal error kinds surfaced to the caller of [`crate::Session`].
#[derive(Debug)]
pub enum Error {
    /// A payload shorter than the documented minimum (2 bytes) was passed to `send`.
    PayloadTooShort,

    /// Three SYNC rounds elapsed with no valid response from the peer.
    SyncFailure,

    /// The REPAIR retry budget was exhausted without completing the transfer.
    Unreachable,

    /// The peer sent something other than MISSING or DONE during REPAIR.
    ProtocolViolation,

    /// The DH response was unparsable, or the SYNC length check failed in secure mode.
    CipherMisuse,

    /// The underlying datagram endpoint failed.
    Io(io::Error),
}

impl Error {
    /// Returns a human-readable description of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            Error::PayloadTooShort => "payload shorter than the 2-byte minimum",
            Error::SyncFailure => "sync failed after three rounds",
            Error::Unreachable => "peer unreachable: repair retry budget exhausted",
            Error::ProtocolViolation => "unexpected frame during repair",
            Error::CipherMisuse => "key exchange or length verification failed",
            Error::Io(_) => "datagram endpoint I/O error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "{}: {}", self.as_str(), e),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
