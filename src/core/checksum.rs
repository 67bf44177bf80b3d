//! 16-byte digest used as the transport's corruption-detection code.
//!
//! The protocol only needs a deterministic fixed-size digest over the
//! frame's id and payload; it is not a MAC and carries no authenticity
//! guarantee (see spec §1, §6). MD5 is used here to match the reference
//! implementation this protocol is compatible with.
//!
//! # Example
//!
//! ```rust
//! use relaygram::core::checksum::digest16;
//!
//! let id = 7u32.to_le_bytes();
//! let payload = b"hello";
//! let sum = digest16(&[&id, payload]);
//! assert_eq!(digest16(&[&id, payload]), sum);
//! ```

use md5::{Digest, Md5};

/// Computes the 16-byte digest over the concatenation of `parts`.
pub fn digest16(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Verifies that `parts` hashes to `expected`.
pub fn verify16(parts: &[&[u8]], expected: &[u8; 16]) -> bool {
    &digest16(parts) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_value() {
        // md5("") == d41d8cd98f00b204e9800998ecf8427e
        let sum = digest16(&[b""]);
        assert_eq!(
            sum,
            [
                0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec, 0xf8,
                0x42, 0x7e
            ]
        );
    }

    #[test]
    fn verify_roundtrip() {
        let id = 42u32.to_le_bytes();
        let payload = b"payload bytes";
        let sum = digest16(&[&id, payload]);
        assert!(verify16(&[&id, payload], &sum));
        assert!(!verify16(&[&id, b"tampered"], &sum));
    }

    #[test]
    fn order_matters() {
        let a = digest16(&[b"ab"]);
        let b = digest16(&[b"a", b"b"]);
        assert_eq!(a, b, "digest is computed over the concatenation, not the parts");
    }
}
