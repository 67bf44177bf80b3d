//! The stream cipher applied to payload bytes in secure mode.
//!
//! An RC4 keystream, seeded once from the derived 32-byte session key.
//! `apply` XORs the keystream into `buf` in place and advances the
//! internal state by exactly `buf.len()` bytes; encryption and decryption
//! are the same operation, so both roles share this type.

use rc4::consts::U32;
use rc4::{KeyInit, Rc4, StreamCipher as _};

/// A forward-advancing RC4 keystream.
pub struct Keystream {
    inner: Rc4<U32>,
}

impl Keystream {
    /// Initializes the keystream from a 32-byte session key.
    pub fn new(key: &[u8; 32]) -> Self {
        Keystream {
            inner: Rc4::new(key.into()),
        }
    }

    /// XORs the keystream into `buf`, advancing state by `buf.len()` bytes.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_is_its_own_inverse_in_order() {
        let key = [7u8; 32];
        let plaintext = b"the quick brown fox jumps".to_vec();

        let mut enc = Keystream::new(&key);
        let mut ciphertext = plaintext.clone();
        enc.apply(&mut ciphertext);
        assert_ne!(ciphertext, plaintext);

        let mut dec = Keystream::new(&key);
        let mut roundtrip = ciphertext.clone();
        dec.apply(&mut roundtrip);
        assert_eq!(roundtrip, plaintext);
    }

    #[test]
    fn advances_forward_across_calls() {
        let key = [1u8; 32];
        let mut a = Keystream::new(&key);
        let mut one_shot = vec![0u8; 20];
        a.apply(&mut one_shot);

        let mut b = Keystream::new(&key);
        let mut first = vec![0u8; 10];
        let mut second = vec![0u8; 10];
        b.apply(&mut first);
        b.apply(&mut second);

        let mut combined = first;
        combined.extend(second);
        assert_eq!(combined, one_shot);
    }
}
