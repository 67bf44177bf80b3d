//! Diffie–Hellman key exchange over the RFC 3526 2048-bit MODP group.
//!
//! Each party generates a private exponent, exchanges the resulting
//! public value (length-prefixed, big-endian), and both derive a
//! 32-byte symmetric key from the shared secret. This is used only to
//! seed the stream cipher (§GLOSSARY): it is not resistant to an active
//! on-path adversary, and `num_bigint`'s `modpow` makes no constant-time
//! guarantee (see DESIGN.md).

use num_bigint::BigUint;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// RFC 3526, 2048-bit MODP Group (generator 2).
const MODP_2048_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08",
    "8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B",
    "302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9",
    "A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6",
    "49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8",
    "FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C",
    "180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFF",
    "FFFFFFFF"
);

fn group_modulus() -> &'static BigUint {
    static P: OnceLock<BigUint> = OnceLock::new();
    P.get_or_init(|| {
        BigUint::parse_bytes(MODP_2048_HEX.as_bytes(), 16)
            .expect("RFC 3526 modulus must parse as hex")
    })
}

fn generator() -> BigUint {
    BigUint::from(2u32)
}

/// A generated private/public exponent pair for one side of the exchange.
pub struct KeyPair {
    x: BigUint,
    pub public: BigUint,
}

impl KeyPair {
    /// Generates `x` uniformly in `[1, p-1]` and computes `y = g^x mod p`.
    pub fn generate(rng: &mut impl Rng) -> Self {
        let p = group_modulus();
        let bit_len = p.bits();
        let x = loop {
            let candidate = random_biguint_below(rng, bit_len, p);
            if candidate > BigUint::from(0u32) {
                break candidate;
            }
        };
        let public = generator().modpow(&x, p);
        KeyPair { x, public }
    }

    /// Computes the shared secret `s = peer_public^x mod p`.
    pub fn shared_secret(&self, peer_public: &BigUint) -> BigUint {
        peer_public.modpow(&self.x, group_modulus())
    }
}

fn random_biguint_below(rng: &mut impl Rng, bit_len: u64, bound: &BigUint) -> BigUint {
    loop {
        let byte_len = (bit_len as usize).div_ceil(8);
        let bytes: Vec<u8> = (0..byte_len).map(|_| rng.r#gen::<u8>()).collect();
        let candidate = BigUint::from_bytes_be(&bytes);
        if &candidate < bound {
            return candidate;
        }
    }
}

/// Serializes a public value as `len(4, LE) | big-endian bytes`.
pub fn encode_public(value: &BigUint) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&bytes);
    out
}

/// Parses a length-prefixed public value, returning it plus the number of
/// bytes consumed from `buf`.
pub fn decode_public(buf: &[u8]) -> Option<(BigUint, usize)> {
    if buf.len() < 4 {
        return None;
    }
    let len = u32::from_le_bytes(buf[..4].try_into().ok()?) as usize;
    let total = 4 + len;
    if buf.len() < total {
        return None;
    }
    Some((BigUint::from_bytes_be(&buf[4..total]), total))
}

/// Derives the 32-byte symmetric key from the DH shared secret `s`.
///
/// This plays the role of the spec's "deterministic PRG seeded by the
/// integer s": SHA-256 over the minimal big-endian encoding of `s` is a
/// deterministic byte source keyed only by `s`, which is all the cipher
/// key derivation needs.
pub fn derive_key(shared_secret: &BigUint) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret.to_bytes_be());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn modulus_parses_to_2048_bits() {
        assert_eq!(group_modulus().bits(), 2048);
    }

    #[test]
    fn shared_secret_agrees() {
        let mut rng = thread_rng();
        let a = KeyPair::generate(&mut rng);
        let b = KeyPair::generate(&mut rng);

        let s_a = a.shared_secret(&b.public);
        let s_b = b.shared_secret(&a.public);
        assert_eq!(s_a, s_b);
    }

    #[test]
    fn public_value_roundtrip() {
        let mut rng = thread_rng();
        let kp = KeyPair::generate(&mut rng);
        let encoded = encode_public(&kp.public);
        let (decoded, consumed) = decode_public(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, kp.public);
    }

    #[test]
    fn derived_keys_match_and_are_32_bytes() {
        let mut rng = thread_rng();
        let a = KeyPair::generate(&mut rng);
        let b = KeyPair::generate(&mut rng);
        let key_a = derive_key(&a.shared_secret(&b.public));
        let key_b = derive_key(&b.shared_secret(&a.public));
        assert_eq!(key_a, key_b);
        assert_eq!(key_a.len(), 32);
    }
}
