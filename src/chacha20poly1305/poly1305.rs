//! Poly1305 one-time authenticator (RFC 8439 section 2.5).
//!
//! The running accumulator needs slightly more than 128 bits of headroom
//! (`r * (acc + val)` can briefly exceed it), so this keeps the accumulator
//! in a `BigUint` rather than hand-rolling 130-bit limb arithmetic.

use num_bigint::BigUint;
use num_traits::Zero;
use once_cell::sync::Lazy;

static MODULUS: Lazy<BigUint> = Lazy::new(|| (BigUint::from(1u8) << 130) - BigUint::from(5u8));
static TWO_128: Lazy<BigUint> = Lazy::new(|| BigUint::from(1u8) << 128);

/// A running Poly1305 computation over a 32-byte one-time key.
pub struct Poly1305 {
    r: BigUint,
    s: BigUint,
    acc: BigUint,
}

impl Poly1305 {
    pub fn new(key: &[u8; 32]) -> Self {
        let mut r_bytes = [0u8; 16];
        r_bytes.copy_from_slice(&key[..16]);
        // Clamp r per RFC 8439: clear specific bits of bytes 3,7,11,15.
        r_bytes[3] &= 0x0f;
        r_bytes[7] &= 0x0f;
        r_bytes[11] &= 0x0f;
        r_bytes[15] &= 0x0f;
        r_bytes[4] &= 0xfc;
        r_bytes[8] &= 0xfc;
        r_bytes[12] &= 0xfc;
        let r = BigUint::from_bytes_le(&r_bytes);
        let s = BigUint::from_bytes_le(&key[16..]);
        Poly1305 {
            r,
            s,
            acc: BigUint::zero(),
        }
    }

    /// Add a message of any length, optionally padding every (including the
    /// final, possibly short) 16-byte chunk up to 17 bytes before the high
    /// bit is implicitly set by treating the chunk length itself as the
    /// padding exponent (matches the RFC's "pad" input used for AAD/
    /// ciphertext length padding in the AEAD construction).
    pub fn add(&mut self, msg: &[u8], pad_to_block: bool) -> &mut Self {
        for chunk in msg.chunks(16) {
            let mut val = BigUint::from_bytes_le(chunk);
            let exponent = if pad_to_block { 16 } else { chunk.len() };
            val += BigUint::from(256u32).pow(exponent as u32);
            self.acc = (&self.r * (&self.acc + val)) % &*MODULUS;
        }
        self
    }

    pub fn tag(&self) -> [u8; 16] {
        let t = (&self.acc + &self.s) % &*TWO_128;
        let raw = t.to_bytes_le();
        let mut out = [0u8; 16];
        out[..raw.len()].copy_from_slice(&raw);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8439 section 2.5.2 test vector.
    #[test]
    fn rfc8439_vector() {
        let key = hex::decode("85d6be7857556d337f4452fe42d506a80103808afb0db2fd4abff6af4149f51")
            .unwrap();
        let mut key_arr = [0u8; 32];
        key_arr.copy_from_slice(&key);
        let msg = b"Cryptographic Forum Research Group";
        let mut poly = Poly1305::new(&key_arr);
        poly.add(msg, false);
        assert_eq!(hex::encode(poly.tag()), "a8061dc1305136c6c22b8baf0c0127a9");
    }
}
