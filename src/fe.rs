//! Minimal secp256k1 field element arithmetic.
//!
//! The handshake's ElligatorSwift codec (see [`crate::ellswift`]) needs to add,
//! multiply, invert and take square roots of elements of the secp256k1 base
//! field. The `secp256k1` crate does not expose that arithmetic directly (it
//! only hands back whole group elements), so this module provides the small
//! slice of field arithmetic the codec needs, built on `num-bigint`'s
//! arbitrary-precision integers rather than a hand-rolled limb representation.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use once_cell::sync::Lazy;

/// The secp256k1 base field prime, `2^256 - 2^32 - 977`.
static P: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(
        b"FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F",
        16,
    )
    .expect("valid prime literal")
});

/// An element of the secp256k1 base field, reduced modulo `P`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FE(BigUint);

impl FE {
    pub fn zero() -> Self {
        FE(BigUint::zero())
    }

    pub fn one() -> Self {
        FE(BigUint::one())
    }

    pub fn from_u64(v: u64) -> Self {
        FE(BigUint::from(v) % &*P)
    }

    /// Build a field element from a big-endian 32-byte encoding, reducing if
    /// the raw value happens to exceed the field prime (it never does for
    /// honestly generated inputs, but out-of-range wire data must not panic).
    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        FE(BigUint::from_bytes_be(bytes) % &*P)
    }

    /// Serialize as a big-endian 32-byte array, zero-padded on the left.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - raw.len()..].copy_from_slice(&raw);
        out
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(&self, other: &FE) -> FE {
        FE((&self.0 + &other.0) % &*P)
    }

    pub fn sub(&self, other: &FE) -> FE {
        // BigUint has no sign, so add P before subtracting to stay non-negative.
        FE((&self.0 + &*P - &other.0) % &*P)
    }

    pub fn neg(&self) -> FE {
        if self.0.is_zero() {
            FE::zero()
        } else {
            FE(&*P - &self.0)
        }
    }

    pub fn mul(&self, other: &FE) -> FE {
        FE((&self.0 * &other.0) % &*P)
    }

    pub fn square(&self) -> FE {
        self.mul(self)
    }

    pub fn double(&self) -> FE {
        self.add(self)
    }

    /// Multiplicative inverse via Fermat's little theorem, `a^(p-2) mod p`.
    /// Panics if `self` is zero; callers must check `is_zero` first.
    pub fn inverse(&self) -> FE {
        debug_assert!(!self.is_zero(), "inverse of zero field element");
        let exp = &*P - BigUint::from(2u8);
        FE(self.0.modpow(&exp, &*P))
    }

    pub fn div(&self, other: &FE) -> FE {
        self.mul(&other.inverse())
    }

    /// `p ≡ 3 (mod 4)` for the secp256k1 prime, so the square root (when it
    /// exists) is `a^((p+1)/4) mod p`. Returns `None` when `self` is not a
    /// quadratic residue.
    pub fn sqrt(&self) -> Option<FE> {
        if self.0.is_zero() {
            return Some(FE::zero());
        }
        let exp = (&*P + BigUint::one()) >> 2u32;
        let candidate = self.0.modpow(&exp, &*P);
        let candidate = FE(candidate);
        if candidate.square() == *self {
            Some(candidate)
        } else {
            None
        }
    }
}
