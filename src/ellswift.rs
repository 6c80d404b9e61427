//! ElligatorSwift encoding of secp256k1 public keys, and the x-only ECDH
//! primitive built on top of it (BIP 324 section "Elligator Swift").
//!
//! `xswiftec` decodes a pair of field elements `(u, t)` to the x-coordinate of
//! a curve point; `xswiftec_inv` and `xelligatorswift` go the other way,
//! producing a `(u, t)` pair that looks like uniform random bytes but decodes
//! back to a chosen x-coordinate. The actual group law (point validity,
//! scalar multiplication) is delegated to the `secp256k1` crate; only the
//! field-element bookkeeping that picks the encoding apart is ours to do.

use once_cell::sync::Lazy;
use rand::RngCore;
use secp256k1::{constants, All, Parity, PublicKey, Scalar, Secp256k1, SecretKey, XOnlyPublicKey};

use crate::fe::FE;
use crate::Error;

static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// `sqrt(-3) mod p`, used throughout the swift-encoding formulas.
static MINUS_3_SQRT: Lazy<FE> = Lazy::new(|| {
    FE::from_u64(3)
        .neg()
        .sqrt()
        .expect("-3 is a quadratic residue mod the secp256k1 prime")
});

fn curve_b() -> FE {
    FE::from_u64(7)
}

fn cube(x: &FE) -> FE {
    x.square().mul(x)
}

/// Whether `x` is the x-coordinate of some point on the secp256k1 curve.
/// Delegates to the `secp256k1` crate's own x-only lift, which is exactly
/// the field/group validity primitive the handshake assumes is available.
fn is_valid_x(x: &FE) -> bool {
    XOnlyPublicKey::from_slice(&x.to_be_bytes()).is_ok()
}

/// Decode field elements `(u, t)` to an X coordinate on the curve.
pub(crate) fn xswiftec(u_in: &FE, t_in: &FE) -> FE {
    let u = if u_in.is_zero() { FE::one() } else { u_in.clone() };
    let mut t = if t_in.is_zero() { FE::one() } else { t_in.clone() };
    if cube(&u).add(&t.square()).add(&curve_b()).is_zero() {
        t = t.double();
    }
    let x = cube(&u).sub(&t.square()).add(&curve_b()).div(&t.double());
    let y = x.add(&t).div(&MINUS_3_SQRT.mul(&u));

    let four_y2 = y.square().double().double();
    let candidate_a = u.add(&four_y2);
    if is_valid_x(&candidate_a) {
        return candidate_a;
    }
    let x_over_y = x.div(&y);
    let two = FE::from_u64(2);
    let candidate_b = x_over_y.neg().sub(&u).div(&two);
    if is_valid_x(&candidate_b) {
        return candidate_b;
    }
    let candidate_c = x_over_y.sub(&u).div(&two);
    debug_assert!(is_valid_x(&candidate_c), "one of the three branches must be valid");
    candidate_c
}

/// Given `x` and `u`, find `t` such that `xswiftec(u, t) == x`, or `None` if
/// this `(x, u, case)` combination has no preimage. `case` selects which of
/// the (up to eight) valid `t` values to compute.
pub(crate) fn xswiftec_inv(x: &FE, u: &FE, case: u8) -> Option<FE> {
    let two = FE::from_u64(2);
    let v;
    let s;
    if case & 2 == 0 {
        let minus_x_minus_u = x.neg().sub(u);
        if is_valid_x(&minus_x_minus_u) {
            return None;
        }
        v = if case & 1 == 0 {
            x.clone()
        } else {
            minus_x_minus_u
        };
        let denom = u.square().add(&u.mul(&v)).add(&v.square());
        if denom.is_zero() {
            return None;
        }
        s = cube(u).add(&curve_b()).neg().div(&denom);
    } else {
        let s_candidate = x.sub(u);
        if s_candidate.is_zero() {
            return None;
        }
        let inner = cube(u)
            .add(&curve_b())
            .double()
            .double()
            .add(&FE::from_u64(3).mul(&s_candidate).mul(&u.square()));
        let mut r = s_candidate.neg().mul(&inner).sqrt()?;
        if case & 1 != 0 {
            if r.is_zero() {
                return None;
            }
            r = r.neg();
        }
        v = u.neg().add(&r.div(&s_candidate)).div(&two);
        s = s_candidate;
    }
    let mut w = s.sqrt()?;
    if case & 4 != 0 {
        w = w.neg();
    }
    let half_c_plus_1 = MINUS_3_SQRT.add(&FE::one()).div(&two);
    Some(w.mul(&u.mul(&half_c_plus_1).add(&v)))
}

fn random_fe_in_curve_order() -> FE {
    let order = constants::CURVE_ORDER;
    let mut rng = rand::thread_rng();
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        if bytes == [0u8; 32] {
            continue;
        }
        if bytes.as_slice() < order.as_slice() {
            return FE::from_be_bytes(&bytes);
        }
    }
}

/// Given a field element `x` on the curve, find `(u, t)` that encode it.
pub(crate) fn xelligatorswift(x: &FE) -> (FE, FE) {
    let mut rng = rand::thread_rng();
    loop {
        let u = random_fe_in_curve_order();
        let case = (rng.next_u32() % 8) as u8;
        if let Some(t) = xswiftec_inv(x, &u, case) {
            return (u, t);
        }
    }
}

/// Generate a fresh ephemeral keypair and its 64-byte ElligatorSwift encoding.
pub fn ellswift_create() -> (SecretKey, [u8; 64]) {
    let mut rng = rand::thread_rng();
    let secret_key = loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        if let Ok(sk) = SecretKey::from_slice(&bytes) {
            break sk;
        }
    };
    let public_key = PublicKey::from_secret_key(&SECP, &secret_key);
    let (xonly, _parity) = public_key.x_only_public_key();
    let x = FE::from_be_bytes(&xonly.serialize());
    let (u, t) = xelligatorswift(&x);

    let mut enc = [0u8; 64];
    enc[..32].copy_from_slice(&u.to_be_bytes());
    enc[32..].copy_from_slice(&t.to_be_bytes());
    (secret_key, enc)
}

/// Decode a 64-byte ElligatorSwift encoding to a full group element. The
/// sign of the resulting point's y-coordinate is a local convention (taken
/// from the parity of `t`); downstream code only ever consumes the
/// x-coordinate of an ECDH result, which does not depend on this choice.
pub fn ellswift_decode(enc: &[u8; 64]) -> Result<PublicKey, Error> {
    let u = FE::from_be_bytes(enc[..32].try_into().expect("32 bytes"));
    let t = FE::from_be_bytes(enc[32..].try_into().expect("32 bytes"));
    let x = xswiftec(&u, &t);
    let xonly = XOnlyPublicKey::from_slice(&x.to_be_bytes()).map_err(|_| Error::CryptoInput)?;
    let t_is_odd = t.to_be_bytes()[31] & 1 == 1;
    let parity = if t_is_odd { Parity::Odd } else { Parity::Even };
    Ok(xonly.public_key(parity))
}

/// Compute the x-only ECDH shared secret between our private key and the
/// peer's ElligatorSwift-encoded public key.
pub fn ellswift_ecdh_xonly(enc_theirs: &[u8; 64], priv_key: &SecretKey) -> Result<[u8; 32], Error> {
    let u = FE::from_be_bytes(enc_theirs[..32].try_into().expect("32 bytes"));
    let t = FE::from_be_bytes(enc_theirs[32..].try_into().expect("32 bytes"));
    let x = xswiftec(&u, &t);
    let xonly = XOnlyPublicKey::from_slice(&x.to_be_bytes()).map_err(|_| Error::CryptoInput)?;
    let q = xonly.public_key(Parity::Even);
    let scalar = Scalar::from(*priv_key);
    let shared = q.mul_tweak(&SECP, &scalar).map_err(|_| Error::CryptoInput)?;
    let (shared_x, _parity) = shared.x_only_public_key();
    Ok(shared_x.serialize())
}
