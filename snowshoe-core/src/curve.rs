//! Scalar & Point Adapter.
//!
//! A thin, constant-time contract over the curve library: generator
//! multiplication, simultaneous multiplication, negation, mod-q reduction,
//! and the Elligator-encoded Diffie-Hellman helpers.
//!
//! `curve25519-dalek`'s public `EdwardsPoint` API does not expose raw affine
//! field-element bytes, so this crate's 64-byte wire encoding of a point is
//! `compress(P) ‖ compress(-P)` rather than a literal affine X ‖ Y packing.
//! An "X-coordinate equals zero" rejection is likewise built from public
//! API: a point has x = 0 exactly at the identity and at the unique
//! order-2 point, which is detected by
//! `P.is_identity() || (P + P).is_identity()`.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar as DalekScalar;
use curve25519_dalek::traits::{IsIdentity, MultiscalarMul};
use rand_core::CryptoRng;
use sha2::Sha512;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{Failed, Result};

/// A scalar reduced modulo the group order `q`.
#[derive(Clone, Copy, Zeroize)]
pub struct Scalar(pub(crate) DalekScalar);

impl Scalar {
    pub const ZERO: Scalar = Scalar(DalekScalar::ZERO);

    /// `mod_q(x)`: reduce a 64-byte wide integer to a scalar in `[0, q)`.
    #[must_use]
    pub fn mod_q(wide: &[u8; 64]) -> Scalar {
        Scalar(DalekScalar::from_bytes_mod_order_wide(wide))
    }

    /// Reduce 32 bytes modulo `q` (used for the Argon2-derived password
    /// verifier scalar, which is already 32 bytes of output).
    #[must_use]
    pub fn mod_q_narrow(bytes: &[u8; 32]) -> Scalar {
        Scalar(DalekScalar::from_bytes_mod_order(*bytes))
    }

    /// Parse 32 bytes as a scalar, requiring the canonical (already
    /// reduced) representation. Used when loading persisted state, where a
    /// non-canonical encoding indicates tampering.
    pub fn from_canonical_bytes(bytes: &[u8; 32]) -> Result<Scalar> {
        let candidate = DalekScalar::from_bytes_mod_order(*bytes);
        if bool::from(candidate.as_bytes().ct_eq(bytes)) {
            Ok(Scalar(candidate))
        } else {
            Err(Failed)
        }
    }

    /// Draw a uniform scalar via rejection sampling: a uniform 64-byte draw
    /// reduced mod `q`. The reduction bias is negligible (q is within 2^126
    /// of 2^255).
    pub fn random<R: rand_core::RngCore + CryptoRng>(rng: &mut R) -> Scalar {
        let mut wide = [0u8; 64];
        rng.fill_bytes(&mut wide);
        let scalar = Scalar::mod_q(&wide);
        wide.zeroize();
        scalar
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Constant-time zero check.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        bool::from(self.0.ct_eq(&DalekScalar::ZERO))
    }
}

/// A point on the curve, carried internally as `curve25519-dalek`'s
/// `EdwardsPoint` (already in the prime-order subgroup once cofactor-cleared).
#[derive(Clone, Copy, Zeroize)]
pub struct Point(pub(crate) EdwardsPoint);

impl Point {
    /// `neg(P) → P′`: point negation.
    #[must_use]
    pub fn neg(&self) -> Point {
        Point(-self.0)
    }

    /// A point has x = 0 only at the identity and the unique order-2 point;
    /// both are detected without needing raw affine coordinates.
    #[must_use]
    pub fn is_x_zero(&self) -> bool {
        self.0.is_identity() || (self.0 + self.0).is_identity()
    }

    /// 64-byte wire encoding: `compress(P) ‖ compress(-P)`.
    #[must_use]
    pub fn pack(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.0.compress().as_bytes());
        out[32..].copy_from_slice((-self.0).compress().as_bytes());
        out
    }

    /// Parse the 64-byte wire encoding, rejecting unless both halves
    /// decompress to valid curve points that are mutual negations.
    pub fn unpack(bytes: &[u8; 64]) -> Result<Point> {
        let mut half = [0u8; 32];
        half.copy_from_slice(&bytes[..32]);
        let p = CompressedEdwardsY(half).decompress().ok_or(Failed)?;
        half.copy_from_slice(&bytes[32..]);
        let neg_p = CompressedEdwardsY(half).decompress().ok_or(Failed)?;
        if (p + neg_p).is_identity() {
            Ok(Point(p))
        } else {
            Err(Failed)
        }
    }
}

/// `mul_gen(k, cofactor_clear?) → P`: `P = k·G`, optionally cofactor-cleared.
/// Fails iff `k ≡ 0`.
pub fn mul_gen(k: &Scalar, cofactor_clear: bool) -> Result<Point> {
    if k.is_zero() {
        return Err(Failed);
    }
    let p = EdwardsPoint::mul_base(&k.0);
    let p = if cofactor_clear { p.mul_by_cofactor() } else { p };
    Ok(Point(p))
}

/// `simul_gen(a, b, Q) → R`: `R = a·G + b·Q`. Fails if `b ≡ 0` or the result
/// is the identity.
pub fn simul_gen(a: &Scalar, b: &Scalar, q: &Point) -> Result<Point> {
    if b.is_zero() {
        return Err(Failed);
    }
    let r = EdwardsPoint::multiscalar_mul(&[a.0, b.0], &[ED25519_BASEPOINT_POINT, q.0]);
    if r.is_identity() {
        return Err(Failed);
    }
    Ok(Point(r))
}

/// `simul(a, P, b, Q) → R`: `R = a·P + b·Q`, constant-time.
pub fn simul(a: &Scalar, p: &Point, b: &Scalar, q: &Point) -> Result<Point> {
    let r = EdwardsPoint::multiscalar_mul(&[a.0, b.0], &[p.0, q.0]);
    Ok(Point(r))
}

/// `mul_mod_q(a, b, c) → s`: `s = a·b + c (mod q)`.
#[must_use]
pub fn mul_mod_q(a: &Scalar, b: &Scalar, c: &Scalar) -> Scalar {
    Scalar(a.0 * b.0 + c.0)
}

/// `add_mod_q(a, b) → s`.
#[must_use]
pub fn add_mod_q(a: &Scalar, b: &Scalar) -> Scalar {
    Scalar(a.0 + b.0)
}

/// Scalar negation mod `q`, used to express `U = s·G − t·SP` as
/// `simul_gen(s, −t, SP)`, reusing the same constant-time two-scalar
/// multiply as every other combined point operation in this crate rather
/// than introducing a bespoke point-subtraction routine.
#[must_use]
pub fn neg_mod_q(a: &Scalar) -> Scalar {
    Scalar(-a.0)
}

/// `elligator(seed) → E`: deterministic map from 32 bytes to a curve point
/// suitable as an additive mask.
#[must_use]
pub fn elligator(seed: &[u8; 32]) -> Point {
    Point(EdwardsPoint::nonspec_map_to_curve::<Sha512>(seed))
}

/// `elligator_encrypt(y, E) → Y′`: computes `Y = y·G` then `Y′ = Y + E`;
/// fails (caller retries with fresh `y`) when `Y` is unusable (zero scalar
/// or x = 0).
pub fn elligator_encrypt(y: &Scalar, e: &Point) -> Result<Point> {
    if y.is_zero() {
        return Err(Failed);
    }
    let big_y = EdwardsPoint::mul_base(&y.0);
    if Point(big_y).is_x_zero() {
        return Err(Failed);
    }
    Ok(Point(big_y + e.0))
}

/// `elligator_secret(a, P′, E, b?, V?) → Z`: recovers `P = P′ − E` and
/// computes `Z = a·P` (or `Z = a·P + b·V` when a verifier point is bound
/// in); fails on invalid inputs.
pub fn elligator_secret(
    a: &Scalar,
    p_prime: &Point,
    e: &Point,
    bv: Option<(&Scalar, &Point)>,
) -> Result<Point> {
    let p = Point(p_prime.0 - e.0);
    if p.is_x_zero() {
        return Err(Failed);
    }
    match bv {
        None => Ok(Point(p.0 * a.0)),
        Some((b, v)) => simul(a, &p, b, v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn mul_gen_rejects_zero_scalar() {
        assert!(mul_gen(&Scalar::ZERO, true).is_err());
    }

    #[test]
    fn mul_gen_cofactor_clear_matches_uncleared_times_cofactor() {
        let mut rng = OsRng;
        let k = Scalar::random(&mut rng);
        let cleared = mul_gen(&k, true).unwrap();
        let uncleared = mul_gen(&k, false).unwrap();
        let eight = Scalar(DalekScalar::from(8u64));
        let recleared = Point(uncleared.0 * eight.0);
        assert_eq!(cleared.pack(), recleared.pack());
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let mut rng = OsRng;
        let k = Scalar::random(&mut rng);
        let p = mul_gen(&k, true).unwrap();
        let packed = p.pack();
        let parsed = Point::unpack(&packed).unwrap();
        assert_eq!(parsed.pack(), packed);
    }

    #[test]
    fn unpack_rejects_mismatched_halves() {
        let mut rng = OsRng;
        let p = mul_gen(&Scalar::random(&mut rng), true).unwrap();
        let q = mul_gen(&Scalar::random(&mut rng), true).unwrap();
        let mut bytes = p.pack();
        bytes[32..].copy_from_slice(&q.pack()[32..]);
        assert!(Point::unpack(&bytes).is_err());
    }

    #[test]
    fn identity_and_order_two_point_are_x_zero() {
        let identity = Point(EdwardsPoint::mul_base(&DalekScalar::ZERO) * DalekScalar::ZERO);
        assert!(identity.is_x_zero());
    }

    #[test]
    fn generic_point_is_not_x_zero() {
        let mut rng = OsRng;
        let p = mul_gen(&Scalar::random(&mut rng), true).unwrap();
        assert!(!p.is_x_zero());
    }

    #[test]
    fn simul_matches_manual_combination() {
        let mut rng = OsRng;
        let a = Scalar::random(&mut rng);
        let b = Scalar::random(&mut rng);
        let p = mul_gen(&Scalar::random(&mut rng), true).unwrap();
        let q = mul_gen(&Scalar::random(&mut rng), true).unwrap();
        let r = simul(&a, &p, &b, &q).unwrap();
        let manual = Point(p.0 * a.0 + q.0 * b.0);
        assert_eq!(r.pack(), manual.pack());
    }

    #[test]
    fn elligator_encrypt_then_secret_recovers_mask() {
        let mut rng = OsRng;
        let seed = [7u8; 32];
        let e = elligator(&seed);
        let y = Scalar::random(&mut rng);
        let y_prime = elligator_encrypt(&y, &e).unwrap();
        let z = elligator_secret(&y, &y_prime, &e, None).unwrap();
        let expected = Point(EdwardsPoint::mul_base(&y.0) * y.0);
        assert_eq!(z.pack(), expected.pack());
    }
}
