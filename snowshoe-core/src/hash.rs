//! BLAKE2b helpers shared by every component.
//!
//! Thin wrappers over the `blake2` crate plus a constant-time equality
//! helper built on `subtle`.

use blake2::Blake2bMac;
use blake2::digest::consts::U64;
use blake2::digest::{FixedOutput, Mac};
use blake2::{Blake2b512, Digest};
use subtle::ConstantTimeEq;

type Blake2bMac512 = Blake2bMac<U64>;

/// Unkeyed BLAKE2b with a 64-byte digest, over an arbitrary number of
/// concatenated byte slices.
#[must_use]
pub fn blake2b64(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Blake2b512::new();
    for part in parts {
        Digest::update(&mut hasher, part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

/// Keyed BLAKE2b with a 64-byte digest. Used by the signature engine's
/// deterministic nonce derivation, keyed under the server's signing
/// sub-key.
#[must_use]
pub fn blake2b64_keyed(key: &[u8], parts: &[&[u8]]) -> [u8; 64] {
    let mut mac = Blake2bMac512::new_from_slice(key).expect("blake2b accepts keys up to 64 bytes");
    for part in parts {
        Mac::update(&mut mac, part);
    }
    let digest = mac.finalize_fixed();
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

/// Unkeyed BLAKE2b with a 32-byte digest, used for the server's signing
/// sub-key derivation and the password engine's Elligator seed.
#[must_use]
pub fn blake2b32(parts: &[&[u8]]) -> [u8; 32] {
    use blake2::Blake2b;
    use blake2::digest::consts::U32;

    let mut hasher = Blake2b::<U32>::new();
    for part in parts {
        Digest::update(&mut hasher, part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Constant-time byte equality, independent of where the first differing
/// byte occurs. Every proof and verifier comparison in this crate goes
/// through this helper rather than `==`.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
