//! Signature Engine.
//!
//! Deterministic-nonce Schnorr signature over the server's static key,
//! identical in structure to Ed25519, built over the Scalar & Point
//! Adapter rather than `ed25519-dalek`'s bundled signer — the static key
//! lives in `MLockedBytes`, which `ed25519_dalek::SigningKey` does not
//! accept as a backing store.

use crate::curve::{Point, Scalar, mul_gen, mul_mod_q, neg_mod_q, simul_gen};
use crate::error::{Failed, Result};
use crate::hash::{blake2b64, blake2b64_keyed, constant_time_eq};
use crate::server::Server;

/// A detached signature: `R[64] ∥ s[32]`, 96 bytes.
pub type Signature = [u8; 96];

/// **Sign(M) → σ**: `r = BLAKE2b-64(M)` keyed by the signing sub-key,
/// reduced mod q; `R = r·G` cofactor-cleared; `t = BLAKE2b-64(SP ∥ R ∥ M)`
/// reduced mod q; `s = r + t·s̄ (mod q)`. Constant-time in the secret key.
/// Fails if `r ≡ 0` (the caller may retry with a different message framing,
/// or accept the failure — this crate does not retry internally, since a
/// genuine `r = 0` indicates the keyed hash itself collided with zero, not
/// a transient condition worth looping on).
pub fn sign(server: &Server, message: &[u8]) -> Result<Signature> {
    crate::init::ensure_initialized()?;
    let inner = server.inner()?;
    let static_scalar = inner.private_scalar();
    let public_point = inner.public_point();

    let wide_r = blake2b64_keyed(inner.signing_subkey(), &[message]);
    let r = Scalar::mod_q(&wide_r);
    if r.is_zero() {
        return Err(Failed);
    }

    let big_r = mul_gen(&r, true)?;
    let wide_t = blake2b64(&[&public_point, &big_r.pack(), message]);
    let t = Scalar::mod_q(&wide_t);

    let s = mul_mod_q(&t, &static_scalar, &r);

    let mut sig = [0u8; 96];
    sig[..64].copy_from_slice(&big_r.pack());
    sig[64..].copy_from_slice(&s.to_bytes());
    Ok(sig)
}

/// **Verify(M, SP, σ) → ok**: recompute `t` from the public transcript and
/// accept iff `U = s·G − t·SP` equals `R` byte-for-byte. Verification does
/// not need to be constant-time (there is no secret key involved), but the
/// final comparison still goes through [`constant_time_eq`] for uniformity
/// with every other proof comparison in this crate.
pub fn verify(server_public: &[u8; 64], message: &[u8], signature: &Signature) -> Result<()> {
    crate::init::ensure_initialized()?;
    let mut r_bytes = [0u8; 64];
    r_bytes.copy_from_slice(&signature[..64]);
    let big_r = Point::unpack(&r_bytes)?;

    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&signature[64..]);
    let s = Scalar::from_canonical_bytes(&s_bytes)?;

    let sp = Point::unpack(server_public)?;

    let wide_t = blake2b64(&[server_public, &r_bytes, message]);
    let t = Scalar::mod_q(&wide_t);

    // U = s·G − t·SP, expressed as simul_gen(s, −t, SP) = s·G + (−t)·SP.
    let u = match simul_gen(&s, &neg_mod_q(&t), &sp) {
        Ok(u) => u,
        Err(_) => return Err(Failed),
    };
    if constant_time_eq(&u.pack(), &r_bytes) {
        Ok(())
    } else {
        Err(Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        crate::init::init();
        let server = Server::generate(b"signature-engine-seed").unwrap();
        let sp = server.public_point().unwrap();
        let sig = sign(&server, b"hello").unwrap();
        assert!(verify(&sp, b"hello", &sig).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_signature_byte() {
        crate::init::init();
        let server = Server::generate(b"signature-engine-tamper-seed").unwrap();
        let sp = server.public_point().unwrap();
        let mut sig = sign(&server, b"hello").unwrap();
        sig[47] ^= 0x01;
        assert!(verify(&sp, b"hello", &sig).is_err());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        crate::init::init();
        let server = Server::generate(b"signature-engine-msg-seed").unwrap();
        let sp = server.public_point().unwrap();
        let sig = sign(&server, b"hello").unwrap();
        assert!(verify(&sp, b"hellp", &sig).is_err());
    }

    #[test]
    fn verify_rejects_wrong_public_key() {
        crate::init::init();
        let server = Server::generate(b"signature-engine-key-a").unwrap();
        let other = Server::generate(b"signature-engine-key-b").unwrap();
        let other_sp = other.public_point().unwrap();
        let sig = sign(&server, b"hello").unwrap();
        assert!(verify(&other_sp, b"hello", &sig).is_err());
    }

    #[test]
    fn signing_is_deterministic() {
        crate::init::init();
        let server = Server::generate(b"signature-engine-determinism-seed").unwrap();
        let sig_a = sign(&server, b"repeat").unwrap();
        let sig_b = sign(&server, b"repeat").unwrap();
        assert_eq!(sig_a, sig_b);
    }
}
