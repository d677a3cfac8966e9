//! Handshake Engine.
//!
//! A one-round augmented ephemeral-DH with server-side binding to the
//! static key: hash the public transcript, reduce mod q, and derive the
//! shared point and session key from it. Reuses `simul`/`simul_gen` from
//! the Scalar & Point Adapter for the combined scalar multiplications.

use zeroize::Zeroizing;

use crate::curve::{Point, Scalar, mul_gen, mul_mod_q, simul};
use crate::error::{Failed, Result};
use crate::hash::{blake2b64, constant_time_eq};
use crate::rng::EngineRng;
use crate::server::Server;

/// Client→server request, 96 bytes: `CP[64] ∥ CN[32]`.
pub type Request = [u8; 96];
/// Server→client response, 128 bytes: `EP[64] ∥ SN[32] ∥ PROOF[32]`.
pub type Response = [u8; 128];
/// The derived shared session key, 32 bytes.
pub type SessionKey = [u8; 32];

/// A short-lived client record: ephemeral key pair, nonce, and RNG.
/// Created per connection attempt; consumed by
/// [`Client::process_response`], so the type system — not caller
/// discipline — forbids reusing a `Client` for a second handshake.
pub struct Client {
    ephemeral_scalar: Scalar,
    ephemeral_point: Point,
    nonce: [u8; 32],
    rng: EngineRng,
}

impl Drop for Client {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.ephemeral_scalar.zeroize();
    }
}

impl Client {
    /// **gen**: draw a fresh ephemeral key pair and nonce from OS entropy
    /// mixed with `seed_bytes`.
    pub fn generate(seed_bytes: &[u8]) -> Result<Client> {
        crate::init::ensure_initialized()?;
        let mut rng = EngineRng::from_os_entropy()?;
        rng.seed(seed_bytes)?;
        Self::from_rng(rng)
    }

    /// **rekey(from_existing)**: re-derive a fresh `Client` from a prior
    /// one via [`EngineRng::derive`], avoiding a blocking OS-entropy draw.
    /// A fresh ephemeral key pair and nonce are always produced, even if
    /// `seed_bytes` repeats across calls, because `derive` ratchets the
    /// parent's own state forward on every call.
    pub fn rekey(parent: &mut Client, seed_bytes: &[u8]) -> Result<Client> {
        crate::init::ensure_initialized()?;
        let rng = parent.rng.derive(seed_bytes);
        Self::from_rng(rng)
    }

    fn from_rng(mut rng: EngineRng) -> Result<Client> {
        let mut ephemeral_scalar = None;
        for _ in 0..crate::RETRY_CAP {
            let candidate = Scalar::random(&mut rng);
            if mul_gen(&candidate, true).is_ok() {
                ephemeral_scalar = Some(candidate);
                break;
            }
        }
        let ephemeral_scalar = ephemeral_scalar.ok_or(Failed)?;
        let ephemeral_point = mul_gen(&ephemeral_scalar, true)?;

        let mut nonce = [0u8; 32];
        rng.random(&mut nonce);

        Ok(Client {
            ephemeral_scalar,
            ephemeral_point,
            nonce,
            rng,
        })
    }

    /// The 96-byte client request, `CP ∥ CN`.
    #[must_use]
    pub fn request(&self) -> Request {
        let mut out = [0u8; 96];
        out[..64].copy_from_slice(&self.ephemeral_point.pack());
        out[64..].copy_from_slice(&self.nonce);
        out
    }

    /// **Client processing**: recompute the transcript hash and the shared
    /// point `T`, reject on `h = 0` or `T.X = 0` or a proof mismatch, and
    /// emit the derived session key on success. Consumes `self`, so a
    /// `Client` cannot be reused for a second handshake.
    pub fn process_response(self, server_public: &[u8; 64], response: &Response) -> Result<SessionKey> {
        crate::init::ensure_initialized()?;
        let mut ep_bytes = [0u8; 64];
        ep_bytes.copy_from_slice(&response[..64]);
        let ep = Point::unpack(&ep_bytes)?;
        let mut sn = [0u8; 32];
        sn.copy_from_slice(&response[64..96]);
        let mut proof = [0u8; 32];
        proof.copy_from_slice(&response[96..128]);

        let sp = Point::unpack(server_public)?;

        let wide_h = blake2b64(&[
            &self.ephemeral_point.pack(),
            &self.nonce,
            &ep_bytes,
            server_public,
            &sn,
        ]);
        let h = Scalar::mod_q(&wide_h);
        if h.is_zero() {
            return Err(Failed);
        }

        let d = mul_mod_q(&h, &self.ephemeral_scalar, &Scalar::ZERO);
        if d.is_zero() {
            // d = 0 would enable a trivial subgroup fault, so both h and d
            // are checked here, not just h.
            return Err(Failed);
        }

        let t = simul(&self.ephemeral_scalar, &ep, &d, &sp)?;
        if t.is_x_zero() {
            return Err(Failed);
        }

        let mut material = Zeroizing::new([0u8; 64]);
        material.copy_from_slice(&blake2b64(&[&t.pack(), &wide_h]));

        if !constant_time_eq(&material[32..], &proof) {
            return Err(Failed);
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&material[..32]);
        Ok(key)
    }
}

/// **Server processing**: draw a fresh ephemeral key pair and nonce,
/// retrying up to [`crate::RETRY_CAP`] times whenever `h = 0` or `T.X = 0`
/// occurs, and respond with `EP ∥ SN ∥ PROOF` plus the session key `k` the
/// server derived alongside that proof (step 6 of spec.md §4.D derives
/// `k ∥ PROOF` together; the server needs `k` for anything downstream of the
/// handshake just as the client does).
pub fn server_respond(server: &mut Server, request: &Request) -> Result<(Response, SessionKey)> {
    crate::init::ensure_initialized()?;
    let mut cp_bytes = [0u8; 64];
    cp_bytes.copy_from_slice(&request[..64]);
    let cp = Point::unpack(&cp_bytes)?;
    let mut cn = [0u8; 32];
    cn.copy_from_slice(&request[64..]);

    let static_scalar = server.inner()?.private_scalar();
    let static_public = server.inner()?.public_point();

    for _ in 0..crate::RETRY_CAP {
        let inner = server.inner_mut()?;

        let mut ephemeral_scalar = None;
        for _ in 0..crate::RETRY_CAP {
            let candidate = Scalar::random(&mut inner.rng);
            if mul_gen(&candidate, true).is_ok() {
                ephemeral_scalar = Some(candidate);
                break;
            }
        }
        let ephemeral_scalar = ephemeral_scalar.ok_or(Failed)?;
        let ep = mul_gen(&ephemeral_scalar, true)?;

        let mut sn = [0u8; 32];
        inner.rng.random(&mut sn);

        let wide_h = blake2b64(&[&cp_bytes, &cn, &ep.pack(), &static_public, &sn]);
        let h = Scalar::mod_q(&wide_h);
        if h.is_zero() {
            continue;
        }

        let d = mul_mod_q(&h, &static_scalar, &Scalar::ZERO);
        let t = simul(&ephemeral_scalar, &cp, &d, &cp)?;
        if t.is_x_zero() {
            continue;
        }

        let material = blake2b64(&[&t.pack(), &wide_h]);

        let mut response = [0u8; 128];
        response[..64].copy_from_slice(&ep.pack());
        response[64..96].copy_from_slice(&sn);
        response[96..128].copy_from_slice(&material[32..]);

        let mut key = [0u8; 32];
        key.copy_from_slice(&material[..32]);
        return Ok((response, key));
    }
    Err(Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_derive_identical_session_key() {
        crate::init::init();
        let mut server = Server::generate(b"handshake-server-seed").unwrap();
        let sp = server.public_point().unwrap();
        let client = Client::generate(b"handshake-client-seed").unwrap();
        let request = client.request();

        let (response, server_key) = server_respond(&mut server, &request).unwrap();
        let client_key = client.process_response(&sp, &response).unwrap();
        assert_eq!(client_key, server_key);
    }

    #[test]
    fn replacing_server_public_key_makes_client_reject() {
        crate::init::init();
        let mut server = Server::generate(b"handshake-binding-server-seed").unwrap();
        let other_server = Server::generate(b"handshake-binding-other-seed").unwrap();
        let wrong_sp = other_server.public_point().unwrap();

        let client = Client::generate(b"handshake-binding-client-seed").unwrap();
        let request = client.request();
        let (response, _server_key) = server_respond(&mut server, &request).unwrap();

        assert!(client.process_response(&wrong_sp, &response).is_err());
    }

    #[test]
    fn rekey_does_not_reuse_ephemeral_material() {
        crate::init::init();
        let mut parent = Client::generate(b"handshake-rekey-seed").unwrap();
        let parent_request = parent.request();
        let child = Client::rekey(&mut parent, b"rekey-seed-bytes").unwrap();
        assert_ne!(parent_request, child.request());
    }

    #[test]
    fn two_handshakes_against_same_server_yield_different_keys() {
        crate::init::init();
        let mut server = Server::generate(b"handshake-uniqueness-server-seed").unwrap();
        let sp = server.public_point().unwrap();

        let client_a = Client::generate(b"handshake-uniqueness-client-a").unwrap();
        let request_a = client_a.request();
        let (response_a, server_key_a) = server_respond(&mut server, &request_a).unwrap();
        let key_a = client_a.process_response(&sp, &response_a).unwrap();
        assert_eq!(key_a, server_key_a);

        let client_b = Client::generate(b"handshake-uniqueness-client-b").unwrap();
        let request_b = client_b.request();
        let (response_b, server_key_b) = server_respond(&mut server, &request_b).unwrap();
        let key_b = client_b.process_response(&sp, &response_b).unwrap();
        assert_eq!(key_b, server_key_b);

        assert_ne!(key_a, key_b);
    }
}
