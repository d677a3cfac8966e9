//! Password Engine.
//!
//! Augmented PAKE over the Scalar & Point Adapter, Elligator-masked so the
//! ephemeral points are indistinguishable from uniform bytestrings to a
//! passive observer. The memory-hard password hash is `argon2` (Argon2id):
//! `v` is derived as BLAKE2b(username ∥ realm ∥ password ∥ salt) fed
//! through Argon2id, then reduced mod q.
//!
//! Two profiles exist (desktop, mobile) with different Argon2 cost
//! parameters and, crucially, different proof-scalar algebra:
//!
//! - Desktop: client scalar `d = v·h`, `h` reusing the Elligator mask seed
//!   `e` (no fresh transcript hash); server recomputes `Z = 0·Y + (x·h)·V`.
//! - Mobile: client scalar `a = v·h + y`, `h = BLAKE2b(X′ ∥ Y′) mod q` (a
//!   fresh transcript hash binding both ephemeral masked points); server
//!   recomputes `Z = x·Y + (x·h)·V`.
//!
//! Both reduce to the same point `Z = v·h·x·G` (plus, in the mobile case,
//! the additional `x·y·G` cross term present on both sides) — see
//! DESIGN.md for the full derivation. The engine does not surface this
//! algebra to callers; it is purely an internal consistency argument for
//! why client and server land on identical `Z`.

use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::curve::{self, Point, Scalar, elligator, elligator_encrypt, elligator_secret, mul_gen};
use crate::error::{Failed, Result};
use crate::hash::{blake2b64, constant_time_eq};
use crate::mlocked_bytes::MLockedBytes;

/// Which of the two deployment profiles governs sizes and cost parameters.
/// An implementation MAY ship only one profile, but MUST NOT mix profile
/// constants within a single deployment's message formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordProfile {
    Desktop,
    Mobile,
}

impl PasswordProfile {
    #[must_use]
    pub fn salt_len(self) -> usize {
        match self {
            PasswordProfile::Desktop => 8,
            PasswordProfile::Mobile => 16,
        }
    }

    #[must_use]
    pub fn verifier_len(self) -> usize {
        64 + self.salt_len()
    }

    #[must_use]
    pub fn challenge_len(self) -> usize {
        64 + self.salt_len()
    }

    fn argon2_params(self) -> Params {
        let (t_cost, m_cost_kib) = match self {
            PasswordProfile::Desktop => (1000, 32),
            PasswordProfile::Mobile => (2, 12288),
        };
        Params::new(m_cost_kib, t_cost, 1, Some(32)).expect("fixed Argon2 params are always valid")
    }

    fn engine(self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.argon2_params())
    }
}

/// Derive the curve-reduced password scalar `v` via
/// BLAKE2b(username ∥ realm ∥ password ∥ salt) → Argon2id → mod q.
fn derive_v(profile: PasswordProfile, username: &[u8], realm: &[u8], password: &[u8], salt: &[u8]) -> Result<Scalar> {
    let prehash = blake2b64(&[username, realm, password, salt]);
    let mut out = [0u8; 32];
    profile
        .engine()
        .hash_password_into(&prehash, salt, &mut out)
        .map_err(|_| Failed)?;
    let v = Scalar::mod_q_narrow(&out);
    out.zeroize();
    Ok(v)
}

/// Draw the server's `x` / client's `y` ephemeral scalar per §6's
/// profile-dependent sampling width: desktop draws 32 raw bytes and reduces
/// narrow, mobile draws 64 bytes and reduces wide. Both land in `[0, q)`
/// with negligible bias either way; the widths are kept distinct because §6
/// states them as bit-exact profile constants.
fn random_session_scalar<R: RngCore + CryptoRng>(profile: PasswordProfile, rng: &mut R) -> Scalar {
    match profile {
        PasswordProfile::Desktop => {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            let scalar = Scalar::mod_q_narrow(&bytes);
            bytes.zeroize();
            scalar
        }
        PasswordProfile::Mobile => Scalar::random(rng),
    }
}

/// The password-derived Elligator mask seed, `e = BLAKE2b(V ∥ salt)`
/// truncated to 32 bytes, and its resulting curve point `E`.
fn derive_mask(verifier_point: &Point, salt: &[u8]) -> ([u8; 32], Point) {
    let wide = blake2b64(&[&verifier_point.pack(), salt]);
    let mut e = [0u8; 32];
    e.copy_from_slice(&wide[..32]);
    let mask = elligator(&e);
    (e, mask)
}

/// **Verifier generation** (client, account creation): draw salt, compute
/// `v`, `V = v·G`, and emit `V ∥ salt`. Retries with a fresh salt on the
/// negligible-probability `mul_gen` failure, up to [`crate::RETRY_CAP`].
pub fn verifier_generate<R: RngCore + CryptoRng>(
    profile: PasswordProfile,
    username: &[u8],
    realm: &[u8],
    password: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>> {
    crate::init::ensure_initialized()?;
    for _ in 0..crate::RETRY_CAP {
        let mut salt = vec![0u8; profile.salt_len()];
        rng.fill_bytes(&mut salt);

        let v = derive_v(profile, username, realm, password, &salt)?;
        let Ok(big_v) = mul_gen(&v, true) else {
            continue;
        };

        let mut out = Vec::with_capacity(profile.verifier_len());
        out.extend_from_slice(&big_v.pack());
        out.extend_from_slice(&salt);
        return Ok(out);
    }
    Err(Failed)
}

/// Server-side scratch for one PAKE round. Zeroizes its secret scalar `x`
/// on drop; `verifier_point`, `mask`, and `masked_point` are public values
/// recoverable from the stored verifier and do not need zeroization.
pub struct ChallengeSecret {
    profile: PasswordProfile,
    mask: Point,
    mask_seed: [u8; 32],
    x_bytes: MLockedBytes,
    verifier_point: Point,
    masked_point: Point,
}

impl ChallengeSecret {
    fn x(&self) -> Scalar {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(self.x_bytes.as_slice());
        Scalar::from_canonical_bytes(&bytes).expect("challenge secret x is always canonical")
    }
}

/// **Server challenge** (server, login attempt): given a stored `V ∥ salt`
/// verifier, mask a fresh ephemeral scalar `x` and emit `X′ ∥ salt`.
pub fn server_challenge<R: RngCore + CryptoRng>(
    profile: PasswordProfile,
    verifier_bytes: &[u8],
    rng: &mut R,
) -> Result<(ChallengeSecret, Vec<u8>)> {
    crate::init::ensure_initialized()?;
    if verifier_bytes.len() != profile.verifier_len() {
        return Err(Failed);
    }
    let mut verifier_point_bytes = [0u8; 64];
    verifier_point_bytes.copy_from_slice(&verifier_bytes[..64]);
    let verifier_point = Point::unpack(&verifier_point_bytes)?;
    let salt = &verifier_bytes[64..];

    let (mask_seed, mask) = derive_mask(&verifier_point, salt);

    for _ in 0..crate::RETRY_CAP {
        let x = random_session_scalar(profile, rng);
        let Ok(masked_point) = elligator_encrypt(&x, &mask) else {
            continue;
        };

        let mut x_bytes = MLockedBytes::new(32).map_err(|_| Failed)?;
        x_bytes.as_mut_slice().copy_from_slice(&x.to_bytes());

        let secret = ChallengeSecret {
            profile,
            mask,
            mask_seed,
            x_bytes,
            verifier_point,
            masked_point,
        };

        let mut out = Vec::with_capacity(profile.challenge_len());
        out.extend_from_slice(&masked_point.pack());
        out.extend_from_slice(salt);
        return Ok((secret, out));
    }
    Err(Failed)
}

/// `h` used in the client proof scalar: desktop reuses the Elligator mask
/// seed directly; mobile hashes the two masked ephemeral points afresh.
fn proof_hash(profile: PasswordProfile, mask_seed: &[u8; 32], masked_x: &[u8; 64], masked_y: &[u8; 64]) -> Scalar {
    match profile {
        PasswordProfile::Desktop => Scalar::mod_q_narrow(mask_seed),
        PasswordProfile::Mobile => Scalar::mod_q(&blake2b64(&[masked_x, masked_y])),
    }
}

fn proof_transcript(
    profile: PasswordProfile,
    mask: &Point,
    masked_x: &[u8; 64],
    masked_y: &[u8; 64],
    server_public: &[u8; 64],
    z: &Point,
) -> [u8; 64] {
    match profile {
        PasswordProfile::Desktop => blake2b64(&[&mask.pack(), server_public, &z.pack()]),
        PasswordProfile::Mobile => blake2b64(&[&mask.pack(), masked_x, masked_y, server_public, &z.pack()]),
    }
}

/// **Client proof**: recompute `v`, `E`, draw a fresh ephemeral `y`, bind it
/// to `v` via the profile's proof scalar, and emit `Y′ ∥ CPROOF`, retaining
/// `SPROOF` privately for [`client_verify_server_proof`].
pub fn client_proof<R: RngCore + CryptoRng>(
    profile: PasswordProfile,
    username: &[u8],
    realm: &[u8],
    password: &[u8],
    salt: &[u8],
    challenge_bytes: &[u8],
    rng: &mut R,
    server_public: &[u8; 64],
) -> Result<(Vec<u8>, [u8; 32])> {
    crate::init::ensure_initialized()?;
    if challenge_bytes.len() != profile.challenge_len() {
        return Err(Failed);
    }
    let mut masked_x = [0u8; 64];
    masked_x.copy_from_slice(&challenge_bytes[..64]);
    let big_x_prime = Point::unpack(&masked_x)?;

    let v = derive_v(profile, username, realm, password, salt)?;
    let verifier_point = mul_gen(&v, true)?;
    let (mask_seed, mask) = derive_mask(&verifier_point, salt);

    let mut masked_y = [0u8; 64];
    let mut y_chosen = None;
    for _ in 0..crate::RETRY_CAP {
        let y = random_session_scalar(profile, rng);
        if let Ok(big_y_prime) = elligator_encrypt(&y, &mask) {
            masked_y = big_y_prime.pack();
            y_chosen = Some(y);
            break;
        }
    }
    let y = y_chosen.ok_or(Failed)?;

    let h = proof_hash(profile, &mask_seed, &masked_x, &masked_y);
    let proof_scalar = match profile {
        PasswordProfile::Desktop => curve::mul_mod_q(&v, &h, &Scalar::ZERO),
        PasswordProfile::Mobile => curve::mul_mod_q(&v, &h, &y),
    };

    let z = elligator_secret(&proof_scalar, &big_x_prime, &mask, None)?;
    let transcript = proof_transcript(profile, &mask, &masked_x, &masked_y, server_public, &z);

    let mut cproof = [0u8; 32];
    cproof.copy_from_slice(&transcript[..32]);
    let mut sproof = [0u8; 32];
    sproof.copy_from_slice(&transcript[32..]);

    let mut out = Vec::with_capacity(96);
    out.extend_from_slice(&masked_y);
    out.extend_from_slice(&cproof);
    Ok((out, sproof))
}

/// **Server proof**: recompute the counter-scalar from `(x, V)` and, in the
/// mobile profile, the fresh transcript hash; verify the received `CPROOF`
/// and emit `SPROOF`.
pub fn server_proof(challenge_secret: &ChallengeSecret, client_proof_bytes: &[u8], server_public: &[u8; 64]) -> Result<[u8; 32]> {
    crate::init::ensure_initialized()?;
    if client_proof_bytes.len() != 96 {
        return Err(Failed);
    }
    let mut masked_y = [0u8; 64];
    masked_y.copy_from_slice(&client_proof_bytes[..64]);
    let mut received_cproof = [0u8; 32];
    received_cproof.copy_from_slice(&client_proof_bytes[64..]);

    let big_y_prime = Point::unpack(&masked_y)?;
    let masked_x = challenge_secret.masked_point.pack();

    let x = challenge_secret.x();
    let h = proof_hash(challenge_secret.profile, &challenge_secret.mask_seed, &masked_x, &masked_y);

    let (a_srv, b_srv) = match challenge_secret.profile {
        PasswordProfile::Desktop => (Scalar::ZERO, curve::mul_mod_q(&x, &h, &Scalar::ZERO)),
        PasswordProfile::Mobile => (x, curve::mul_mod_q(&x, &h, &Scalar::ZERO)),
    };

    let z = elligator_secret(
        &a_srv,
        &big_y_prime,
        &challenge_secret.mask,
        Some((&b_srv, &challenge_secret.verifier_point)),
    )?;

    let transcript = proof_transcript(
        challenge_secret.profile,
        &challenge_secret.mask,
        &masked_x,
        &masked_y,
        server_public,
        &z,
    );

    if !constant_time_eq(&transcript[..32], &received_cproof) {
        return Err(Failed);
    }

    let mut sproof = [0u8; 32];
    sproof.copy_from_slice(&transcript[32..]);
    Ok(sproof)
}

/// **Client verification of server proof**: constant-time compare.
pub fn client_verify_server_proof(stored_server_verifier: &[u8; 32], received_server_proof: &[u8; 32]) -> Result<()> {
    crate::init::ensure_initialized()?;
    if constant_time_eq(stored_server_verifier, received_server_proof) {
        Ok(())
    } else {
        Err(Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn dummy_server_public() -> [u8; 64] {
        let mut rng = OsRng;
        let k = Scalar::random(&mut rng);
        mul_gen(&k, true).unwrap().pack()
    }

    #[test]
    fn desktop_round_trip_mutual_accept() {
        crate::init::init();
        let mut rng = OsRng;
        let sp = dummy_server_public();
        let verifier = verifier_generate(
            PasswordProfile::Desktop,
            b"alice",
            b"tabby.test",
            b"correct horse battery staple",
            &mut rng,
        )
        .unwrap();
        assert_eq!(verifier.len(), PasswordProfile::Desktop.verifier_len());

        let salt = verifier[64..].to_vec();
        let (secret, challenge) = server_challenge(PasswordProfile::Desktop, &verifier, &mut rng).unwrap();

        let (client_proof_bytes, held_sproof) = client_proof(
            PasswordProfile::Desktop,
            b"alice",
            b"tabby.test",
            b"correct horse battery staple",
            &salt,
            &challenge,
            &mut rng,
            &sp,
        )
        .unwrap();

        let sproof = server_proof(&secret, &client_proof_bytes, &sp).unwrap();
        assert!(client_verify_server_proof(&held_sproof, &sproof).is_ok());
    }

    #[test]
    fn mobile_round_trip_mutual_accept() {
        crate::init::init();
        let mut rng = OsRng;
        let sp = dummy_server_public();
        let verifier = verifier_generate(
            PasswordProfile::Mobile,
            b"alice",
            b"tabby.test",
            b"correct horse battery staple",
            &mut rng,
        )
        .unwrap();
        assert_eq!(verifier.len(), PasswordProfile::Mobile.verifier_len());

        let salt = verifier[64..].to_vec();
        let (secret, challenge) = server_challenge(PasswordProfile::Mobile, &verifier, &mut rng).unwrap();

        let (client_proof_bytes, held_sproof) = client_proof(
            PasswordProfile::Mobile,
            b"alice",
            b"tabby.test",
            b"correct horse battery staple",
            &salt,
            &challenge,
            &mut rng,
            &sp,
        )
        .unwrap();

        let sproof = server_proof(&secret, &client_proof_bytes, &sp).unwrap();
        assert!(client_verify_server_proof(&held_sproof, &sproof).is_ok());
    }

    #[test]
    fn wrong_password_yields_mutual_reject() {
        crate::init::init();
        let mut rng = OsRng;
        let sp = dummy_server_public();
        let verifier = verifier_generate(
            PasswordProfile::Desktop,
            b"alice",
            b"tabby.test",
            b"correct horse battery staple",
            &mut rng,
        )
        .unwrap();
        let salt = verifier[64..].to_vec();
        let (secret, challenge) = server_challenge(PasswordProfile::Desktop, &verifier, &mut rng).unwrap();

        let (client_proof_bytes, _) = client_proof(
            PasswordProfile::Desktop,
            b"alice",
            b"tabby.test",
            b"correct horse battery staplE",
            &salt,
            &challenge,
            &mut rng,
            &sp,
        )
        .unwrap();

        assert!(server_proof(&secret, &client_proof_bytes, &sp).is_err());
    }
}
