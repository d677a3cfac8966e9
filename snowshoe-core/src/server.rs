//! Server State.
//!
//! Modeled as `enum Server { Uninitialized, Initialized(Inner) }`, a tagged
//! variant rather than a boolean flag field. The static private scalar and
//! signing sub-key live in `MLockedBytes`, so the secret-zeroization
//! invariant is enforced by `Drop`, not by caller discipline: replacing an
//! `Initialized` server with `Uninitialized`, or dropping it, frees and
//! zeroizes the old `Inner` automatically.

use crate::curve::{Scalar, mul_gen};
use crate::error::{Failed, Result};
use crate::hash::{blake2b32, constant_time_eq};
use crate::mlocked_bytes::MLockedBytes;
use crate::rng::EngineRng;

const SIGNING_SUBKEY_DOMAIN: &[u8] = b"snowshoe-core/server/signing-subkey";

/// Long-lived server static key pair plus its handshake/signature RNG.
pub enum Server {
    Uninitialized,
    Initialized(Inner),
}

pub struct Inner {
    private_scalar: MLockedBytes,
    public_point: [u8; 64],
    signing_subkey: MLockedBytes,
    pub(crate) rng: EngineRng,
}

impl Default for Server {
    fn default() -> Self {
        Server::Uninitialized
    }
}

impl Server {
    /// **generate(seed)**: draw a static private scalar via rejection
    /// sampling, compute the cofactor-cleared public point, derive the
    /// signing sub-key, and mark initialized. On any underlying failure the
    /// server remains `Uninitialized`; no secret is ever committed to `self`
    /// until generation fully succeeds.
    pub fn generate(seed_bytes: &[u8]) -> Result<Server> {
        crate::init::ensure_initialized()?;
        let mut rng = EngineRng::from_os_entropy()?;
        rng.seed(seed_bytes)?;

        let mut scalar = None;
        for _ in 0..crate::RETRY_CAP {
            let candidate = Scalar::random(&mut rng);
            if mul_gen(&candidate, true).is_ok() {
                scalar = Some(candidate);
                break;
            }
        }
        let private_scalar = scalar.ok_or(Failed)?;
        let public = mul_gen(&private_scalar, true)?;

        let mut priv_bytes = MLockedBytes::new(32).map_err(|_| Failed)?;
        priv_bytes
            .as_mut_slice()
            .copy_from_slice(&private_scalar.to_bytes());

        let subkey_bytes = blake2b32(&[SIGNING_SUBKEY_DOMAIN, &private_scalar.to_bytes()]);
        let mut signing_subkey = MLockedBytes::new(32).map_err(|_| Failed)?;
        signing_subkey.as_mut_slice().copy_from_slice(&subkey_bytes);

        Ok(Server::Initialized(Inner {
            private_scalar: priv_bytes,
            public_point: public.pack(),
            signing_subkey,
            rng,
        }))
    }

    /// **save(out)**: write `priv[32] ∥ pub[64] ∥ signkey[32]` to a 128-byte
    /// buffer. Requires initialized.
    pub fn save(&self, out: &mut [u8; 128]) -> Result<()> {
        crate::init::ensure_initialized()?;
        let inner = self.inner()?;
        out[..32].copy_from_slice(inner.private_scalar.as_slice());
        out[32..96].copy_from_slice(&inner.public_point);
        out[96..128].copy_from_slice(inner.signing_subkey.as_slice());
        Ok(())
    }

    /// **load(in)**: read the same 128-byte buffer, validating that the
    /// stored public point corresponds to `priv·G`. Fails on mismatch
    /// (including any single-bit tamper of the stored public point).
    pub fn load(bytes: &[u8; 128]) -> Result<Server> {
        crate::init::ensure_initialized()?;
        let mut priv_array = [0u8; 32];
        priv_array.copy_from_slice(&bytes[..32]);
        let mut pub_array = [0u8; 64];
        pub_array.copy_from_slice(&bytes[32..96]);
        let signing_subkey_bytes = &bytes[96..128];

        let private_scalar = Scalar::from_canonical_bytes(&priv_array)?;
        let expected_public = mul_gen(&private_scalar, true)?;
        if !constant_time_eq(&expected_public.pack(), &pub_array) {
            return Err(Failed);
        }

        let mut priv_bytes = MLockedBytes::new(32).map_err(|_| Failed)?;
        priv_bytes.as_mut_slice().copy_from_slice(&priv_array);
        let mut signing_subkey = MLockedBytes::new(32).map_err(|_| Failed)?;
        signing_subkey
            .as_mut_slice()
            .copy_from_slice(signing_subkey_bytes);

        let rng = EngineRng::from_os_entropy()?;

        Ok(Server::Initialized(Inner {
            private_scalar: priv_bytes,
            public_point: pub_array,
            signing_subkey,
            rng,
        }))
    }

    /// **clear()**: zeroize all secret fields and transition to
    /// uninitialized. Dropping the replaced `Inner` releases its
    /// `MLockedBytes` allocations, which zero themselves on `Drop`.
    pub fn clear(&mut self) {
        *self = Server::Uninitialized;
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self, Server::Initialized(_))
    }

    /// The server's static public point, `SP`.
    pub fn public_point(&self) -> Result<[u8; 64]> {
        Ok(self.inner()?.public_point)
    }

    pub(crate) fn inner(&self) -> Result<&Inner> {
        match self {
            Server::Initialized(inner) => Ok(inner),
            Server::Uninitialized => Err(Failed),
        }
    }

    pub(crate) fn inner_mut(&mut self) -> Result<&mut Inner> {
        match self {
            Server::Initialized(inner) => Ok(inner),
            Server::Uninitialized => Err(Failed),
        }
    }
}

impl Inner {
    pub(crate) fn private_scalar(&self) -> Scalar {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(self.private_scalar.as_slice());
        // `Scalar::from_canonical_bytes` was already validated at
        // generate/load time; the stored bytes are always canonical here.
        Scalar::from_canonical_bytes(&bytes).expect("server private scalar is always canonical")
    }

    pub(crate) fn signing_subkey(&self) -> &[u8] {
        self.signing_subkey.as_slice()
    }

    pub(crate) fn public_point(&self) -> [u8; 64] {
        self.public_point
    }
}
