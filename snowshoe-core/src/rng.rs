//! Randomness Adapter.
//!
//! A real CSPRNG with reseed and non-blocking fork-derive: `EngineRng`
//! wraps a `ChaCha20Rng` and re-keys itself from a BLAKE2b-512 ratchet
//! after every draw, so a compromise of the state after drawing output
//! *i* does not expose output *i-1*.

use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRng, OsRng, RngCore, SeedableRng, TryRngCore};
use zeroize::Zeroizing;

use crate::error::{Failed, Result};
use crate::hash::blake2b64;

const DOMAIN_SEED: &[u8] = b"snowshoe-core/rng/seed";
const DOMAIN_RATCHET: &[u8] = b"snowshoe-core/rng/ratchet";
const DOMAIN_DERIVE: &[u8] = b"snowshoe-core/rng/derive";

/// A CSPRNG instance with reseed and non-blocking fork-derive.
pub struct EngineRng {
    inner: ChaCha20Rng,
    key: Zeroizing<[u8; 64]>,
    counter: u64,
}

impl EngineRng {
    /// Construct a fresh generator keyed purely from the OS entropy source.
    /// Used by `Server::generate` and fresh `Client` creation.
    pub fn from_os_entropy() -> Result<EngineRng> {
        let mut entropy = Zeroizing::new([0u8; 32]);
        OsRng.try_fill_bytes(entropy.as_mut_slice()).map_err(|_| Failed)?;
        Ok(Self::rekey_from(&entropy, &[]))
    }

    /// `seed(seed_bytes)`: (re)mix caller-supplied entropy into the internal
    /// state; also draws from the OS source.
    pub fn seed(&mut self, seed_bytes: &[u8]) -> Result<()> {
        let mut entropy = Zeroizing::new([0u8; 32]);
        OsRng.try_fill_bytes(entropy.as_mut_slice()).map_err(|_| Failed)?;
        *self = Self::rekey_from(&entropy, seed_bytes);
        Ok(())
    }

    /// `random(out)`: write uniform bytes, ratcheting the internal key
    /// afterward so that a later compromise cannot recover earlier output.
    pub fn random(&mut self, out: &mut [u8]) {
        self.inner.fill_bytes(out);
        self.counter = self.counter.wrapping_add(1);
        let digest = blake2b64(&[
            DOMAIN_RATCHET,
            self.key.as_ref(),
            out,
            &self.counter.to_le_bytes(),
        ]);
        self.key.copy_from_slice(&digest);
        self.inner = ChaCha20Rng::from_seed(chacha_seed(&digest));
    }

    /// `derive(parent, seed_bytes)`: initialize a child generator from this
    /// generator's current key plus optional seed bytes, without touching
    /// the OS entropy source. Used by client rekey to stay non-blocking.
    ///
    /// Also ratchets the parent's own key forward (the same mechanism
    /// [`random`](Self::random) uses), so that two `derive` calls against
    /// the same parent with identical `seed_bytes` never produce the same
    /// child: a fresh ephemeral key and nonce is required on every rekey,
    /// even under repeated rekey with identical input seeds.
    pub fn derive(&mut self, seed_bytes: &[u8]) -> EngineRng {
        let digest = blake2b64(&[DOMAIN_DERIVE, self.key.as_ref(), seed_bytes]);
        let ratchet = blake2b64(&[DOMAIN_RATCHET, self.key.as_ref(), &digest]);
        self.key.copy_from_slice(&ratchet);
        self.inner = ChaCha20Rng::from_seed(chacha_seed(&ratchet));
        EngineRng {
            inner: ChaCha20Rng::from_seed(chacha_seed(&digest)),
            key: Zeroizing::new(digest),
            counter: 0,
        }
    }

    fn rekey_from(entropy: &[u8; 32], seed_bytes: &[u8]) -> EngineRng {
        let digest = blake2b64(&[DOMAIN_SEED, entropy, seed_bytes]);
        EngineRng {
            inner: ChaCha20Rng::from_seed(chacha_seed(&digest)),
            key: Zeroizing::new(digest),
            counter: 0,
        }
    }
}

impl RngCore for EngineRng {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.random(dest);
    }
}

impl CryptoRng for EngineRng {}

fn chacha_seed(digest: &[u8; 64]) -> [u8; 32] {
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest[..32]);
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_output_changes_key() {
        let mut rng = EngineRng::from_os_entropy().unwrap();
        let key_before = *rng.key;
        let mut out = [0u8; 32];
        rng.random(&mut out);
        assert_ne!(key_before, *rng.key);
    }

    #[test]
    fn repeated_derive_with_same_seed_bytes_still_diverges() {
        // `derive` never calls OsRng, but repeated rekeys from the same
        // parent with identical seed bytes must still produce distinct
        // children, since the parent's key ratchets forward on every call.
        let mut parent = EngineRng::from_os_entropy().unwrap();
        let mut a = parent.derive(b"rekey");
        let mut b = parent.derive(b"rekey");
        let mut out_a = [0u8; 16];
        let mut out_b = [0u8; 16];
        a.random(&mut out_a);
        b.random(&mut out_b);
        assert_ne!(out_a, out_b);
    }

    #[test]
    fn derive_with_different_seed_bytes_diverges() {
        let mut parent = EngineRng::from_os_entropy().unwrap();
        let mut a = parent.derive(b"one");
        let mut b = parent.derive(b"two");
        let mut out_a = [0u8; 16];
        let mut out_b = [0u8; 16];
        a.random(&mut out_a);
        b.random(&mut out_b);
        assert_ne!(out_a, out_b);
    }
}
