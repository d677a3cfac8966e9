//! Handshake, signature, and augmented-PAKE protocol engine over a twisted
//! Edwards curve and BLAKE2b: one module per protocol component, a single
//! collapsed error type, and a process-wide idempotent `init`.
//!
//! The curve arithmetic, the memory-hard password hash, the CSPRNG, the
//! constant-time comparator, and the zeroizer are built on
//! `curve25519-dalek`, `argon2`, `rand_chacha`, `subtle`, and `zeroize`
//! respectively. See `DESIGN.md` for the grounding of each choice.

pub mod curve;
pub mod error;
pub mod handshake;
pub mod hash;
pub mod init;
pub mod mlocked_bytes;
pub mod password;
pub mod rng;
pub mod server;
pub mod signature;

pub use error::{Failed, Result};
pub use init::{ensure_initialized, init};

/// Cap on bounded retry loops around Elligator/RNG draws (server nonce
/// redraw on `h = 0`, `T.X = 0` redraw, password-verifier salt redraw): a
/// defensible bound that prevents pathological non-termination under a
/// hostile RNG without ever being reachable under an honest one.
pub(crate) const RETRY_CAP: u32 = 64;
