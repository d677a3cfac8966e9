//! Process-wide one-time initialization.
//!
//! Modeled as an idempotent "ensure initialized" call rather than a
//! singleton holding mutable state. There is no mutable global state to
//! seed in this crate — `curve25519-dalek` ships its constants pre-baked
//! and needs no runtime table build — but every public entry point still
//! calls `ensure_initialized` first, so an uninitialized library rejects
//! every call, and so a future engine-wide precomputation has a single
//! place to live.

use std::sync::OnceLock;

use crate::error::{Failed, Result};

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Idempotent initialization. Safe to call from multiple threads
/// concurrently; subsequent calls are no-ops.
pub fn init() {
    INITIALIZED.get_or_init(|| ());
}

/// Returns `Failed` unless [`init`] has already run at least once.
pub fn ensure_initialized() -> Result<()> {
    if INITIALIZED.get().is_some() {
        Ok(())
    } else {
        Err(Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        assert!(ensure_initialized().is_ok());
    }
}
