use thiserror::Error;

/// The engine's single error kind.
///
/// Every failure mode listed in the protocol's error handling design —
/// uninitialized records, rejected scalars and points, proof mismatches,
/// RNG exhaustion, hash failures — collapses to this one variant.
/// Distinguishing failure modes to a caller would leak information about
/// which check failed, which is exactly what a timing or oracle attacker
/// wants.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("snowshoe-core operation failed")]
pub struct Failed;

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Failed>;
