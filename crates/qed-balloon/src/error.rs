//! Error types for the balloon crate.

use qed_storage::StoreError;

/// Errors surfaced by the balloon and its trees.
#[derive(Debug, thiserror::Error)]
pub enum BalloonError {
    /// The underlying store failed. Retriable; no state was changed.
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    /// A stored batch or node violated a structural invariant. Fatal for
    /// the affected operation; recover from backup.
    #[error("corrupt batch: {0}")]
    CorruptBatch(String),

    /// A query referenced a version the log has not reached, or an
    /// inverted incremental range.
    #[error("version {queried} is beyond the current version {current}")]
    VersionGap {
        /// The version the caller asked about.
        queried: u64,
        /// The highest version the log has assigned.
        current: u64,
    },

    /// A recomputed root does not match the claimed commitment.
    #[error("recomputed root does not match the commitment")]
    HashMismatch,

    /// A wire message could not be decoded.
    #[error("malformed wire message: {0}")]
    Malformed(String),
}
