//! Verifiable append-only log built on a dual-tree authenticator.
//!
//! The [`Balloon`] accepts opaque event bytes, assigns each a monotonically
//! increasing version, and publishes a [`Commitment`] after every insertion.
//! Two Merkle structures back it:
//!
//! - a **history tree** indexed by insertion order, proving *"event E has
//!   version v under commitment C"* and *"commitment C₁ is a prefix of C₂"*;
//! - a **hyper tree**, a sparse Merkle tree keyed by event digest, proving
//!   *"the first occurrence of digest D is at version v (or D is absent)"*.
//!
//! Both trees share a pluggable [`Hasher`](qed_hashing::Hasher) and a
//! persistent [`Store`](qed_storage::Store); each primitive first builds a
//! declarative operation tree (pruning) and then interprets it, so the same
//! evaluator serves inserts, queries, and proof verification.

pub mod balloon;
pub mod cache;
pub mod config;
pub mod error;
pub mod history;
pub mod hyper;
pub mod navigation;
pub mod protocol;

#[cfg(test)]
mod tests;

pub use balloon::{Balloon, Commitment, IncrementalProof, MembershipProof};
pub use config::QedConfig;
pub use error::BalloonError;
pub use navigation::AuditPath;
