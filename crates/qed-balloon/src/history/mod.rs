//! The history tree: a binary Merkle tree indexed by insertion order.
//!
//! Leaves are the ordered sequence of event digests. A node is *frozen*
//! once its subtree is fully populated; frozen hashes are written to the
//! store exactly once, at the insertion that completes them, and all other
//! hashes are recomputed on demand from frozen descendants.

pub mod ops;
pub mod proof;
pub mod pruning;

use std::sync::Arc;

use qed_hashing::{Digest, Hasher};
use qed_storage::{Mutation, Store, Table};
use tracing::debug;

use crate::cache::PassThroughCache;
use crate::error::BalloonError;
use crate::navigation::AuditPath;

use self::ops::{CacheSource, Context, interpret};

type Result<T> = std::result::Result<T, BalloonError>;

/// Append-only Merkle tree over event digests.
pub struct HistoryTree {
    hasher: Box<dyn Hasher>,
    cache: PassThroughCache,
}

impl HistoryTree {
    /// Create a tree reading frozen nodes from the store's history table.
    pub fn new(hasher: Box<dyn Hasher>, store: Arc<Store>) -> Self {
        Self {
            hasher,
            cache: PassThroughCache::new(store, Table::History),
        }
    }

    /// Append `digest` as version `version`.
    ///
    /// Returns the new root and the mutations persisting the leaf and
    /// every newly frozen node. The caller applies them atomically.
    pub fn add(&mut self, digest: &[u8], version: u64) -> Result<(Digest, Vec<Mutation>)> {
        let op = pruning::prune_to_insert(version, digest.to_vec());
        let mut ctx = Context::new(&*self.hasher, CacheSource::Frozen(&self.cache));
        let root = interpret(&op, &mut ctx)?;
        debug!(version, frozen = ctx.mutations.len(), "appended history leaf");
        Ok((root, ctx.mutations))
    }

    /// Collect the audit path proving the leaf at `index` under the root
    /// at `version`.
    pub fn prove_membership(&self, index: u64, version: u64) -> Result<AuditPath> {
        let op = pruning::prune_to_find(index, version);
        let mut ctx = Context::new(&*self.hasher, CacheSource::Frozen(&self.cache));
        interpret(&op, &mut ctx)?;
        Ok(ctx.audit_path)
    }

    /// Collect the combined audit path witnessing that the tree at
    /// `start` is a prefix of the tree at `end`.
    pub fn prove_consistency(&self, start: u64, end: u64) -> Result<AuditPath> {
        let op = pruning::prune_to_check_consistency(start, end);
        let mut ctx = Context::new(&*self.hasher, CacheSource::Frozen(&self.cache));
        interpret(&op, &mut ctx)?;
        Ok(ctx.audit_path)
    }
}
