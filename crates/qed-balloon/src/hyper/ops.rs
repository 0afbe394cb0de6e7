//! Operation tree for hyper-tree primitives and its interpreter.
//!
//! Hyper plans differ from history plans in that they operate on loaded
//! [`Batch`]es: pruning loads every batch the primitive touches into an
//! arena, operations address slots by `(batch, slot)`, and interpretation
//! writes recomputed hashes back into the arena before `PutCache` /
//! `MutateBatch` serialize a batch into a staged mutation.

use qed_hashing::{Digest, Hasher};
use qed_storage::{Mutation, Table};

use super::batch::Batch;
use crate::error::BalloonError;
use crate::navigation::{AuditPath, HyperPosition};

type Result<T> = std::result::Result<T, BalloonError>;

/// One node of a hyper pruning plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// `H(left, right)`.
    Inner {
        /// Position of the combined node.
        pos: HyperPosition,
        /// Left subtree plan.
        left: Box<Op>,
        /// Right subtree plan.
        right: Box<Op>,
    },
    /// The default hash of an empty subtree at this height.
    GetDefault {
        /// Position of the empty subtree.
        pos: HyperPosition,
    },
    /// Read the hash already present in a batch slot.
    GetProvided {
        /// Position the slot covers.
        pos: HyperPosition,
        /// Arena index of the batch.
        batch: usize,
        /// Slot within the batch.
        slot: usize,
    },
    /// Hash a shortcut leaf (`H(key, value)`) and write it, with its key
    /// and value, into the batch.
    Shortcut {
        /// Position the shortcut terminates descent at.
        pos: HyperPosition,
        /// Arena index of the batch.
        batch: usize,
        /// Slot within the batch.
        slot: usize,
        /// Full event digest.
        key: Digest,
        /// Version field stored at the leaf.
        value: Vec<u8>,
    },
    /// Interpret the child and write the result into a batch slot as an
    /// inner-node hash.
    UpdateNode {
        /// Position the slot covers.
        pos: HyperPosition,
        /// Arena index of the batch.
        batch: usize,
        /// Slot within the batch.
        slot: usize,
        /// Plan computing the slot's hash.
        child: Box<Op>,
    },
    /// Interpret the child, then serialize the batch into a cache-table
    /// mutation (cached zone; applied to the in-memory cache on commit).
    PutCache {
        /// Batch root position.
        pos: HyperPosition,
        /// Arena index of the batch.
        batch: usize,
        /// Plan filling the batch.
        child: Box<Op>,
    },
    /// Interpret the child, then serialize the batch into a hyper-table
    /// mutation (stored zone).
    MutateBatch {
        /// Batch root position.
        pos: HyperPosition,
        /// Arena index of the batch.
        batch: usize,
        /// Plan filling the batch.
        child: Box<Op>,
    },
    /// Interpret the child and record `(pos, result)` on the audit path.
    Collect {
        /// Position the collected hash witnesses.
        pos: HyperPosition,
        /// Plan computing the collected hash.
        child: Box<Op>,
    },
    /// Take the hash from an externally supplied audit path
    /// (verification mode).
    UseProvided {
        /// Position to look up.
        pos: HyperPosition,
    },
    /// A digest computed at planning time.
    Literal {
        /// Position the digest belongs to.
        pos: HyperPosition,
        /// The digest.
        digest: Digest,
    },
    /// Empty subtree marker: yields the default hash and ends descent.
    NoOp {
        /// Position of the empty subtree.
        pos: HyperPosition,
    },
}

impl Op {
    /// The position this operation applies to.
    pub fn pos(&self) -> &HyperPosition {
        match self {
            Op::Inner { pos, .. }
            | Op::GetDefault { pos }
            | Op::GetProvided { pos, .. }
            | Op::Shortcut { pos, .. }
            | Op::UpdateNode { pos, .. }
            | Op::PutCache { pos, .. }
            | Op::MutateBatch { pos, .. }
            | Op::Collect { pos, .. }
            | Op::UseProvided { pos }
            | Op::Literal { pos, .. }
            | Op::NoOp { pos } => pos,
        }
    }
}

/// Accumulator state threaded through one interpretation.
pub struct Context<'a> {
    /// Hash function of the tree.
    pub hasher: &'a dyn Hasher,
    /// Precomputed empty-subtree hashes, indexed by height.
    pub default_hashes: &'a [Digest],
    /// Audit path supplied by a proof (verification mode).
    pub provided: Option<&'a AuditPath>,
    /// Mutations staged by `PutCache` / `MutateBatch`.
    pub mutations: Vec<Mutation>,
    /// Sibling hashes recorded by `Collect`.
    pub audit_path: AuditPath,
}

impl<'a> Context<'a> {
    /// Fresh context for tree-side plans.
    pub fn new(hasher: &'a dyn Hasher, default_hashes: &'a [Digest]) -> Self {
        Self {
            hasher,
            default_hashes,
            provided: None,
            mutations: Vec::new(),
            audit_path: AuditPath::new(),
        }
    }

    /// Fresh context for verification plans.
    pub fn for_verification(
        hasher: &'a dyn Hasher,
        default_hashes: &'a [Digest],
        provided: &'a AuditPath,
    ) -> Self {
        Self {
            provided: Some(provided),
            ..Self::new(hasher, default_hashes)
        }
    }

    fn default_hash(&self, pos: &HyperPosition) -> Digest {
        // The lone out-of-range height is the root of an empty tree,
        // which evaluates to the deepest precomputed default.
        let idx = (pos.height() as usize).min(self.default_hashes.len() - 1);
        self.default_hashes[idx].clone()
    }
}

/// Hash of a shortcut leaf holding `value` under the full `key`.
pub fn shortcut_hash(hasher: &dyn Hasher, key: &[u8], value: &[u8]) -> Digest {
    hasher.hash(&[key, value])
}

/// Evaluate a plan in post-order, returning the digest of its root.
pub fn interpret(op: &Op, batches: &mut [Batch], ctx: &mut Context<'_>) -> Result<Digest> {
    match op {
        Op::Inner { left, right, .. } => {
            let l = interpret(left, batches, ctx)?;
            let r = interpret(right, batches, ctx)?;
            Ok(ctx.hasher.hash(&[&l, &r]))
        }
        Op::GetDefault { pos } | Op::NoOp { pos } => Ok(ctx.default_hash(pos)),
        Op::GetProvided { pos, batch, slot } => batches[*batch]
            .hash_at(*slot)
            .map(|h| h.to_vec())
            .ok_or_else(|| {
                BalloonError::CorruptBatch(format!("batch slot {slot} missing at {pos:?}"))
            }),
        Op::Shortcut {
            batch,
            slot,
            key,
            value,
            ..
        } => {
            let leaf = shortcut_hash(ctx.hasher, key, value);
            batches[*batch].set_shortcut(*slot, &leaf, key, value);
            Ok(leaf)
        }
        Op::UpdateNode { batch, slot, child, .. } => {
            let digest = interpret(child, batches, ctx)?;
            batches[*batch].set_inner(*slot, &digest);
            Ok(digest)
        }
        Op::PutCache { pos, batch, child } => {
            let digest = interpret(child, batches, ctx)?;
            ctx.mutations.push(Mutation::new(
                Table::HyperCache,
                pos.cache_key(),
                batches[*batch].serialize(),
            ));
            Ok(digest)
        }
        Op::MutateBatch { pos, batch, child } => {
            let digest = interpret(child, batches, ctx)?;
            ctx.mutations.push(Mutation::new(
                Table::Hyper,
                pos.batch_key(),
                batches[*batch].serialize(),
            ));
            Ok(digest)
        }
        Op::Collect { pos, child } => {
            let digest = interpret(child, batches, ctx)?;
            ctx.audit_path.insert(pos.string_id(), digest.clone());
            Ok(digest)
        }
        Op::UseProvided { pos } => ctx
            .provided
            .and_then(|path| path.get(&pos.string_id()))
            .cloned()
            .ok_or(BalloonError::HashMismatch),
        Op::Literal { digest, .. } => Ok(digest.clone()),
    }
}
