//! Operation tree for history-tree primitives and its interpreter.
//!
//! Every primitive (insert, membership, consistency, verification) first
//! builds an [`Op`] tree describing exactly which nodes to hash, fetch, or
//! collect, then evaluates it in post-order with [`interpret`]. The same
//! evaluator serves the tree and its verifiers: `GetCache` resolves against
//! the frozen-node store in tree mode and against a caller-supplied audit
//! path in verification mode.

use qed_hashing::{Digest, Hasher};
use qed_storage::{Mutation, Table};

use crate::cache::PassThroughCache;
use crate::error::BalloonError;
use crate::navigation::{AuditPath, HistoryPosition};

type Result<T> = std::result::Result<T, BalloonError>;

/// One node of a history pruning plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Hash a leaf: `H(eventDigest, pos.bytes())`.
    Leaf {
        /// Leaf position `(version, 0)`.
        pos: HistoryPosition,
        /// The event digest stored at this version.
        digest: Digest,
    },
    /// `H(left, right)`.
    Inner {
        /// Position of the combined node.
        pos: HistoryPosition,
        /// Left subtree plan.
        left: Box<Op>,
        /// Right subtree plan.
        right: Box<Op>,
    },
    /// Single-child chain: the right subtree lies entirely above the
    /// current version, so the hash passes through unchanged.
    Partial {
        /// Position of the partial node.
        pos: HistoryPosition,
        /// Left subtree plan.
        left: Box<Op>,
    },
    /// Fetch the hash of a frozen node (tree mode) or take it from the
    /// supplied audit path (verification mode).
    GetCache {
        /// Position to resolve.
        pos: HistoryPosition,
    },
    /// Interpret the child and stage a mutation persisting the result.
    Put {
        /// Position being frozen.
        pos: HistoryPosition,
        /// Plan computing the hash to persist.
        inner: Box<Op>,
    },
    /// Interpret the child and record `(pos, result)` on the audit path.
    Collect {
        /// Position the collected hash witnesses.
        pos: HistoryPosition,
        /// Plan computing the collected hash.
        inner: Box<Op>,
    },
}

impl Op {
    /// The position this operation applies to.
    pub fn pos(&self) -> HistoryPosition {
        match self {
            Op::Leaf { pos, .. }
            | Op::Inner { pos, .. }
            | Op::Partial { pos, .. }
            | Op::GetCache { pos }
            | Op::Put { pos, .. }
            | Op::Collect { pos, .. } => *pos,
        }
    }
}

/// Where `GetCache` resolves hashes from.
pub enum CacheSource<'a> {
    /// Tree mode: read frozen nodes through the store.
    Frozen(&'a PassThroughCache),
    /// Verification mode: read from the proof's audit path.
    Provided(&'a AuditPath),
}

/// Accumulator state threaded through one interpretation.
pub struct Context<'a> {
    /// Hash function of the tree.
    pub hasher: &'a dyn Hasher,
    /// Resolution source for `GetCache`.
    pub source: CacheSource<'a>,
    /// Mutations staged by `Put` operations.
    pub mutations: Vec<Mutation>,
    /// Sibling hashes recorded by `Collect` operations.
    pub audit_path: AuditPath,
}

impl<'a> Context<'a> {
    /// Fresh context over the given hasher and cache source.
    pub fn new(hasher: &'a dyn Hasher, source: CacheSource<'a>) -> Self {
        Self {
            hasher,
            source,
            mutations: Vec::new(),
            audit_path: AuditPath::new(),
        }
    }
}

/// Evaluate a plan in post-order, returning the digest of its root.
pub fn interpret(op: &Op, ctx: &mut Context<'_>) -> Result<Digest> {
    match op {
        Op::Leaf { pos, digest } => Ok(ctx.hasher.hash(&[digest, &pos.bytes()])),
        Op::Inner { left, right, .. } => {
            let l = interpret(left, ctx)?;
            let r = interpret(right, ctx)?;
            Ok(ctx.hasher.hash(&[&l, &r]))
        }
        Op::Partial { left, .. } => interpret(left, ctx),
        Op::GetCache { pos } => match &ctx.source {
            CacheSource::Frozen(cache) => {
                let value = cache.get(&pos.bytes())?.ok_or_else(|| {
                    BalloonError::CorruptBatch(format!("missing frozen history node {pos:?}"))
                })?;
                if value.len() != ctx.hasher.len() {
                    return Err(BalloonError::CorruptBatch(format!(
                        "history node {pos:?} has width {}, expected {}",
                        value.len(),
                        ctx.hasher.len()
                    )));
                }
                Ok(value.to_vec())
            }
            CacheSource::Provided(path) => path
                .get(&pos.string_id())
                .cloned()
                .ok_or(BalloonError::HashMismatch),
        },
        Op::Put { pos, inner } => {
            let digest = interpret(inner, ctx)?;
            ctx.mutations
                .push(Mutation::new(Table::History, pos.bytes(), digest.clone()));
            Ok(digest)
        }
        Op::Collect { pos, inner } => {
            let digest = interpret(inner, ctx)?;
            ctx.audit_path.insert(pos.string_id(), digest.clone());
            Ok(digest)
        }
    }
}
