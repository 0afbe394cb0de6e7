//! Pruning plans for the hyper tree.
//!
//! Every primitive descends the digest bits from the root, loading each
//! touched batch into an arena exactly once. The cached zone (heights
//! above the cache height limit) always materializes inner nodes; the
//! stored zone collapses single-leaf subtrees into shortcuts and explodes
//! an existing shortcut downward when a new key shares its prefix.

use qed_hashing::{Digest, Hasher};
use qed_storage::{Store, Table};

use super::batch::{BATCH_HEIGHT, Batch};
use super::ops::{Op, shortcut_hash};
use crate::cache::ModifiableCache;
use crate::error::BalloonError;
use crate::navigation::HyperPosition;

type Result<T> = std::result::Result<T, BalloonError>;

/// Loads batches for the pruners: cached zone from the modifiable cache,
/// stored zone from the hyper table. A missing batch is an empty one.
pub struct BatchLoader<'a> {
    store: &'a Store,
    cache: &'a ModifiableCache,
    cache_height_limit: u16,
    width: usize,
}

impl<'a> BatchLoader<'a> {
    /// Loader over the tree's store slice and cache.
    pub fn new(
        store: &'a Store,
        cache: &'a ModifiableCache,
        cache_height_limit: u16,
        width: usize,
    ) -> Self {
        Self {
            store,
            cache,
            cache_height_limit,
            width,
        }
    }

    /// Digest width in bits.
    pub fn bits(&self) -> u16 {
        (self.width * 8) as u16
    }

    fn load(&self, pos: &HyperPosition) -> Result<Batch> {
        if pos.height() > self.cache_height_limit {
            match self.cache.get(&pos.cache_key()) {
                Some(bytes) => Batch::deserialize(self.width, &bytes),
                None => Ok(Batch::empty(self.width)),
            }
        } else {
            match self.store.get(Table::Hyper, &pos.batch_key())? {
                Some(bytes) => Batch::deserialize(self.width, &bytes),
                None => Ok(Batch::empty(self.width)),
            }
        }
    }
}

/// An insert plan plus the batch arena its operations address.
pub struct InsertPlan {
    /// Entry operation.
    pub op: Op,
    /// Batches loaded (and to be mutated) by the plan.
    pub batches: Vec<Batch>,
}

/// A membership-search plan. `found` carries the shortcut value when the
/// descent ended on the searched key.
pub struct SearchPlan {
    /// Entry operation.
    pub op: Op,
    /// Batches loaded by the plan.
    pub batches: Vec<Batch>,
    /// Value of the shortcut matching the searched key, if any.
    pub found: Option<Vec<u8>>,
}

/// A cache-rebuild plan for one stored batch root.
pub struct RebuildPlan {
    /// Entry operation.
    pub op: Op,
    /// Batches loaded by the plan.
    pub batches: Vec<Batch>,
}

struct PendingLeaf {
    key: Vec<u8>,
    value: Vec<u8>,
}

fn split_leaves(leaves: Vec<PendingLeaf>, pos: &HyperPosition) -> (Vec<PendingLeaf>, Vec<PendingLeaf>) {
    leaves
        .into_iter()
        .partition(|leaf| !pos.goes_right(&leaf.key))
}

// ---------------------------------------------------------------------------
// Insert
// ---------------------------------------------------------------------------

struct InsertPruner<'a> {
    loader: &'a BatchLoader<'a>,
    cache_height_limit: u16,
    batches: Vec<Batch>,
}

/// Plan the insertion of `(key → value)`.
pub fn prune_to_insert(key: &[u8], value: &[u8], loader: &BatchLoader<'_>) -> Result<InsertPlan> {
    let root = HyperPosition::root(loader.bits());
    let mut pruner = InsertPruner {
        loader,
        cache_height_limit: loader.cache_height_limit,
        batches: Vec::new(),
    };
    let root_batch = pruner.load(&root)?;
    let leaves = vec![PendingLeaf {
        key: key.to_vec(),
        value: value.to_vec(),
    }];
    let op = pruner.descend(root, leaves, root_batch, 0)?;
    Ok(InsertPlan {
        op,
        batches: pruner.batches,
    })
}

impl InsertPruner<'_> {
    fn load(&mut self, pos: &HyperPosition) -> Result<usize> {
        let batch = self.loader.load(pos)?;
        self.batches.push(batch);
        Ok(self.batches.len() - 1)
    }

    fn descend(
        &mut self,
        pos: HyperPosition,
        mut leaves: Vec<PendingLeaf>,
        batch: usize,
        slot: usize,
    ) -> Result<Op> {
        // Discarded branch: nothing to insert below here.
        if leaves.is_empty() {
            return Ok(if self.batches[batch].has(slot) {
                Op::GetProvided { pos, batch, slot }
            } else {
                Op::GetDefault { pos }
            });
        }

        // Bottom row of a batch: recurse into the child batch and write
        // its root hash back into this slot.
        if slot != 0 && pos.height() % BATCH_HEIGHT == 0 {
            let child_batch = self.load(&pos)?;
            let child = self.descend(pos.clone(), leaves, child_batch, 0)?;
            return Ok(Op::UpdateNode {
                pos,
                batch,
                slot,
                child: Box::new(child),
            });
        }

        // Cached zone: inner nodes only, batch re-cached at its root.
        if pos.height() > self.cache_height_limit {
            let (left_leaves, right_leaves) = split_leaves(leaves, &pos);
            let left = self.descend(pos.left(), left_leaves, batch, 2 * slot + 1)?;
            let right = self.descend(pos.right(), right_leaves, batch, 2 * slot + 2)?;
            let node = Op::UpdateNode {
                pos: pos.clone(),
                batch,
                slot,
                child: Box::new(Op::Inner {
                    pos: pos.clone(),
                    left: Box::new(left),
                    right: Box::new(right),
                }),
            };
            return Ok(if slot == 0 {
                Op::PutCache {
                    pos,
                    batch,
                    child: Box::new(node),
                }
            } else {
                node
            });
        }

        // Stored zone. An existing shortcut on the path is pushed down:
        // its leaf joins the pending set and descent re-runs on the freed
        // slot until the keys diverge.
        if self.batches[batch].is_shortcut(slot) {
            let (key, value) = self.batches[batch].shortcut_at(slot)?;
            self.batches[batch].clear_shortcut(slot);
            if let Some(pending) = leaves.iter_mut().find(|l| l.key == key) {
                // Re-add of a known digest: the first version wins.
                pending.value = value;
            } else {
                leaves.push(PendingLeaf { key, value });
                leaves.sort_by(|a, b| a.key.cmp(&b.key));
            }
            return self.descend(pos, leaves, batch, slot);
        }

        // A single leaf over an empty subtree terminates in a shortcut.
        if leaves.len() == 1 && !self.batches[batch].has(slot) {
            let leaf = leaves.remove(0);
            let node = Op::Shortcut {
                pos: pos.clone(),
                batch,
                slot,
                key: leaf.key,
                value: leaf.value,
            };
            return Ok(if slot == 0 {
                Op::MutateBatch {
                    pos,
                    batch,
                    child: Box::new(node),
                }
            } else {
                node
            });
        }

        // Internal node of a stored batch.
        let (left_leaves, right_leaves) = split_leaves(leaves, &pos);
        let left = self.descend(pos.left(), left_leaves, batch, 2 * slot + 1)?;
        let right = self.descend(pos.right(), right_leaves, batch, 2 * slot + 2)?;
        let node = Op::UpdateNode {
            pos: pos.clone(),
            batch,
            slot,
            child: Box::new(Op::Inner {
                pos: pos.clone(),
                left: Box::new(left),
                right: Box::new(right),
            }),
        };
        Ok(if slot == 0 {
            Op::MutateBatch {
                pos,
                batch,
                child: Box::new(node),
            }
        } else {
            node
        })
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

struct SearchPruner<'a> {
    loader: &'a BatchLoader<'a>,
    key: Vec<u8>,
    batches: Vec<Batch>,
    found: Option<Vec<u8>>,
}

/// Plan a membership search for `key`, collecting one sibling per level.
///
/// Descent stops at the first shortcut (matching or not) or at an empty
/// subtree; an empty root yields a bare `NoOp` and an empty audit path.
pub fn prune_to_find(key: &[u8], loader: &BatchLoader<'_>) -> Result<SearchPlan> {
    let root = HyperPosition::root(loader.bits());
    let mut pruner = SearchPruner {
        loader,
        key: key.to_vec(),
        batches: Vec::new(),
        found: None,
    };
    let root_batch = pruner.load(&root)?;
    let op = pruner.descend(root, root_batch, 0)?;
    Ok(SearchPlan {
        op,
        batches: pruner.batches,
        found: pruner.found,
    })
}

impl SearchPruner<'_> {
    fn load(&mut self, pos: &HyperPosition) -> Result<usize> {
        let batch = self.loader.load(pos)?;
        self.batches.push(batch);
        Ok(self.batches.len() - 1)
    }

    fn descend(&mut self, pos: HyperPosition, batch: usize, slot: usize) -> Result<Op> {
        if !self.batches[batch].has(slot) {
            return Ok(Op::NoOp { pos });
        }

        if self.batches[batch].is_shortcut(slot) {
            let (key, value) = self.batches[batch].shortcut_at(slot)?;
            if key == self.key {
                self.found = Some(value);
            }
            return Ok(Op::GetProvided { pos, batch, slot });
        }

        if slot != 0 && pos.height() % BATCH_HEIGHT == 0 {
            let child_batch = self.load(&pos)?;
            return self.descend(pos, child_batch, 0);
        }

        let (target, target_slot, sibling, sibling_slot) = if pos.goes_right(&self.key) {
            (pos.right(), 2 * slot + 2, pos.left(), 2 * slot + 1)
        } else {
            (pos.left(), 2 * slot + 1, pos.right(), 2 * slot + 2)
        };

        let target_op = self.descend(target, batch, target_slot)?;
        let sibling_read = if self.batches[batch].has(sibling_slot) {
            Op::GetProvided {
                pos: sibling.clone(),
                batch,
                slot: sibling_slot,
            }
        } else {
            Op::GetDefault {
                pos: sibling.clone(),
            }
        };
        let sibling_op = Op::Collect {
            pos: sibling,
            child: Box::new(sibling_read),
        };

        let (left, right) = if pos.goes_right(&self.key) {
            (sibling_op, target_op)
        } else {
            (target_op, sibling_op)
        };
        Ok(Op::Inner {
            pos,
            left: Box::new(left),
            right: Box::new(right),
        })
    }
}

// ---------------------------------------------------------------------------
// Cache rebuild
// ---------------------------------------------------------------------------

struct RebuildPruner<'a> {
    loader: &'a BatchLoader<'a>,
    target: HyperPosition,
    root_hash: Digest,
    batches: Vec<Batch>,
}

/// Plan the re-insertion of one stored batch root (at the cache height
/// limit) into the cached zone, recomputing its parent chain up to the
/// tree root.
pub fn prune_to_rebuild(
    target: HyperPosition,
    root_hash: Digest,
    loader: &BatchLoader<'_>,
) -> Result<RebuildPlan> {
    let root = HyperPosition::root(loader.bits());
    let mut pruner = RebuildPruner {
        loader,
        target,
        root_hash,
        batches: Vec::new(),
    };
    let root_batch = pruner.load(&root)?;
    let op = pruner.descend(root, root_batch, 0)?;
    Ok(RebuildPlan {
        op,
        batches: pruner.batches,
    })
}

impl RebuildPruner<'_> {
    fn load(&mut self, pos: &HyperPosition) -> Result<usize> {
        let batch = self.loader.load(pos)?;
        self.batches.push(batch);
        Ok(self.batches.len() - 1)
    }

    fn descend(&mut self, pos: HyperPosition, batch: usize, slot: usize) -> Result<Op> {
        if pos.height() == self.target.height() {
            return Ok(Op::UpdateNode {
                pos: pos.clone(),
                batch,
                slot,
                child: Box::new(Op::Literal {
                    pos,
                    digest: self.root_hash.clone(),
                }),
            });
        }

        if slot != 0 && pos.height() % BATCH_HEIGHT == 0 {
            let child_batch = self.load(&pos)?;
            let child = self.descend(pos.clone(), child_batch, 0)?;
            return Ok(Op::UpdateNode {
                pos,
                batch,
                slot,
                child: Box::new(child),
            });
        }

        let (target, target_slot, sibling, sibling_slot) = if pos.goes_right(self.target.index()) {
            (pos.right(), 2 * slot + 2, pos.left(), 2 * slot + 1)
        } else {
            (pos.left(), 2 * slot + 1, pos.right(), 2 * slot + 2)
        };

        let target_op = self.descend(target, batch, target_slot)?;
        let sibling_op = if self.batches[batch].has(sibling_slot) {
            Op::GetProvided {
                pos: sibling,
                batch,
                slot: sibling_slot,
            }
        } else {
            Op::GetDefault { pos: sibling }
        };

        let (left, right) = if pos.goes_right(self.target.index()) {
            (sibling_op, target_op)
        } else {
            (target_op, sibling_op)
        };
        let node = Op::UpdateNode {
            pos: pos.clone(),
            batch,
            slot,
            child: Box::new(Op::Inner {
                pos: pos.clone(),
                left: Box::new(left),
                right: Box::new(right),
            }),
        };
        Ok(if slot == 0 {
            Op::PutCache {
                pos,
                batch,
                child: Box::new(node),
            }
        } else {
            node
        })
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Plan the root reconstruction for a membership query: audit-path hashes
/// stand in for every sibling, and the leaf at `leaf_height` is either the
/// recomputed shortcut hash (found) or the default hash (absent).
pub fn prune_to_verify(
    hasher: &dyn Hasher,
    key: &[u8],
    value: Option<&[u8]>,
    leaf_height: u16,
    bits: u16,
) -> Op {
    fn recurse(
        pos: HyperPosition,
        hasher: &dyn Hasher,
        key: &[u8],
        value: Option<&[u8]>,
        leaf_height: u16,
    ) -> Op {
        if pos.height() == leaf_height {
            return match value {
                Some(value) => Op::Literal {
                    pos: pos.clone(),
                    digest: shortcut_hash(hasher, key, value),
                },
                None => Op::GetDefault { pos },
            };
        }
        let (target, sibling) = if pos.goes_right(key) {
            (pos.right(), pos.left())
        } else {
            (pos.left(), pos.right())
        };
        let target_op = recurse(target, hasher, key, value, leaf_height);
        let sibling_op = Op::UseProvided { pos: sibling };
        let (left, right) = if pos.goes_right(key) {
            (sibling_op, target_op)
        } else {
            (target_op, sibling_op)
        };
        Op::Inner {
            pos,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
    recurse(HyperPosition::root(bits), hasher, key, value, leaf_height)
}
