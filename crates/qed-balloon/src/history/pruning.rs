//! Pruning plans for the history tree.
//!
//! Each builder walks the version-bounded tree shape and emits the minimal
//! operation tree for its primitive. Frozen subtrees collapse into
//! `GetCache`; subtrees entirely above the current version collapse into
//! `Partial` chains; siblings that are not yet frozen are recomputed from
//! their frozen descendants so proofs for any past version stay
//! constructible.

use qed_hashing::Digest;

use super::ops::Op;
use crate::navigation::HistoryPosition;

fn boxed(op: Op) -> Box<Op> {
    Box::new(op)
}

/// Plan the append of `digest` at `version`.
///
/// The new leaf is always persisted; every inner node the insertion
/// freezes is wrapped in `Put` so it reaches the store exactly once.
pub fn prune_to_insert(version: u64, digest: Digest) -> Op {
    fn recurse(pos: HistoryPosition, version: u64, digest: &Digest) -> Op {
        if pos.is_leaf() {
            return Op::Put {
                pos,
                inner: boxed(Op::Leaf {
                    pos,
                    digest: digest.clone(),
                }),
            };
        }
        let right = pos.right();
        if version < right.index() {
            return Op::Partial {
                pos,
                left: boxed(recurse(pos.left(), version, digest)),
            };
        }
        let inner = Op::Inner {
            pos,
            left: boxed(Op::GetCache { pos: pos.left() }),
            right: boxed(recurse(right, version, digest)),
        };
        if pos.is_frozen_at(version) {
            Op::Put {
                pos,
                inner: boxed(inner),
            }
        } else {
            inner
        }
    }
    recurse(HistoryPosition::root(version), version, &digest)
}

/// Recompute the hash of a subtree as it stood at `version`, reading only
/// frozen nodes. Collapses to `GetCache` as soon as the subtree is frozen.
fn recompute(pos: HistoryPosition, version: u64) -> Op {
    if pos.is_leaf() || pos.is_frozen_at(version) {
        return Op::GetCache { pos };
    }
    let right = pos.right();
    if version < right.index() {
        Op::Partial {
            pos,
            left: boxed(recompute(pos.left(), version)),
        }
    } else {
        Op::Inner {
            pos,
            left: boxed(recompute(pos.left(), version)),
            right: boxed(recompute(right, version)),
        }
    }
}

/// Plan a membership proof for the leaf at `index` within the tree at
/// `version`: every sibling on the path is collected.
pub fn prune_to_find(index: u64, version: u64) -> Op {
    fn recurse(pos: HistoryPosition, index: u64, version: u64) -> Op {
        if pos.is_leaf() {
            return Op::GetCache { pos };
        }
        let right = pos.right();
        if index < right.index() {
            let left = boxed(recurse(pos.left(), index, version));
            if version < right.index() {
                Op::Partial { pos, left }
            } else {
                Op::Inner {
                    pos,
                    left,
                    right: boxed(Op::Collect {
                        pos: right,
                        inner: boxed(recompute(right, version)),
                    }),
                }
            }
        } else {
            Op::Inner {
                pos,
                left: boxed(Op::Collect {
                    pos: pos.left(),
                    inner: boxed(Op::GetCache { pos: pos.left() }),
                }),
                right: boxed(recurse(right, index, version)),
            }
        }
    }
    recurse(HistoryPosition::root(version), index, version)
}

/// Plan the combined audit path witnessing that version `start` is a
/// prefix of version `end`: traverse the `end` tree, descending wherever a
/// subtree contains `start` or `end`, collecting everything else.
pub fn prune_to_check_consistency(start: u64, end: u64) -> Op {
    fn recurse(pos: HistoryPosition, start: u64, end: u64) -> Op {
        if pos.is_leaf() {
            return Op::Collect {
                pos,
                inner: boxed(Op::GetCache { pos }),
            };
        }
        let right = pos.right();
        let descend = |child: HistoryPosition| {
            if child.contains(start) || child.contains(end) {
                recurse(child, start, end)
            } else {
                Op::Collect {
                    pos: child,
                    inner: boxed(recompute(child, end)),
                }
            }
        };
        let left = boxed(descend(pos.left()));
        if end < right.index() {
            Op::Partial { pos, left }
        } else {
            Op::Inner {
                pos,
                left,
                right: boxed(descend(right)),
            }
        }
    }
    recurse(HistoryPosition::root(end), start, end)
}

/// Plan the root reconstruction for a membership proof: audit-path hashes
/// stand in for the siblings and the leaf is recomputed from the event.
pub fn prune_to_verify(index: u64, version: u64, digest: Digest) -> Op {
    fn recurse(pos: HistoryPosition, index: u64, version: u64, digest: &Digest) -> Op {
        if pos.is_leaf() {
            return Op::Leaf {
                pos,
                digest: digest.clone(),
            };
        }
        let right = pos.right();
        if index < right.index() {
            let left = boxed(recurse(pos.left(), index, version, digest));
            if version < right.index() {
                Op::Partial { pos, left }
            } else {
                Op::Inner {
                    pos,
                    left,
                    right: boxed(Op::GetCache { pos: right }),
                }
            }
        } else {
            Op::Inner {
                pos,
                left: boxed(Op::GetCache { pos: pos.left() }),
                right: boxed(recurse(right, index, version, digest)),
            }
        }
    }
    recurse(HistoryPosition::root(version), index, version, &digest)
}

/// Plan the reconstruction of the root at version `start` from a combined
/// incremental audit path.
pub fn prune_to_verify_incremental_start(start: u64) -> Op {
    fn recurse(pos: HistoryPosition, start: u64) -> Op {
        if pos.is_leaf() {
            return Op::GetCache { pos };
        }
        let right = pos.right();
        if start < right.index() {
            Op::Partial {
                pos,
                left: boxed(recurse(pos.left(), start)),
            }
        } else {
            Op::Inner {
                pos,
                left: boxed(Op::GetCache { pos: pos.left() }),
                right: boxed(recurse(right, start)),
            }
        }
    }
    recurse(HistoryPosition::root(start), start)
}

/// Plan the reconstruction of the root at version `end` from a combined
/// incremental audit path, descending wherever a subtree contains `start`
/// or `end`.
pub fn prune_to_verify_incremental_end(start: u64, end: u64) -> Op {
    fn recurse(pos: HistoryPosition, start: u64, end: u64) -> Op {
        if pos.is_leaf() {
            return Op::GetCache { pos };
        }
        let right = pos.right();
        let descend = |child: HistoryPosition| {
            if child.contains(start) || child.contains(end) {
                recurse(child, start, end)
            } else {
                Op::GetCache { pos: child }
            }
        };
        let left = boxed(descend(pos.left()));
        if end < right.index() {
            Op::Partial { pos, left }
        } else {
            Op::Inner {
                pos,
                left,
                right: boxed(descend(right)),
            }
        }
    }
    recurse(HistoryPosition::root(end), start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(index: u64, height: u16) -> HistoryPosition {
        HistoryPosition::new(index, height)
    }

    fn leaf(p: HistoryPosition, digest: u8) -> Op {
        Op::Leaf {
            pos: p,
            digest: vec![digest],
        }
    }

    fn inner(p: HistoryPosition, left: Op, right: Op) -> Op {
        Op::Inner {
            pos: p,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn partial(p: HistoryPosition, left: Op) -> Op {
        Op::Partial {
            pos: p,
            left: Box::new(left),
        }
    }

    fn get_cache(p: HistoryPosition) -> Op {
        Op::GetCache { pos: p }
    }

    fn put(p: HistoryPosition, inner: Op) -> Op {
        Op::Put {
            pos: p,
            inner: Box::new(inner),
        }
    }

    fn collect(p: HistoryPosition, inner: Op) -> Op {
        Op::Collect {
            pos: p,
            inner: Box::new(inner),
        }
    }

    #[test]
    fn test_prune_to_verify_shapes() {
        let cases: Vec<(u64, u64, u8, Op)> = vec![
            (0, 0, 0x0, leaf(pos(0, 0), 0x0)),
            (
                0,
                1,
                0x0,
                inner(pos(0, 1), leaf(pos(0, 0), 0x0), get_cache(pos(1, 0))),
            ),
            (
                1,
                1,
                0x1,
                inner(pos(0, 1), get_cache(pos(0, 0)), leaf(pos(1, 0), 0x1)),
            ),
            (
                1,
                2,
                0x1,
                inner(
                    pos(0, 2),
                    inner(pos(0, 1), get_cache(pos(0, 0)), leaf(pos(1, 0), 0x1)),
                    get_cache(pos(2, 1)),
                ),
            ),
            (
                6,
                6,
                0x6,
                inner(
                    pos(0, 3),
                    get_cache(pos(0, 2)),
                    inner(
                        pos(4, 2),
                        get_cache(pos(4, 1)),
                        partial(pos(6, 1), leaf(pos(6, 0), 0x6)),
                    ),
                ),
            ),
            (
                1,
                7,
                0x1,
                inner(
                    pos(0, 3),
                    inner(
                        pos(0, 2),
                        inner(pos(0, 1), get_cache(pos(0, 0)), leaf(pos(1, 0), 0x1)),
                        get_cache(pos(2, 1)),
                    ),
                    get_cache(pos(4, 2)),
                ),
            ),
        ];

        for (index, version, digest, expected) in cases {
            let pruned = prune_to_verify(index, version, vec![digest]);
            assert_eq!(pruned, expected, "verify plan mismatch for index {index} version {version}");
        }
    }

    #[test]
    fn test_prune_to_verify_incremental_end_shapes() {
        let cases: Vec<(u64, Op)> = vec![
            (0, get_cache(pos(0, 0))),
            (1, inner(pos(0, 1), get_cache(pos(0, 0)), get_cache(pos(1, 0)))),
            (
                2,
                inner(
                    pos(0, 2),
                    inner(pos(0, 1), get_cache(pos(0, 0)), get_cache(pos(1, 0))),
                    partial(pos(2, 1), get_cache(pos(2, 0))),
                ),
            ),
            (
                4,
                inner(
                    pos(0, 3),
                    inner(
                        pos(0, 2),
                        inner(pos(0, 1), get_cache(pos(0, 0)), get_cache(pos(1, 0))),
                        get_cache(pos(2, 1)),
                    ),
                    partial(pos(4, 2), partial(pos(4, 1), get_cache(pos(4, 0)))),
                ),
            ),
            (
                6,
                inner(
                    pos(0, 3),
                    inner(
                        pos(0, 2),
                        inner(pos(0, 1), get_cache(pos(0, 0)), get_cache(pos(1, 0))),
                        get_cache(pos(2, 1)),
                    ),
                    inner(
                        pos(4, 2),
                        get_cache(pos(4, 1)),
                        partial(pos(6, 1), get_cache(pos(6, 0))),
                    ),
                ),
            ),
        ];

        for (version, expected) in cases {
            let pruned = prune_to_verify_incremental_end(0, version);
            assert_eq!(pruned, expected, "incremental end plan mismatch at version {version}");
        }
    }

    #[test]
    fn test_prune_to_verify_incremental_start_navigates_rightmost_path() {
        assert_eq!(prune_to_verify_incremental_start(0), get_cache(pos(0, 0)));
        assert_eq!(
            prune_to_verify_incremental_start(2),
            inner(
                pos(0, 2),
                get_cache(pos(0, 1)),
                partial(pos(2, 1), get_cache(pos(2, 0))),
            )
        );
    }

    #[test]
    fn test_prune_to_insert_freezes_completed_subtrees() {
        assert_eq!(prune_to_insert(0, vec![0x0]), put(pos(0, 0), leaf(pos(0, 0), 0x0)));

        // Version 6 completes nothing above the leaf.
        assert_eq!(
            prune_to_insert(6, vec![0x6]),
            inner(
                pos(0, 3),
                get_cache(pos(0, 2)),
                inner(
                    pos(4, 2),
                    get_cache(pos(4, 1)),
                    partial(pos(6, 1), put(pos(6, 0), leaf(pos(6, 0), 0x6))),
                ),
            )
        );

        // Version 7 freezes the whole left spine up to the root.
        assert_eq!(
            prune_to_insert(7, vec![0x7]),
            put(
                pos(0, 3),
                inner(
                    pos(0, 3),
                    get_cache(pos(0, 2)),
                    put(
                        pos(4, 2),
                        inner(
                            pos(4, 2),
                            get_cache(pos(4, 1)),
                            put(
                                pos(6, 1),
                                inner(
                                    pos(6, 1),
                                    get_cache(pos(6, 0)),
                                    put(pos(7, 0), leaf(pos(7, 0), 0x7)),
                                ),
                            ),
                        ),
                    ),
                ),
            )
        );
    }

    #[test]
    fn test_prune_to_find_recomputes_unfrozen_siblings() {
        // Membership of version 0 in the tree at version 4: the right
        // sibling (4,2) holds a single leaf and is recomputed through a
        // partial chain.
        assert_eq!(
            prune_to_find(0, 4),
            inner(
                pos(0, 3),
                inner(
                    pos(0, 2),
                    inner(
                        pos(0, 1),
                        get_cache(pos(0, 0)),
                        collect(pos(1, 0), get_cache(pos(1, 0))),
                    ),
                    collect(pos(2, 1), get_cache(pos(2, 1))),
                ),
                collect(
                    pos(4, 2),
                    partial(pos(4, 2), partial(pos(4, 1), get_cache(pos(4, 0)))),
                ),
            )
        );
    }

    #[test]
    fn test_prune_to_check_consistency_collects_both_paths() {
        let op = prune_to_check_consistency(2, 6);
        let mut collected = Vec::new();
        fn walk(op: &Op, out: &mut Vec<HistoryPosition>) {
            match op {
                Op::Collect { pos, inner } => {
                    out.push(*pos);
                    walk(inner, out);
                }
                Op::Inner { left, right, .. } => {
                    walk(left, out);
                    walk(right, out);
                }
                Op::Partial { left, .. } => walk(left, out),
                Op::Put { inner, .. } => walk(inner, out),
                Op::Leaf { .. } | Op::GetCache { .. } => {}
            }
        }
        walk(&op, &mut collected);
        collected.sort();

        let mut expected = vec![pos(0, 1), pos(2, 0), pos(3, 0), pos(4, 1), pos(6, 0)];
        expected.sort();
        assert_eq!(collected, expected);
    }
}
