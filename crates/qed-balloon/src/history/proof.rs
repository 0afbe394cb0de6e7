//! Root reconstruction for history-tree proofs.
//!
//! Verification replays the pruning plans with `GetCache` resolved against
//! the proof's audit path instead of the store; the reconstructed root is
//! compared bytewise against the claimed one.

use qed_hashing::{Digest, Hasher};

use super::ops::{CacheSource, Context, interpret};
use super::pruning;
use crate::navigation::AuditPath;

/// Check a membership audit path: rebuild the root at `version` from the
/// event digest at `index` plus the supplied siblings.
pub fn verify_membership(
    hasher: &dyn Hasher,
    digest: &[u8],
    index: u64,
    version: u64,
    path: &AuditPath,
    expected_root: &Digest,
) -> bool {
    let op = pruning::prune_to_verify(index, version, digest.to_vec());
    let mut ctx = Context::new(hasher, CacheSource::Provided(path));
    match interpret(&op, &mut ctx) {
        Ok(root) => &root == expected_root,
        Err(_) => false,
    }
}

/// Check an incremental audit path: rebuild both the `start` and `end`
/// roots from the combined path and compare each against its commitment.
pub fn verify_incremental(
    hasher: &dyn Hasher,
    start: u64,
    end: u64,
    path: &AuditPath,
    start_root: &Digest,
    end_root: &Digest,
) -> bool {
    let start_op = pruning::prune_to_verify_incremental_start(start);
    let mut ctx = Context::new(hasher, CacheSource::Provided(path));
    let rebuilt_start = match interpret(&start_op, &mut ctx) {
        Ok(root) => root,
        Err(_) => return false,
    };

    let end_op = pruning::prune_to_verify_incremental_end(start, end);
    let mut ctx = Context::new(hasher, CacheSource::Provided(path));
    let rebuilt_end = match interpret(&end_op, &mut ctx) {
        Ok(root) => root,
        Err(_) => return false,
    };

    &rebuilt_start == start_root && &rebuilt_end == end_root
}
