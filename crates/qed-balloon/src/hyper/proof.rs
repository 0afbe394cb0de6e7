//! Membership query proofs for the hyper tree.

use qed_hashing::{Digest, Hasher};

use super::ops::{Context, interpret};
use super::pruning;
use crate::navigation::{AuditPath, field_to_version};

/// Result of a hyper membership query: the searched digest, the stored
/// value when the descent ended on a matching shortcut, and one collected
/// sibling per traversed level.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryProof {
    /// The searched event digest.
    pub key: Digest,
    /// Raw value of the matching shortcut, absent when the key is not in
    /// the tree.
    pub value: Option<Vec<u8>>,
    /// Collected sibling hashes.
    pub audit_path: AuditPath,
}

impl QueryProof {
    /// Assemble a proof.
    pub fn new(key: Digest, value: Option<Vec<u8>>, audit_path: AuditPath) -> Self {
        Self {
            key,
            value,
            audit_path,
        }
    }

    /// The version recorded for the key, if found.
    pub fn version(&self) -> Option<u64> {
        self.value.as_deref().map(field_to_version)
    }

    /// Rebuild the root from the audit path and compare it against
    /// `expected_root`.
    ///
    /// The path length fixes the height the descent stopped at: each
    /// traversed level contributes exactly one sibling. A found key
    /// recomputes the shortcut hash there; an absent key can only be
    /// checked when the divergence hit an empty subtree (default hash) —
    /// proving non-membership against foreign shortcuts is out of scope.
    pub fn verify(&self, hasher: &dyn Hasher, expected_root: &Digest) -> bool {
        verify_query(
            hasher,
            &self.key,
            self.value.as_deref(),
            &self.audit_path,
            expected_root,
        )
    }
}

/// Rebuild a hyper root from a query audit path.
pub fn verify_query(
    hasher: &dyn Hasher,
    key: &[u8],
    value: Option<&[u8]>,
    path: &AuditPath,
    expected_root: &Digest,
) -> bool {
    let bits = hasher.bits();
    if path.len() > bits as usize {
        return false;
    }

    let mut default_hashes = Vec::with_capacity(bits as usize);
    default_hashes.push(hasher.hash(&[&[0x00], &[0x00]]));
    for i in 1..bits as usize {
        let prev = &default_hashes[i - 1];
        default_hashes.push(hasher.hash(&[prev, prev]));
    }

    let leaf_height = bits - path.len() as u16;
    let op = pruning::prune_to_verify(hasher, key, value, leaf_height, bits);
    let mut ctx = Context::for_verification(hasher, &default_hashes, path);
    match interpret(&op, &mut [], &mut ctx) {
        Ok(root) => &root == expected_root,
        Err(_) => false,
    }
}
