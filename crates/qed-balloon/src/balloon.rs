//! The balloon: history and hyper trees behind one append/query façade.
//!
//! `add` serializes all writes: it assigns the next version, plans both
//! tree insertions, commits their mutations in one atomic store write, and
//! only then updates the hyper cache and the version counter. A failed
//! store write therefore leaves no visible state change. Queries take
//! shared access and may run in parallel with each other.

use std::sync::{Arc, RwLock};

use qed_hashing::{Digest, Hasher, HasherKind};
use qed_storage::{Mutation, Store, Table};
use tracing::debug;

use crate::error::BalloonError;
use crate::history::{self, HistoryTree};
use crate::hyper::proof::verify_query;
use crate::hyper::{DEFAULT_CACHE_BATCHES, HyperTree};
use crate::navigation::{AuditPath, bytes_to_u64, u64_to_bytes, version_to_field};

type Result<T> = std::result::Result<T, BalloonError>;

/// Public commitment published after every insertion: both tree roots plus
/// the version they cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    /// History-tree root over versions `0..=version`.
    pub history_digest: Digest,
    /// Hyper-tree root at the same instant.
    pub hyper_digest: Digest,
    /// Version assigned to the inserted event.
    pub version: u64,
}

/// Proof that an event is (or is not) in the log under a commitment.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipProof {
    /// Whether the event was in the log at `query_version`.
    pub exists: bool,
    /// Hyper-tree audit path for the event digest.
    pub hyper_path: AuditPath,
    /// History-tree audit path for `actual_version`; empty when the event
    /// does not exist at `query_version`.
    pub history_path: AuditPath,
    /// The log's version when the proof was generated.
    pub current_version: u64,
    /// The version the caller asked about.
    pub query_version: u64,
    /// First version at which the event's digest was added.
    pub actual_version: u64,
    /// Digest of the queried event.
    pub key_digest: Digest,
    /// The queried event bytes.
    pub key: Vec<u8>,
}

/// Proof that the log at `start` is a prefix of the log at `end`.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementalProof {
    /// Earlier version.
    pub start: u64,
    /// Later version.
    pub end: u64,
    /// Combined audit path reconstructing both roots.
    pub audit_path: AuditPath,
}

/// The combined authenticator. Single writer, many readers.
pub struct Balloon {
    store: Arc<Store>,
    hasher: Box<dyn Hasher>,
    history: RwLock<HistoryTree>,
    hyper: RwLock<HyperTree>,
    /// Next version to assign; bumped only after a successful commit.
    next_version: RwLock<u64>,
}

impl Balloon {
    /// Open a balloon over `store`, recovering the version counter from
    /// the last persisted history leaf.
    pub fn new(store: Arc<Store>, kind: HasherKind, cache_batches: usize) -> Result<Self> {
        let history = HistoryTree::new(kind.new_hasher(), Arc::clone(&store));
        let hyper = HyperTree::new(kind.new_hasher(), Arc::clone(&store), cache_batches)?;

        let next_version = match store.get_last(Table::History)? {
            Some((key, _)) => bytes_to_u64(&key[..8]) + 1,
            None => 0,
        };

        Ok(Self {
            store,
            hasher: kind.new_hasher(),
            history: RwLock::new(history),
            hyper: RwLock::new(hyper),
            next_version: RwLock::new(next_version),
        })
    }

    /// Open with the production cache sizing.
    pub fn open(store: Arc<Store>, kind: HasherKind) -> Result<Self> {
        Self::new(store, kind, DEFAULT_CACHE_BATCHES)
    }

    /// Version of the most recent insertion, or `None` for an empty log.
    pub fn version(&self) -> Option<u64> {
        self.next_version
            .read()
            .expect("version lock poisoned")
            .checked_sub(1)
    }

    /// Append an event: hash it, insert into both trees, commit one
    /// atomic mutation batch, and return the joint commitment.
    ///
    /// A digest that was already added leaves the hyper tree and the index
    /// table untouched; only the history tree grows.
    pub fn add(&self, event: &[u8]) -> Result<Commitment> {
        let key_digest = self.hasher.hash(&[event]);

        let mut history = self.history.write().expect("history lock poisoned");
        let mut hyper = self.hyper.write().expect("hyper lock poisoned");
        let mut next_version = self.next_version.write().expect("version lock poisoned");
        let version = *next_version;

        let first_occurrence = self.store.get(Table::Index, &key_digest)?.is_none();
        let (history_digest, mut mutations) = history.add(&key_digest, version)?;
        let hyper_digest = if first_occurrence {
            let (root, hyper_mutations) = hyper.add(&key_digest, version)?;
            mutations.extend(hyper_mutations);
            mutations.push(Mutation::new(
                Table::Index,
                key_digest.clone(),
                u64_to_bytes(version).to_vec(),
            ));
            root
        } else {
            hyper.root()?
        };

        // The single externally visible write. On failure nothing below
        // runs: caches and the version counter stay untouched.
        self.store.mutate(&mutations)?;
        hyper.update_cache(&mutations);
        *next_version = version + 1;

        debug!(version, first_occurrence, "added event");
        Ok(Commitment {
            history_digest,
            hyper_digest,
            version,
        })
    }

    /// Prove membership of `event` as of `version`.
    pub fn query_membership(&self, event: &[u8], version: u64) -> Result<MembershipProof> {
        let history = self.history.read().expect("history lock poisoned");
        let hyper = self.hyper.read().expect("hyper lock poisoned");
        let next_version = self.next_version.read().expect("version lock poisoned");

        let current = next_version.checked_sub(1).ok_or(BalloonError::VersionGap {
            queried: version,
            current: 0,
        })?;
        if version > current {
            return Err(BalloonError::VersionGap {
                queried: version,
                current,
            });
        }

        let key_digest = self.hasher.hash(&[event]);
        let query_proof = hyper.query_membership(&key_digest)?;
        let (exists, actual_version) = match query_proof.version() {
            Some(actual) => (actual <= version, actual),
            None => (false, 0),
        };

        let history_path = if exists {
            history.prove_membership(actual_version, version)?
        } else {
            AuditPath::new()
        };

        Ok(MembershipProof {
            exists,
            hyper_path: query_proof.audit_path,
            history_path,
            current_version: current,
            query_version: version,
            actual_version,
            key_digest,
            key: event.to_vec(),
        })
    }

    /// Prove that the log at `start` is a prefix of the log at `end`.
    pub fn query_consistency(&self, start: u64, end: u64) -> Result<IncrementalProof> {
        let history = self.history.read().expect("history lock poisoned");
        let next_version = self.next_version.read().expect("version lock poisoned");

        let current = next_version.checked_sub(1).ok_or(BalloonError::VersionGap {
            queried: end,
            current: 0,
        })?;
        if start > end {
            return Err(BalloonError::VersionGap {
                queried: start,
                current: end,
            });
        }
        if end > current {
            return Err(BalloonError::VersionGap {
                queried: end,
                current,
            });
        }

        let audit_path = history.prove_consistency(start, end)?;
        Ok(IncrementalProof {
            start,
            end,
            audit_path,
        })
    }

    /// Verify `proof` against the commitment the caller holds. See
    /// [`verify_membership`].
    pub fn verify_membership(
        &self,
        proof: &MembershipProof,
        commitment: &Commitment,
        event: &[u8],
    ) -> Result<()> {
        verify_membership(&*self.hasher, proof, commitment, event)
    }

    /// Verify an incremental proof between two commitments. See
    /// [`verify_incremental`].
    pub fn verify_incremental(
        &self,
        proof: &IncrementalProof,
        start: &Commitment,
        end: &Commitment,
    ) -> Result<()> {
        verify_incremental(&*self.hasher, proof, start, end)
    }
}

/// Verify a membership proof independently of any balloon instance.
///
/// Rebuilds the hyper root from the proof's hyper path and, for an
/// existing event, the history root at `query_version` from its history
/// path; both must match the commitment bytewise.
pub fn verify_membership(
    hasher: &dyn Hasher,
    proof: &MembershipProof,
    commitment: &Commitment,
    event: &[u8],
) -> Result<()> {
    let key_digest = hasher.hash(&[event]);
    if key_digest != proof.key_digest {
        return Err(BalloonError::HashMismatch);
    }
    if commitment.version != proof.query_version {
        return Err(BalloonError::HashMismatch);
    }
    if proof.exists && proof.actual_version > proof.query_version {
        return Err(BalloonError::HashMismatch);
    }

    let value = proof
        .exists
        .then(|| version_to_field(proof.actual_version, hasher.len()));
    if !verify_query(
        hasher,
        &key_digest,
        value.as_deref(),
        &proof.hyper_path,
        &commitment.hyper_digest,
    ) {
        return Err(BalloonError::HashMismatch);
    }

    if proof.exists
        && !history::proof::verify_membership(
            hasher,
            &key_digest,
            proof.actual_version,
            proof.query_version,
            &proof.history_path,
            &commitment.history_digest,
        )
    {
        return Err(BalloonError::HashMismatch);
    }
    Ok(())
}

/// Verify an incremental proof between two commitments independently of
/// any balloon instance.
pub fn verify_incremental(
    hasher: &dyn Hasher,
    proof: &IncrementalProof,
    start: &Commitment,
    end: &Commitment,
) -> Result<()> {
    if proof.start != start.version || proof.end != end.version || proof.start > proof.end {
        return Err(BalloonError::HashMismatch);
    }
    if history::proof::verify_incremental(
        hasher,
        proof.start,
        proof.end,
        &proof.audit_path,
        &start.history_digest,
        &end.history_digest,
    ) {
        Ok(())
    } else {
        Err(BalloonError::HashMismatch)
    }
}
