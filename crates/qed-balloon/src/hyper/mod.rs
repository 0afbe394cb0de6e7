//! The hyper tree: a sparse Merkle tree keyed by event digest.
//!
//! Conceptually a complete binary tree of depth W over all possible
//! digests; physically, empty subtrees hash to precomputed defaults,
//! single-leaf subtrees collapse into shortcuts, and nodes are packed into
//! fixed-shape [batches](batch). Batches at or above the cache height
//! limit live in a modifiable in-memory cache; deeper batches live only in
//! the store.

pub mod batch;
pub mod ops;
pub mod proof;
pub mod pruning;

use std::sync::Arc;

use bytes::Bytes;
use qed_hashing::{Digest, Hasher};
use qed_storage::{Mutation, Store, Table};
use tracing::{debug, info};

use crate::cache::ModifiableCache;
use crate::error::BalloonError;
use crate::navigation::{HyperPosition, version_to_field};

use self::batch::Batch;
use self::ops::{Context, interpret};
use self::proof::QueryProof;
use self::pruning::BatchLoader;

type Result<T> = std::result::Result<T, BalloonError>;

/// Default capacity of the modifiable cache, in batches. Covers the full
/// cached zone of a 256-bit tree with room to spare.
pub const DEFAULT_CACHE_BATCHES: usize = 2_000_000;

/// Sparse Merkle tree mapping event digests to their first version.
pub struct HyperTree {
    hasher: Box<dyn Hasher>,
    store: Arc<Store>,
    cache: ModifiableCache,
    cache_height_limit: u16,
    default_hashes: Vec<Digest>,
}

impl HyperTree {
    /// Create a tree over the store's hyper table and warm its cache from
    /// the batches persisted at the cache height limit.
    pub fn new(hasher: Box<dyn Hasher>, store: Arc<Store>, cache_batches: usize) -> Result<Self> {
        let bits = hasher.bits();
        let cache_height_limit = bits - (bits / 8 * 4).min(24);

        let mut default_hashes = Vec::with_capacity(bits as usize);
        default_hashes.push(hasher.hash(&[&[0x00], &[0x00]]));
        for i in 1..bits as usize {
            let prev = &default_hashes[i - 1];
            default_hashes.push(hasher.hash(&[prev, prev]));
        }

        let mut tree = Self {
            hasher,
            store,
            cache: ModifiableCache::new(cache_batches),
            cache_height_limit,
            default_hashes,
        };
        tree.rebuild_cache()?;
        Ok(tree)
    }

    /// Height at and below which batches are stored rather than cached.
    pub fn cache_height_limit(&self) -> u16 {
        self.cache_height_limit
    }

    fn loader(&self) -> BatchLoader<'_> {
        BatchLoader::new(
            &self.store,
            &self.cache,
            self.cache_height_limit,
            self.hasher.len(),
        )
    }

    /// Insert `digest → version`.
    ///
    /// Returns the new root and the staged mutations: stored-zone batches
    /// destined for the hyper table and cached-zone batches destined for
    /// the cache table. Neither the store nor the cache is touched here;
    /// the caller commits the mutations and then replays the cache slice
    /// via [`update_cache`](Self::update_cache).
    pub fn add(&mut self, digest: &[u8], version: u64) -> Result<(Digest, Vec<Mutation>)> {
        let value = version_to_field(version, self.hasher.len());
        let loader = self.loader();
        let plan = pruning::prune_to_insert(digest, &value, &loader)?;

        let mut batches = plan.batches;
        let mut ctx = Context::new(&*self.hasher, &self.default_hashes);
        let root = interpret(&plan.op, &mut batches, &mut ctx)?;
        debug!(version, batches = ctx.mutations.len(), "inserted hyper leaf");
        Ok((root, ctx.mutations))
    }

    /// Replay the cache-table slice of a committed mutation batch into the
    /// in-memory cache. Called only after the store write succeeded, so a
    /// failed add leaves the cache untouched.
    pub fn update_cache(&self, mutations: &[Mutation]) {
        for mutation in mutations {
            if mutation.table == Table::HyperCache {
                self.cache
                    .put(mutation.key.clone(), Bytes::from(mutation.value.clone()));
            }
        }
    }

    /// Prove membership (or absence) of `digest` under the current root.
    pub fn query_membership(&self, digest: &[u8]) -> Result<QueryProof> {
        let loader = self.loader();
        let plan = pruning::prune_to_find(digest, &loader)?;

        let mut batches = plan.batches;
        let mut ctx = Context::new(&*self.hasher, &self.default_hashes);
        interpret(&plan.op, &mut batches, &mut ctx)?;
        Ok(QueryProof::new(digest.to_vec(), plan.found, ctx.audit_path))
    }

    /// The current root digest.
    pub fn root(&self) -> Result<Digest> {
        let root = HyperPosition::root(self.hasher.bits());
        match self.cache.get(&root.cache_key()) {
            Some(bytes) => {
                let batch = Batch::deserialize(self.hasher.len(), &bytes)?;
                Ok(batch
                    .hash_at(0)
                    .map(|h| h.to_vec())
                    .unwrap_or_else(|| self.empty_root()))
            }
            None => Ok(self.empty_root()),
        }
    }

    fn empty_root(&self) -> Digest {
        self.default_hashes[self.default_hashes.len() - 1].clone()
    }

    /// Rebuild the modifiable cache from the store: scan every batch
    /// persisted at exactly the cache height limit and replay its parent
    /// chain up to the root.
    pub fn rebuild_cache(&mut self) -> Result<()> {
        self.cache.clear();

        let width = self.hasher.len();
        let limit = self.cache_height_limit;
        let mut start = vec![0u8; 1 + width];
        start[0] = limit as u8;
        let mut end = vec![0u8; 1 + width];
        end[0] = limit as u8 + 1;

        let nodes = self.store.get_range(Table::Hyper, &start, &end)?;
        if nodes.is_empty() {
            return Ok(());
        }
        info!(batches = nodes.len(), "warming hyper cache");

        for (key, bytes) in nodes {
            let pos = HyperPosition::new(key[1..].to_vec(), limit);
            let batch = Batch::deserialize(width, &bytes)?;
            let root_hash = batch.hash_at(0).map(|h| h.to_vec()).ok_or_else(|| {
                BalloonError::CorruptBatch(format!("stored batch at {pos:?} has no root"))
            })?;

            let loader = self.loader();
            let plan = pruning::prune_to_rebuild(pos, root_hash, &loader)?;
            let mut batches = plan.batches;
            let mut ctx = Context::new(&*self.hasher, &self.default_hashes);
            interpret(&plan.op, &mut batches, &mut ctx)?;
            self.update_cache(&ctx.mutations);
        }
        Ok(())
    }
}
