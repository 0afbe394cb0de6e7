//! Deployment configuration, parsed from TOML.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use qed_hashing::HasherKind;
use qed_storage::Store;
use serde::{Deserialize, Serialize};

use crate::balloon::Balloon;
use crate::error::BalloonError;
use crate::hyper::DEFAULT_CACHE_BATCHES;

/// Top-level configuration for a QED deployment.
///
/// The digest width is pinned by the hasher choice; reopening an existing
/// data directory with a different hasher is unsupported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QedConfig {
    /// Directory for the persistent store. `None` keeps everything in
    /// memory, which is what tests want.
    pub data_dir: Option<PathBuf>,
    /// Hash function: `"sha256"` (default), `"blake3"`, or the 8-bit test
    /// hashers `"xor"` / `"pearson"`.
    pub hasher: String,
    /// Capacity of the hyper tree's in-memory cache, in batches.
    pub hyper_cache_batches: usize,
}

impl Default for QedConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            hasher: "sha256".to_string(),
            hyper_cache_batches: DEFAULT_CACHE_BATCHES,
        }
    }
}

impl QedConfig {
    /// Resolve the configured hasher.
    pub fn hasher_kind(&self) -> Result<HasherKind, BalloonError> {
        HasherKind::from_str(&self.hasher).map_err(BalloonError::Malformed)
    }

    /// Open a balloon as configured.
    pub fn open(&self) -> Result<Balloon, BalloonError> {
        let store = match &self.data_dir {
            Some(dir) => Store::open(dir)?,
            None => Store::in_memory(),
        };
        Balloon::new(Arc::new(store), self.hasher_kind()?, self.hyper_cache_batches)
    }
}
