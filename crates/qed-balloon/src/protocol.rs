//! JSON wire representations of commitments and proofs.
//!
//! Field names are stable: external consumers (auditors, monitors) parse
//! these messages byte-for-byte. Digests travel as lowercase hex, raw
//! event bytes as base64, audit paths as maps from position string-id to
//! hex digest.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::balloon::{Commitment, IncrementalProof, MembershipProof};
use crate::error::BalloonError;
use crate::navigation::AuditPath;

type Result<T> = std::result::Result<T, BalloonError>;

/// A published commitment plus the event that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMessage {
    /// Hex history-tree root.
    pub history_digest: String,
    /// Hex hyper-tree root.
    pub hyper_digest: String,
    /// Version of the insertion.
    pub version: u64,
    /// Base64 event bytes.
    pub event: String,
}

impl SnapshotMessage {
    /// Encode a commitment and its event.
    pub fn from_commitment(commitment: &Commitment, event: &[u8]) -> Self {
        Self {
            history_digest: hex::encode(&commitment.history_digest),
            hyper_digest: hex::encode(&commitment.hyper_digest),
            version: commitment.version,
            event: BASE64.encode(event),
        }
    }

    /// Decode back into a commitment and event bytes.
    pub fn to_commitment(&self) -> Result<(Commitment, Vec<u8>)> {
        let commitment = Commitment {
            history_digest: decode_hex(&self.history_digest)?,
            hyper_digest: decode_hex(&self.hyper_digest)?,
            version: self.version,
        };
        let event = BASE64
            .decode(&self.event)
            .map_err(|e| BalloonError::Malformed(format!("event is not base64: {e}")))?;
        Ok((commitment, event))
    }
}

/// A membership proof on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipMessage {
    /// Whether the event existed at `query_version`.
    pub exists: bool,
    /// Hyper audit path: position string-id → hex digest.
    pub hyper: BTreeMap<String, String>,
    /// History audit path: position string-id → hex digest.
    pub history: BTreeMap<String, String>,
    /// Log version when the proof was generated.
    pub current_version: u64,
    /// Version the caller asked about.
    pub query_version: u64,
    /// First version at which the digest was added.
    pub actual_version: u64,
    /// Hex digest of the event.
    pub key_digest: String,
    /// Base64 event bytes.
    pub key: String,
}

impl MembershipMessage {
    /// Encode a membership proof.
    pub fn from_proof(proof: &MembershipProof) -> Self {
        Self {
            exists: proof.exists,
            hyper: encode_path(&proof.hyper_path),
            history: encode_path(&proof.history_path),
            current_version: proof.current_version,
            query_version: proof.query_version,
            actual_version: proof.actual_version,
            key_digest: hex::encode(&proof.key_digest),
            key: BASE64.encode(&proof.key),
        }
    }

    /// Decode back into a membership proof.
    pub fn to_proof(&self) -> Result<MembershipProof> {
        Ok(MembershipProof {
            exists: self.exists,
            hyper_path: decode_path(&self.hyper)?,
            history_path: decode_path(&self.history)?,
            current_version: self.current_version,
            query_version: self.query_version,
            actual_version: self.actual_version,
            key_digest: decode_hex(&self.key_digest)?,
            key: BASE64
                .decode(&self.key)
                .map_err(|e| BalloonError::Malformed(format!("key is not base64: {e}")))?,
        })
    }
}

/// An incremental proof on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalMessage {
    /// Earlier version.
    pub start: u64,
    /// Later version.
    pub end: u64,
    /// Combined audit path: position string-id → hex digest.
    pub audit_path: BTreeMap<String, String>,
}

impl IncrementalMessage {
    /// Encode an incremental proof.
    pub fn from_proof(proof: &IncrementalProof) -> Self {
        Self {
            start: proof.start,
            end: proof.end,
            audit_path: encode_path(&proof.audit_path),
        }
    }

    /// Decode back into an incremental proof.
    pub fn to_proof(&self) -> Result<IncrementalProof> {
        Ok(IncrementalProof {
            start: self.start,
            end: self.end,
            audit_path: decode_path(&self.audit_path)?,
        })
    }
}

fn encode_path(path: &AuditPath) -> BTreeMap<String, String> {
    path.iter()
        .map(|(id, digest)| (id.clone(), hex::encode(digest)))
        .collect()
}

fn decode_path(map: &BTreeMap<String, String>) -> Result<AuditPath> {
    map.iter()
        .map(|(id, digest)| Ok((id.clone(), decode_hex(digest)?)))
        .collect()
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| BalloonError::Malformed(format!("digest is not hex: {e}")))
}
