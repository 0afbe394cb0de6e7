//! Tests for the balloon crate.

mod balloon_tests;

use std::sync::Arc;

use qed_hashing::HasherKind;
use qed_storage::Store;

use crate::balloon::Balloon;

/// Balloon over a fresh in-memory store with the 8-bit XOR hasher, so
/// every node hash can be predicted by hand.
fn xor_balloon() -> Balloon {
    Balloon::new(Arc::new(Store::in_memory()), HasherKind::Xor, 64).expect("open balloon")
}

/// Balloon over a fresh in-memory store with the production hasher.
fn sha_balloon() -> Balloon {
    Balloon::new(Arc::new(Store::in_memory()), HasherKind::Sha256, 1024).expect("open balloon")
}

/// Single-byte events: distinct bytes give distinct XOR digests.
fn event(byte: u8) -> Vec<u8> {
    vec![byte]
}
