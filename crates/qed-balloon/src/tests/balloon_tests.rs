//! End-to-end balloon behavior: commitments, proofs, invariants.

use std::sync::Arc;

use qed_hashing::HasherKind;
use qed_storage::Store;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::balloon::Balloon;
use crate::error::BalloonError;

use super::{event, sha_balloon, xor_balloon};

#[test]
fn test_first_commitment_is_version_zero() {
    let balloon = xor_balloon();
    let commitment = balloon.add(b"msg").unwrap();

    assert_eq!(commitment.version, 0);
    // XOR: the history root of a single-leaf tree is the leaf hash,
    // which folds the digest with an all-zero position.
    let digest = HasherKind::Xor.new_hasher().hash(&[b"msg".as_slice()]);
    assert_eq!(commitment.history_digest, digest);
    assert_eq!(balloon.version(), Some(0));

    let proof = balloon.query_membership(b"msg", 0).unwrap();
    assert!(proof.exists);
    assert_eq!(proof.actual_version, 0);
    balloon.verify_membership(&proof, &commitment, b"msg").unwrap();
}

#[test]
fn test_duplicate_add_keeps_the_first_version() {
    let balloon = xor_balloon();
    let first = balloon.add(b"A").unwrap();
    let second = balloon.add(b"A").unwrap();

    assert_eq!(second.version, 1);
    // The hyper tree is untouched by the duplicate.
    assert_eq!(first.hyper_digest, second.hyper_digest);

    let proof = balloon.query_membership(b"A", 1).unwrap();
    assert!(proof.exists);
    assert_eq!(proof.actual_version, 0);
    assert_eq!(proof.current_version, 1);
    balloon.verify_membership(&proof, &second, b"A").unwrap();
}

#[test]
fn test_event_added_later_does_not_exist_at_an_earlier_version() {
    let balloon = xor_balloon();
    balloon.add(&event(0)).unwrap();
    balloon.add(&event(1)).unwrap();

    let proof = balloon.query_membership(&event(1), 0).unwrap();
    assert!(!proof.exists);
    assert_eq!(proof.actual_version, 1);
    assert!(proof.history_path.is_empty());
}

#[test]
fn test_membership_invariant_over_a_random_stream() {
    let balloon = sha_balloon();
    let mut rng = StdRng::seed_from_u64(42);

    let mut events = Vec::new();
    let mut commitments = Vec::new();
    for _ in 0..10 {
        let event: Vec<u8> = (0..rng.random_range(1..64)).map(|_| rng.random()).collect();
        commitments.push(balloon.add(&event).unwrap());
        events.push(event);

        // Every event added so far verifies under the newest commitment.
        let newest = commitments.last().unwrap();
        for (index, event) in events.iter().enumerate() {
            let proof = balloon.query_membership(event, newest.version).unwrap();
            assert!(proof.exists, "event {index} missing at version {}", newest.version);
            assert_eq!(proof.actual_version, index as u64);
            balloon.verify_membership(&proof, newest, event).unwrap();
        }
    }
}

#[test]
fn test_consistency_invariant_over_a_random_stream() {
    let balloon = sha_balloon();
    let mut rng = StdRng::seed_from_u64(7);

    let mut commitments = Vec::new();
    for _ in 0..8 {
        let event: Vec<u8> = (0..16).map(|_| rng.random()).collect();
        commitments.push(balloon.add(&event).unwrap());
    }

    for start in 0..commitments.len() {
        for end in start..commitments.len() {
            let proof = balloon.query_consistency(start as u64, end as u64).unwrap();
            balloon
                .verify_incremental(&proof, &commitments[start], &commitments[end])
                .unwrap_or_else(|e| panic!("consistency {start}..{end}: {e}"));
        }
    }
}

#[test]
fn test_incremental_tampering_is_detected() {
    let balloon = sha_balloon();
    let mut commitments = Vec::new();
    for byte in 0..8u8 {
        commitments.push(balloon.add(&event(byte)).unwrap());
    }

    let proof = balloon.query_consistency(2, 6).unwrap();
    balloon.verify_incremental(&proof, &commitments[2], &commitments[6]).unwrap();

    // Flip one byte of one audit-path entry.
    let tampered_id = proof.audit_path.iter().next().map(|(id, _)| id.clone()).unwrap();
    let forged_path = proof
        .audit_path
        .iter()
        .map(|(id, digest)| {
            let mut digest = digest.clone();
            if *id == tampered_id {
                digest[0] ^= 0x01;
            }
            (id.clone(), digest)
        })
        .collect();
    let mut tampered = proof.clone();
    tampered.audit_path = forged_path;
    assert!(matches!(
        balloon.verify_incremental(&tampered, &commitments[2], &commitments[6]),
        Err(BalloonError::HashMismatch)
    ));
}

#[test]
fn test_membership_tampering_is_detected() {
    let balloon = sha_balloon();
    let commitment = balloon.add(b"authentic event").unwrap();
    let proof = balloon.query_membership(b"authentic event", 0).unwrap();
    balloon.verify_membership(&proof, &commitment, b"authentic event").unwrap();

    // A different event under the same proof.
    assert!(matches!(
        balloon.verify_membership(&proof, &commitment, b"authentic Event"),
        Err(BalloonError::HashMismatch)
    ));

    // A tampered commitment root.
    let mut forged = commitment.clone();
    forged.hyper_digest[0] ^= 0x01;
    assert!(matches!(
        balloon.verify_membership(&proof, &forged, b"authentic event"),
        Err(BalloonError::HashMismatch)
    ));

    // A forged actual version.
    let mut forged_proof = proof.clone();
    forged_proof.actual_version = 1;
    assert!(balloon.verify_membership(&forged_proof, &commitment, b"authentic event").is_err());
}

#[test]
fn test_absent_event_verifies_when_its_branch_is_empty() {
    let balloon = sha_balloon();
    let commitment = balloon.add(b"only event").unwrap();

    let proof = balloon.query_membership(b"something else", 0).unwrap();
    assert!(!proof.exists);
    balloon.verify_membership(&proof, &commitment, b"something else").unwrap();
}

#[test]
fn test_version_gap_errors() {
    let balloon = xor_balloon();
    assert!(matches!(
        balloon.query_membership(b"x", 0),
        Err(BalloonError::VersionGap { queried: 0, current: 0 })
    ));

    balloon.add(&event(0)).unwrap();
    assert!(matches!(
        balloon.query_membership(b"x", 5),
        Err(BalloonError::VersionGap { queried: 5, current: 0 })
    ));
    assert!(matches!(
        balloon.query_consistency(3, 2),
        Err(BalloonError::VersionGap { .. })
    ));
    assert!(matches!(
        balloon.query_consistency(0, 9),
        Err(BalloonError::VersionGap { queried: 9, current: 0 })
    ));
}

#[test]
fn test_reopen_recovers_version_and_roots() {
    let store = Arc::new(Store::in_memory());
    let mut last = None;
    {
        let balloon = Balloon::new(Arc::clone(&store), HasherKind::Xor, 64).unwrap();
        for byte in 0..5u8 {
            last = Some(balloon.add(&event(byte)).unwrap());
        }
    }
    let last = last.unwrap();

    let reopened = Balloon::new(store, HasherKind::Xor, 64).unwrap();
    assert_eq!(reopened.version(), Some(4));

    // Proofs generated after the restart verify against the pre-restart
    // commitment: both roots were recovered from the store alone.
    let proof = reopened.query_membership(&event(3), 4).unwrap();
    reopened.verify_membership(&proof, &last, &event(3)).unwrap();

    // The next add continues the version sequence under the new roots.
    let next = reopened.add(&event(5)).unwrap();
    assert_eq!(next.version, 5);
    let proof = reopened.query_membership(&event(5), 5).unwrap();
    reopened.verify_membership(&proof, &next, &event(5)).unwrap();
}

#[test]
fn test_commitments_chain_across_the_whole_log() {
    let balloon = xor_balloon();
    let mut commitments = Vec::new();
    for byte in 0..8u8 {
        commitments.push(balloon.add(&event(byte)).unwrap());
    }

    // S4: consistency between versions 2 and 6.
    let proof = balloon.query_consistency(2, 6).unwrap();
    balloon.verify_incremental(&proof, &commitments[2], &commitments[6]).unwrap();

    // Wrong commitment pair fails.
    assert!(
        balloon
            .verify_incremental(&proof, &commitments[3], &commitments[6])
            .is_err()
    );
}
