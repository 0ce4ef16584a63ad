// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Merkle Inclusion & Chain-Hash Verification
//!
//! An epoch's `TreeHash` commits to every leaf in the directory. To verify
//! inclusion of a signed key list, the client recomputes the path from its
//! leaf up to the root using the neighbor hashes from the proof and compares
//! the result against `TreeHash`. Any tampering (a flipped neighbor, a
//! wrong revision, altered list data) surfaces as the single terminal
//! mismatch; there is deliberately no earlier failure signal to leak which
//! level diverged.
//!
//! Consecutive epochs are hash-chained: `ChainHash = H(PrevChainHash ‖
//! TreeHash)`, which pins the whole epoch history once one chain hash is
//! anchored by certificate.

use sha2::{Digest, Sha256};

use crate::config::MERKLE_TREE_DEPTH;
use crate::crypto::vrf;
use crate::error::VerificationError;
use crate::models::InclusionProof;

/// Empty subtrees hash as 32 zero bytes.
const EMPTY_NODE: [u8; 32] = [0u8; 32];

/// Verify that `skl_data` at the proof's revision is included under
/// `tree_hash` at the leaf position the VRF assigns to `email`.
pub fn verify_inclusion(
    proof: &InclusionProof,
    tree_hash: &[u8; 32],
    skl_data: &str,
    email: &str,
    vrf_public_key: &[u8],
) -> Result<(), VerificationError> {
    vrf::verify(
        vrf_public_key,
        email.as_bytes(),
        &proof.vrf_proof,
        &proof.leaf_name,
    )?;

    if !proof.has_full_depth() {
        return Err(VerificationError::NeighborCount {
            expected: MERKLE_TREE_DEPTH,
            got: proof.neighbors.len(),
        });
    }

    let leaf = leaf_value(skl_data.as_bytes(), proof.revision);
    let root = root_from_leaf(&proof.leaf_name, leaf, &proof.neighbors);
    if &root != tree_hash {
        return Err(VerificationError::TreeHashMismatch);
    }
    Ok(())
}

/// Check the inter-epoch chaining law `chain_hash == H(prev ‖ tree)`.
pub fn verify_chain_hash(
    tree_hash: &[u8; 32],
    prev_chain_hash: &[u8; 32],
    chain_hash: &[u8; 32],
) -> Result<(), VerificationError> {
    let expected = hash_pair(prev_chain_hash, tree_hash);
    if &expected != chain_hash {
        return Err(VerificationError::ChainHashMismatch);
    }
    Ok(())
}

/// Leaf value stored in the tree: `H(H(data) ‖ bigEndian32(revision))`.
pub(crate) fn leaf_value(skl_data: &[u8], revision: u32) -> [u8; 32] {
    let data_hash: [u8; 32] = Sha256::digest(skl_data).into();
    let mut hasher = Sha256::new();
    hasher.update(data_hash);
    hasher.update(revision.to_be_bytes());
    hasher.finalize().into()
}

/// Recompute the root by walking the neighbor list from the deepest level
/// up. Level `i` consults bit `i` of the leaf name, MSB-first within each
/// byte; a set bit means the leaf path is the right child at that level.
pub(crate) fn root_from_leaf(
    leaf_name: &[u8; 32],
    leaf: [u8; 32],
    neighbors: &[Option<[u8; 32]>],
) -> [u8; 32] {
    let mut value = leaf;
    for i in (0..neighbors.len()).rev() {
        let neighbor = neighbors[i].unwrap_or(EMPTY_NODE);
        let byte = leaf_name[(i / 8) % 32];
        let bit = (byte >> (7 - (i % 8))) & 1;
        value = if bit == 1 {
            hash_pair(&neighbor, &value)
        } else {
            hash_pair(&value, &neighbor)
        };
    }
    value
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}
