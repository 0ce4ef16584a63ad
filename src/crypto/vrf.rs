// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # VRF Proof Verification
//!
//! The directory derives each email's tree-leaf identifier through a
//! verifiable random function over edwards25519, so the server cannot pick
//! leaf positions adversarially and the client can check that the leaf it is
//! shown really belongs to the email it asked about.
//!
//! Proof layout (81 bytes):
//!
//! ```text
//! [ sign marker (1) | curve point Γ (32) | challenge c (16) | response s (32) ]
//! ```
//!
//! The claimed leaf name must equal the encoded point Γ byte-for-byte: the
//! proof is bound to the name before any curve arithmetic happens. The
//! verification equations are Schnorr-style:
//!
//! ```text
//! u = c·P + s·G        v = c·Γ + s·H(email)
//! c' = SHA-256(G ‖ H(email) ‖ P ‖ Γ ‖ u ‖ v)[..16]
//! ```
//!
//! and the proof verifies iff `c' == c`.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha256};

use crate::config::{HASH_TO_CURVE_ATTEMPTS, VRF_CHALLENGE_LEN, VRF_PROOF_LEN};
use crate::error::VerificationError;

/// Verify that `leaf_name` was derived from `email` under the VRF key.
///
/// Each failure mode is a distinct error so self-audit can report exactly
/// which stage rejected the proof.
pub fn verify(
    public_key: &[u8],
    email: &[u8],
    proof: &[u8],
    leaf_name: &[u8],
) -> Result<(), VerificationError> {
    if proof.len() != VRF_PROOF_LEN {
        return Err(VerificationError::VrfProofLength {
            expected: VRF_PROOF_LEN,
            got: proof.len(),
        });
    }
    if leaf_name.len() != 32 {
        return Err(VerificationError::LeafNameLength(leaf_name.len()));
    }
    if public_key.len() != 32 {
        return Err(VerificationError::VrfKeyLength(public_key.len()));
    }

    // The encoded point sits right after the sign marker; it must equal the
    // claimed leaf name before any curve arithmetic happens.
    let gamma_bytes = &proof[1..33];
    if gamma_bytes != leaf_name {
        return Err(VerificationError::LeafNameMismatch);
    }

    let gamma = decode_point(gamma_bytes).ok_or(VerificationError::VrfDecode {
        role: "proof point",
    })?;
    let challenge = &proof[33..33 + VRF_CHALLENGE_LEN];
    let c = widen_challenge(challenge);
    let s: Option<Scalar> =
        Scalar::from_canonical_bytes(proof[33 + VRF_CHALLENGE_LEN..].try_into().expect("32 bytes"))
            .into();
    let s = s.ok_or(VerificationError::VrfDecode {
        role: "response scalar",
    })?;

    let pk = decode_point(public_key).ok_or(VerificationError::VrfDecode {
        role: "public key",
    })?;

    let h = hash_to_curve(email, public_key)?;

    let u = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, &pk, &s);
    let v = gamma * c + h * s;

    let recomputed = challenge_bytes(&h, &pk, &gamma, &u, &v);
    if recomputed.as_slice() != challenge {
        return Err(VerificationError::VrfChallengeMismatch);
    }
    Ok(())
}

/// Deterministically hash an email onto the curve.
///
/// Rejection sampling: hash `(email ‖ vrf_key ‖ counter)` and try to decode
/// the digest as a point; the first decodable digest wins and is multiplied
/// by the cofactor to clear small-order components.
pub fn hash_to_curve(email: &[u8], public_key: &[u8]) -> Result<EdwardsPoint, VerificationError> {
    for counter in 0..HASH_TO_CURVE_ATTEMPTS {
        let mut hasher = Sha256::new();
        hasher.update(email);
        hasher.update(public_key);
        hasher.update([counter]);
        let digest: [u8; 32] = hasher.finalize().into();
        if let Some(point) = CompressedEdwardsY(digest).decompress() {
            return Ok(point.mul_by_cofactor());
        }
    }
    Err(VerificationError::HashToCurveExhausted(
        HASH_TO_CURVE_ATTEMPTS,
    ))
}

/// The truncated Schnorr challenge over all public points of the proof.
pub(crate) fn challenge_bytes(
    h: &EdwardsPoint,
    pk: &EdwardsPoint,
    gamma: &EdwardsPoint,
    u: &EdwardsPoint,
    v: &EdwardsPoint,
) -> [u8; VRF_CHALLENGE_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(ED25519_BASEPOINT_POINT.compress().as_bytes());
    hasher.update(h.compress().as_bytes());
    hasher.update(pk.compress().as_bytes());
    hasher.update(gamma.compress().as_bytes());
    hasher.update(u.compress().as_bytes());
    hasher.update(v.compress().as_bytes());
    let digest = hasher.finalize();
    digest[..VRF_CHALLENGE_LEN].try_into().expect("16 bytes")
}

/// Zero-extend the 16-byte wire challenge into a scalar.
pub(crate) fn widen_challenge(challenge: &[u8]) -> Scalar {
    let mut wide = [0u8; 32];
    wide[..VRF_CHALLENGE_LEN].copy_from_slice(challenge);
    Scalar::from_bytes_mod_order(wide)
}

fn decode_point(bytes: &[u8]) -> Option<EdwardsPoint> {
    let array: [u8; 32] = bytes.try_into().ok()?;
    CompressedEdwardsY(array).decompress()
}
