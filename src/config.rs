// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Protocol Constants
//!
//! This module defines the fixed parameters of the Key Transparency
//! protocol. They are dictated by the server's log construction and must not
//! be made configurable: a client that disagrees with the server on any of
//! them cannot verify its proofs.
//!
//! | Constant | Meaning | Value |
//! |----------|---------|-------|
//! | `max_epoch_interval` | Maximum age of a verified epoch certificate | 24h |
//! | `exp_epoch_interval` | Maximum age of an audit before its result expires | 4h |
//! | `MERKLE_TREE_DEPTH` | Levels in the directory's Merkle tree | 256 |
//! | `VRF_PROOF_LEN` | Byte length of a VRF proof | 81 |
//! | `MAX_NEW_SKLS` | Most signed key lists expected since a checkpoint | 3 |
//! | `MAX_CHECKPOINT_BLOBS` | Most local checkpoint blobs per address | 2 |

use chrono::Duration;

/// Maximum interval between the reference time and an epoch certificate's
/// issuance for the epoch to count as fresh.
///
/// The server issues a new epoch at least once per day; a certificate older
/// than this against "now" (or against the previous checkpoint's timestamp
/// during self-audit) means the client is being shown a stale view.
pub fn max_epoch_interval() -> Duration {
    Duration::hours(24)
}

/// Maximum age of a completed self-audit before its result may no longer be
/// used to build a verified-epoch checkpoint.
pub fn exp_epoch_interval() -> Duration {
    Duration::hours(4)
}

/// Depth of the directory's Merkle tree: one level per bit of the VRF-derived
/// leaf name. Inclusion proofs carry exactly this many neighbor entries.
pub const MERKLE_TREE_DEPTH: usize = 256;

/// Total byte length of a VRF proof: 1 sign marker, 32-byte curve point,
/// 16-byte challenge, 32-byte response scalar.
pub const VRF_PROOF_LEN: usize = 1 + 32 + 16 + 32;

/// Length of the truncated VRF challenge in bytes.
pub const VRF_CHALLENGE_LEN: usize = 16;

/// Number of rejection-sampling attempts when hashing an email onto the
/// curve before the proof is rejected outright.
pub const HASH_TO_CURVE_ATTEMPTS: u8 = 100;

/// Most signed key lists the server may legitimately return between a
/// verified checkpoint and the present. Keys change at most once per epoch
/// window, so more than this is a protocol violation.
pub const MAX_NEW_SKLS: usize = 3;

/// Most locally stored checkpoint blobs per address (slots 0 and 1). A third
/// blob means local state was corrupted.
pub const MAX_CHECKPOINT_BLOBS: usize = 2;
