// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Engine Data Model
//!
//! Types exchanged between the verification components and persisted by the
//! checkpoint store. Wire payloads use PascalCase field names to match the
//! directory server's JSON, and 32-byte hashes travel as lowercase hex.
//!
//! ## Lifetimes
//!
//! [`Epoch`], [`InclusionProof`] and [`SignedKeyList`] are transient: fetched
//! per verification pass and never mutated. [`VerifiedCheckpoint`] is the one
//! durable entity the engine owns: the audit high-water mark, persisted both
//! locally (encrypted blob) and remotely (signed upload).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MERKLE_TREE_DEPTH;

/// Serde helper: `[u8; 32]` as lowercase hex.
pub(crate) mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(de)?;
        let raw = hex::decode(&text).map_err(serde::de::Error::custom)?;
        raw.try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes of hex"))
    }
}

// =============================================================================
// Address Identity
// =============================================================================

/// Stable identifier of a mail address, distinct from the email string.
///
/// Checkpoint blobs and remote verified-epoch uploads are keyed by this
/// identifier; the email string is only used for directory lookups after
/// canonicalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressId(pub String);

impl std::fmt::Display for AddressId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AddressId {
    fn from(value: &str) -> Self {
        AddressId(value.to_string())
    }
}

/// One address to self-audit: its stable id, email, the key list the client
/// currently holds for it (fingerprints precomputed by the key store), and
/// the signed key list the server currently serves, or `None` when the
/// directory has no entry for the address yet.
#[derive(Debug, Clone)]
pub struct AuditAddress {
    pub id: AddressId,
    pub email: String,
    pub keys: Vec<ClientKey>,
    pub signed_key_list: Option<SignedKeyList>,
}

// =============================================================================
// Directory Log Entities
// =============================================================================

/// One published, hash-chained snapshot of the server's key directory.
///
/// Invariant: `chain_hash == H(prev_chain_hash || tree_hash)`; epoch ids form
/// a strictly increasing sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epoch {
    pub epoch_id: u64,
    pub tree_hash: [u8; 32],
    pub chain_hash: [u8; 32],
    pub prev_chain_hash: [u8; 32],
    /// PEM text holding the epoch's certificate chain, highest first.
    pub certificate_chain: String,
}

/// Inclusion proof for one `(epoch, email)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    /// VRF-derived leaf identifier for the email.
    pub leaf_name: [u8; 32],
    /// Proof that `leaf_name` was derived from the email and the VRF key.
    pub vrf_proof: Vec<u8>,
    /// Revision of the signed key list stored at the leaf.
    pub revision: u32,
    /// Sibling hashes from root level down to the leaf; `None` marks an
    /// empty subtree.
    pub neighbors: Vec<Option<[u8; 32]>>,
}

impl InclusionProof {
    /// Whether the proof carries one neighbor per tree level.
    pub fn has_full_depth(&self) -> bool {
        self.neighbors.len() == MERKLE_TREE_DEPTH
    }
}

/// A client-signed statement of which public keys are valid for an address.
///
/// `min_epoch_id == None` means the list has not yet been included in any
/// epoch; `max_epoch_id == None` means it is still the latest list for the
/// address. Superseded lists are retained in the server-side history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SignedKeyList {
    /// JSON-serialized list of [`KeyInfo`].
    pub data: String,
    /// Detached signature over `data` by the address keys.
    pub signature: String,
    #[serde(rename = "MinEpochID")]
    pub min_epoch_id: Option<u64>,
    #[serde(rename = "MaxEpochID")]
    pub max_epoch_id: Option<u64>,
}

/// One public key inside a signed key list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct KeyInfo {
    /// Lowercase hex v4 fingerprint.
    pub fingerprint: String,
    /// Lowercase hex SHA-256 fingerprints of the key and its subkeys, in
    /// key-store order.
    #[serde(rename = "SHA256Fingerprints")]
    pub sha256_fingerprints: Vec<String>,
    /// Capability bitmask (verification, encryption, ...).
    pub flags: u32,
    /// 1 for the primary key of the list, 0 otherwise.
    pub primary: u8,
}

/// A public key as held by the client's own key store.
///
/// Fingerprints arrive precomputed; this engine never parses key material.
/// Position 0 in the client list is the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey {
    pub fingerprint: String,
    pub sha256_fingerprints: Vec<String>,
    pub flags: u32,
}

// =============================================================================
// Checkpoints
// =============================================================================

/// The audit high-water mark for one address: the newest epoch whose
/// inclusion of the address's key list has been fully verified.
///
/// A later self-audit only needs to re-verify epochs newer than this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct VerifiedCheckpoint {
    #[serde(rename = "EpochID")]
    pub epoch_id: u64,
    #[serde(with = "hex32")]
    pub chain_hash: [u8; 32],
    /// Issuance date of the epoch's leaf certificate.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub certificate_date: DateTime<Utc>,
    pub revision: u32,
}

/// Payload of one locally stored checkpoint blob: a key list the client
/// uploaded, remembered until the server provably includes it in an epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct LocalCheckpoint {
    #[serde(rename = "EpochID")]
    pub epoch_id: u64,
    pub signed_key_list: SignedKeyList,
}

// =============================================================================
// Audit Outcomes
// =============================================================================

/// Coarse status of a verification or audit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KtStatus {
    /// All checks passed.
    Passed,
    /// Audit correctly deferred (address too new to appear in the log yet).
    Warning,
    /// A check failed; the reason names it.
    Failed,
    /// The directory has no entry for the address.
    AddressNotInDirectory,
    /// The latest key list has not entered any epoch yet.
    AwaitingInclusion,
}

impl std::fmt::Display for KtStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            KtStatus::Passed => "passed",
            KtStatus::Warning => "warning",
            KtStatus::Failed => "failed",
            KtStatus::AddressNotInDirectory => "address not in directory",
            KtStatus::AwaitingInclusion => "awaiting epoch inclusion",
        };
        write!(f, "{text}")
    }
}

/// Result of auditing one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Every epoch since the previous checkpoint verified; this is the new
    /// high-water mark.
    Passed { checkpoint: VerifiedCheckpoint },
    /// Audit postponed, not failed (e.g. the address has no epoch yet).
    Warning { reason: String },
    /// A verification step failed; the reason names the check.
    Failed { reason: String },
}

impl AuditOutcome {
    pub fn status(&self) -> KtStatus {
        match self {
            AuditOutcome::Passed { .. } => KtStatus::Passed,
            AuditOutcome::Warning { .. } => KtStatus::Warning,
            AuditOutcome::Failed { .. } => KtStatus::Failed,
        }
    }
}

/// Result of one whole self-audit run across a set of addresses.
#[derive(Debug, Clone)]
pub struct AuditReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Outcome per address id; addresses skipped by cancellation are absent.
    pub outcomes: HashMap<AddressId, AuditOutcome>,
}

impl AuditReport {
    pub fn is_running(&self) -> bool {
        self.finished_at.is_none()
    }
}
