// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Error Taxonomy
//!
//! Two orthogonal failure families:
//!
//! - [`FetchError`]: network/API failure. Recoverable by the caller (retry
//!   or defer the audit); never a statement about directory integrity.
//! - [`VerificationError`]: cryptographic or structural mismatch. Terminal
//!   for the address/epoch being checked and never retried internally. Each
//!   variant names the exact check that failed so audit outcomes can report
//!   a precise reason.
//!
//! [`StorageError`] covers the local checkpoint blob store; corruption there
//! is fatal for that address's audit pass but does not abort the batch.
//! [`KtError`] aggregates all three for callers that drive a whole audit.

/// Network or API failure while talking to the directory server.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("response decoding failed: {0}")]
    Decode(String),

    #[error("invalid transport base URL: {0}")]
    BaseUrl(String),
}

/// Cryptographic or structural verification failure.
///
/// Every variant corresponds to exactly one failed check, so a failed audit
/// can always name what broke: proofs, signatures, the hash chain, the
/// certificate anchoring, key-list equality, staleness, or local bookkeeping.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    // ---- VRF ----
    #[error("VRF proof has length {got}, expected {expected}")]
    VrfProofLength { expected: usize, got: usize },

    #[error("VRF public key has length {0}, expected 32")]
    VrfKeyLength(usize),

    #[error("leaf name has length {0}, expected 32")]
    LeafNameLength(usize),

    #[error("VRF proof is not bound to the claimed leaf name")]
    LeafNameMismatch,

    #[error("VRF {role} does not decode to a curve element")]
    VrfDecode { role: &'static str },

    #[error("no curve point found for the email after {0} attempts")]
    HashToCurveExhausted(u8),

    #[error("VRF challenge recomputation does not match the proof")]
    VrfChallengeMismatch,

    // ---- Merkle ----
    #[error("inclusion proof carries {got} neighbors, expected {expected}")]
    NeighborCount { expected: usize, got: usize },

    #[error("hash chain does not result in TreeHash")]
    TreeHashMismatch,

    #[error("ChainHash is not the hash of PrevChainHash and TreeHash")]
    ChainHashMismatch,

    // ---- Certificates ----
    #[error("certificate chain failed to parse: {0}")]
    CertificateParse(String),

    #[error("certificate chain is empty")]
    EmptyCertificateChain,

    #[error("topmost certificate issuer {0:?} is not a pinned root")]
    UnknownRoot(String),

    #[error("signature of certificate {subject:?} does not verify against its issuer")]
    ChainLink { subject: String },

    #[error("leaf certificate carries {0} alternative names, expected at least 2")]
    AltNameCount(usize),

    #[error("leaf certificate is not bound to this epoch's chain hash")]
    DomainBinding,

    #[error("leaf certificate embeds no timestamp proofs")]
    NoEmbeddedTimestamps,

    #[error("embedded timestamp proof names unknown log {0}")]
    UnknownLog(String),

    #[error("embedded timestamp proof from log {log_id} does not verify")]
    LogInclusion { log_id: String },

    // ---- Key lists ----
    #[error("signed key list signature does not verify: {0}")]
    SklSignature(String),

    #[error("signed key list data failed to parse: {0}")]
    SklParse(String),

    #[error("key list is empty")]
    EmptyKeyList,

    #[error("key lists have different lengths: client {client}, server {server}")]
    KeyListLength { client: usize, server: usize },

    #[error("key at position {index} differs in {field}")]
    KeyFieldMismatch { index: usize, field: &'static str },

    // ---- Self-audit bookkeeping ----
    #[error("epoch certificate is {age_seconds}s away from the reference time, allowed {max_seconds}s")]
    StaleEpoch { age_seconds: i64, max_seconds: i64 },

    #[error("revision {got} does not follow revision {previous}")]
    RevisionOrder { previous: u32, got: u32 },

    #[error("certificate dates regressed between epochs {older} and {newer}")]
    CertificateDateRegression { older: u64, newer: u64 },

    #[error("server returned {0} new signed key lists, more than the protocol allows")]
    TooManyNewSkls(usize),

    #[error("signed key list recorded locally is missing from the server history")]
    StoredSklMissing,

    #[error("signed key list has no epoch assignment yet")]
    NotYetIncluded,

    #[error("user signature over the verified-epoch checkpoint does not verify")]
    CheckpointSignature,

    #[error("checkpoint payload failed to parse: {0}")]
    CheckpointParse(String),
}

/// Local checkpoint blob store failure.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("blob decryption failed: {0}")]
    Decrypt(String),

    #[error("address already holds {0} checkpoint blobs, the slot scheme allows no more")]
    TooManyBlobs(usize),

    #[error("checkpoint blobs are not ordered by epoch")]
    SlotOrder,
}

/// Top-level error for callers driving a full verification or audit pass.
#[derive(Debug, thiserror::Error)]
pub enum KtError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("self-audit is still running")]
    AuditInProgress,

    #[error("last self-audit is too old to trust")]
    AuditExpired,

    #[error("address {0} was not covered by the last self-audit")]
    AddressNotAudited(String),

    #[error("last audit for this address did not pass: {0}")]
    AuditNotPassed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_errors_name_the_failed_check() {
        let e = VerificationError::VrfProofLength {
            expected: 81,
            got: 80,
        };
        assert_eq!(e.to_string(), "VRF proof has length 80, expected 81");

        let e = VerificationError::TreeHashMismatch;
        assert_eq!(e.to_string(), "hash chain does not result in TreeHash");

        let e = VerificationError::KeyFieldMismatch {
            index: 2,
            field: "fingerprint",
        };
        assert_eq!(e.to_string(), "key at position 2 differs in fingerprint");
    }

    #[test]
    fn kt_error_wraps_both_families() {
        let fetch: KtError = FetchError::Request("timeout".into()).into();
        assert!(matches!(fetch, KtError::Fetch(_)));

        let verify: KtError = VerificationError::TreeHashMismatch.into();
        assert!(matches!(verify, KtError::Verification(_)));
    }
}
