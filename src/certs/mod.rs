// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Epoch Certificate Verification
//!
//! Each epoch ships a certificate chain that anchors its chain hash outside
//! the directory operator's control. Acceptance requires three independent
//! checks:
//!
//! 1. **Chain of trust**: the chain terminates at a pinned root
//!    ([`registry::TrustRegistry`]) and every link's signature verifies.
//! 2. **Domain binding**: the leaf certificate names the epoch's chain hash
//!    and epoch id in its alternative names, so the certificate cannot be
//!    reused for a different epoch.
//! 3. **Log anchoring**: every timestamp proof embedded in the leaf
//!    verifies against a known log operator, proving the certificate was
//!    submitted to public append-only logs.
//!
//! Certificates travel as PEM `CERTIFICATE` blocks whose payload is the JSON
//! encoding of [`Certificate`]; signatures are Ed25519 over a
//! domain-separated serialization of the to-be-signed body.

pub mod registry;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::VerificationError;
use crate::models::hex32;
use registry::TrustRegistry;

/// Domain separator for certificate signatures.
pub const CERT_SIGNING_DOMAIN: &[u8] = b"keytrans:epoch-certificate:v1\0";

/// Domain separator for embedded timestamp-log signatures.
pub const SCT_SIGNING_DOMAIN: &[u8] = b"keytrans:signed-timestamp:v1\0";

/// A log operator's signed promise that the certificate was submitted to its
/// append-only log. The signature covers the certificate body with the
/// timestamp list cleared, so it can be produced before embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SignedCertificateTimestamp {
    #[serde(rename = "LogID", with = "hex32")]
    pub log_id: [u8; 32],
    /// Submission time, Unix milliseconds.
    pub timestamp: i64,
    /// Base64 Ed25519 signature by the log operator.
    pub signature: String,
}

/// The signed body of a certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct TbsCertificate {
    pub version: u32,
    pub serial: u64,
    /// Issuer common name; for the topmost certificate this selects the
    /// pinned root.
    pub issuer: String,
    pub subject: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub not_before: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub not_after: DateTime<Utc>,
    /// Alternative names; on the leaf these carry the epoch binding.
    pub subject_alt_names: Vec<String>,
    /// Ed25519 key certified by this certificate.
    #[serde(with = "hex32")]
    pub public_key: [u8; 32],
    /// Embedded timestamp-log proofs (leaf certificates only).
    #[serde(default)]
    pub scts: Vec<SignedCertificateTimestamp>,
}

/// One certificate: a signed body plus the issuer's detached signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Certificate {
    pub tbs: TbsCertificate,
    /// Base64 Ed25519 signature by the issuer over the signed body.
    pub signature: String,
}

impl TbsCertificate {
    fn canonical_bytes(&self) -> Result<Vec<u8>, VerificationError> {
        serde_json::to_vec(self).map_err(|e| VerificationError::CertificateParse(e.to_string()))
    }

    /// Digest the timestamp logs sign: the body with its timestamp list
    /// cleared, so the signature can exist before the proofs are embedded.
    fn submission_digest(&self) -> Result<[u8; 32], VerificationError> {
        let mut submitted = self.clone();
        submitted.scts.clear();
        let bytes = submitted.canonical_bytes()?;
        Ok(Sha256::digest(&bytes).into())
    }
}

impl Certificate {
    /// The key this certificate certifies, for verifying the next link.
    pub fn verifying_key(&self) -> Result<VerifyingKey, VerificationError> {
        VerifyingKey::from_bytes(&self.tbs.public_key).map_err(|_| {
            VerificationError::CertificateParse(format!(
                "certificate {:?} carries an invalid key",
                self.tbs.subject
            ))
        })
    }

    fn verify_issued_by(&self, issuer_key: &VerifyingKey) -> Result<(), VerificationError> {
        let signature = decode_signature(&self.signature).ok_or_else(|| {
            VerificationError::ChainLink {
                subject: self.tbs.subject.clone(),
            }
        })?;
        let mut message = CERT_SIGNING_DOMAIN.to_vec();
        message.extend_from_slice(&self.tbs.canonical_bytes()?);
        issuer_key
            .verify(&message, &signature)
            .map_err(|_| VerificationError::ChainLink {
                subject: self.tbs.subject.clone(),
            })
    }
}

/// Parse a PEM certificate chain, highest certificate first.
pub fn parse_chain(pem_text: &str) -> Result<Vec<Certificate>, VerificationError> {
    let blocks = pem::parse_many(pem_text)
        .map_err(|e| VerificationError::CertificateParse(e.to_string()))?;
    if blocks.is_empty() {
        return Err(VerificationError::EmptyCertificateChain);
    }
    blocks
        .into_iter()
        .map(|block| {
            if block.tag() != "CERTIFICATE" {
                return Err(VerificationError::CertificateParse(format!(
                    "unexpected PEM block {:?}",
                    block.tag()
                )));
            }
            serde_json::from_slice(block.contents())
                .map_err(|e| VerificationError::CertificateParse(e.to_string()))
        })
        .collect()
}

/// Verify the chain of trust: pinned root at the top, then every link.
pub fn verify_chain(
    chain: &[Certificate],
    registry: &TrustRegistry,
) -> Result<(), VerificationError> {
    let top = chain
        .first()
        .ok_or(VerificationError::EmptyCertificateChain)?;
    let root = registry.find_root(&top.tbs.issuer)?;
    top.verify_issued_by(&root.verifying_key()?)?;

    for pair in chain.windows(2) {
        let issuer_key = pair[0].verifying_key()?;
        pair[1].verify_issued_by(&issuer_key)?;
    }
    Ok(())
}

/// Verify the leaf's domain binding to this epoch.
///
/// The leaf must carry at least two alternative names: the longest is the
/// bound name, the second-longest the placeholder domain suffix. The bound
/// name must spell out the chain hash (split into two 32-hex-char labels)
/// and the epoch id under that suffix.
pub fn check_domain_binding(
    leaf: &Certificate,
    chain_hash: &[u8; 32],
    epoch_id: u64,
) -> Result<(), VerificationError> {
    let names = &leaf.tbs.subject_alt_names;
    if names.len() < 2 {
        return Err(VerificationError::AltNameCount(names.len()));
    }

    let mut by_length: Vec<&String> = names.iter().collect();
    by_length.sort_by(|a, b| b.len().cmp(&a.len()));
    let bound_name = by_length[0];
    let suffix = by_length[1];

    let hash_hex = hex::encode(chain_hash);
    let expected = format!(
        "{}.{}.{}.0.{}",
        &hash_hex[..32],
        &hash_hex[32..],
        epoch_id,
        suffix
    );
    if bound_name != &expected {
        return Err(VerificationError::DomainBinding);
    }
    Ok(())
}

/// Verify every timestamp proof embedded in the leaf against the known-log
/// registry. All must verify; a certificate without any proofs is rejected.
pub fn verify_log_inclusion(
    leaf: &Certificate,
    registry: &TrustRegistry,
) -> Result<(), VerificationError> {
    if leaf.tbs.scts.is_empty() {
        return Err(VerificationError::NoEmbeddedTimestamps);
    }

    let digest = leaf.tbs.submission_digest()?;
    for sct in &leaf.tbs.scts {
        let log = registry.find_log(&sct.log_id)?;
        let signature =
            decode_signature(&sct.signature).ok_or_else(|| VerificationError::LogInclusion {
                log_id: hex::encode(sct.log_id),
            })?;
        let mut message = SCT_SIGNING_DOMAIN.to_vec();
        message.extend_from_slice(&sct.log_id);
        message.extend_from_slice(&sct.timestamp.to_be_bytes());
        message.extend_from_slice(&digest);
        log.verifying_key()?
            .verify(&message, &signature)
            .map_err(|_| VerificationError::LogInclusion {
                log_id: hex::encode(sct.log_id),
            })?;
    }
    Ok(())
}

/// Run all certificate checks for an epoch and return the leaf certificate's
/// issuance date, the timestamp all staleness checks compare against.
pub fn verify_epoch_certificates(
    pem_chain: &str,
    chain_hash: &[u8; 32],
    epoch_id: u64,
    registry: &TrustRegistry,
) -> Result<DateTime<Utc>, VerificationError> {
    let chain = parse_chain(pem_chain)?;
    verify_chain(&chain, registry)?;
    let leaf = chain.last().expect("parse_chain rejects empty chains");
    check_domain_binding(leaf, chain_hash, epoch_id)?;
    verify_log_inclusion(leaf, registry)?;
    Ok(leaf.tbs.not_before)
}

fn decode_signature(encoded: &str) -> Option<Signature> {
    let raw = Base64::decode_vec(encoded).ok()?;
    Signature::from_slice(&raw).ok()
}
