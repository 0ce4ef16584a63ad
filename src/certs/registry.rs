// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Pinned Trust Anchors
//!
//! The fixed set of root certificate authorities an epoch certificate chain
//! may terminate at, and the fixed registry of timestamp-log operators whose
//! embedded proofs anchor those certificates to independent infrastructure.
//!
//! Both tables are baked into the client. An attacker who controls the
//! directory server but not these keys cannot mint an acceptable epoch
//! certificate. Tests inject their own registry instead of mutating the
//! built-in one.

use ed25519_dalek::VerifyingKey;

use crate::error::VerificationError;

/// A pinned root authority, matched by issuer common name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedRoot {
    pub common_name: String,
    pub public_key: [u8; 32],
}

/// A known timestamp-log operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownLog {
    /// 32-byte log identifier embedded in each timestamp proof.
    pub log_id: [u8; 32],
    pub operator: String,
    pub public_key: [u8; 32],
}

/// The trust anchors a chain verification runs against: pinned roots, known
/// timestamp logs, and the directory's VRF public key.
#[derive(Debug, Clone)]
pub struct TrustRegistry {
    roots: Vec<PinnedRoot>,
    logs: Vec<KnownLog>,
    vrf_public_key: [u8; 32],
}

impl TrustRegistry {
    pub fn new(roots: Vec<PinnedRoot>, logs: Vec<KnownLog>, vrf_public_key: [u8; 32]) -> Self {
        Self {
            roots,
            logs,
            vrf_public_key,
        }
    }

    /// The production anchors shipped with the client.
    pub fn builtin() -> Self {
        Self::new(
            vec![
                PinnedRoot {
                    common_name: "KT Root CA R1".into(),
                    public_key: decode_key(
                        "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a",
                    ),
                },
                PinnedRoot {
                    common_name: "KT Root CA R2".into(),
                    public_key: decode_key(
                        "3d4017c3e843895a92b70aa74d1b7ebc9c982ccf2ec4968cc0cd55f12af4660c",
                    ),
                },
            ],
            vec![
                KnownLog {
                    log_id: decode_key(
                        "fc51cd8e6218a1a38da47ed00230f0580816ed13ba3303ac5deb911548908025",
                    ),
                    operator: "Aurora Transparency Log 2026".into(),
                    public_key: decode_key(
                        "fc51cd8e6218a1a38da47ed00230f0580816ed13ba3303ac5deb911548908025",
                    ),
                },
                KnownLog {
                    log_id: decode_key(
                        "278117fc144c72340f67d0f2316e8386ceffbf2b2428c9c51fef7c597f1d426e",
                    ),
                    operator: "Meridian Timestamp Log 2026".into(),
                    public_key: decode_key(
                        "278117fc144c72340f67d0f2316e8386ceffbf2b2428c9c51fef7c597f1d426e",
                    ),
                },
            ],
            decode_key("5866666666666666666666666666666666666666666666666666666666666666"),
        )
    }

    /// The directory's VRF public key, fixed for the log's lifetime.
    pub fn vrf_public_key(&self) -> &[u8; 32] {
        &self.vrf_public_key
    }

    /// Look up a pinned root by issuer common name.
    pub fn find_root(&self, common_name: &str) -> Result<&PinnedRoot, VerificationError> {
        self.roots
            .iter()
            .find(|root| root.common_name == common_name)
            .ok_or_else(|| VerificationError::UnknownRoot(common_name.to_string()))
    }

    /// Look up a timestamp log by its identifier.
    pub fn find_log(&self, log_id: &[u8; 32]) -> Result<&KnownLog, VerificationError> {
        self.logs
            .iter()
            .find(|log| &log.log_id == log_id)
            .ok_or_else(|| VerificationError::UnknownLog(hex::encode(log_id)))
    }
}

impl PinnedRoot {
    pub fn verifying_key(&self) -> Result<VerifyingKey, VerificationError> {
        VerifyingKey::from_bytes(&self.public_key)
            .map_err(|_| VerificationError::UnknownRoot(self.common_name.clone()))
    }
}

impl KnownLog {
    pub fn verifying_key(&self) -> Result<VerifyingKey, VerificationError> {
        VerifyingKey::from_bytes(&self.public_key)
            .map_err(|_| VerificationError::UnknownLog(hex::encode(self.log_id)))
    }
}

fn decode_key(hex_key: &str) -> [u8; 32] {
    hex::decode(hex_key)
        .expect("pinned key is valid hex")
        .try_into()
        .expect("pinned key is 32 bytes")
}
