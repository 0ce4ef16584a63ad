// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key-List Comparison
//!
//! The last line of defense: even with every proof verified, the key list
//! the directory published must be exactly the key list this client holds.
//! Both sides are normalized (lowercased fingerprints, derived primary bit)
//! and sorted by fingerprint before an element-wise comparison; the first
//! differing field aborts with an error naming it.

use crate::error::VerificationError;
use crate::models::{ClientKey, KeyInfo};

/// Parse the JSON payload of a signed key list.
pub fn parse_key_list(data: &str) -> Result<Vec<KeyInfo>, VerificationError> {
    serde_json::from_str(data).map_err(|e| VerificationError::SklParse(e.to_string()))
}

/// Compare the client's keys against a published key list.
///
/// The client list's position 0 is its primary key; order is otherwise
/// irrelevant on both sides because comparison happens in fingerprint order.
pub fn compare(
    client_keys: &[ClientKey],
    skl_keys: &[KeyInfo],
) -> Result<(), VerificationError> {
    if client_keys.is_empty() || skl_keys.is_empty() {
        return Err(VerificationError::EmptyKeyList);
    }
    if client_keys.len() != skl_keys.len() {
        return Err(VerificationError::KeyListLength {
            client: client_keys.len(),
            server: skl_keys.len(),
        });
    }

    let mut derived: Vec<KeyInfo> = client_keys
        .iter()
        .enumerate()
        .map(|(index, key)| KeyInfo {
            fingerprint: key.fingerprint.to_lowercase(),
            sha256_fingerprints: key
                .sha256_fingerprints
                .iter()
                .map(|fp| fp.to_lowercase())
                .collect(),
            flags: key.flags,
            primary: u8::from(index == 0),
        })
        .collect();
    derived.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

    let mut published = skl_keys.to_vec();
    published.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

    for (index, (ours, theirs)) in derived.iter().zip(published.iter()).enumerate() {
        if ours.fingerprint != theirs.fingerprint {
            return Err(VerificationError::KeyFieldMismatch {
                index,
                field: "fingerprint",
            });
        }
        if ours.sha256_fingerprints.len() != theirs.sha256_fingerprints.len() {
            return Err(VerificationError::KeyFieldMismatch {
                index,
                field: "sha256 fingerprints",
            });
        }
        for (a, b) in ours
            .sha256_fingerprints
            .iter()
            .zip(theirs.sha256_fingerprints.iter())
        {
            if a != b {
                return Err(VerificationError::KeyFieldMismatch {
                    index,
                    field: "sha256 fingerprints",
                });
            }
        }
        if ours.flags != theirs.flags {
            return Err(VerificationError::KeyFieldMismatch {
                index,
                field: "flags",
            });
        }
        if ours.primary != theirs.primary {
            return Err(VerificationError::KeyFieldMismatch {
                index,
                field: "primary",
            });
        }
    }
    Ok(())
}
