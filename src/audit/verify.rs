// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-epoch verification: the composition of certificate, chain-hash,
//! VRF and Merkle checks every audit path runs, plus the point-in-time
//! public-key check exposed to callers.

use chrono::{DateTime, Utc};

use crate::certs;
use crate::certs::registry::TrustRegistry;
use crate::config;
use crate::crypto::merkle;
use crate::error::{KtError, VerificationError};
use crate::fetch::{EpochFetcher, KtTransport};
use crate::keylist;
use crate::models::{ClientKey, KtStatus, SignedKeyList, VerifiedCheckpoint};
use crate::signer::UserCrypto;

/// Everything a fully verified epoch yields for checkpointing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EpochVerification {
    pub epoch_id: u64,
    pub chain_hash: [u8; 32],
    pub certificate_date: DateTime<Utc>,
    pub revision: u32,
}

impl EpochVerification {
    pub fn into_checkpoint(self) -> VerifiedCheckpoint {
        VerifiedCheckpoint {
            epoch_id: self.epoch_id,
            chain_hash: self.chain_hash,
            certificate_date: self.certificate_date,
            revision: self.revision,
        }
    }
}

/// Fetch and verify one epoch for an email's key list: certificate chain,
/// domain binding, log anchoring, chain-hash law, then VRF + Merkle
/// inclusion of the list data.
pub(crate) async fn verify_epoch<T: KtTransport>(
    fetcher: &EpochFetcher<T>,
    registry: &TrustRegistry,
    email: &str,
    skl_data: &str,
    epoch_id: u64,
) -> Result<EpochVerification, KtError> {
    let epoch = fetcher.epoch(epoch_id).await?;
    let proof = fetcher.inclusion_proof(epoch_id, email).await?;

    let certificate_date = certs::verify_epoch_certificates(
        &epoch.certificate_chain,
        &epoch.chain_hash,
        epoch.epoch_id,
        registry,
    )?;
    merkle::verify_chain_hash(&epoch.tree_hash, &epoch.prev_chain_hash, &epoch.chain_hash)?;
    merkle::verify_inclusion(
        &proof,
        &epoch.tree_hash,
        skl_data,
        email,
        registry.vrf_public_key(),
    )?;

    Ok(EpochVerification {
        epoch_id: epoch.epoch_id,
        chain_hash: epoch.chain_hash,
        certificate_date,
        revision: proof.revision,
    })
}

/// Require a certificate date to lie within the maximum epoch interval of a
/// reference time, in either direction.
pub(crate) fn check_freshness(
    certificate_date: DateTime<Utc>,
    reference: DateTime<Utc>,
) -> Result<(), VerificationError> {
    let age = (reference - certificate_date).abs();
    let max = config::max_epoch_interval();
    if age > max {
        return Err(VerificationError::StaleEpoch {
            age_seconds: age.num_seconds(),
            max_seconds: max.num_seconds(),
        });
    }
    Ok(())
}

/// Point-in-time check that the key list this client holds for `email` is
/// the one the directory has published and anchored.
///
/// Returns [`KtStatus::AddressNotInDirectory`] when the server serves no
/// signed key list at all, and [`KtStatus::AwaitingInclusion`] when the
/// list has not entered an epoch yet (too recent to audit, retry later).
/// All hard failures surface as errors naming the failed check.
pub(crate) async fn verify_public_keys<T: KtTransport>(
    fetcher: &EpochFetcher<T>,
    registry: &TrustRegistry,
    crypto: &dyn UserCrypto,
    client_keys: &[ClientKey],
    email: &str,
    skl: Option<&SignedKeyList>,
) -> Result<KtStatus, KtError> {
    let canonical = fetcher.canonical_email(email).await?;

    let Some(skl) = skl else {
        tracing::info!(email = %canonical, "directory has no key list for this address");
        return Ok(KtStatus::AddressNotInDirectory);
    };

    let published = keylist::parse_key_list(&skl.data)?;
    crypto.verify_key_list_signature(&skl.data, &skl.signature, client_keys)?;
    keylist::compare(client_keys, &published)?;

    let Some(max_epoch_id) = skl.max_epoch_id else {
        tracing::info!(email = %canonical, "key list awaits epoch inclusion");
        return Ok(KtStatus::AwaitingInclusion);
    };

    let verification = verify_epoch(fetcher, registry, &canonical, &skl.data, max_epoch_id).await?;
    check_freshness(verification.certificate_date, Utc::now())?;

    tracing::info!(
        email = %canonical,
        epoch = verification.epoch_id,
        "public keys verified against the directory"
    );
    Ok(KtStatus::Passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn freshness_boundary_is_inclusive() {
        let reference = DateTime::from_timestamp(1_750_000_000, 0).unwrap();

        // Exactly the interval away passes, in both directions.
        let max = config::max_epoch_interval();
        check_freshness(reference - max, reference).unwrap();
        check_freshness(reference + max, reference).unwrap();

        // One millisecond beyond fails.
        let over = max + Duration::milliseconds(1);
        assert!(matches!(
            check_freshness(reference - over, reference),
            Err(VerificationError::StaleEpoch { .. })
        ));
        assert!(matches!(
            check_freshness(reference + over, reference),
            Err(VerificationError::StaleEpoch { .. })
        ));
    }
}
