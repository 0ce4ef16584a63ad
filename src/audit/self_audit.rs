// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Per-Address Self-Audit
//!
//! One address moves through the audit in three stages:
//!
//! 1. **Local reconciliation**: every pending checkpoint blob is checked
//!    against the server's history: the stored key list must still appear
//!    there, and once it has entered an epoch, that epoch is verified and
//!    the blob deleted.
//! 2. **Checkpoint advance**: with a remote verified checkpoint, every key
//!    list published since is verified in its epoch, with revisions
//!    advancing one at a time and certificate dates never regressing. With
//!    no remote checkpoint, the current list's first epoch is verified
//!    directly, or the audit is postponed if no epoch includes it yet.
//! 3. **Upload**: the newest verified epoch becomes the new remote
//!    checkpoint.
//!
//! Outcomes are per address and independent: a failure here never aborts
//! the rest of the batch.

use base64ct::{Base64, Encoding};

use crate::certs::registry::TrustRegistry;
use crate::config;
use crate::error::{KtError, VerificationError};
use crate::fetch::{EpochFetcher, KtTransport, SignedBlob};
use crate::models::{AuditAddress, AuditOutcome, LocalCheckpoint, VerifiedCheckpoint};
use crate::signer::UserCrypto;
use crate::storage::{CheckpointStore, Slot};

use super::verify::{check_freshness, verify_epoch, EpochVerification};

/// Shared collaborators for one audit run.
pub(crate) struct AuditContext<'a, T: KtTransport> {
    pub fetcher: &'a EpochFetcher<T>,
    pub registry: &'a TrustRegistry,
    pub checkpoints: &'a CheckpointStore,
    pub crypto: &'a dyn UserCrypto,
}

/// Audit one address and fold every failure into its outcome.
pub(crate) async fn audit_address<T: KtTransport>(
    ctx: &AuditContext<'_, T>,
    address: &AuditAddress,
) -> AuditOutcome {
    match run(ctx, address).await {
        Ok(outcome) => outcome,
        // Network trouble defers the audit; it says nothing about the log.
        Err(KtError::Fetch(e)) => AuditOutcome::Warning {
            reason: format!("audit deferred: {e}"),
        },
        Err(e) => AuditOutcome::Failed {
            reason: e.to_string(),
        },
    }
}

async fn run<T: KtTransport>(
    ctx: &AuditContext<'_, T>,
    address: &AuditAddress,
) -> Result<AuditOutcome, KtError> {
    let email = ctx.fetcher.canonical_email(&address.email).await?;

    let locals = ctx.checkpoints.load_all(&address.id)?;
    for (slot, local) in &locals {
        reconcile_local_blob(ctx, address, &email, *slot, local).await?;
    }

    match ctx.fetcher.verified_checkpoint(&address.id).await? {
        Some(blob) => advance_checkpoint(ctx, address, &email, blob).await,
        None => bootstrap_checkpoint(ctx, address, &email).await,
    }
}

/// Check one pending local blob against the server history and delete it
/// once its key list is provably part of an epoch.
async fn reconcile_local_blob<T: KtTransport>(
    ctx: &AuditContext<'_, T>,
    address: &AuditAddress,
    email: &str,
    slot: Slot,
    local: &LocalCheckpoint,
) -> Result<(), KtError> {
    let recorded_at = ctx.crypto.verify_key_list_signature(
        &local.signed_key_list.data,
        &local.signed_key_list.signature,
        &address.keys,
    )?;

    let history = ctx
        .fetcher
        .skl_history(email, local.epoch_id, true)
        .await?;
    let included = history
        .iter()
        .find(|skl| skl.data == local.signed_key_list.data)
        .ok_or(VerificationError::StoredSklMissing)?;

    let signed_at =
        ctx.crypto
            .verify_key_list_signature(&included.data, &included.signature, &address.keys)?;
    check_freshness(signed_at, recorded_at)?;

    if let Some(min_epoch_id) = included.min_epoch_id {
        let verification =
            verify_epoch(ctx.fetcher, ctx.registry, email, &included.data, min_epoch_id).await?;
        check_freshness(verification.certificate_date, recorded_at)?;
        ctx.checkpoints.remove(&address.id, slot)?;
        tracing::info!(
            address = %address.id,
            epoch = min_epoch_id,
            "pending key list entered the log, local blob cleared"
        );
    }
    Ok(())
}

/// First audit for an address with no remote checkpoint yet.
async fn bootstrap_checkpoint<T: KtTransport>(
    ctx: &AuditContext<'_, T>,
    address: &AuditAddress,
    email: &str,
) -> Result<AuditOutcome, KtError> {
    let Some(skl) = &address.signed_key_list else {
        return Ok(AuditOutcome::Warning {
            reason: "address is not in the directory yet".into(),
        });
    };

    let Some(min_epoch_id) = skl.min_epoch_id else {
        // Too new: the list exists but no epoch includes it. Postponed.
        return Ok(AuditOutcome::Warning {
            reason: "no epoch includes the address's key list yet".into(),
        });
    };

    ctx.crypto
        .verify_key_list_signature(&skl.data, &skl.signature, &address.keys)?;
    let verification =
        verify_epoch(ctx.fetcher, ctx.registry, email, &skl.data, min_epoch_id).await?;
    upload(ctx, address, verification.clone()).await?;
    Ok(AuditOutcome::Passed {
        checkpoint: verification.into_checkpoint(),
    })
}

/// Verify everything published since the remote checkpoint and move it
/// forward to the newest verified epoch.
async fn advance_checkpoint<T: KtTransport>(
    ctx: &AuditContext<'_, T>,
    address: &AuditAddress,
    email: &str,
    blob: SignedBlob,
) -> Result<AuditOutcome, KtError> {
    let signature = Base64::decode_vec(&blob.signature)
        .map_err(|_| VerificationError::CheckpointSignature)?;
    ctx.crypto
        .verify_checkpoint(blob.data.as_bytes(), &signature)?;
    let checkpoint: VerifiedCheckpoint = serde_json::from_str(&blob.data)
        .map_err(|e| VerificationError::CheckpointParse(e.to_string()))?;

    let history = ctx
        .fetcher
        .skl_history(email, checkpoint.epoch_id, true)
        .await?;
    if history.is_empty() {
        // The checkpointed list itself should still be in the history.
        return Err(VerificationError::StoredSklMissing.into());
    }
    if history.len() > config::MAX_NEW_SKLS {
        return Err(VerificationError::TooManyNewSkls(history.len()).into());
    }

    let mut previous_revision = checkpoint.revision;
    let mut previous_date = checkpoint.certificate_date;
    let mut previous_epoch = checkpoint.epoch_id;
    let mut newest: Option<EpochVerification> = None;

    for (position, skl) in history.iter().enumerate() {
        let is_current = position == history.len() - 1;
        if is_current {
            ctx.crypto
                .verify_key_list_signature(&skl.data, &skl.signature, &address.keys)?;
        }

        // Superseded lists are verified in the first epoch that included
        // them; the current list is verified in the newest epoch. The
        // checkpointed list itself (history includes the last expired one)
        // was verified by the previous audit and is skipped.
        let target_epoch = if is_current {
            match skl.min_epoch_id {
                Some(_) => ctx.fetcher.latest_epoch_id(email).await?,
                // The newest list has not entered an epoch yet; everything
                // before it has been verified, so the audit still passes.
                None => break,
            }
        } else {
            match skl.min_epoch_id {
                Some(min_epoch_id) if min_epoch_id <= checkpoint.epoch_id => continue,
                Some(min_epoch_id) => min_epoch_id,
                // A superseded list that never entered an epoch cannot
                // exist in an honest history.
                None => return Err(VerificationError::NotYetIncluded.into()),
            }
        };

        let verification =
            verify_epoch(ctx.fetcher, ctx.registry, email, &skl.data, target_epoch).await?;

        // The current list may simply be the checkpointed one seen at a
        // newer epoch and keeps its revision; every new list must advance
        // the revision by exactly one.
        let unchanged_list = is_current && verification.revision == previous_revision;
        if !unchanged_list && verification.revision != previous_revision + 1 {
            return Err(VerificationError::RevisionOrder {
                previous: previous_revision,
                got: verification.revision,
            }
            .into());
        }

        if previous_date - verification.certificate_date > config::max_epoch_interval() {
            return Err(VerificationError::CertificateDateRegression {
                older: previous_epoch,
                newer: verification.epoch_id,
            }
            .into());
        }

        previous_revision = verification.revision;
        previous_date = verification.certificate_date;
        previous_epoch = verification.epoch_id;
        newest = Some(verification);
    }

    match newest {
        Some(verification) => {
            upload(ctx, address, verification.clone()).await?;
            Ok(AuditOutcome::Passed {
                checkpoint: verification.into_checkpoint(),
            })
        }
        // Only an unincluded list came back: keep the old checkpoint.
        None => Ok(AuditOutcome::Passed { checkpoint }),
    }
}

async fn upload<T: KtTransport>(
    ctx: &AuditContext<'_, T>,
    address: &AuditAddress,
    verification: EpochVerification,
) -> Result<(), KtError> {
    let checkpoint = verification.into_checkpoint();
    let data = serde_json::to_string(&checkpoint)
        .map_err(|e| VerificationError::CheckpointParse(e.to_string()))?;
    let signature = ctx.crypto.sign_checkpoint(data.as_bytes())?;
    ctx.fetcher
        .upload_checkpoint(
            &address.id,
            SignedBlob {
                data,
                signature: Base64::encode_string(&signature),
            },
        )
        .await?;
    Ok(())
}
