// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Self-Audit Orchestrator
//!
//! [`SelfAuditor`] is the engine's public entry point. It owns the fetch
//! cache, the local checkpoint store, the trust anchors and the user key
//! capability, and drives the verifier modules:
//!
//! - [`SelfAuditor::verify_public_keys`]: point-in-time check after a key
//!   fetch: is the key list the client holds the one the directory anchors?
//! - [`SelfAuditor::self_audit`]: the periodic incremental audit across
//!   all of the user's addresses.
//! - [`SelfAuditor::verify_self_audit_result`] /
//!   [`SelfAuditor::save_checkpoint`]: finalize step after key changes; a
//!   fresh, passing audit is required before a new checkpoint may be
//!   persisted.
//!
//! Addresses are audited sequentially and independently; a per-address
//! mutex serializes concurrent runs touching the same address, since the
//! two-slot local store is read-modify-write. Cancellation is observed
//! between addresses: a cancelled run reports what it finished.

mod self_audit;
mod verify;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64ct::{Base64, Encoding};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::certs::registry::TrustRegistry;
use crate::config;
use crate::error::KtError;
use crate::fetch::{EpochCache, EpochFetcher, KtTransport, SignedBlob};
use crate::models::{
    AddressId, AuditAddress, AuditOutcome, AuditReport, ClientKey, KtStatus, SignedKeyList,
};
use crate::signer::UserCrypto;
use crate::storage::{BlobStore, CheckpointStore};

use self_audit::{audit_address, AuditContext};

/// The top-level Key Transparency engine.
pub struct SelfAuditor<T: KtTransport> {
    fetcher: EpochFetcher<T>,
    registry: TrustRegistry,
    checkpoints: CheckpointStore,
    crypto: Arc<dyn UserCrypto>,
    last_report: tokio::sync::RwLock<Option<AuditReport>>,
    address_locks: Mutex<HashMap<AddressId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<T: KtTransport> SelfAuditor<T> {
    /// Build an auditor against the production trust anchors.
    pub fn new(
        transport: T,
        cache: Arc<dyn EpochCache>,
        blobs: Arc<dyn BlobStore>,
        crypto: Arc<dyn UserCrypto>,
    ) -> Self {
        Self::with_registry(transport, cache, blobs, crypto, TrustRegistry::builtin())
    }

    /// Build an auditor with explicit trust anchors (tests, staging).
    pub fn with_registry(
        transport: T,
        cache: Arc<dyn EpochCache>,
        blobs: Arc<dyn BlobStore>,
        crypto: Arc<dyn UserCrypto>,
        registry: TrustRegistry,
    ) -> Self {
        Self {
            fetcher: EpochFetcher::new(transport, cache),
            registry,
            checkpoints: CheckpointStore::new(blobs, crypto.clone()),
            crypto,
            last_report: tokio::sync::RwLock::new(None),
            address_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Point-in-time verification of a fetched key list against the log.
    ///
    /// `skl` is the signed key list the server serves for the address, or
    /// `None` when the directory has no entry for it.
    pub async fn verify_public_keys(
        &self,
        client_keys: &[ClientKey],
        email: &str,
        skl: Option<&SignedKeyList>,
    ) -> Result<KtStatus, KtError> {
        verify::verify_public_keys(
            &self.fetcher,
            &self.registry,
            self.crypto.as_ref(),
            client_keys,
            email,
            skl,
        )
        .await
    }

    /// Incrementally audit every address, one at a time.
    ///
    /// Each address gets an independent outcome; failures never abort the
    /// batch. Cancellation stops before the next address and the report
    /// covers whatever completed.
    pub async fn self_audit(
        &self,
        addresses: &[AuditAddress],
        cancel: &CancellationToken,
    ) -> AuditReport {
        let started_at = Utc::now();
        {
            let mut report = self.last_report.write().await;
            *report = Some(AuditReport {
                started_at,
                finished_at: None,
                outcomes: HashMap::new(),
            });
        }

        let mut outcomes = HashMap::new();
        for address in addresses {
            if cancel.is_cancelled() {
                tracing::info!(
                    audited = outcomes.len(),
                    remaining = addresses.len() - outcomes.len(),
                    "self-audit cancelled"
                );
                break;
            }

            let lock = self.address_lock(&address.id);
            let _guard = lock.lock().await;

            let outcome = audit_address(
                &AuditContext {
                    fetcher: &self.fetcher,
                    registry: &self.registry,
                    checkpoints: &self.checkpoints,
                    crypto: self.crypto.as_ref(),
                },
                address,
            )
            .await;

            match &outcome {
                AuditOutcome::Passed { checkpoint } => tracing::info!(
                    address = %address.id,
                    epoch = checkpoint.epoch_id,
                    "address audit passed"
                ),
                AuditOutcome::Warning { reason } => {
                    tracing::info!(address = %address.id, reason, "address audit postponed")
                }
                AuditOutcome::Failed { reason } => {
                    tracing::warn!(address = %address.id, reason, "address audit failed")
                }
            }
            outcomes.insert(address.id.clone(), outcome);
        }

        let report = AuditReport {
            started_at,
            finished_at: Some(Utc::now()),
            outcomes,
        };
        {
            let mut last = self.last_report.write().await;
            *last = Some(report.clone());
        }
        report
    }

    /// Check that the last audit is finished, fresh, and passed for this
    /// address, and build the signed checkpoint message to persist.
    pub async fn verify_self_audit_result(
        &self,
        address_id: &AddressId,
    ) -> Result<SignedBlob, KtError> {
        let guard = self.last_report.read().await;
        let report = guard.as_ref().ok_or(KtError::AuditExpired)?;
        let finished_at = report.finished_at.ok_or(KtError::AuditInProgress)?;
        if Utc::now() - finished_at > config::exp_epoch_interval() {
            return Err(KtError::AuditExpired);
        }

        let outcome = report
            .outcomes
            .get(address_id)
            .ok_or_else(|| KtError::AddressNotAudited(address_id.to_string()))?;
        match outcome {
            AuditOutcome::Passed { checkpoint } => {
                let data = serde_json::to_string(checkpoint)
                    .map_err(|e| KtError::Verification(
                        crate::error::VerificationError::CheckpointParse(e.to_string()),
                    ))?;
                let signature = self.crypto.sign_checkpoint(data.as_bytes())?;
                Ok(SignedBlob {
                    data,
                    signature: Base64::encode_string(&signature),
                })
            }
            AuditOutcome::Warning { reason } | AuditOutcome::Failed { reason } => {
                Err(KtError::AuditNotPassed(reason.clone()))
            }
        }
    }

    /// Finalize: upload the checkpoint built from the last passing audit.
    pub async fn save_checkpoint(&self, address_id: &AddressId) -> Result<(), KtError> {
        let blob = self.verify_self_audit_result(address_id).await?;
        self.fetcher.upload_checkpoint(address_id, blob).await?;
        tracing::info!(address = %address_id, "verified-epoch checkpoint uploaded");
        Ok(())
    }

    /// The report of the most recent audit run, if any.
    pub async fn last_report(&self) -> Option<AuditReport> {
        self.last_report.read().await.clone()
    }

    fn address_lock(&self, address_id: &AddressId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.address_locks.lock().expect("address lock map");
        locks
            .entry(address_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
