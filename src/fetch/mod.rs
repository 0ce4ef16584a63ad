// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Directory Fetch Layer
//!
//! [`KtTransport`] is the seam to the HTTP API: every network interaction
//! the engine performs goes through it, so tests drive the whole audit
//! against an in-memory directory. [`EpochFetcher`] wraps a transport with
//! an injected [`EpochCache`]: epochs are immutable once published, so a
//! fetched epoch never needs to be fetched again.
//!
//! Fetch failures are [`FetchError`]s, a family entirely separate from
//! verification failures: a timeout is recoverable, a bad proof is not.

pub mod http;

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::FetchError;
use crate::models::{AddressId, Epoch, InclusionProof, SignedKeyList};

/// A signed payload as uploaded to or downloaded from the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SignedBlob {
    pub data: String,
    pub signature: String,
}

/// The directory server's API surface, as consumed by the engine.
#[async_trait]
pub trait KtTransport: Send + Sync {
    /// Identifier of the newest published epoch covering this email.
    async fn latest_epoch_id(&self, email: &str) -> Result<u64, FetchError>;

    /// Fetch one epoch by identifier.
    async fn epoch(&self, epoch_id: u64) -> Result<Epoch, FetchError>;

    /// Fetch the inclusion proof for `(epoch, email)`.
    async fn inclusion_proof(
        &self,
        epoch_id: u64,
        email: &str,
    ) -> Result<InclusionProof, FetchError>;

    /// Ordered signed-key-list history for an email since an epoch,
    /// optionally including the last already-expired list.
    async fn skl_history(
        &self,
        email: &str,
        since_epoch_id: u64,
        include_last_expired: bool,
    ) -> Result<Vec<SignedKeyList>, FetchError>;

    /// Server-side canonical form of an email (case/alias normalization).
    async fn canonical_email(&self, email: &str) -> Result<String, FetchError>;

    /// The remotely stored verified-epoch checkpoint, if any.
    async fn verified_checkpoint(
        &self,
        address_id: &AddressId,
    ) -> Result<Option<SignedBlob>, FetchError>;

    /// Upload a new verified-epoch checkpoint.
    async fn upload_checkpoint(
        &self,
        address_id: &AddressId,
        blob: SignedBlob,
    ) -> Result<(), FetchError>;
}

/// Cache seam for fetched epochs.
///
/// Injected so production can bound memory with an LRU while tests use a
/// deterministic map.
pub trait EpochCache: Send + Sync {
    fn get(&self, epoch_id: u64) -> Option<Epoch>;
    fn put(&self, epoch: Epoch);
}

/// Bounded production epoch cache.
pub struct LruEpochCache {
    cache: Mutex<LruCache<u64, Epoch>>,
}

impl LruEpochCache {
    /// Create a cache holding at most `capacity` epochs.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
        }
    }
}

impl EpochCache for LruEpochCache {
    fn get(&self, epoch_id: u64) -> Option<Epoch> {
        let mut cache = self.cache.lock().ok()?;
        cache.get(&epoch_id).cloned()
    }

    fn put(&self, epoch: Epoch) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(epoch.epoch_id, epoch);
        }
    }
}

/// Client-side normalization applied before any email reaches the wire.
pub fn normalize_email(email: &str) -> String {
    email.trim().nfc().collect()
}

/// A transport wrapper that memoizes epochs through an [`EpochCache`].
pub struct EpochFetcher<T> {
    transport: T,
    cache: Arc<dyn EpochCache>,
}

impl<T: KtTransport> EpochFetcher<T> {
    pub fn new(transport: T, cache: Arc<dyn EpochCache>) -> Self {
        Self { transport, cache }
    }

    /// The wrapped transport (cache bypass for callers that need it).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch an epoch, serving repeats from the cache.
    pub async fn epoch(&self, epoch_id: u64) -> Result<Epoch, FetchError> {
        if let Some(epoch) = self.cache.get(epoch_id) {
            return Ok(epoch);
        }
        let epoch = self.transport.epoch(epoch_id).await?;
        self.cache.put(epoch.clone());
        Ok(epoch)
    }

    pub async fn latest_epoch_id(&self, email: &str) -> Result<u64, FetchError> {
        self.transport.latest_epoch_id(email).await
    }

    pub async fn inclusion_proof(
        &self,
        epoch_id: u64,
        email: &str,
    ) -> Result<InclusionProof, FetchError> {
        self.transport.inclusion_proof(epoch_id, email).await
    }

    pub async fn skl_history(
        &self,
        email: &str,
        since_epoch_id: u64,
        include_last_expired: bool,
    ) -> Result<Vec<SignedKeyList>, FetchError> {
        self.transport
            .skl_history(email, since_epoch_id, include_last_expired)
            .await
    }

    /// Resolve the canonical form of an email, normalizing locally first.
    pub async fn canonical_email(&self, email: &str) -> Result<String, FetchError> {
        let normalized = normalize_email(email);
        self.transport.canonical_email(&normalized).await
    }

    pub async fn verified_checkpoint(
        &self,
        address_id: &AddressId,
    ) -> Result<Option<SignedBlob>, FetchError> {
        self.transport.verified_checkpoint(address_id).await
    }

    pub async fn upload_checkpoint(
        &self,
        address_id: &AddressId,
        blob: SignedBlob,
    ) -> Result<(), FetchError> {
        self.transport.upload_checkpoint(address_id, blob).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        epoch_calls: AtomicUsize,
    }

    #[async_trait]
    impl KtTransport for CountingTransport {
        async fn latest_epoch_id(&self, _email: &str) -> Result<u64, FetchError> {
            Ok(7)
        }

        async fn epoch(&self, epoch_id: u64) -> Result<Epoch, FetchError> {
            self.epoch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Epoch {
                epoch_id,
                tree_hash: [1; 32],
                chain_hash: [2; 32],
                prev_chain_hash: [3; 32],
                certificate_chain: String::new(),
            })
        }

        async fn inclusion_proof(
            &self,
            _epoch_id: u64,
            _email: &str,
        ) -> Result<InclusionProof, FetchError> {
            Err(FetchError::Request("not used".into()))
        }

        async fn skl_history(
            &self,
            _email: &str,
            _since_epoch_id: u64,
            _include_last_expired: bool,
        ) -> Result<Vec<SignedKeyList>, FetchError> {
            Ok(vec![])
        }

        async fn canonical_email(&self, email: &str) -> Result<String, FetchError> {
            Ok(email.to_lowercase())
        }

        async fn verified_checkpoint(
            &self,
            _address_id: &AddressId,
        ) -> Result<Option<SignedBlob>, FetchError> {
            Ok(None)
        }

        async fn upload_checkpoint(
            &self,
            _address_id: &AddressId,
            _blob: SignedBlob,
        ) -> Result<(), FetchError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn epochs_are_fetched_once() {
        let fetcher = EpochFetcher::new(
            CountingTransport {
                epoch_calls: AtomicUsize::new(0),
            },
            Arc::new(LruEpochCache::new(8)),
        );

        let first = fetcher.epoch(5).await.unwrap();
        let second = fetcher.epoch(5).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.transport.epoch_calls.load(Ordering::SeqCst), 1);

        fetcher.epoch(6).await.unwrap();
        assert_eq!(fetcher.transport.epoch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn canonicalization_normalizes_before_the_wire() {
        let fetcher = EpochFetcher::new(
            CountingTransport {
                epoch_calls: AtomicUsize::new(0),
            },
            Arc::new(LruEpochCache::new(8)),
        );
        // NFD "é" (e + combining acute) normalizes to the NFC code point.
        let canonical = fetcher.canonical_email(" Use\u{0301}r@Example.com ").await.unwrap();
        assert_eq!(canonical, "usér@example.com");
    }

    #[test]
    fn lru_cache_evicts_beyond_capacity() {
        let cache = LruEpochCache::new(1);
        let epoch = |id| Epoch {
            epoch_id: id,
            tree_hash: [0; 32],
            chain_hash: [0; 32],
            prev_chain_hash: [0; 32],
            certificate_chain: String::new(),
        };
        cache.put(epoch(1));
        cache.put(epoch(2));
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
    }
}
