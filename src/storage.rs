// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Local Checkpoint Storage
//!
//! Between uploading a new key list and seeing it included in an epoch, the
//! client remembers what it uploaded in a local, encrypted-to-self blob.
//! Self-audit later reconciles these blobs against the server's history and
//! deletes them once subsumed by a verified epoch.
//!
//! Storage is bounded by construction: each address owns exactly two slots
//! ([`Slot::Primary`], [`Slot::Secondary`]), keyed as `(address, slot)`,
//! never by parsing composite string keys. Blobs are opaque bytes at this
//! layer; [`CheckpointStore`] adds the JSON payload and the
//! encrypt/decrypt-to-self round trip on top of any [`BlobStore`].

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::MAX_CHECKPOINT_BLOBS;
use crate::error::StorageError;
use crate::models::{AddressId, LocalCheckpoint};
use crate::signer::UserCrypto;

/// One of the two local blob slots an address may occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    Primary,
    Secondary,
}

impl Slot {
    pub const ALL: [Slot; MAX_CHECKPOINT_BLOBS] = [Slot::Primary, Slot::Secondary];

    fn index(self) -> u8 {
        match self {
            Slot::Primary => 0,
            Slot::Secondary => 1,
        }
    }
}

/// Opaque per-(address, slot) byte storage.
///
/// Implementations hold ciphertext only; plaintext never reaches this trait.
pub trait BlobStore: Send + Sync {
    fn read(&self, address_id: &AddressId, slot: Slot) -> Result<Option<Vec<u8>>, StorageError>;
    fn write(&self, address_id: &AddressId, slot: Slot, data: &[u8]) -> Result<(), StorageError>;
    fn remove(&self, address_id: &AddressId, slot: Slot) -> Result<(), StorageError>;
}

// =============================================================================
// Filesystem-backed store
// =============================================================================

/// Blob store over a directory tree: one file per `(address, slot)`.
///
/// Writes go to a temp file first and are renamed into place, so a crashed
/// write never leaves a torn blob behind.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, address_id: &AddressId, slot: Slot) -> PathBuf {
        self.root
            .join(&address_id.0)
            .join(format!("checkpoint-{}.blob", slot.index()))
    }

    fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(data)?;
            file.flush()?;
        }
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn read(&self, address_id: &AddressId, slot: Slot) -> Result<Option<Vec<u8>>, StorageError> {
        // Open instead of stat: encrypted mounts can fail metadata calls on
        // files that read back fine.
        match File::open(self.blob_path(address_id, slot)) {
            Ok(mut file) => {
                let mut data = Vec::new();
                file.read_to_end(&mut data)?;
                Ok(Some(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, address_id: &AddressId, slot: Slot, data: &[u8]) -> Result<(), StorageError> {
        Self::write_atomic(&self.blob_path(address_id, slot), data)
    }

    fn remove(&self, address_id: &AddressId, slot: Slot) -> Result<(), StorageError> {
        match fs::remove_file(self.blob_path(address_id, slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Map-backed store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<(AddressId, u8), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, address_id: &AddressId, slot: Slot) -> Result<Option<Vec<u8>>, StorageError> {
        let blobs = self.blobs.lock().expect("blob map lock");
        Ok(blobs.get(&(address_id.clone(), slot.index())).cloned())
    }

    fn write(&self, address_id: &AddressId, slot: Slot, data: &[u8]) -> Result<(), StorageError> {
        let mut blobs = self.blobs.lock().expect("blob map lock");
        blobs.insert((address_id.clone(), slot.index()), data.to_vec());
        Ok(())
    }

    fn remove(&self, address_id: &AddressId, slot: Slot) -> Result<(), StorageError> {
        let mut blobs = self.blobs.lock().expect("blob map lock");
        blobs.remove(&(address_id.clone(), slot.index()));
        Ok(())
    }
}

// =============================================================================
// Typed checkpoint store
// =============================================================================

/// Typed view over a [`BlobStore`]: serializes [`LocalCheckpoint`]s,
/// encrypts them to the user, and enforces the two-slot bound.
pub struct CheckpointStore {
    blobs: Arc<dyn BlobStore>,
    crypto: Arc<dyn UserCrypto>,
}

impl CheckpointStore {
    pub fn new(blobs: Arc<dyn BlobStore>, crypto: Arc<dyn UserCrypto>) -> Self {
        Self { blobs, crypto }
    }

    /// Load and decrypt every stored checkpoint for an address, ordered by
    /// recorded epoch, oldest first.
    ///
    /// Two blobs recording the same epoch mean local state was corrupted.
    pub fn load_all(
        &self,
        address_id: &AddressId,
    ) -> Result<Vec<(Slot, LocalCheckpoint)>, StorageError> {
        let mut entries = Vec::new();
        for slot in Slot::ALL {
            if let Some(ciphertext) = self.blobs.read(address_id, slot)? {
                let plaintext = self.crypto.decrypt_from_self(&ciphertext)?;
                let checkpoint: LocalCheckpoint = serde_json::from_slice(&plaintext)?;
                entries.push((slot, checkpoint));
            }
        }
        entries.sort_by_key(|(_, checkpoint)| checkpoint.epoch_id);
        if let [(_, first), (_, second)] = entries.as_slice() {
            if first.epoch_id == second.epoch_id {
                return Err(StorageError::SlotOrder);
            }
        }
        Ok(entries)
    }

    /// Store a new pending checkpoint in the first free slot.
    pub fn store_pending(
        &self,
        address_id: &AddressId,
        checkpoint: &LocalCheckpoint,
    ) -> Result<Slot, StorageError> {
        let mut free = None;
        for slot in Slot::ALL {
            if self.blobs.read(address_id, slot)?.is_none() {
                free = Some(slot);
                break;
            }
        }
        let slot = free.ok_or(StorageError::TooManyBlobs(MAX_CHECKPOINT_BLOBS))?;

        let plaintext = serde_json::to_vec(checkpoint)?;
        let ciphertext = self.crypto.encrypt_to_self(&plaintext)?;
        self.blobs.write(address_id, slot, &ciphertext)?;
        Ok(slot)
    }

    /// Delete a blob once its checkpoint is subsumed by a verified epoch.
    pub fn remove(&self, address_id: &AddressId, slot: Slot) -> Result<(), StorageError> {
        self.blobs.remove(address_id, slot)
    }
}
