// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # User Key Capability
//!
//! The engine never touches private key material or OpenPGP internals. All
//! signature and encryption operations involving the user's own keys go
//! through [`UserCrypto`], implemented by the surrounding application on top
//! of its key store. The engine only interprets the results: a signature
//! timestamp to compare against epoch dates, or the plaintext of a
//! checkpoint blob.

use chrono::{DateTime, Utc};

use crate::error::{StorageError, VerificationError};
use crate::models::ClientKey;

/// Signing, verification and encrypt-to-self operations backed by the
/// user's key store.
pub trait UserCrypto: Send + Sync {
    /// Verify a signed key list's detached signature against the given keys
    /// and return the signature's creation time.
    fn verify_key_list_signature(
        &self,
        data: &str,
        signature: &str,
        keys: &[ClientKey],
    ) -> Result<DateTime<Utc>, VerificationError>;

    /// Sign a verified-epoch checkpoint payload with the user's primary key.
    fn sign_checkpoint(&self, data: &[u8]) -> Result<Vec<u8>, VerificationError>;

    /// Verify a checkpoint signature produced by [`Self::sign_checkpoint`].
    fn verify_checkpoint(&self, data: &[u8], signature: &[u8])
        -> Result<(), VerificationError>;

    /// Encrypt a local checkpoint blob to the user's primary key.
    fn encrypt_to_self(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError>;

    /// Decrypt a blob produced by [`Self::encrypt_to_self`].
    fn decrypt_from_self(&self, ciphertext: &[u8]) -> Result<Vec<u8>, StorageError>;
}
