// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! keytrans - Key Transparency Verification & Self-Audit Engine
//!
//! This crate lets a mail client cryptographically verify that the
//! server-operated public-key directory for its addresses is consistent
//! with a publicly auditable, append-only log, anchored by pinned
//! certificate roots and independent timestamp logs, and re-verify that
//! claim incrementally over time through persisted checkpoints.
//!
//! ## Modules
//!
//! - `audit` - Self-audit orchestration (the public entry point)
//! - `certs` - Epoch certificate chain, domain binding, log anchoring
//! - `crypto` - VRF and Merkle proof verification
//! - `fetch` - Directory API transport and epoch caching
//! - `keylist` - Key-list parsing and comparison
//! - `storage` - Local encrypted checkpoint blobs
//! - `signer` - Seam to the user's key store

pub mod audit;
pub mod certs;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fetch;
pub mod keylist;
pub mod models;
pub mod signer;
pub mod storage;

pub use audit::SelfAuditor;
pub use error::{FetchError, KtError, StorageError, VerificationError};
pub use models::{AuditOutcome, AuditReport, KtStatus};
