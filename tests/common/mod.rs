// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test directory: an in-memory Key Transparency server that publishes
//! genuinely verifiable epochs: real VRF proofs, real Merkle roots, real
//! certificate chains under an injected trust registry. Scenarios build a
//! directory state, hand its transport to the auditor, and assert outcomes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

use keytrans::certs::registry::{KnownLog, PinnedRoot, TrustRegistry};
use keytrans::certs::{
    Certificate, SignedCertificateTimestamp, TbsCertificate, CERT_SIGNING_DOMAIN,
    SCT_SIGNING_DOMAIN,
};
use keytrans::crypto::vrf;
use keytrans::error::{FetchError, StorageError, VerificationError};
use keytrans::fetch::{KtTransport, SignedBlob};
use keytrans::models::{AddressId, ClientKey, Epoch, InclusionProof, SignedKeyList};
use keytrans::signer::UserCrypto;

pub const TREE_DEPTH: usize = 256;

// =============================================================================
// VRF proving (server side; the crate only verifies)
// =============================================================================

pub struct VrfKeypair {
    pub secret: Scalar,
    pub public: [u8; 32],
}

pub fn vrf_keypair(seed: &[u8]) -> VrfKeypair {
    let mut hasher = Sha256::new();
    hasher.update(b"fixture-vrf-key");
    hasher.update(seed);
    let secret = Scalar::from_bytes_mod_order(hasher.finalize().into());
    let public = (ED25519_BASEPOINT_POINT * secret).compress().to_bytes();
    VrfKeypair { secret, public }
}

fn vrf_challenge(
    h: &EdwardsPoint,
    pk: &EdwardsPoint,
    gamma: &EdwardsPoint,
    u: &EdwardsPoint,
    v: &EdwardsPoint,
) -> [u8; 16] {
    let mut hasher = Sha256::new();
    hasher.update(ED25519_BASEPOINT_POINT.compress().as_bytes());
    hasher.update(h.compress().as_bytes());
    hasher.update(pk.compress().as_bytes());
    hasher.update(gamma.compress().as_bytes());
    hasher.update(u.compress().as_bytes());
    hasher.update(v.compress().as_bytes());
    let digest = hasher.finalize();
    digest[..16].try_into().unwrap()
}

pub fn vrf_prove(keypair: &VrfKeypair, email: &str) -> ([u8; 32], Vec<u8>) {
    let h = vrf::hash_to_curve(email.as_bytes(), &keypair.public).expect("hash to curve");
    let gamma = h * keypair.secret;

    let mut hasher = Sha256::new();
    hasher.update(b"fixture-vrf-nonce");
    hasher.update(keypair.secret.as_bytes());
    hasher.update(email.as_bytes());
    let k = Scalar::from_bytes_mod_order(hasher.finalize().into());

    let u = ED25519_BASEPOINT_POINT * k;
    let v = h * k;
    let pk = CompressedEdwardsY(keypair.public).decompress().unwrap();
    let challenge = vrf_challenge(&h, &pk, &gamma, &u, &v);

    let mut wide = [0u8; 32];
    wide[..16].copy_from_slice(&challenge);
    let c = Scalar::from_bytes_mod_order(wide);
    let s = k - c * keypair.secret;

    let name = gamma.compress().to_bytes();
    let mut proof = Vec::with_capacity(81);
    proof.push(0x02);
    proof.extend_from_slice(&name);
    proof.extend_from_slice(&challenge);
    proof.extend_from_slice(s.as_bytes());
    (name, proof)
}

// =============================================================================
// Merkle building (mirrors the verifier's walk)
// =============================================================================

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

pub fn leaf_value(skl_data: &[u8], revision: u32) -> [u8; 32] {
    let data_hash: [u8; 32] = Sha256::digest(skl_data).into();
    let mut hasher = Sha256::new();
    hasher.update(data_hash);
    hasher.update(revision.to_be_bytes());
    hasher.finalize().into()
}

pub fn root_from_leaf(
    leaf_name: &[u8; 32],
    leaf: [u8; 32],
    neighbors: &[Option<[u8; 32]>],
) -> [u8; 32] {
    let mut value = leaf;
    for i in (0..neighbors.len()).rev() {
        let neighbor = neighbors[i].unwrap_or([0u8; 32]);
        let byte = leaf_name[(i / 8) % 32];
        let bit = (byte >> (7 - (i % 8))) & 1;
        value = if bit == 1 {
            hash_pair(&neighbor, &value)
        } else {
            hash_pair(&value, &neighbor)
        };
    }
    value
}

// =============================================================================
// Directory fixture
// =============================================================================

pub struct DirectoryFixture {
    pub vrf: VrfKeypair,
    root_key: SigningKey,
    intermediate_key: SigningKey,
    log_key: SigningKey,
    log_id: [u8; 32],
    epochs: HashMap<u64, Epoch>,
    proofs: HashMap<(u64, String), InclusionProof>,
    histories: HashMap<String, Vec<SignedKeyList>>,
    latest_epoch: u64,
    prev_chain_hash: [u8; 32],
}

impl DirectoryFixture {
    pub fn new() -> Self {
        Self {
            vrf: vrf_keypair(b"directory"),
            root_key: SigningKey::from_bytes(&[41; 32]),
            intermediate_key: SigningKey::from_bytes(&[42; 32]),
            log_key: SigningKey::from_bytes(&[43; 32]),
            log_id: [0x07; 32],
            epochs: HashMap::new(),
            proofs: HashMap::new(),
            histories: HashMap::new(),
            latest_epoch: 0,
            prev_chain_hash: [0u8; 32],
        }
    }

    /// Trust anchors matching this directory's keys.
    pub fn registry(&self) -> TrustRegistry {
        TrustRegistry::new(
            vec![PinnedRoot {
                common_name: "Fixture Root CA".into(),
                public_key: self.root_key.verifying_key().to_bytes(),
            }],
            vec![KnownLog {
                log_id: self.log_id,
                operator: "Fixture Log".into(),
                public_key: self.log_key.verifying_key().to_bytes(),
            }],
            self.vrf.public,
        )
    }

    /// Publish an epoch containing one email's key list.
    pub fn publish_epoch(
        &mut self,
        epoch_id: u64,
        email: &str,
        skl_data: &str,
        revision: u32,
        not_before: DateTime<Utc>,
    ) {
        assert!(epoch_id > self.latest_epoch, "epoch ids must increase");

        let (leaf_name, vrf_proof) = vrf_prove(&self.vrf, email);
        let neighbors: Vec<Option<[u8; 32]>> = vec![None; TREE_DEPTH];
        let tree_hash = root_from_leaf(&leaf_name, leaf_value(skl_data.as_bytes(), revision), &neighbors);
        let chain_hash = hash_pair(&self.prev_chain_hash, &tree_hash);

        let certificate_chain = self.certificate_chain(&chain_hash, epoch_id, not_before);
        self.epochs.insert(
            epoch_id,
            Epoch {
                epoch_id,
                tree_hash,
                chain_hash,
                prev_chain_hash: self.prev_chain_hash,
                certificate_chain,
            },
        );
        self.proofs.insert(
            (epoch_id, email.to_string()),
            InclusionProof {
                leaf_name,
                vrf_proof,
                revision,
                neighbors,
            },
        );
        self.prev_chain_hash = chain_hash;
        self.latest_epoch = epoch_id;
    }

    /// Set the full signed-key-list history served for an email.
    pub fn set_history(&mut self, email: &str, history: Vec<SignedKeyList>) {
        self.histories.insert(email.to_string(), history);
    }

    /// Corrupt a published proof (tamper with one neighbor hash).
    pub fn corrupt_proof(&mut self, epoch_id: u64, email: &str) {
        let proof = self
            .proofs
            .get_mut(&(epoch_id, email.to_string()))
            .expect("proof exists");
        proof.neighbors[100] = Some([0x66; 32]);
    }

    fn certificate_chain(
        &self,
        chain_hash: &[u8; 32],
        epoch_id: u64,
        not_before: DateTime<Utc>,
    ) -> String {
        let leaf_key = SigningKey::from_bytes(&[44; 32]);
        let hash_hex = hex::encode(chain_hash);
        let suffix = "epoch.keytrans.test";

        let intermediate = sign_certificate(
            TbsCertificate {
                version: 3,
                serial: 100,
                issuer: "Fixture Root CA".into(),
                subject: "Fixture Issuing CA".into(),
                not_before,
                not_after: not_before + chrono::Duration::days(90),
                subject_alt_names: vec![],
                public_key: self.intermediate_key.verifying_key().to_bytes(),
                scts: vec![],
            },
            &self.root_key,
        );

        let mut leaf_body = TbsCertificate {
            version: 3,
            serial: 100 + epoch_id,
            issuer: "Fixture Issuing CA".into(),
            subject: suffix.into(),
            not_before,
            not_after: not_before + chrono::Duration::days(90),
            subject_alt_names: vec![
                suffix.into(),
                format!("{}.{}.{}.0.{}", &hash_hex[..32], &hash_hex[32..], epoch_id, suffix),
            ],
            public_key: leaf_key.verifying_key().to_bytes(),
            scts: vec![],
        };
        leaf_body.scts = vec![self.sign_sct(&leaf_body)];
        let leaf = sign_certificate(leaf_body, &self.intermediate_key);

        [intermediate, leaf]
            .iter()
            .map(|cert| {
                pem::encode(&pem::Pem::new(
                    "CERTIFICATE",
                    serde_json::to_vec(cert).unwrap(),
                ))
            })
            .collect()
    }

    fn sign_sct(&self, body: &TbsCertificate) -> SignedCertificateTimestamp {
        let mut submitted = body.clone();
        submitted.scts.clear();
        let digest: [u8; 32] = Sha256::digest(serde_json::to_vec(&submitted).unwrap()).into();

        let timestamp = body.not_before.timestamp_millis();
        let mut message = SCT_SIGNING_DOMAIN.to_vec();
        message.extend_from_slice(&self.log_id);
        message.extend_from_slice(&timestamp.to_be_bytes());
        message.extend_from_slice(&digest);
        SignedCertificateTimestamp {
            log_id: self.log_id,
            timestamp,
            signature: Base64::encode_string(&self.log_key.sign(&message).to_bytes()),
        }
    }

    /// A published epoch, for seeding checkpoints in scenarios.
    pub fn epoch(&self, epoch_id: u64) -> &Epoch {
        &self.epochs[&epoch_id]
    }

    pub fn into_transport(self) -> FixtureTransport {
        FixtureTransport {
            state: Arc::new(FixtureState {
                epochs: self.epochs,
                proofs: self.proofs,
                histories: self.histories,
                latest_epoch: self.latest_epoch,
                checkpoints: Mutex::new(HashMap::new()),
                uploads: Mutex::new(Vec::new()),
            }),
        }
    }
}

fn sign_certificate(tbs: TbsCertificate, issuer: &SigningKey) -> Certificate {
    let mut message = CERT_SIGNING_DOMAIN.to_vec();
    message.extend_from_slice(&serde_json::to_vec(&tbs).unwrap());
    let signature = Base64::encode_string(&issuer.sign(&message).to_bytes());
    Certificate { tbs, signature }
}

// =============================================================================
// Transport over the fixture
// =============================================================================

struct FixtureState {
    epochs: HashMap<u64, Epoch>,
    proofs: HashMap<(u64, String), InclusionProof>,
    histories: HashMap<String, Vec<SignedKeyList>>,
    latest_epoch: u64,
    checkpoints: Mutex<HashMap<AddressId, SignedBlob>>,
    uploads: Mutex<Vec<(AddressId, SignedBlob)>>,
}

/// Cloneable handle over shared directory state, so scenarios keep one
/// clone for assertions after handing the other to the auditor.
#[derive(Clone)]
pub struct FixtureTransport {
    state: Arc<FixtureState>,
}

impl FixtureTransport {
    /// Seed a remote verified-epoch checkpoint for an address.
    pub fn seed_checkpoint(&self, address_id: AddressId, blob: SignedBlob) {
        self.state
            .checkpoints
            .lock()
            .unwrap()
            .insert(address_id, blob);
    }

    pub fn upload_count(&self) -> usize {
        self.state.uploads.lock().unwrap().len()
    }

    pub fn uploaded_checkpoint(&self, address_id: &AddressId) -> Option<SignedBlob> {
        self.state
            .checkpoints
            .lock()
            .unwrap()
            .get(address_id)
            .cloned()
    }
}

#[async_trait]
impl KtTransport for FixtureTransport {
    async fn latest_epoch_id(&self, _email: &str) -> Result<u64, FetchError> {
        Ok(self.state.latest_epoch)
    }

    async fn epoch(&self, epoch_id: u64) -> Result<Epoch, FetchError> {
        self.state
            .epochs
            .get(&epoch_id)
            .cloned()
            .ok_or_else(|| FetchError::Request(format!("unknown epoch {epoch_id}")))
    }

    async fn inclusion_proof(
        &self,
        epoch_id: u64,
        email: &str,
    ) -> Result<InclusionProof, FetchError> {
        self.state
            .proofs
            .get(&(epoch_id, email.to_string()))
            .cloned()
            .ok_or_else(|| FetchError::Request(format!("no proof for {email} in {epoch_id}")))
    }

    async fn skl_history(
        &self,
        email: &str,
        since_epoch_id: u64,
        _include_last_expired: bool,
    ) -> Result<Vec<SignedKeyList>, FetchError> {
        let history = self.state.histories.get(email).cloned().unwrap_or_default();
        Ok(history
            .into_iter()
            .filter(|skl| skl.max_epoch_id.is_none_or(|max| max >= since_epoch_id))
            .collect())
    }

    async fn canonical_email(&self, email: &str) -> Result<String, FetchError> {
        Ok(email.to_lowercase())
    }

    async fn verified_checkpoint(
        &self,
        address_id: &AddressId,
    ) -> Result<Option<SignedBlob>, FetchError> {
        Ok(self
            .state
            .checkpoints
            .lock()
            .unwrap()
            .get(address_id)
            .cloned())
    }

    async fn upload_checkpoint(
        &self,
        address_id: &AddressId,
        blob: SignedBlob,
    ) -> Result<(), FetchError> {
        self.state
            .checkpoints
            .lock()
            .unwrap()
            .insert(address_id.clone(), blob.clone());
        self.state
            .uploads
            .lock()
            .unwrap()
            .push((address_id.clone(), blob));
        Ok(())
    }
}

// =============================================================================
// User key capability over the fixture
// =============================================================================

/// Key-list "signatures" carry their creation time as `ts:<unix-seconds>`,
/// so scenarios control every timestamp the audit compares.
pub struct FixtureCrypto;

pub fn sign_skl_at(at: DateTime<Utc>) -> String {
    format!("ts:{}", at.timestamp())
}

impl UserCrypto for FixtureCrypto {
    fn verify_key_list_signature(
        &self,
        _data: &str,
        signature: &str,
        _keys: &[ClientKey],
    ) -> Result<DateTime<Utc>, VerificationError> {
        let seconds = signature
            .strip_prefix("ts:")
            .and_then(|raw| raw.parse::<i64>().ok())
            .ok_or_else(|| VerificationError::SklSignature("unparseable signature".into()))?;
        DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| VerificationError::SklSignature("timestamp out of range".into()))
    }

    fn sign_checkpoint(&self, data: &[u8]) -> Result<Vec<u8>, VerificationError> {
        let mut signature = b"ck:".to_vec();
        signature.extend_from_slice(&Sha256::digest(data)[..8]);
        Ok(signature)
    }

    fn verify_checkpoint(&self, data: &[u8], signature: &[u8]) -> Result<(), VerificationError> {
        if signature == self.sign_checkpoint(data)? {
            Ok(())
        } else {
            Err(VerificationError::CheckpointSignature)
        }
    }

    fn encrypt_to_self(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        Ok(plaintext.iter().map(|b| !b).collect())
    }

    fn decrypt_from_self(&self, ciphertext: &[u8]) -> Result<Vec<u8>, StorageError> {
        Ok(ciphertext.iter().map(|b| !b).collect())
    }
}

/// A remote checkpoint blob as the engine itself would have uploaded it.
pub fn checkpoint_blob(checkpoint: &keytrans::models::VerifiedCheckpoint) -> SignedBlob {
    let data = serde_json::to_string(checkpoint).unwrap();
    let signature = FixtureCrypto.sign_checkpoint(data.as_bytes()).unwrap();
    SignedBlob {
        data,
        signature: Base64::encode_string(&signature),
    }
}
