// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # HTTP Transport
//!
//! reqwest-backed implementation of [`KtTransport`] against the directory
//! server's JSON API. This module only moves bytes: every response is
//! decoded into the engine's models and verified elsewhere. A non-success
//! status or an undecodable body is a [`FetchError`], never a verification
//! verdict.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use super::{KtTransport, SignedBlob};
use crate::config::MERKLE_TREE_DEPTH;
use crate::error::FetchError;
use crate::models::{AddressId, Epoch, InclusionProof, SignedKeyList};

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for the Key Transparency endpoints.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    http: Client,
}

impl HttpTransport {
    /// Create a transport against the given API base URL.
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let base_url: Url = base_url
            .parse()
            .map_err(|e: url::ParseError| FetchError::BaseUrl(e.to_string()))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { base_url, http })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::BaseUrl(e.to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let endpoint = url.path().to_string();
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                endpoint,
                status: response.status().as_u16(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

// =============================================================================
// Wire DTOs
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LatestEpochResponse {
    #[serde(rename = "EpochID")]
    epoch_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EpochResponse {
    #[serde(rename = "EpochID")]
    epoch_id: u64,
    tree_hash: String,
    chain_hash: String,
    prev_chain_hash: String,
    certificate: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProofResponse {
    proof: String,
    name: String,
    revision: u32,
    neighbors: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CanonicalEntry {
    email: String,
    canonical: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CanonicalResponse {
    responses: Vec<CanonicalEntry>,
}

fn decode_hash(field: &str, text: &str) -> Result<[u8; 32], FetchError> {
    hex::decode(text)
        .map_err(|e| FetchError::Decode(format!("{field}: {e}")))?
        .try_into()
        .map_err(|_| FetchError::Decode(format!("{field}: expected 32 bytes")))
}

impl TryFrom<EpochResponse> for Epoch {
    type Error = FetchError;

    fn try_from(dto: EpochResponse) -> Result<Self, FetchError> {
        Ok(Epoch {
            epoch_id: dto.epoch_id,
            tree_hash: decode_hash("TreeHash", &dto.tree_hash)?,
            chain_hash: decode_hash("ChainHash", &dto.chain_hash)?,
            prev_chain_hash: decode_hash("PrevChainHash", &dto.prev_chain_hash)?,
            certificate_chain: dto.certificate,
        })
    }
}

impl TryFrom<ProofResponse> for InclusionProof {
    type Error = FetchError;

    fn try_from(dto: ProofResponse) -> Result<Self, FetchError> {
        use base64ct::{Base64, Encoding};

        if dto.neighbors.len() != MERKLE_TREE_DEPTH {
            return Err(FetchError::Decode(format!(
                "Neighbors: expected {MERKLE_TREE_DEPTH} entries, got {}",
                dto.neighbors.len()
            )));
        }
        let mut neighbors = Vec::with_capacity(dto.neighbors.len());
        for entry in &dto.neighbors {
            neighbors.push(match entry {
                Some(text) => Some(decode_hash("Neighbors", text)?),
                None => None,
            });
        }
        Ok(InclusionProof {
            leaf_name: decode_hash("Name", &dto.name)?,
            vrf_proof: Base64::decode_vec(&dto.proof)
                .map_err(|e| FetchError::Decode(format!("Proof: {e}")))?,
            revision: dto.revision,
            neighbors,
        })
    }
}

#[async_trait]
impl KtTransport for HttpTransport {
    async fn latest_epoch_id(&self, email: &str) -> Result<u64, FetchError> {
        let mut url = self.endpoint("kt/epochs")?;
        url.query_pairs_mut()
            .append_pair("SinceEpochID", "0")
            .append_pair("Email", email);
        let latest: LatestEpochResponse = self.get_json(url).await?;
        Ok(latest.epoch_id)
    }

    async fn epoch(&self, epoch_id: u64) -> Result<Epoch, FetchError> {
        let url = self.endpoint(&format!("kt/epochs/{epoch_id}"))?;
        let dto: EpochResponse = self.get_json(url).await?;
        dto.try_into()
    }

    async fn inclusion_proof(
        &self,
        epoch_id: u64,
        email: &str,
    ) -> Result<InclusionProof, FetchError> {
        let url = self.endpoint(&format!("kt/epochs/{epoch_id}/proof/{email}"))?;
        let dto: ProofResponse = self.get_json(url).await?;
        dto.try_into()
    }

    async fn skl_history(
        &self,
        email: &str,
        since_epoch_id: u64,
        include_last_expired: bool,
    ) -> Result<Vec<SignedKeyList>, FetchError> {
        let mut url = self.endpoint("kt/skls")?;
        url.query_pairs_mut()
            .append_pair("Email", email)
            .append_pair("SinceEpochID", &since_epoch_id.to_string())
            .append_pair(
                "IncludeLastExpired",
                if include_last_expired { "1" } else { "0" },
            );
        self.get_json(url).await
    }

    async fn canonical_email(&self, email: &str) -> Result<String, FetchError> {
        let mut url = self.endpoint("addresses/canonical")?;
        url.query_pairs_mut().append_pair("Emails[]", email);
        let decoded: CanonicalResponse = self.get_json(url).await?;
        decoded
            .responses
            .into_iter()
            .find(|entry| entry.email == email)
            .map(|entry| entry.canonical)
            .ok_or_else(|| FetchError::Decode("canonical form missing from response".into()))
    }

    async fn verified_checkpoint(
        &self,
        address_id: &AddressId,
    ) -> Result<Option<SignedBlob>, FetchError> {
        let url = self.endpoint(&format!("kt/verifiedepoch/{address_id}"))?;
        let endpoint = url.path().to_string();
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        // No checkpoint uploaded yet is a regular state, not an error.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(FetchError::Status {
                endpoint,
                status: response.status().as_u16(),
            });
        }
        let blob = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(Some(blob))
    }

    async fn upload_checkpoint(
        &self,
        address_id: &AddressId,
        blob: SignedBlob,
    ) -> Result<(), FetchError> {
        let url = self.endpoint(&format!("kt/verifiedepoch/{address_id}"))?;
        let endpoint = url.path().to_string();
        let response = self
            .http
            .put(url)
            .json(&blob)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                endpoint,
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
