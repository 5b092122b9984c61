//! Relayer-backed engine for the public test network
//!
//! Ciphertext construction, proof generation and threshold decryption all
//! happen behind the relayer. The client only fetches the network public key
//! reference once per session and forwards values and signed requests.

use std::str::FromStr;

use alloy_signer_local::PrivateKeySigner;
use diary_core::{Address, Handle, NetworkId, U256};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{sign_decrypt_request, FheType, RawEncryptedInput};
use crate::error::EngineError;

/// Public key reference published by the relayer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub public_key_id: String,
    pub public_key_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputValue {
    #[serde(rename = "type")]
    ty: &'static str,
    value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputProofRequest {
    contract_address: Address,
    user_address: Address,
    contract_chain_id: NetworkId,
    key_id: String,
    values: Vec<InputValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputProofResponse {
    handles: Vec<String>,
    input_proof: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDecryptRequest {
    handle: Handle,
    contract_address: Address,
    user_address: Address,
    signature: String,
    #[serde(rename = "type")]
    ty: &'static str,
}

#[derive(Deserialize)]
struct UserDecryptResponse {
    value: String,
}

fn decode_hex(field: &str, s: &str) -> Result<Vec<u8>, EngineError> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| EngineError::InvalidResponse(format!("{field}: {e}")))
}

/// Full-width hex form of a 256-bit word
fn word_hex(value: U256) -> String {
    format!("0x{}", hex::encode(value.to_be_bytes::<32>()))
}

/// HTTP client for one relayer deployment
#[derive(Clone)]
pub struct HttpRelayer {
    http: Client,
    base_url: String,
}

impl HttpRelayer {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, EngineError> {
        if !resp.status().is_success() {
            return Err(EngineError::Relayer {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp.json().await?)
    }

    /// Fetch the network public key reference
    pub async fn fetch_key_info(&self) -> Result<KeyInfo, EngineError> {
        let url = format!("{}/v1/keyurl", self.base_url);
        let resp = self.http.get(&url).send().await?;
        Self::parse(resp).await
    }

    async fn input_proof(&self, req: &InputProofRequest) -> Result<InputProofResponse, EngineError> {
        let url = format!("{}/v1/input-proof", self.base_url);
        let resp = self.http.post(&url).json(req).send().await?;
        Self::parse(resp).await
    }

    async fn user_decrypt(&self, req: &UserDecryptRequest) -> Result<UserDecryptResponse, EngineError> {
        let url = format!("{}/v1/user-decrypt", self.base_url);
        let resp = self.http.post(&url).json(req).send().await?;
        Self::parse(resp).await
    }
}

pub struct LiveEngine {
    relayer: HttpRelayer,
    key_info: KeyInfo,
    network_id: NetworkId,
}

impl LiveEngine {
    pub fn new(relayer: HttpRelayer, key_info: KeyInfo, network_id: NetworkId) -> Self {
        Self {
            relayer,
            key_info,
            network_id,
        }
    }

    pub fn key_info(&self) -> &KeyInfo {
        &self.key_info
    }

    pub fn relayer(&self) -> &HttpRelayer {
        &self.relayer
    }

    pub(super) async fn build_encrypted_input(
        &self,
        contract: Address,
        user: Address,
        value: U256,
    ) -> Result<RawEncryptedInput, EngineError> {
        let req = InputProofRequest {
            contract_address: contract,
            user_address: user,
            contract_chain_id: self.network_id,
            key_id: self.key_info.public_key_id.clone(),
            values: vec![InputValue {
                ty: FheType::Euint256.as_str(),
                value: word_hex(value),
            }],
        };

        let resp = self.relayer.input_proof(&req).await?;
        if resp.handles.is_empty() {
            return Err(EngineError::InvalidResponse("relayer returned no handles".into()));
        }

        let handles = resp
            .handles
            .iter()
            .map(|h| decode_hex("handles", h))
            .collect::<Result<Vec<_>, _>>()?;
        let proof = decode_hex("inputProof", &resp.input_proof)?;

        Ok(RawEncryptedInput { handles, proof })
    }

    pub(super) async fn user_decrypt(
        &self,
        ty: FheType,
        handle: Handle,
        contract: Address,
        signer: &PrivateKeySigner,
    ) -> Result<U256, EngineError> {
        let signature = sign_decrypt_request(signer, &handle, &contract, self.network_id)?;
        let req = UserDecryptRequest {
            handle,
            contract_address: contract,
            user_address: signer.address(),
            signature: format!("0x{}", hex::encode(signature)),
            ty: ty.as_str(),
        };

        let resp = self.relayer.user_decrypt(&req).await?;
        U256::from_str(resp.value.trim())
            .map_err(|e| EngineError::InvalidResponse(format!("value: {e}")))
    }
}
