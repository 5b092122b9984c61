//! Simulated engine for the local development chain
//!
//! Stands in for the real coprocessor: values are "encrypted" into handles
//! whose cleartexts are kept in a process-wide [`MockCoprocessor`], together
//! with the (user, contract) pair allowed to decrypt them. Handles
//! follow the live layout so they are interchangeable on the wire:
//!
//! ```text
//! [hash:21][index:1][chain_id:8][type:1][version:1]
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use diary_core::{keccak256_concat, Address, Handle, NetworkId, U256};
use serde_json::Value;

use super::{decrypt_request_digest, FheType, RawEncryptedInput};
use crate::error::EngineError;

/// Handle format version
const HANDLE_VERSION: u8 = 0;

/// Domain separator for handle derivation
const HANDLE_DOMAIN: &[u8] = b"ZK-w_hdl";

/// Engine contract addresses reported by the local node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineMetadata {
    pub acl: Address,
    pub input_verifier: Address,
    pub kms_verifier: Address,
}

impl EngineMetadata {
    /// Parse the node's metadata response, naming the first missing field
    pub fn from_rpc(value: &Value) -> Result<Self, String> {
        let field = |name: &str| -> Result<Address, String> {
            value
                .get(name)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Address>().ok())
                .ok_or_else(|| format!("missing or invalid {name}"))
        };

        Ok(Self {
            acl: field("ACLAddress")?,
            input_verifier: field("InputVerifierAddress")?,
            kms_verifier: field("KMSVerifierAddress")?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Cleartext {
    value: U256,
    user: Address,
    contract: Address,
}

/// Cleartext store shared by every simulated session in the process
#[derive(Debug, Clone, Default)]
pub struct MockCoprocessor {
    cleartexts: Arc<Mutex<HashMap<Handle, Cleartext>>>,
    nonce: Arc<AtomicU64>,
}

impl MockCoprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::Relaxed)
    }

    fn insert(&self, handle: Handle, cleartext: Cleartext) {
        if let Ok(mut map) = self.cleartexts.lock() {
            map.insert(handle, cleartext);
        }
    }

    fn get(&self, handle: &Handle) -> Option<Cleartext> {
        self.cleartexts.lock().ok()?.get(handle).copied()
    }

    /// Number of ciphertexts registered so far
    pub fn len(&self) -> usize {
        self.cleartexts.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct SimulatedEngine {
    chain_id: NetworkId,
    metadata: EngineMetadata,
    verifying_decryption: Address,
    verifying_input: Address,
    gateway_chain_id: NetworkId,
    coprocessor: MockCoprocessor,
}

impl SimulatedEngine {
    pub fn new(
        chain_id: NetworkId,
        metadata: EngineMetadata,
        verifying_decryption: Address,
        verifying_input: Address,
        gateway_chain_id: NetworkId,
        coprocessor: MockCoprocessor,
    ) -> Self {
        Self {
            chain_id,
            metadata,
            verifying_decryption,
            verifying_input,
            gateway_chain_id,
            coprocessor,
        }
    }

    pub fn metadata(&self) -> &EngineMetadata {
        &self.metadata
    }

    pub(super) fn build_encrypted_input(
        &self,
        contract: Address,
        user: Address,
        value: U256,
    ) -> Result<RawEncryptedInput, EngineError> {
        let nonce = self.coprocessor.next_nonce();
        let value_bytes = value.to_be_bytes::<32>();
        let ciphertext_digest = keccak256_concat(&[
            &value_bytes[..],
            contract.as_slice(),
            user.as_slice(),
            &nonce.to_be_bytes()[..],
        ]);

        let index: u8 = 0;
        let mut handle = keccak256_concat(&[
            HANDLE_DOMAIN,
            &ciphertext_digest[..],
            &[index][..],
            self.metadata.acl.as_slice(),
            &self.chain_id.to_be_bytes()[..],
        ]);
        handle[21] = index;
        handle[22..30].copy_from_slice(&self.chain_id.to_be_bytes());
        handle[30] = FheType::Euint256.type_byte();
        handle[31] = HANDLE_VERSION;

        let handle = Handle::from(handle);
        self.coprocessor.insert(
            handle,
            Cleartext {
                value,
                user,
                contract,
            },
        );

        // [num_handles][num_signers][handles...][attestation]
        let attestation = keccak256_concat(&[
            handle.as_slice(),
            user.as_slice(),
            contract.as_slice(),
            self.verifying_input.as_slice(),
            &self.gateway_chain_id.to_be_bytes()[..],
        ]);
        let mut proof = Vec::with_capacity(2 + 32 + 32);
        proof.push(1);
        proof.push(1);
        proof.extend_from_slice(handle.as_slice());
        proof.extend_from_slice(&attestation);

        tracing::debug!(handle = %handle, nonce, "Simulated encrypted input");

        Ok(RawEncryptedInput {
            handles: vec![handle.to_vec()],
            proof,
        })
    }

    /// Verify the signed request and release the cleartext to its grantee
    pub(super) fn mock_decrypt(
        &self,
        handle: Handle,
        contract: Address,
        signer: &PrivateKeySigner,
    ) -> Result<U256, EngineError> {
        let digest = decrypt_request_digest(&handle, &contract, self.chain_id);
        let signature = signer.sign_hash_sync(&digest)?;
        let requester = signature
            .recover_address_from_prehash(&digest)
            .map_err(|e| EngineError::InvalidResponse(format!("bad request signature: {e}")))?;

        let cleartext = self
            .coprocessor
            .get(&handle)
            .ok_or(EngineError::UnknownHandle(handle))?;
        if cleartext.user != requester || cleartext.contract != contract {
            tracing::debug!(%handle, %requester, %contract, "Decrypt request without grant");
            return Err(EngineError::NotAllowed {
                handle,
                user: requester,
            });
        }
        tracing::debug!(%handle, verifier = %self.verifying_decryption, "Simulated decryption");
        Ok(cleartext.value)
    }
}
