//! Homomorphic-encryption engine backends
//!
//! The engine surface is closed: every backend exposes exactly three
//! operations (build an encrypted input, mock-decrypt, typed user-decrypt) and
//! there are exactly two backends, so dispatch is a plain `match` on
//! [`Engine`].

mod live;
mod simulated;

pub use live::{HttpRelayer, KeyInfo, LiveEngine};
pub use simulated::{EngineMetadata, MockCoprocessor, SimulatedEngine};

use std::fmt;

use alloy_primitives::address;
use alloy_signer_local::PrivateKeySigner;
use diary_core::{keccak256_concat, Address, Handle, NetworkId, NetworkKind, B256, U256};

use crate::error::EngineError;

/// Verifying contract for decryption requests (gateway chain)
pub const VERIFYING_CONTRACT_DECRYPTION: Address =
    address!("5ffdaAB0373E62E2ea2944776209aEf29E631A64");

/// Verifying contract for input proofs (gateway chain)
pub const VERIFYING_CONTRACT_INPUT: Address =
    address!("812b06e1CDCE800494b79fFE4f925A504a9A9810");

/// Encrypted value type tags understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FheType {
    Euint256,
}

impl FheType {
    /// Type byte embedded in handles
    pub fn type_byte(&self) -> u8 {
        match self {
            FheType::Euint256 => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FheType::Euint256 => "euint256",
        }
    }
}

impl fmt::Display for FheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine output before handle canonicalization
#[derive(Debug, Clone)]
pub struct RawEncryptedInput {
    pub handles: Vec<Vec<u8>>,
    pub proof: Vec<u8>,
}

/// Digest a user signs to request decryption of `handle` for `contract`
pub fn decrypt_request_digest(handle: &Handle, contract: &Address, network_id: NetworkId) -> B256 {
    B256::from(keccak256_concat(&[
        &b"diary/user-decrypt"[..],
        handle.as_slice(),
        contract.as_slice(),
        &network_id.to_be_bytes()[..],
    ]))
}

/// Sign a decrypt request with the user's key
pub(crate) fn sign_decrypt_request(
    signer: &PrivateKeySigner,
    handle: &Handle,
    contract: &Address,
    network_id: NetworkId,
) -> Result<Vec<u8>, EngineError> {
    use alloy_signer::SignerSync;

    let digest = decrypt_request_digest(handle, contract, network_id);
    let signature = signer.sign_hash_sync(&digest)?;
    Ok(signature.as_bytes().to_vec())
}

/// A network-bound engine instance
pub enum Engine {
    Simulated(SimulatedEngine),
    Live(LiveEngine),
}

impl Engine {
    pub fn kind(&self) -> NetworkKind {
        match self {
            Engine::Simulated(_) => NetworkKind::Simulated,
            Engine::Live(_) => NetworkKind::Live,
        }
    }

    /// Encrypt one 256-bit value for `contract`, bound to `user`
    pub async fn build_encrypted_input(
        &self,
        contract: Address,
        user: Address,
        value: U256,
    ) -> Result<RawEncryptedInput, EngineError> {
        match self {
            Engine::Simulated(engine) => engine.build_encrypted_input(contract, user, value),
            Engine::Live(engine) => engine.build_encrypted_input(contract, user, value).await,
        }
    }

    /// Decrypt through the local mock coprocessor
    pub async fn mock_decrypt(
        &self,
        handle: Handle,
        contract: Address,
        signer: &PrivateKeySigner,
    ) -> Result<U256, EngineError> {
        match self {
            Engine::Simulated(engine) => engine.mock_decrypt(handle, contract, signer),
            Engine::Live(_) => Err(EngineError::InvalidResponse(
                "mock decryption is only available on the simulated engine".into(),
            )),
        }
    }

    /// Typed user decryption through the relayer
    pub async fn user_decrypt(
        &self,
        ty: FheType,
        handle: Handle,
        contract: Address,
        signer: &PrivateKeySigner,
    ) -> Result<U256, EngineError> {
        match self {
            Engine::Live(engine) => engine.user_decrypt(ty, handle, contract, signer).await,
            Engine::Simulated(engine) => engine.mock_decrypt(handle, contract, signer),
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Simulated(e) => f.debug_tuple("Simulated").field(&e.metadata()).finish(),
            Engine::Live(e) => f.debug_tuple("Live").field(&e.key_info().public_key_id).finish(),
        }
    }
}
