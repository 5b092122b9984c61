//! Encryption session manager
//!
//! Owns the network-bound engine session. A session is built lazily on first
//! use and rebuilt whenever the caller's network id differs from the cached
//! one. The cache sits behind an async mutex, so at most one build is in
//! flight and callers on different networks are serialized.

use std::sync::Arc;

use diary_core::network::{GATEWAY_CHAIN_ID, LOCAL_CHAIN_ID, SEPOLIA_CHAIN_ID};
use diary_core::{NetworkId, NetworkKind};
use serde_json::json;
use tokio::sync::Mutex;

use crate::engine::{
    Engine, EngineMetadata, HttpRelayer, KeyInfo, LiveEngine, MockCoprocessor, SimulatedEngine,
    VERIFYING_CONTRACT_DECRYPTION, VERIFYING_CONTRACT_INPUT,
};
use crate::error::{DiaryError, Result};
use crate::rpc::{ChainRpc, METADATA_METHOD};

/// A ready engine bound to one network
#[derive(Debug)]
pub struct EncryptionSession {
    id: u64,
    network_id: NetworkId,
    mode: NetworkKind,
    ready: bool,
    engine: Engine,
}

impl EncryptionSession {
    /// Manager-assigned build counter, distinct for every build
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn mode(&self) -> NetworkKind {
        self.mode
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

/// Primary and fallback relayer endpoints for the live engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerEndpoints {
    pub primary: String,
    pub fallback: String,
}

struct SessionCache {
    session: Option<Arc<EncryptionSession>>,
    /// Set once the live engine has been loaded and initialized
    live: Option<(HttpRelayer, KeyInfo)>,
    next_id: u64,
}

pub struct SessionManager<R> {
    rpc: R,
    relayers: RelayerEndpoints,
    coprocessor: MockCoprocessor,
    cache: Mutex<SessionCache>,
}

impl<R: ChainRpc> SessionManager<R> {
    pub fn new(rpc: R, relayers: RelayerEndpoints) -> Self {
        Self::with_coprocessor(rpc, relayers, MockCoprocessor::new())
    }

    /// Share a coprocessor so simulated ciphertexts outlive this manager
    pub fn with_coprocessor(rpc: R, relayers: RelayerEndpoints, coprocessor: MockCoprocessor) -> Self {
        Self {
            rpc,
            relayers,
            coprocessor,
            cache: Mutex::new(SessionCache {
                session: None,
                live: None,
                next_id: 1,
            }),
        }
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    pub fn coprocessor(&self) -> &MockCoprocessor {
        &self.coprocessor
    }

    /// Return the session for `network_id`, building it if needed
    pub async fn get_session(&self, network_id: NetworkId) -> Result<Arc<EncryptionSession>> {
        let mut cache = self.cache.lock().await;

        if let Some(session) = &cache.session {
            if session.network_id == network_id {
                return Ok(session.clone());
            }
            tracing::info!(
                from = session.network_id,
                to = network_id,
                "Network changed, discarding encryption session"
            );
        }
        cache.session = None;

        let engine = match network_id {
            LOCAL_CHAIN_ID => self.build_simulated(network_id).await?,
            SEPOLIA_CHAIN_ID => self.build_live(&mut cache, network_id).await?,
            other => return Err(DiaryError::UnsupportedNetwork(other)),
        };

        let id = cache.next_id;
        cache.next_id += 1;
        let session = Arc::new(EncryptionSession {
            id,
            network_id,
            mode: engine.kind(),
            ready: true,
            engine,
        });

        tracing::info!(
            session_id = id,
            network_id,
            mode = %session.mode,
            "Encryption session ready"
        );

        cache.session = Some(session.clone());
        Ok(session)
    }

    /// Cached session, without building
    pub async fn current(&self) -> Option<Arc<EncryptionSession>> {
        self.cache.lock().await.session.clone()
    }

    /// Drop the cached session; the next call rebuilds it
    pub async fn invalidate(&self) {
        if let Some(session) = self.cache.lock().await.session.take() {
            tracing::debug!(session_id = session.id, "Encryption session invalidated");
        }
    }

    async fn build_simulated(&self, network_id: NetworkId) -> Result<Engine> {
        let value = self
            .rpc
            .request(METADATA_METHOD, json!([]))
            .await
            .map_err(|e| DiaryError::MetadataUnavailable(e.to_string()))?;
        let metadata = EngineMetadata::from_rpc(&value).map_err(DiaryError::MetadataUnavailable)?;

        tracing::debug!(
            acl = %metadata.acl,
            input_verifier = %metadata.input_verifier,
            kms_verifier = %metadata.kms_verifier,
            "Fetched engine metadata"
        );

        Ok(Engine::Simulated(SimulatedEngine::new(
            network_id,
            metadata,
            VERIFYING_CONTRACT_DECRYPTION,
            VERIFYING_CONTRACT_INPUT,
            GATEWAY_CHAIN_ID,
            self.coprocessor.clone(),
        )))
    }

    async fn build_live(&self, cache: &mut SessionCache, network_id: NetworkId) -> Result<Engine> {
        if cache.live.is_none() {
            cache.live = Some(self.load_live().await?);
        }
        let (relayer, key_info) = cache
            .live
            .clone()
            .ok_or_else(|| DiaryError::Config("live engine not initialized".into()))?;

        Ok(Engine::Live(LiveEngine::new(relayer, key_info, network_id)))
    }

    async fn load_live(&self) -> Result<(HttpRelayer, KeyInfo)> {
        let primary = HttpRelayer::new(&self.relayers.primary);
        let primary_err = match primary.fetch_key_info().await {
            Ok(key) => return Ok((primary, key)),
            Err(e) => e,
        };
        tracing::warn!(
            relayer = %self.relayers.primary,
            error = %primary_err,
            "Primary relayer unavailable, trying fallback"
        );

        let fallback = HttpRelayer::new(&self.relayers.fallback);
        match fallback.fetch_key_info().await {
            Ok(key) => Ok((fallback, key)),
            Err(fallback_err) => Err(DiaryError::EngineLoadFailure {
                primary: primary_err.to_string(),
                fallback: fallback_err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use serde_json::{json, Value};

    use crate::error::RpcError;
    use crate::rpc::mock::MockRpc;

    pub fn metadata() -> Value {
        json!({
            "ACLAddress": "0x50157CFfD6bBFA2DECe204a89ec419c23ef5755D",
            "InputVerifierAddress": "0x901F8942346f7AB3a01F6D7613119Bca447Bb030",
            "KMSVerifierAddress": "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC",
        })
    }

    /// Local node answering engine metadata and chain id
    pub fn local_node() -> MockRpc {
        MockRpc::new(|method, _| match method {
            "fhevm_relayer_metadata" => Ok(metadata()),
            "eth_chainId" => Ok(json!("0x7a69")),
            other => Err(RpcError::InvalidResponse(format!("unexpected {other}"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::local_node;
    use super::*;
    use crate::error::RpcError;
    use crate::rpc::mock::MockRpc;

    fn unreachable_relayers() -> RelayerEndpoints {
        RelayerEndpoints {
            primary: "http://127.0.0.1:1".into(),
            fallback: "http://127.0.0.1:1/fallback".into(),
        }
    }

    #[tokio::test]
    async fn test_session_is_reused_for_same_network() {
        let rpc = local_node();
        let manager = SessionManager::new(rpc.clone(), unreachable_relayers());

        let a = manager.get_session(31337).await.unwrap();
        let b = manager.get_session(31337).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.mode(), NetworkKind::Simulated);
        assert!(a.is_ready());
        assert_eq!(rpc.count(METADATA_METHOD), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let manager = SessionManager::new(local_node(), unreachable_relayers());

        let a = manager.get_session(31337).await.unwrap();
        manager.invalidate().await;
        assert!(manager.current().await.is_none());

        let b = manager.get_session(31337).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_unsupported_network_drops_cached_session() {
        let manager = SessionManager::new(local_node(), unreachable_relayers());
        manager.get_session(31337).await.unwrap();

        let err = manager.get_session(1).await.unwrap_err();
        assert!(matches!(err, DiaryError::UnsupportedNetwork(1)));
        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_metadata_field() {
        let rpc = MockRpc::new(|_, _| {
            Ok(serde_json::json!({
                "ACLAddress": "0x50157CFfD6bBFA2DECe204a89ec419c23ef5755D",
                "InputVerifierAddress": "0x901F8942346f7AB3a01F6D7613119Bca447Bb030",
            }))
        });
        let manager = SessionManager::new(rpc, unreachable_relayers());

        let err = manager.get_session(31337).await.unwrap_err();
        assert!(matches!(err, DiaryError::MetadataUnavailable(ref m) if m.contains("KMSVerifierAddress")));
    }

    #[tokio::test]
    async fn test_metadata_rpc_failure() {
        let rpc = MockRpc::new(|_, _| {
            Err(RpcError::Rpc {
                code: -32601,
                message: "method not found".into(),
            })
        });
        let manager = SessionManager::new(rpc, unreachable_relayers());

        let err = manager.get_session(31337).await.unwrap_err();
        assert_eq!(err.code(), "METADATA_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_live_load_failure_reports_both_relayers() {
        let manager = SessionManager::new(local_node(), unreachable_relayers());

        let err = manager.get_session(11155111).await.unwrap_err();
        match err {
            DiaryError::EngineLoadFailure { primary, fallback } => {
                assert!(!primary.is_empty());
                assert!(!fallback.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
