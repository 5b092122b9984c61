//! Client configuration
//!
//! Resolution order: defaults, then an optional JSON file, then `DIARY_*`
//! environment variables. The CLI applies its own flags last.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use diary_core::network::{LOCAL_CHAIN_ID, LOCAL_DIARY_ADDRESS};
use diary_core::{Address, NetworkId};
use serde::{Deserialize, Serialize};

use crate::error::{DiaryError, Result};
use crate::ledger;
use crate::session::RelayerEndpoints;

pub const ENV_RPC_URL: &str = "DIARY_RPC_URL";
pub const ENV_CHAIN_ID: &str = "DIARY_CHAIN_ID";
pub const ENV_DATA_DIR: &str = "DIARY_DATA_DIR";

const DEFAULT_RELAYER_URL: &str = "https://relayer.testnet.zama.cloud";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub rpc_url: String,
    pub chain_id: NetworkId,
    /// Diary contract per chain id
    pub contract_addresses: BTreeMap<NetworkId, Address>,
    pub relayer_url: String,
    pub relayer_fallback_url: String,
    pub data_dir: PathBuf,
    pub probe_interval_secs: u64,
    pub list_retry_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".into(),
            chain_id: LOCAL_CHAIN_ID,
            contract_addresses: BTreeMap::from([(LOCAL_CHAIN_ID, LOCAL_DIARY_ADDRESS)]),
            relayer_url: DEFAULT_RELAYER_URL.into(),
            relayer_fallback_url: DEFAULT_RELAYER_URL.into(),
            data_dir: PathBuf::from(".diary"),
            probe_interval_secs: 5,
            list_retry_attempts: 3,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with the file at `path` (if any) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DiaryError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| DiaryError::Config(format!("{}: {e}", path.display())))
    }

    /// Overlay `DIARY_*` variables as returned by `get`
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = get(ENV_RPC_URL) {
            self.rpc_url = url;
        }
        if let Some(id) = get(ENV_CHAIN_ID) {
            self.chain_id = id
                .trim()
                .parse()
                .map_err(|e| DiaryError::Config(format!("{ENV_CHAIN_ID}={id}: {e}")))?;
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn contract_address(&self) -> Result<Address> {
        ledger::contract_address(
            self.chain_id,
            self.contract_addresses.get(&self.chain_id).copied(),
        )
    }

    pub fn relayers(&self) -> RelayerEndpoints {
        RelayerEndpoints {
            primary: self.relayer_url.clone(),
            fallback: self.relayer_fallback_url.clone(),
        }
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}
