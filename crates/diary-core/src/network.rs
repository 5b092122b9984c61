//! Supported networks and their engine mode

use std::fmt;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

/// EVM chain id
pub type NetworkId = u64;

/// Local development chain (Hardhat node with mock engine)
pub const LOCAL_CHAIN_ID: NetworkId = 31337;

/// Sepolia testnet (relayer-backed engine)
pub const SEPOLIA_CHAIN_ID: NetworkId = 11155111;

/// Gateway chain id used by the engine's verifying contracts
pub const GATEWAY_CHAIN_ID: NetworkId = 55815;

/// Diary contract as deployed by the first transaction on a fresh local node
pub const LOCAL_DIARY_ADDRESS: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

/// Engine backend a network runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Simulated,
    Live,
}

impl NetworkKind {
    /// Classify a chain id, `None` for unsupported networks
    pub fn of(network_id: NetworkId) -> Option<Self> {
        match network_id {
            LOCAL_CHAIN_ID => Some(NetworkKind::Simulated),
            SEPOLIA_CHAIN_ID => Some(NetworkKind::Live),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkKind::Simulated => write!(f, "simulated"),
            NetworkKind::Live => write!(f, "live"),
        }
    }
}

/// Human-readable list of supported networks for error messages
pub fn supported_networks() -> &'static str {
    "localhost (31337), Sepolia (11155111)"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_kind() {
        assert_eq!(NetworkKind::of(31337), Some(NetworkKind::Simulated));
        assert_eq!(NetworkKind::of(11155111), Some(NetworkKind::Live));
        assert_eq!(NetworkKind::of(1), None);
    }
}
