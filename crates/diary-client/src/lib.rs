//! diary-client: encrypted diary client over a homomorphic-encryption ledger
//!
//! Entry content is encrypted into a ciphertext handle under a
//! network-bound engine session, submitted to the diary contract, and
//! decrypted again once the entry's unlock condition holds.
//!
//! Two engine backends exist: a simulated coprocessor for the local
//! development chain and a relayer-backed engine for the public test network.

pub mod client;
pub mod codec;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod rpc;
pub mod session;
pub mod stats;
pub mod store;

pub use client::{unix_now, DiaryClient, RetryPolicy};
pub use codec::EncryptedInput;
pub use config::ClientConfig;
pub use connectivity::{ConnectionState, ConnectionStatus, ConnectivityMonitor, WalletEvent};
pub use engine::{Engine, FheType};
pub use error::{DiaryError, EngineError, Result, RpcError};
pub use ledger::{ContractLedger, Ledger, WriteReceipt};
pub use memory::MemoryLedger;
pub use rpc::{ChainRpc, HttpRpc};
pub use session::{EncryptionSession, RelayerEndpoints, SessionManager};
pub use stats::{DashboardStats, ScanWindow};
pub use store::{DurableStorage, PreferenceStore};
