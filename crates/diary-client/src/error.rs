//! Client error types

use diary_core::{Address, CoreError, EntryId, Handle, NetworkId};
use thiserror::Error;

/// Errors raised by the encryption engines (simulated or relayer-backed)
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Relayer HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Relayer error: {status} - {message}")]
    Relayer { status: u16, message: String },

    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),

    #[error("Unknown ciphertext handle: {0}")]
    UnknownHandle(Handle),

    #[error("Signing failed: {0}")]
    Signer(#[from] alloy_signer::Error),

    #[error("{user} may not decrypt {handle}")]
    NotAllowed { handle: Handle, user: Address },
}

/// Errors from the JSON-RPC transport
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Node returned HTTP {status}")]
    Status { status: u16 },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DiaryError {
    #[error("Unsupported chain ID: {0}. Supported networks: {supported}", supported = diary_core::network::supported_networks())]
    UnsupportedNetwork(NetworkId),

    #[error("Engine metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Failed to load live engine (primary: {primary}; fallback: {fallback})")]
    EngineLoadFailure { primary: String, fallback: String },

    #[error("Failed to encrypt diary content: {0}")]
    EncryptionFailure(#[source] EngineError),

    #[error("Failed to decrypt diary content: {0}")]
    DecryptionFailure(#[source] EngineError),

    #[error("Ledger read failed ({call}): {message}")]
    LedgerReadFailure { call: &'static str, message: String },

    #[error("Ledger write failed: {0}")]
    LedgerWriteFailure(String),

    #[error("Wallet transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Invalid entry content: {0}")]
    InvalidContent(#[source] CoreError),

    #[error("Entry {0} cannot be decrypted by this account (locked, never-unlock, or not the author)")]
    DecryptNotPermitted(EntryId),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl DiaryError {
    /// Stable error code for structured output
    pub fn code(&self) -> &'static str {
        match self {
            DiaryError::UnsupportedNetwork(_) => "UNSUPPORTED_NETWORK",
            DiaryError::MetadataUnavailable(_) => "METADATA_UNAVAILABLE",
            DiaryError::EngineLoadFailure { .. } => "ENGINE_LOAD_FAILURE",
            DiaryError::EncryptionFailure(_) => "ENCRYPTION_FAILURE",
            DiaryError::DecryptionFailure(_) => "DECRYPTION_FAILURE",
            DiaryError::LedgerReadFailure { .. } => "LEDGER_READ_FAILURE",
            DiaryError::LedgerWriteFailure(_) => "LEDGER_WRITE_FAILURE",
            DiaryError::TransportUnavailable(_) => "TRANSPORT_UNAVAILABLE",
            DiaryError::InvalidContent(_) => "INVALID_CONTENT",
            DiaryError::DecryptNotPermitted(_) => "DECRYPT_NOT_PERMITTED",
            DiaryError::Core(_) => "CORE_ERROR",
            DiaryError::Storage(_) => "STORAGE_ERROR",
            DiaryError::Json(_) => "JSON_ERROR",
            DiaryError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the caller should offer a retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DiaryError::EncryptionFailure(_)
                | DiaryError::DecryptionFailure(_)
                | DiaryError::LedgerReadFailure { .. }
                | DiaryError::LedgerWriteFailure(_)
                | DiaryError::TransportUnavailable(_)
                | DiaryError::MetadataUnavailable(_)
                | DiaryError::EngineLoadFailure { .. }
        )
    }

    /// Authorization-kind failures: the account may not read this entry
    pub fn is_authorization(&self) -> bool {
        matches!(self, DiaryError::DecryptNotPermitted(_))
    }

    pub(crate) fn read(call: &'static str, err: impl std::fmt::Display) -> Self {
        DiaryError::LedgerReadFailure {
            call,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DiaryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_network_message() {
        let err = DiaryError::UnsupportedNetwork(1);
        assert!(err.to_string().contains("Unsupported chain ID: 1"));
        assert!(err.to_string().contains("31337"));
        assert_eq!(err.code(), "UNSUPPORTED_NETWORK");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_engine_load_failure_keeps_both_causes() {
        let err = DiaryError::EngineLoadFailure {
            primary: "connection refused".into(),
            fallback: "timed out".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("connection refused"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_retry_affordance() {
        assert!(DiaryError::read("getEntryCount", "boom").is_retryable());
        assert!(DiaryError::LedgerWriteFailure("reverted".into()).is_retryable());
        assert!(!DiaryError::DecryptNotPermitted(3).is_retryable());
        assert!(DiaryError::DecryptNotPermitted(3).is_authorization());
    }
}
