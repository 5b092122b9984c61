//! Ledger contract client
//!
//! The diary contract is consumed only through its call interface. Reads go
//! out as `eth_call`, the single write as `eth_sendTransaction` followed by
//! receipt polling. Every call carries the caller identity in `from`, since
//! the contract's author checks key off the sender.

use std::future::Future;
use std::time::Duration;

use alloy_sol_types::{sol, SolCall};
use diary_core::network::{LOCAL_CHAIN_ID, LOCAL_DIARY_ADDRESS};
use diary_core::{Address, EntryId, EntryMetadata, Handle, NetworkId, B256, U256};
use serde_json::{json, Value};

use crate::codec::EncryptedInput;
use crate::error::{DiaryError, Result};
use crate::rpc::{parse_quantity, ChainRpc};

sol! {
    interface IEncryptedDiary {
        function getEntryCount() external view returns (uint256);
        function getUserEntryCount(address user) external view returns (uint256);
        function getUserEntries(address user) external view returns (uint256[] memory);
        function getEntryMetadata(uint256 entryId) external view returns (address author, uint256 createdAt, uint256 unlockTimestamp, bool isPublic);
        function getEncryptedEntry(uint256 entryId) external view returns (bytes32);
        function canUnlockEntry(uint256 entryId) external view returns (bool);
        function canDecryptEntry(uint256 entryId) external view returns (bool);
        function createEntry(bytes32 encryptedContent, bytes calldata inputProof, uint256 unlockTimestamp, bool isPublic) external;
    }
}

/// Confirmation of a mined `createEntry` transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
}

/// Call surface of the diary contract, bound to one caller identity
pub trait Ledger: Send + Sync {
    fn address(&self) -> Address;

    fn entry_count(&self) -> impl Future<Output = Result<u64>> + Send;

    fn user_entry_count(&self, user: Address) -> impl Future<Output = Result<u64>> + Send;

    fn user_entries(&self, user: Address) -> impl Future<Output = Result<Vec<EntryId>>> + Send;

    fn entry_metadata(&self, id: EntryId) -> impl Future<Output = Result<EntryMetadata>> + Send;

    /// Ciphertext handle; the contract reverts for every non-author
    fn encrypted_entry(&self, id: EntryId) -> impl Future<Output = Result<Handle>> + Send;

    fn can_unlock_entry(&self, id: EntryId) -> impl Future<Output = Result<bool>> + Send;

    fn can_decrypt_entry(&self, id: EntryId) -> impl Future<Output = Result<bool>> + Send;

    /// Submit an encrypted entry; the input is consumed by the write
    fn create_entry(
        &self,
        input: EncryptedInput,
        unlock_timestamp: u64,
        is_public: bool,
    ) -> impl Future<Output = Result<WriteReceipt>> + Send;
}

/// Resolve the diary contract for a network
pub fn contract_address(network_id: NetworkId, configured: Option<Address>) -> Result<Address> {
    match (network_id, configured) {
        (_, Some(addr)) => Ok(addr),
        (LOCAL_CHAIN_ID, None) => Ok(LOCAL_DIARY_ADDRESS),
        (other, None) => Err(DiaryError::Config(format!(
            "no diary contract address configured for chain {other}"
        ))),
    }
}

fn to_u64(call: &'static str, value: U256) -> Result<u64> {
    u64::try_from(value).map_err(|_| DiaryError::read(call, format!("{value} does not fit in u64")))
}

/// JSON-RPC backed contract client
#[derive(Clone)]
pub struct ContractLedger<R> {
    rpc: R,
    address: Address,
    caller: Option<Address>,
    receipt_interval: Duration,
    receipt_attempts: u32,
}

impl<R: ChainRpc> ContractLedger<R> {
    pub fn new(rpc: R, address: Address) -> Self {
        Self {
            rpc,
            address,
            caller: None,
            receipt_interval: Duration::from_millis(500),
            receipt_attempts: 60,
        }
    }

    /// Bind the caller identity sent as `from`
    pub fn with_caller(mut self, caller: Address) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn with_receipt_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.receipt_interval = interval;
        self.receipt_attempts = attempts;
        self
    }

    pub fn caller(&self) -> Option<Address> {
        self.caller
    }

    fn tx_object(&self, data: Vec<u8>) -> Value {
        let mut tx = json!({
            "to": self.address,
            "data": format!("0x{}", hex::encode(data)),
        });
        if let Some(from) = self.caller {
            tx["from"] = json!(from);
        }
        tx
    }

    async fn call<C: SolCall>(&self, name: &'static str, call: C) -> Result<C::Return> {
        tracing::debug!(call = name, contract = %self.address, "eth_call");

        let result = self
            .rpc
            .request("eth_call", json!([self.tx_object(call.abi_encode()), "latest"]))
            .await
            .map_err(|e| DiaryError::read(name, e))?;

        let data = result
            .as_str()
            .ok_or_else(|| DiaryError::read(name, format!("non-string result {result}")))?;
        let bytes =
            hex::decode(data.trim_start_matches("0x")).map_err(|e| DiaryError::read(name, e))?;

        C::abi_decode_returns(&bytes).map_err(|e| DiaryError::read(name, e))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<WriteReceipt> {
        for _ in 0..self.receipt_attempts {
            let receipt = self
                .rpc
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await
                .map_err(|e| DiaryError::LedgerWriteFailure(e.to_string()))?;

            if receipt.is_null() {
                tokio::time::sleep(self.receipt_interval).await;
                continue;
            }

            let status = receipt.get("status").and_then(parse_quantity);
            if status != Some(1) {
                return Err(DiaryError::LedgerWriteFailure(format!(
                    "transaction {tx_hash} reverted"
                )));
            }

            let block_number = receipt
                .get("blockNumber")
                .and_then(parse_quantity)
                .unwrap_or_default();
            return Ok(WriteReceipt {
                tx_hash,
                block_number,
            });
        }

        Err(DiaryError::LedgerWriteFailure(format!(
            "no receipt for {tx_hash} after {} attempts",
            self.receipt_attempts
        )))
    }
}

impl<R: ChainRpc> Ledger for ContractLedger<R> {
    fn address(&self) -> Address {
        self.address
    }

    async fn entry_count(&self) -> Result<u64> {
        let count = self
            .call("getEntryCount", IEncryptedDiary::getEntryCountCall {})
            .await?;
        to_u64("getEntryCount", count)
    }

    async fn user_entry_count(&self, user: Address) -> Result<u64> {
        let count = self
            .call(
                "getUserEntryCount",
                IEncryptedDiary::getUserEntryCountCall { user },
            )
            .await?;
        to_u64("getUserEntryCount", count)
    }

    async fn user_entries(&self, user: Address) -> Result<Vec<EntryId>> {
        let ids = self
            .call("getUserEntries", IEncryptedDiary::getUserEntriesCall { user })
            .await?;
        ids.into_iter()
            .map(|id| to_u64("getUserEntries", id))
            .collect()
    }

    async fn entry_metadata(&self, id: EntryId) -> Result<EntryMetadata> {
        let ret = self
            .call(
                "getEntryMetadata",
                IEncryptedDiary::getEntryMetadataCall {
                    entryId: U256::from(id),
                },
            )
            .await?;

        Ok(EntryMetadata {
            author: ret.author,
            created_at: to_u64("getEntryMetadata", ret.createdAt)?,
            unlock_timestamp: to_u64("getEntryMetadata", ret.unlockTimestamp)?,
            is_public: ret.isPublic,
        })
    }

    async fn encrypted_entry(&self, id: EntryId) -> Result<Handle> {
        self.call(
            "getEncryptedEntry",
            IEncryptedDiary::getEncryptedEntryCall {
                entryId: U256::from(id),
            },
        )
        .await
    }

    async fn can_unlock_entry(&self, id: EntryId) -> Result<bool> {
        self.call(
            "canUnlockEntry",
            IEncryptedDiary::canUnlockEntryCall {
                entryId: U256::from(id),
            },
        )
        .await
    }

    async fn can_decrypt_entry(&self, id: EntryId) -> Result<bool> {
        self.call(
            "canDecryptEntry",
            IEncryptedDiary::canDecryptEntryCall {
                entryId: U256::from(id),
            },
        )
        .await
    }

    async fn create_entry(
        &self,
        input: EncryptedInput,
        unlock_timestamp: u64,
        is_public: bool,
    ) -> Result<WriteReceipt> {
        if self.caller.is_none() {
            return Err(DiaryError::LedgerWriteFailure("no sender account".into()));
        }
        let handle = input
            .primary_handle()
            .ok_or_else(|| DiaryError::LedgerWriteFailure("encrypted input has no handle".into()))?;

        let call = IEncryptedDiary::createEntryCall {
            encryptedContent: handle,
            inputProof: input.proof,
            unlockTimestamp: U256::from(unlock_timestamp),
            isPublic: is_public,
        };

        let result = self
            .rpc
            .request("eth_sendTransaction", json!([self.tx_object(call.abi_encode())]))
            .await
            .map_err(|e| DiaryError::LedgerWriteFailure(e.to_string()))?;
        let tx_hash: B256 = serde_json::from_value(result)
            .map_err(|e| DiaryError::LedgerWriteFailure(format!("bad transaction hash: {e}")))?;

        tracing::info!(%tx_hash, unlock_timestamp, is_public, "Submitted diary entry");

        self.wait_for_receipt(tx_hash).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use alloy_sol_types::SolValue;
    use diary_core::Bytes;

    use super::*;
    use crate::error::RpcError;
    use crate::rpc::mock::MockRpc;

    fn hex_result(bytes: Vec<u8>) -> Value {
        json!(format!("0x{}", hex::encode(bytes)))
    }

    #[test]
    fn test_contract_address_resolution() {
        assert_eq!(contract_address(31337, None).unwrap(), LOCAL_DIARY_ADDRESS);
        let configured = Address::repeat_byte(9);
        assert_eq!(contract_address(11155111, Some(configured)).unwrap(), configured);
        assert!(matches!(
            contract_address(11155111, None),
            Err(DiaryError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_entry_metadata_decoding() {
        let author = Address::repeat_byte(0xaa);
        let rpc = MockRpc::new(move |method, params| {
            assert_eq!(method, "eth_call");
            assert_eq!(params[1], "latest");
            let ret = (author, U256::from(1_700_000_000u64), U256::ZERO, true);
            Ok(hex_result(ret.abi_encode_params()))
        });
        let ledger = ContractLedger::new(rpc, LOCAL_DIARY_ADDRESS);

        let meta = ledger.entry_metadata(4).await.unwrap();
        assert_eq!(meta.author, author);
        assert_eq!(meta.created_at, 1_700_000_000);
        assert_eq!(meta.unlock_timestamp, 0);
        assert!(meta.is_public);
    }

    #[tokio::test]
    async fn test_caller_sent_as_from() {
        let seen = Arc::new(Mutex::new(Value::Null));
        let seen_clone = seen.clone();
        let rpc = MockRpc::new(move |_, params| {
            *seen_clone.lock().unwrap() = params[0].clone();
            Ok(hex_result(U256::from(3).abi_encode()))
        });
        let caller = Address::repeat_byte(0x01);
        let ledger = ContractLedger::new(rpc, LOCAL_DIARY_ADDRESS).with_caller(caller);

        assert_eq!(ledger.entry_count().await.unwrap(), 3);
        let tx = seen.lock().unwrap().clone();
        assert_eq!(tx["from"], json!(caller));
        assert_eq!(tx["to"], json!(LOCAL_DIARY_ADDRESS));
    }

    #[tokio::test]
    async fn test_revert_is_read_failure() {
        let rpc = MockRpc::new(|_, _| {
            Err(RpcError::Rpc {
                code: 3,
                message: "execution reverted: Only author can access encrypted content".into(),
            })
        });
        let ledger = ContractLedger::new(rpc, LOCAL_DIARY_ADDRESS);

        let err = ledger.encrypted_entry(0).await.unwrap_err();
        match err {
            DiaryError::LedgerReadFailure { call, message } => {
                assert_eq!(call, "getEncryptedEntry");
                assert!(message.contains("Only author"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_entry_waits_for_receipt() {
        let tx_hash = B256::repeat_byte(0x5e);
        let polls = Arc::new(Mutex::new(0u32));
        let polls_clone = polls.clone();
        let rpc = MockRpc::new(move |method, _| match method {
            "eth_sendTransaction" => Ok(json!(tx_hash)),
            "eth_getTransactionReceipt" => {
                let mut n = polls_clone.lock().unwrap();
                *n += 1;
                if *n < 3 {
                    Ok(Value::Null)
                } else {
                    Ok(json!({ "status": "0x1", "blockNumber": "0x10" }))
                }
            }
            other => Err(RpcError::InvalidResponse(other.to_string())),
        });
        let ledger = ContractLedger::new(rpc, LOCAL_DIARY_ADDRESS)
            .with_caller(Address::repeat_byte(1))
            .with_receipt_polling(Duration::from_millis(1), 5);

        let input = EncryptedInput {
            handles: vec![Handle::repeat_byte(1)],
            proof: Bytes::from(vec![1, 2, 3]),
            encoding: diary_core::ContentEncoding::Packed,
        };
        let receipt = ledger.create_entry(input, 0, false).await.unwrap();
        assert_eq!(receipt.tx_hash, tx_hash);
        assert_eq!(receipt.block_number, 16);
        assert_eq!(*polls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_reverted_write() {
        let rpc = MockRpc::new(|method, _| match method {
            "eth_sendTransaction" => Ok(json!(B256::repeat_byte(1))),
            _ => Ok(json!({ "status": "0x0", "blockNumber": "0x2" })),
        });
        let ledger = ContractLedger::new(rpc, LOCAL_DIARY_ADDRESS).with_caller(Address::repeat_byte(1));

        let input = EncryptedInput {
            handles: vec![Handle::repeat_byte(1)],
            proof: Bytes::new(),
            encoding: diary_core::ContentEncoding::Packed,
        };
        let err = ledger.create_entry(input, 0, false).await.unwrap_err();
        assert_eq!(err.code(), "LEDGER_WRITE_FAILURE");
    }
}
