//! In-memory diary ledger
//!
//! Mirrors the deployed contract's call semantics (dense ids from 0,
//! author-gated ciphertext reads, time-based unlock checks) with a settable
//! clock. Used by tests and offline demos.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use diary_core::{Address, EntryId, EntryMetadata, Handle, B256};

use crate::client::unix_now;
use crate::codec::EncryptedInput;
use crate::error::{DiaryError, Result};
use crate::ledger::{Ledger, WriteReceipt};

const NOT_AUTHOR: &str = "Only author can access encrypted content";

struct StoredEntry {
    metadata: EntryMetadata,
    handle: Handle,
}

#[derive(Default)]
struct LedgerState {
    entries: Vec<StoredEntry>,
    metadata_reads: Vec<EntryId>,
    failing: HashSet<EntryId>,
    block_number: u64,
}

#[derive(Clone)]
pub struct MemoryLedger {
    address: Address,
    caller: Option<Address>,
    state: Arc<Mutex<LedgerState>>,
    clock: Arc<AtomicU64>,
}

impl MemoryLedger {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            caller: None,
            state: Arc::new(Mutex::new(LedgerState::default())),
            clock: Arc::new(AtomicU64::new(unix_now())),
        }
    }

    /// Same ledger, different sender
    pub fn connect(&self, caller: Address) -> Self {
        Self {
            caller: Some(caller),
            ..self.clone()
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    pub fn set_time(&self, now: u64) {
        self.clock.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.clock.fetch_add(secs, Ordering::SeqCst);
    }

    /// Append an entry directly, bypassing encryption
    pub fn seed(&self, metadata: EntryMetadata, handle: Handle) -> EntryId {
        let mut state = self.state();
        state.entries.push(StoredEntry { metadata, handle });
        (state.entries.len() - 1) as EntryId
    }

    /// Ids passed to `entry_metadata`, in call order
    pub fn metadata_reads(&self) -> Vec<EntryId> {
        self.state().metadata_reads.clone()
    }

    /// Make metadata reads for `id` fail
    pub fn fail_metadata_for(&self, id: EntryId) {
        self.state().failing.insert(id);
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_entry<T>(
        &self,
        call: &'static str,
        id: EntryId,
        f: impl FnOnce(&StoredEntry) -> Result<T>,
    ) -> Result<T> {
        let state = self.state();
        let entry = state
            .entries
            .get(id as usize)
            .ok_or_else(|| DiaryError::read(call, "Entry does not exist"))?;
        f(entry)
    }

    fn is_author(&self, metadata: &EntryMetadata) -> bool {
        self.caller == Some(metadata.author)
    }
}

impl Ledger for MemoryLedger {
    fn address(&self) -> Address {
        self.address
    }

    async fn entry_count(&self) -> Result<u64> {
        Ok(self.state().entries.len() as u64)
    }

    async fn user_entry_count(&self, user: Address) -> Result<u64> {
        Ok(self.user_entries(user).await?.len() as u64)
    }

    async fn user_entries(&self, user: Address) -> Result<Vec<EntryId>> {
        Ok(self
            .state()
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.metadata.author == user)
            .map(|(id, _)| id as EntryId)
            .collect())
    }

    async fn entry_metadata(&self, id: EntryId) -> Result<EntryMetadata> {
        let mut state = self.state();
        state.metadata_reads.push(id);
        if state.failing.contains(&id) {
            return Err(DiaryError::read("getEntryMetadata", "injected failure"));
        }
        state
            .entries
            .get(id as usize)
            .map(|e| e.metadata)
            .ok_or_else(|| DiaryError::read("getEntryMetadata", "Entry does not exist"))
    }

    async fn encrypted_entry(&self, id: EntryId) -> Result<Handle> {
        self.with_entry("getEncryptedEntry", id, |e| {
            if self.is_author(&e.metadata) {
                Ok(e.handle)
            } else {
                Err(DiaryError::read("getEncryptedEntry", NOT_AUTHOR))
            }
        })
    }

    async fn can_unlock_entry(&self, id: EntryId) -> Result<bool> {
        let now = self.now();
        self.with_entry("canUnlockEntry", id, |e| {
            Ok(e.metadata.unlock_state(now).is_unlocked())
        })
    }

    async fn can_decrypt_entry(&self, id: EntryId) -> Result<bool> {
        let now = self.now();
        self.with_entry("canDecryptEntry", id, |e| {
            Ok(e.metadata.unlock_state(now).is_unlocked()
                && (e.metadata.is_public || self.is_author(&e.metadata)))
        })
    }

    async fn create_entry(
        &self,
        input: EncryptedInput,
        unlock_timestamp: u64,
        is_public: bool,
    ) -> Result<WriteReceipt> {
        let author = self
            .caller
            .ok_or_else(|| DiaryError::LedgerWriteFailure("no sender account".into()))?;
        let handle = input
            .primary_handle()
            .ok_or_else(|| DiaryError::LedgerWriteFailure("encrypted input has no handle".into()))?;

        let metadata = EntryMetadata {
            author,
            created_at: self.now(),
            unlock_timestamp,
            is_public,
        };

        let mut state = self.state();
        state.entries.push(StoredEntry { metadata, handle });
        state.block_number += 1;
        let id = state.entries.len() as u64 - 1;

        Ok(WriteReceipt {
            tx_hash: B256::from(diary_core::keccak256_concat(&[
                handle.as_slice(),
                &id.to_be_bytes()[..],
            ])),
            block_number: state.block_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use diary_core::{Bytes, ContentEncoding};

    use super::*;

    const NOW: u64 = 1_704_067_200;

    fn input() -> EncryptedInput {
        EncryptedInput {
            handles: vec![Handle::repeat_byte(0x42)],
            proof: Bytes::from(vec![1]),
            encoding: ContentEncoding::Packed,
        }
    }

    fn ledger() -> (MemoryLedger, MemoryLedger, MemoryLedger) {
        let base = MemoryLedger::new(Address::repeat_byte(0xdd));
        base.set_time(NOW);
        let alice = base.connect(Address::repeat_byte(0xa1));
        let bob = base.connect(Address::repeat_byte(0xb0));
        (base, alice, bob)
    }

    #[tokio::test]
    async fn test_only_author_reads_private_ciphertext() {
        let (_, alice, bob) = ledger();
        alice.create_entry(input(), 0, false).await.unwrap();

        assert_eq!(alice.encrypted_entry(0).await.unwrap(), Handle::repeat_byte(0x42));
        let err = bob.encrypted_entry(0).await.unwrap_err();
        assert!(err.to_string().contains(NOT_AUTHOR));
    }

    #[tokio::test]
    async fn test_public_unlocked_ciphertext_still_author_only() {
        let (_, alice, bob) = ledger();
        alice.create_entry(input(), NOW - 1, true).await.unwrap();

        assert!(bob.can_decrypt_entry(0).await.unwrap());
        let err = bob.encrypted_entry(0).await.unwrap_err();
        assert!(err.to_string().contains(NOT_AUTHOR));
    }

    #[tokio::test]
    async fn test_never_unlock_stays_closed() {
        let (base, alice, _) = ledger();
        alice.create_entry(input(), 0, true).await.unwrap();

        base.advance(10 * 365 * 86_400);
        assert!(!alice.can_unlock_entry(0).await.unwrap());
        assert!(!alice.can_decrypt_entry(0).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_after_timestamp() {
        let (base, alice, bob) = ledger();
        alice.create_entry(input(), NOW + 60, false).await.unwrap();

        assert!(!alice.can_decrypt_entry(0).await.unwrap());
        base.advance(60);
        assert!(alice.can_unlock_entry(0).await.unwrap());
        assert!(alice.can_decrypt_entry(0).await.unwrap());
        assert!(!bob.can_decrypt_entry(0).await.unwrap());
    }

    #[tokio::test]
    async fn test_counts_and_ids() {
        let (_, alice, bob) = ledger();
        alice.create_entry(input(), 0, false).await.unwrap();
        bob.create_entry(input(), 0, false).await.unwrap();
        alice.create_entry(input(), 0, true).await.unwrap();

        assert_eq!(alice.entry_count().await.unwrap(), 3);
        assert_eq!(alice.user_entries(alice.caller.unwrap()).await.unwrap(), vec![0, 2]);
        assert_eq!(bob.user_entry_count(bob.caller.unwrap()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_write_requires_sender() {
        let (base, _, _) = ledger();
        let err = base.create_entry(input(), 0, false).await.unwrap_err();
        assert_eq!(err.code(), "LEDGER_WRITE_FAILURE");
    }
}
