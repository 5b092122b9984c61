//! Diary client facade
//!
//! Ties the session manager, codec, ledger and local store together behind
//! the operations a diary front end needs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_signer_local::PrivateKeySigner;
use diary_core::{
    content, Address, DecryptedContent, DiaryEntry, EntryId, NetworkId, NetworkKind, UnlockPolicy,
};

use crate::codec;
use crate::error::{DiaryError, Result};
use crate::ledger::{Ledger, WriteReceipt};
use crate::rpc::ChainRpc;
use crate::session::SessionManager;
use crate::stats::{self, DashboardStats, ScanWindow};
use crate::store::PreferenceStore;

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Bounded retry with linear backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay before retry `n` is `n * backoff`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub struct DiaryClient<R, L> {
    sessions: SessionManager<R>,
    ledger: L,
    signer: PrivateKeySigner,
    store: Mutex<PreferenceStore>,
    network_id: AtomicU64,
    /// Chain whose contract address `ledger` was resolved for
    ledger_network: NetworkId,
    retry: RetryPolicy,
    clock: Clock,
}

impl<R: ChainRpc, L: Ledger> DiaryClient<R, L> {
    pub fn new(
        sessions: SessionManager<R>,
        ledger: L,
        signer: PrivateKeySigner,
        store: PreferenceStore,
        network_id: NetworkId,
    ) -> Self {
        Self {
            sessions,
            ledger,
            signer,
            store: Mutex::new(store),
            network_id: AtomicU64::new(network_id),
            ledger_network: network_id,
            retry: RetryPolicy::default(),
            clock: Arc::new(unix_now),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the wall clock (unix seconds)
    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id.load(Ordering::SeqCst)
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn sessions(&self) -> &SessionManager<R> {
        &self.sessions
    }

    /// Local store; do not hold the guard across an await
    pub fn store(&self) -> MutexGuard<'_, PreferenceStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Current network, provided the ledger was built for it
    fn active_network(&self) -> Result<NetworkId> {
        let id = self.network_id();
        if NetworkKind::of(id).is_none() {
            return Err(DiaryError::UnsupportedNetwork(id));
        }
        if id != self.ledger_network {
            return Err(DiaryError::Config(format!(
                "ledger is bound to chain {}, not {id}; rebuild the client for the new chain",
                self.ledger_network
            )));
        }
        Ok(id)
    }

    /// Encrypt and submit a new entry, then clear the draft
    pub async fn write_entry(
        &self,
        text: &str,
        policy: UnlockPolicy,
        is_public: bool,
    ) -> Result<WriteReceipt> {
        content::validate(text).map_err(DiaryError::InvalidContent)?;
        let unlock_timestamp = policy.checked_timestamp()?;

        let session = self.sessions.get_session(self.active_network()?).await?;
        let input = codec::encrypt(&session, self.ledger.address(), self.address(), text).await?;
        let encoding = input.encoding;

        let receipt = self
            .ledger
            .create_entry(input, unlock_timestamp, is_public)
            .await?;

        tracing::info!(
            tx_hash = %receipt.tx_hash,
            block = receipt.block_number,
            unlock_timestamp,
            is_public,
            ?encoding,
            "Diary entry written"
        );

        self.store().save_draft("")?;
        Ok(receipt)
    }

    /// The caller's entries, newest first, with any cached plaintext attached
    pub async fn list_entries(&self) -> Result<Vec<DiaryEntry>> {
        let mut attempt = 1;
        loop {
            match self.fetch_entries().await {
                Ok(entries) => return Ok(entries),
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    tracing::warn!(attempt, error = %e, "Listing entries failed, retrying");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_entries(&self) -> Result<Vec<DiaryEntry>> {
        let mut ids = self.ledger.user_entries(self.address()).await?;
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let metadata = self.ledger.entry_metadata(id).await?;
            let mut entry = DiaryEntry::new(id, metadata);
            entry.plaintext = self.store().cached(id).and_then(|c| c.content.clone());
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Decrypt one entry if the ledger allows it, caching the result
    pub async fn decrypt_entry(&self, id: EntryId) -> Result<DecryptedContent> {
        if !self.ledger.can_decrypt_entry(id).await? {
            return Err(DiaryError::DecryptNotPermitted(id));
        }

        // The contract serves ciphertext to the author only, even for
        // public entries; any failure there is a denial for everyone else.
        let metadata = self.ledger.entry_metadata(id).await?;
        let handle = match self.ledger.encrypted_entry(id).await {
            Ok(handle) => handle,
            Err(e) if metadata.author != self.address() => {
                tracing::warn!(entry_id = id, error = %e, "Ciphertext refused to non-author");
                return Err(DiaryError::DecryptNotPermitted(id));
            }
            Err(e) => return Err(e),
        };
        let session = self.sessions.get_session(self.active_network()?).await?;
        let word = codec::decrypt(&session, handle, self.ledger.address(), &self.signer).await?;
        let content = DecryptedContent::decode(word);

        self.store()
            .cache_entry(id, metadata, Some(content.clone()), self.now())?;

        tracing::info!(entry_id = id, encoding = ?content.encoding(), "Entry decrypted");
        Ok(content)
    }

    pub async fn stats(&self) -> Result<DashboardStats> {
        self.stats_window(ScanWindow::default()).await
    }

    pub async fn stats_window(&self, window: ScanWindow) -> Result<DashboardStats> {
        stats::compute_stats_window(&self.ledger, Some(self.address()), window, self.now()).await
    }

    /// Switch network context; the next session use rebuilds the engine
    ///
    /// The ledger stays bound to the contract of the chain the client was
    /// built for. Encrypting or decrypting on any other chain fails with a
    /// config error until the client is rebuilt or the network switches back.
    pub async fn on_network_changed(&self, network_id: NetworkId) {
        let previous = self.network_id.swap(network_id, Ordering::SeqCst);
        if previous != network_id {
            tracing::info!(from = previous, to = network_id, "Network changed");
            self.sessions.invalidate().await;
        }
    }
}
