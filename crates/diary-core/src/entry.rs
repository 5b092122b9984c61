//! Diary entries as reported by the ledger contract

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::content::DecryptedContent;
use crate::lifecycle::UnlockState;
use crate::Handle;

/// Contract-assigned entry id (monotonic, dense, starting at 0)
pub type EntryId = u64;

/// Cleartext metadata stored alongside each ciphertext handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub author: Address,
    /// Unix seconds
    pub created_at: u64,
    /// Unix seconds, 0 = never unlocks
    pub unlock_timestamp: u64,
    pub is_public: bool,
}

impl EntryMetadata {
    /// Current unlock state at `now` (unix seconds)
    pub fn unlock_state(&self, now: u64) -> UnlockState {
        UnlockState::derive(self.unlock_timestamp, now)
    }

    /// Whether `viewer` passes the local visibility rule (public or authored)
    pub fn visible_to(&self, viewer: &Address) -> bool {
        self.is_public || self.author == *viewer
    }

    /// Local pre-check for decrypt eligibility.
    ///
    /// The ledger stays authoritative: a `true` here still requires a
    /// `canDecryptEntry` call before any decryption is attempted.
    pub fn may_attempt_decrypt(&self, viewer: &Address, now: u64) -> bool {
        self.unlock_state(now).is_unlocked() && self.visible_to(viewer)
    }
}

/// An entry with its client-local decryption state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiaryEntry {
    pub id: EntryId,
    pub metadata: EntryMetadata,
    pub encrypted_handle: Option<Handle>,
    /// Present only after a successful local decryption
    pub plaintext: Option<DecryptedContent>,
}

impl DiaryEntry {
    pub fn new(id: EntryId, metadata: EntryMetadata) -> Self {
        Self {
            id,
            metadata,
            encrypted_handle: None,
            plaintext: None,
        }
    }

    pub fn unlock_state(&self, now: u64) -> UnlockState {
        self.metadata.unlock_state(now)
    }
}
