//! diary-core: Core types and derivations for the encrypted diary client
//!
//! This crate defines the foundational, I/O-free pieces shared by the client:
//! - Entry metadata as reported by the ledger contract
//! - The unlock lifecycle (`NeverUnlock` / `Locked` / `Unlocked`)
//! - Plaintext to 256-bit word encoding and handle canonicalization
//! - UTC day bucketing for dashboard statistics
//!
//! # Privacy Model
//!
//! Entry content never reaches the ledger in cleartext. The client encrypts a
//! single 256-bit word under the network's homomorphic engine and submits only
//! the resulting handle and input proof.
//!
//! ## What the Ledger Learns
//!
//! | Information | Ledger Knowledge |
//! |-------------|------------------|
//! | Author address | **YES** - transaction sender |
//! | Creation time | **YES** - block timestamp |
//! | Unlock timestamp, visibility | **YES** - stored in cleartext |
//! | Entry content | NO - only a ciphertext handle |
//!
//! ## Encoding Trade-off
//!
//! The engine carries one 256-bit field per entry. Short texts (up to
//! [`content::MAX_PACKED_BYTES`] bytes of UTF-8) are packed losslessly; longer
//! texts are reduced to a keccak-256 digest, which can only be verified
//! against a locally cached copy, never recovered.

pub mod buckets;
pub mod content;
mod entry;
mod error;
pub mod handle;
mod hash;
pub mod lifecycle;
pub mod network;

pub use buckets::{day_key, DateBucket, DateHistogram};
pub use content::{ContentEncoding, DecryptedContent};
pub use entry::{DiaryEntry, EntryId, EntryMetadata};
pub use error::CoreError;
pub use handle::canonicalize_handle;
pub use hash::keccak256_concat;
pub use lifecycle::{UnlockPolicy, UnlockState};
pub use network::{NetworkId, NetworkKind};

pub use alloy_primitives::{Address, Bytes, B256, U256};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Fixed-width ciphertext reference exchanged with the ledger
pub type Handle = B256;

/// Constants shared by client and tests
pub mod constants {
    /// Handle width in bytes
    pub const HANDLE_SIZE: usize = 32;

    /// Maximum entry length in characters accepted for encryption
    pub const MAX_ENTRY_CHARS: usize = 1000;

    /// Default number of entries the statistics pipeline reads per window
    pub const STATS_SCAN_LIMIT: u64 = 100;

    /// Number of date buckets kept per timeline
    pub const TIMELINE_BUCKETS: usize = 14;

    /// Maximum number of remembered search terms
    pub const SEARCH_HISTORY_CAP: usize = 10;
}
