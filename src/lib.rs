//! encrypted-diary: client-side encrypted diary on a homomorphic-encryption ledger
//!
//! - [`diary_core`]: entry metadata, unlock lifecycle, content encoding, day buckets
//! - [`diary_client`]: engine sessions, codec, ledger client, statistics, local store, CLI

pub use diary_client;
pub use diary_core;
