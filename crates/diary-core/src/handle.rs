//! Handle canonicalization
//!
//! Engines may hand back handles that are not exactly 32 bytes wide. The
//! ledger ABI takes `bytes32`, so every handle is normalized before it can
//! reach the wire:
//! - shorter than 32 bytes: left-padded with zeros
//! - longer than 32 bytes: first 32 bytes kept
//! - exactly 32 bytes: unchanged

use crate::constants::HANDLE_SIZE;
use crate::Handle;

pub fn canonicalize_handle(raw: &[u8]) -> Handle {
    let mut out = [0u8; HANDLE_SIZE];
    if raw.len() >= HANDLE_SIZE {
        out.copy_from_slice(&raw[..HANDLE_SIZE]);
    } else {
        out[HANDLE_SIZE - raw.len()..].copy_from_slice(raw);
    }
    Handle::from(out)
}
