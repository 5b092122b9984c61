//! Plaintext <-> 256-bit word encoding
//!
//! The engine encrypts exactly one `euint256` per entry, so text has to fit a
//! single 32-byte word. Two encodings share the word, distinguished by the
//! leading byte:
//!
//! ```text
//! packed:  [0x01][len:1][utf8 bytes: len <= 30][zero padding]
//! digest:  [0x00][keccak256(utf8)[1..32]]
//! ```
//!
//! Packed words decode back to the original text. Digest words are one-way:
//! the client can only confirm that a cached text produced them.

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::constants::MAX_ENTRY_CHARS;
use crate::error::CoreError;
use crate::hash::keccak256_concat;

/// Leading byte of a packed word
pub const PACKED_TAG: u8 = 0x01;

/// Leading byte of a digest word
pub const DIGEST_TAG: u8 = 0x00;

/// Longest UTF-8 payload that packs losslessly
pub const MAX_PACKED_BYTES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    Packed,
    Digest,
}

/// Reject blank or oversized entries before any engine work happens
pub fn validate(text: &str) -> Result<(), CoreError> {
    if text.trim().is_empty() {
        return Err(CoreError::EmptyContent);
    }
    let chars = text.chars().count();
    if chars > MAX_ENTRY_CHARS {
        return Err(CoreError::ContentTooLong {
            chars,
            max: MAX_ENTRY_CHARS,
        });
    }
    Ok(())
}

/// Map text to the word handed to the engine
pub fn encode(text: &str) -> (U256, ContentEncoding) {
    let bytes = text.as_bytes();
    let mut word = [0u8; 32];

    if bytes.len() <= MAX_PACKED_BYTES {
        word[0] = PACKED_TAG;
        word[1] = bytes.len() as u8;
        word[2..2 + bytes.len()].copy_from_slice(bytes);
        return (U256::from_be_bytes(word), ContentEncoding::Packed);
    }

    word = keccak256_concat(&[bytes]);
    word[0] = DIGEST_TAG;

    (U256::from_be_bytes(word), ContentEncoding::Digest)
}

/// Result of decoding a decrypted word
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum DecryptedContent {
    Text(String),
    Digest(U256),
}

impl DecryptedContent {
    pub fn decode(word: U256) -> Self {
        let bytes = word.to_be_bytes::<32>();
        if bytes[0] == PACKED_TAG {
            let len = bytes[1] as usize;
            if len <= MAX_PACKED_BYTES && bytes[2 + len..].iter().all(|&b| b == 0) {
                if let Ok(text) = std::str::from_utf8(&bytes[2..2 + len]) {
                    return DecryptedContent::Text(text.to_string());
                }
            }
        }
        DecryptedContent::Digest(word)
    }

    pub fn encoding(&self) -> ContentEncoding {
        match self {
            DecryptedContent::Text(_) => ContentEncoding::Packed,
            DecryptedContent::Digest(_) => ContentEncoding::Digest,
        }
    }

    /// Whether `text` is the content that produced this word
    pub fn matches(&self, text: &str) -> bool {
        match self {
            DecryptedContent::Text(stored) => stored == text,
            DecryptedContent::Digest(word) => encode(text).0 == *word,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecryptedContent::Text(text) => Some(text),
            DecryptedContent::Digest(_) => None,
        }
    }
}

impl fmt::Display for DecryptedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecryptedContent::Text(text) => write!(f, "{text}"),
            DecryptedContent::Digest(word) => {
                write!(f, "digest:0x{}", hex::encode(word.to_be_bytes::<32>()))
            }
        }
    }
}
