//! Plaintext to ciphertext handle conversion under an encryption session

use alloy_signer_local::PrivateKeySigner;
use diary_core::{
    canonicalize_handle, content, Address, Bytes, ContentEncoding, Handle, NetworkKind, U256,
};

use crate::engine::FheType;
use crate::error::{DiaryError, Result};
use crate::session::EncryptionSession;

/// Handles plus proof for one ledger write
///
/// Not `Clone`: an input is produced per encryption and moved into exactly one
/// `create_entry` call.
#[derive(Debug, PartialEq, Eq)]
pub struct EncryptedInput {
    pub handles: Vec<Handle>,
    pub proof: Bytes,
    pub encoding: ContentEncoding,
}

impl EncryptedInput {
    /// First handle; the ledger stores one ciphertext per entry
    pub fn primary_handle(&self) -> Option<Handle> {
        self.handles.first().copied()
    }
}

/// Encrypt `text` for `contract`, bound to `user`
pub async fn encrypt(
    session: &EncryptionSession,
    contract: Address,
    user: Address,
    text: &str,
) -> Result<EncryptedInput> {
    let (value, encoding) = content::encode(text);

    let raw = session
        .engine()
        .build_encrypted_input(contract, user, value)
        .await
        .map_err(DiaryError::EncryptionFailure)?;

    let handles: Vec<Handle> = raw.handles.iter().map(|h| canonicalize_handle(h)).collect();

    tracing::debug!(
        network_id = session.network_id(),
        handles = handles.len(),
        proof_len = raw.proof.len(),
        ?encoding,
        "Encrypted entry content"
    );

    Ok(EncryptedInput {
        handles,
        proof: Bytes::from(raw.proof),
        encoding,
    })
}

/// Decrypt one handle back to its 256-bit word
pub async fn decrypt(
    session: &EncryptionSession,
    handle: Handle,
    contract: Address,
    signer: &PrivateKeySigner,
) -> Result<U256> {
    let engine = session.engine();
    let result = match session.mode() {
        NetworkKind::Simulated => engine.mock_decrypt(handle, contract, signer).await,
        NetworkKind::Live => {
            engine
                .user_decrypt(FheType::Euint256, handle, contract, signer)
                .await
        }
    };

    result.map_err(DiaryError::DecryptionFailure)
}

#[cfg(test)]
mod tests {
    use diary_core::DecryptedContent;

    use super::*;
    use crate::error::EngineError;
    use crate::session::test_support::local_node;
    use crate::session::{RelayerEndpoints, SessionManager};

    fn manager() -> SessionManager<crate::rpc::mock::MockRpc> {
        SessionManager::new(
            local_node(),
            RelayerEndpoints {
                primary: "http://127.0.0.1:1".into(),
                fallback: "http://127.0.0.1:1".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt_short_text() {
        let manager = manager();
        let session = manager.get_session(31337).await.unwrap();
        let signer = PrivateKeySigner::random();
        let contract = Address::repeat_byte(0x44);

        let input = encrypt(&session, contract, signer.address(), "dear diary")
            .await
            .unwrap();
        assert_eq!(input.handles.len(), 1);
        assert_eq!(input.encoding, ContentEncoding::Packed);
        assert!(!input.proof.is_empty());

        let word = decrypt(&session, input.handles[0], contract, &signer)
            .await
            .unwrap();
        assert_eq!(DecryptedContent::decode(word).as_text(), Some("dear diary"));
    }

    #[tokio::test]
    async fn test_long_text_is_digest() {
        let manager = manager();
        let session = manager.get_session(31337).await.unwrap();
        let signer = PrivateKeySigner::random();
        let text = "a much longer entry that will never fit into a single word";

        let input = encrypt(&session, Address::ZERO, signer.address(), text)
            .await
            .unwrap();
        assert_eq!(input.encoding, ContentEncoding::Digest);

        let word = decrypt(&session, input.primary_handle().unwrap(), Address::ZERO, &signer)
            .await
            .unwrap();
        assert!(DecryptedContent::decode(word).matches(text));
    }

    #[tokio::test]
    async fn test_unknown_handle_is_decryption_failure() {
        let manager = manager();
        let session = manager.get_session(31337).await.unwrap();
        let signer = PrivateKeySigner::random();

        let err = decrypt(&session, Handle::repeat_byte(7), Address::ZERO, &signer)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DiaryError::DecryptionFailure(EngineError::UnknownHandle(_))
        ));
    }
}
