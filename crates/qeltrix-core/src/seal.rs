//! AEAD sealing of blocks with ChaCha20-Poly1305 or AES-256-GCM.
//!
//! Every block is sealed under the container data key with a fresh random
//! 96-bit nonce and the canonical metadata bytes as associated data, binding
//! each block to the container configuration.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{QltxError, QltxResult};
use crate::kdf::DataKey;

/// AEAD nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// AEAD authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// AEAD cipher recorded in container metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SealAlgorithm {
    /// ChaCha20-Poly1305 — constant-time, fast without AES hardware.
    #[default]
    #[serde(rename = "chacha20")]
    ChaCha20Poly1305,
    /// AES-256-GCM — hardware accelerated with AES-NI.
    #[serde(rename = "aes256")]
    Aes256Gcm,
}

/// Generate a random 96-bit nonce for one block.
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt one block. The returned ciphertext carries the 16-byte tag.
pub fn seal(
    algo: SealAlgorithm,
    key: &DataKey,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    ad: &[u8],
) -> QltxResult<Vec<u8>> {
    match algo {
        SealAlgorithm::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| QltxError::Crypto(e.to_string()))?;
            cipher
                .encrypt(
                    chacha20poly1305::Nonce::from_slice(nonce),
                    Payload { msg: plaintext, aad: ad },
                )
                .map_err(|e| QltxError::Crypto(format!("seal failed: {e}")))
        }
        SealAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| QltxError::Crypto(e.to_string()))?;
            cipher
                .encrypt(
                    aes_gcm::Nonce::from_slice(nonce),
                    Payload { msg: plaintext, aad: ad },
                )
                .map_err(|e| QltxError::Crypto(format!("seal failed: {e}")))
        }
    }
}

/// Decrypt one block. Fails with [`QltxError::Auth`] on tag mismatch and
/// never returns partial plaintext.
pub fn open(
    algo: SealAlgorithm,
    key: &DataKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    ad: &[u8],
) -> QltxResult<Vec<u8>> {
    match algo {
        SealAlgorithm::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| QltxError::Crypto(e.to_string()))?;
            cipher
                .decrypt(
                    chacha20poly1305::Nonce::from_slice(nonce),
                    Payload { msg: ciphertext, aad: ad },
                )
                .map_err(|_| QltxError::Auth("AEAD tag verification failed".into()))
        }
        SealAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| QltxError::Crypto(e.to_string()))?;
            cipher
                .decrypt(
                    aes_gcm::Nonce::from_slice(nonce),
                    Payload { msg: ciphertext, aad: ad },
                )
                .map_err(|_| QltxError::Auth("AEAD tag verification failed".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_key() -> DataKey {
        DataKey::from_bytes([0x42; 32])
    }

    proptest! {
        #[test]
        fn prop_chacha_roundtrip(data in prop::collection::vec(0u8..=255, 0..16_384)) {
            let key = test_key();
            let nonce = random_nonce();
            let sealed = seal(SealAlgorithm::ChaCha20Poly1305, &key, &nonce, &data, b"ad").unwrap();
            let opened = open(SealAlgorithm::ChaCha20Poly1305, &key, &nonce, &sealed, b"ad").unwrap();
            prop_assert_eq!(opened, data);
        }
        #[test]
        fn prop_aes_roundtrip(data in prop::collection::vec(0u8..=255, 0..16_384)) {
            let key = test_key();
            let nonce = random_nonce();
            let sealed = seal(SealAlgorithm::Aes256Gcm, &key, &nonce, &data, b"ad").unwrap();
            let opened = open(SealAlgorithm::Aes256Gcm, &key, &nonce, &sealed, b"ad").unwrap();
            prop_assert_eq!(opened, data);
        }
    }

    #[test]
    fn ciphertext_includes_tag() {
        let key = test_key();
        let nonce = random_nonce();
        let sealed = seal(SealAlgorithm::ChaCha20Poly1305, &key, &nonce, b"hello", b"").unwrap();
        assert_eq!(sealed.len(), 5 + TAG_LEN);
        let empty = seal(SealAlgorithm::Aes256Gcm, &key, &nonce, b"", b"").unwrap();
        assert_eq!(empty.len(), TAG_LEN);
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let key = test_key();
        let nonce = random_nonce();
        for algo in [SealAlgorithm::ChaCha20Poly1305, SealAlgorithm::Aes256Gcm] {
            let mut sealed = seal(algo, &key, &nonce, b"secret", b"ad").unwrap();
            sealed[0] ^= 0xFF;
            assert!(matches!(
                open(algo, &key, &nonce, &sealed, b"ad"),
                Err(QltxError::Auth(_))
            ));
        }
    }

    #[test]
    fn wrong_associated_data_fails_auth() {
        let key = test_key();
        let nonce = random_nonce();
        let sealed = seal(SealAlgorithm::ChaCha20Poly1305, &key, &nonce, b"secret", b"ad").unwrap();
        assert!(matches!(
            open(SealAlgorithm::ChaCha20Poly1305, &key, &nonce, &sealed, b"da"),
            Err(QltxError::Auth(_))
        ));
    }

    #[test]
    fn wrong_key_fails_auth() {
        let nonce = random_nonce();
        let sealed =
            seal(SealAlgorithm::Aes256Gcm, &test_key(), &nonce, b"secret", b"ad").unwrap();
        let wrong = DataKey::from_bytes([0x99; 32]);
        assert!(matches!(
            open(SealAlgorithm::Aes256Gcm, &wrong, &nonce, &sealed, b"ad"),
            Err(QltxError::Auth(_))
        ));
    }

    #[test]
    fn wrong_nonce_fails_auth() {
        let key = test_key();
        let sealed =
            seal(SealAlgorithm::ChaCha20Poly1305, &key, &[1; NONCE_LEN], b"secret", b"").unwrap();
        assert!(matches!(
            open(SealAlgorithm::ChaCha20Poly1305, &key, &[2; NONCE_LEN], &sealed, b""),
            Err(QltxError::Auth(_))
        ));
    }

    #[test]
    fn serde_tags() {
        assert_eq!(
            serde_json::to_string(&SealAlgorithm::ChaCha20Poly1305).unwrap(),
            "\"chacha20\""
        );
        assert_eq!(
            serde_json::to_string(&SealAlgorithm::Aes256Gcm).unwrap(),
            "\"aes256\""
        );
    }
}
