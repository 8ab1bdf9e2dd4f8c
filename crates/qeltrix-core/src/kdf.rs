//! Content-derived key material: HKDF-SHA256 over a content digest.

use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::version::FormatVersion;

/// 256-bit bulk encryption key, shared read-only by the seal/open workers.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; 32]);

impl DataKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random DEK (asymmetric transport only).
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DataKey([REDACTED])")
    }
}

/// Rolling SHA-256 over compressed blocks in index order — the two-pass
/// input keying material. Blocks must be fed strictly in index order or the
/// derived key becomes nondeterministic under parallel completion.
#[derive(Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    /// Start a fresh rolling hash.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next compressed block.
    pub fn update(&mut self, block: &[u8]) {
        self.inner.update(block);
    }

    /// Final digest over everything fed so far.
    pub fn finalize(self) -> [u8; 32] {
        self.inner.finalize().into()
    }
}

/// SHA-256 of the first `head_bytes` of raw input — the single-pass input
/// keying material.
pub fn head_digest(head: &[u8]) -> [u8; 32] {
    Sha256::digest(head).into()
}

/// Derive the 32-byte data key from the content digest, the container salt,
/// and the version's info label.
pub fn derive_data_key(ikm: &[u8; 32], salt: &[u8; 16], version: FormatVersion) -> DataKey {
    let hk = Hkdf::<Sha256>::new(Some(&salt[..]), ikm);
    let mut okm = [0u8; 32];
    hk.expand(version.descriptor().info_label, &mut okm)
        .expect("HKDF expand failed");
    DataKey(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let ikm = [7u8; 32];
        let salt = [1u8; 16];
        let a = derive_data_key(&ikm, &salt, FormatVersion::V2);
        let b = derive_data_key(&ikm, &salt, FormatVersion::V2);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn versions_derive_distinct_keys() {
        let ikm = [7u8; 32];
        let salt = [1u8; 16];
        let keys = [
            derive_data_key(&ikm, &salt, FormatVersion::V1),
            derive_data_key(&ikm, &salt, FormatVersion::V2),
            derive_data_key(&ikm, &salt, FormatVersion::V3),
            derive_data_key(&ikm, &salt, FormatVersion::V4),
        ];
        for i in 0..keys.len() {
            for j in i + 1..keys.len() {
                assert_ne!(keys[i].as_bytes(), keys[j].as_bytes());
            }
        }
    }

    #[test]
    fn salt_and_ikm_both_matter() {
        let base = derive_data_key(&[7u8; 32], &[1u8; 16], FormatVersion::V3);
        let other_salt = derive_data_key(&[7u8; 32], &[2u8; 16], FormatVersion::V3);
        let other_ikm = derive_data_key(&[8u8; 32], &[1u8; 16], FormatVersion::V3);
        assert_ne!(base.as_bytes(), other_salt.as_bytes());
        assert_ne!(base.as_bytes(), other_ikm.as_bytes());
    }

    #[test]
    fn content_hasher_matches_one_shot_digest() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), head_digest(b"hello world"));
    }

    #[test]
    fn content_hasher_order_sensitive() {
        let mut a = ContentHasher::new();
        a.update(b"one");
        a.update(b"two");
        let mut b = ContentHasher::new();
        b.update(b"two");
        b.update(b"one");
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn random_deks_differ() {
        assert_ne!(DataKey::random().as_bytes(), DataKey::random().as_bytes());
    }

    #[test]
    fn debug_is_redacted() {
        let key = DataKey::from_bytes([0x42; 32]);
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
