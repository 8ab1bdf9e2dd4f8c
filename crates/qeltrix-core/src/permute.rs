//! Deterministic byte permutation keyed by (data key, block index).
//!
//! The per-block seed is the first eight bytes of
//! SHA-256(key ‖ "PERM" ‖ big-endian index). The shuffle is a Fisher–Yates
//! pass driven by ChaCha8 (`rand_chacha::ChaCha8Rng`), whose output stream
//! is fully specified, so pack and unpack agree on the permutation on every
//! platform and crate release. The permutation is never stored.
//!
//! This layer is obfuscation only; the AEAD layer carries the security.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use crate::kdf::DataKey;

fn block_seed(key: &DataKey, index: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(b"PERM");
    hasher.update(index.to_be_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[..8].try_into().expect("SHA-256 digest is 32 bytes"))
}

fn permutation(seed: u64, len: usize) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..len).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for k in (1..len).rev() {
        let j = rng.gen_range(0..=k);
        perm.swap(k, j);
    }
    perm
}

/// Scatter `data[k]` to position `π(k)`.
pub fn permute(data: &[u8], key: &DataKey, index: u64) -> Vec<u8> {
    let perm = permutation(block_seed(key, index), data.len());
    let mut out = vec![0u8; data.len()];
    for (k, &byte) in data.iter().enumerate() {
        out[perm[k]] = byte;
    }
    out
}

/// Inverse of [`permute`].
pub fn unpermute(data: &[u8], key: &DataKey, index: u64) -> Vec<u8> {
    let perm = permutation(block_seed(key, index), data.len());
    let mut out = vec![0u8; data.len()];
    for (k, slot) in out.iter_mut().enumerate() {
        *slot = data[perm[k]];
    }
    out
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
        fn prop_unpermute_inverts_permute(
            data in prop::collection::vec(0u8..=255, 0..4096),
            index in 0u64..1024,
        ) {
            let key = test_key();
            let shuffled = permute(&data, &key, index);
            prop_assert_eq!(unpermute(&shuffled, &key, index), data);
        }
    }

    #[test]
    fn permutation_is_deterministic() {
        let key = test_key();
        let data: Vec<u8> = (0u8..=255).collect();
        assert_eq!(permute(&data, &key, 3), permute(&data, &key, 3));
    }

    #[test]
    fn different_indices_shuffle_differently() {
        let key = test_key();
        let data: Vec<u8> = (0u8..=255).collect();
        assert_ne!(permute(&data, &key, 0), permute(&data, &key, 1));
    }

    #[test]
    fn different_keys_shuffle_differently() {
        let data: Vec<u8> = (0u8..=255).collect();
        let a = permute(&data, &DataKey::from_bytes([1; 32]), 0);
        let b = permute(&data, &DataKey::from_bytes([2; 32]), 0);
        assert_ne!(a, b);
    }

    #[test]
    fn permutation_preserves_multiset() {
        let key = test_key();
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut shuffled = permute(&data, &key, 9);
        let mut original = data.clone();
        shuffled.sort_unstable();
        original.sort_unstable();
        assert_eq!(shuffled, original);
    }

    #[test]
    fn tiny_inputs() {
        let key = test_key();
        assert_eq!(permute(&[], &key, 0), Vec::<u8>::new());
        assert_eq!(permute(&[0xAB], &key, 0), vec![0xAB]);
        assert_eq!(unpermute(&[0xAB], &key, 0), vec![0xAB]);
    }
}
