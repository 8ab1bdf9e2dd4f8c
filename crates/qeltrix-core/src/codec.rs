//! Block compression codecs (LZ4, Zstandard, identity).

use serde::{Deserialize, Serialize};

use crate::error::{QltxError, QltxResult};

/// Compression applied uniformly to every raw block of a container.
///
/// LZ4 uses the `lz4_flex` block format with a size prefix; Zstd uses the
/// default level without a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// LZ4 block format — hot path.
    #[default]
    Lz4,
    /// Zstandard, default level, no dictionary.
    Zstd,
    /// Identity (passthrough).
    None,
}

/// Compress one raw block.
pub fn compress(raw: &[u8], algo: Compression) -> QltxResult<Vec<u8>> {
    match algo {
        Compression::Lz4 => Ok(lz4_flex::compress_prepend_size(raw)),
        Compression::Zstd => {
            zstd::encode_all(raw, 0).map_err(|e| QltxError::Codec(format!("zstd encode: {e}")))
        }
        Compression::None => Ok(raw.to_vec()),
    }
}

/// Decompress one block. `max_raw_len` is the container block size; output
/// exceeding it means a corrupt or hostile block.
pub fn decompress(data: &[u8], algo: Compression, max_raw_len: usize) -> QltxResult<Vec<u8>> {
    let raw = match algo {
        Compression::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| QltxError::Codec(format!("lz4 decode: {e}")))?,
        Compression::Zstd => {
            zstd::decode_all(data).map_err(|e| QltxError::Codec(format!("zstd decode: {e}")))?
        }
        Compression::None => data.to_vec(),
    };
    if raw.len() > max_raw_len {
        return Err(QltxError::Codec(format!(
            "decompressed block is {} bytes, exceeds block size {max_raw_len}",
            raw.len()
        )));
    }
    Ok(raw)
}
