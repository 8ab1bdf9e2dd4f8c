//! Error types for the Qeltrix container engine.

use thiserror::Error;

/// Result type alias for container operations.
pub type QltxResult<T> = Result<T, QltxError>;

/// All errors that can occur while packing, unpacking, or seeking.
#[derive(Debug, Error)]
pub enum QltxError {
    /// Invalid arguments or configuration (zero block size, an algorithm the
    /// chosen format version does not permit, ...).
    #[error("usage error: {0}")]
    Usage(String),

    /// Malformed container: bad magic, unknown version, missing delimiter,
    /// length mismatch, or unparseable metadata/footer JSON.
    #[error("format error: {0}")]
    Format(String),

    /// Compression failure, or decompressed output exceeding the block size.
    #[error("codec error: {0}")]
    Codec(String),

    /// AEAD tag or metadata signature verification failure.
    #[error("authentication failure: {0}")]
    Auth(String),

    /// The global ciphertext hash does not match the footer.
    #[error("integrity error: ciphertext hash mismatch (footer {expected}, computed {computed})")]
    Integrity {
        /// Digest recorded in the footer (hex).
        expected: String,
        /// Digest computed over the sealed blocks on disk (hex).
        computed: String,
    },

    /// Requested byte range lies beyond the end of the stream.
    #[error("range error: {0}")]
    Range(String),

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key transport or key derivation failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The operation was cancelled before completion.
    #[error("operation cancelled")]
    Cancelled,
}
