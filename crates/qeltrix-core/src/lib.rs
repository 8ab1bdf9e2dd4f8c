#![warn(missing_docs)]

//! Qeltrix (`.qltx`) container engine: authenticated, block-compressed,
//! block-encrypted archives with content-derived keying and seekable reads.
//!
//! Pack path: chunk → compress (LZ4/Zstd/identity) → permute → AEAD seal →
//! footer index. Unpack and seek reverse it block-parallel with strict
//! in-order output. The bulk key is derived with HKDF-SHA256 from a digest
//! of the content itself (stored in the metadata), or — in the asymmetric
//! variant — is a random DEK wrapped for a recipient with RSA-OAEP.
//!
//! Content-derived keying is obfuscation plus integrity, not secrecy against
//! an adversary holding the container: anyone with the file can re-derive a
//! content-derived key, and two containers packed from identical input under
//! the same salt expose their equality. Pack generates a random 16-byte salt
//! per container unless one is pinned explicitly.

pub mod codec;
pub mod error;
pub mod format;
pub mod kdf;
pub mod pack;
pub mod permute;
pub mod seal;
pub mod seek;
pub mod transport;
pub mod unpack;
pub mod version;

pub use codec::Compression;
pub use error::{QltxError, QltxResult};
pub use format::{BlockEntry, ContainerHeader, Footer, KeyingMode, Metadata};
pub use kdf::DataKey;
pub use pack::{PackConfig, PackSummary, Packer, DEFAULT_BLOCK_SIZE, DEFAULT_HEAD_BYTES};
pub use seal::SealAlgorithm;
pub use seek::Seeker;
pub use transport::{ContentDerived, KeyTransport, RsaOaepTransport};
pub use unpack::{UnpackConfig, UnpackSummary, Unpacker};
pub use version::{FormatVersion, VersionDescriptor};
