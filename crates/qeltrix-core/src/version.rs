//! Format versions and the descriptor table that parameterizes the engine.
//!
//! V1 through V4 share one pipeline; they differ only in the HKDF info label
//! and in what the descriptor below permits. There are no per-version code
//! paths.

use serde::{Deserialize, Serialize};

use crate::codec::Compression;
use crate::error::QltxError;
use crate::seal::SealAlgorithm;

/// On-disk format revision, written as a single byte after the magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum FormatVersion {
    /// First revision: two-pass keying, LZ4, ChaCha20-Poly1305.
    V1,
    /// Adds Zstd/identity codecs and single-pass keying.
    V2,
    /// Adds AES-256-GCM and the asymmetric (wrapped-DEK) transport.
    V3,
    /// AES-256-GCM exclusively; no asymmetric transport.
    V4,
}

impl FormatVersion {
    /// Version byte as written in the header.
    pub fn as_byte(self) -> u8 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
            FormatVersion::V3 => 3,
            FormatVersion::V4 => 4,
        }
    }

    /// Parse a header version byte.
    pub fn from_byte(byte: u8) -> Result<Self, QltxError> {
        match byte {
            1 => Ok(FormatVersion::V1),
            2 => Ok(FormatVersion::V2),
            3 => Ok(FormatVersion::V3),
            4 => Ok(FormatVersion::V4),
            other => Err(QltxError::Format(format!("unknown format version {other}"))),
        }
    }

    /// The capability descriptor for this revision.
    pub fn descriptor(self) -> &'static VersionDescriptor {
        match self {
            FormatVersion::V1 => &V1_DESCRIPTOR,
            FormatVersion::V2 => &V2_DESCRIPTOR,
            FormatVersion::V3 => &V3_DESCRIPTOR,
            FormatVersion::V4 => &V4_DESCRIPTOR,
        }
    }
}

impl From<FormatVersion> for u8 {
    fn from(version: FormatVersion) -> u8 {
        version.as_byte()
    }
}

impl TryFrom<u8> for FormatVersion {
    type Error = String;

    fn try_from(byte: u8) -> Result<Self, String> {
        FormatVersion::from_byte(byte).map_err(|e| e.to_string())
    }
}

/// What a format revision permits. The engine validates configurations and
/// parsed containers against this table instead of branching on version.
#[derive(Debug)]
pub struct VersionDescriptor {
    /// ASCII HKDF-SHA256 info label; distinct per version so a key derived
    /// under one revision is useless under another.
    pub info_label: &'static [u8],
    /// AEAD ciphers this revision may record in metadata.
    pub allowed_algos: &'static [SealAlgorithm],
    /// Block codecs this revision may record in metadata.
    pub allowed_compressions: &'static [Compression],
    /// Whether a wrapped DEK (RSA-OAEP transport) is permitted.
    pub allows_asymmetric: bool,
    /// Whether single_pass_firstN keying is permitted.
    pub allows_single_pass: bool,
}

static V1_DESCRIPTOR: VersionDescriptor = VersionDescriptor {
    info_label: b"QLTX-V1-HKDF-KEY",
    allowed_algos: &[SealAlgorithm::ChaCha20Poly1305],
    allowed_compressions: &[Compression::Lz4],
    allows_asymmetric: false,
    allows_single_pass: false,
};

static V2_DESCRIPTOR: VersionDescriptor = VersionDescriptor {
    info_label: b"QLTX-V2-HKDF-KEY",
    allowed_algos: &[SealAlgorithm::ChaCha20Poly1305],
    allowed_compressions: &[Compression::Lz4, Compression::Zstd, Compression::None],
    allows_asymmetric: false,
    allows_single_pass: true,
};

static V3_DESCRIPTOR: VersionDescriptor = VersionDescriptor {
    info_label: b"QLTX-V3-HKDF-KEY",
    allowed_algos: &[SealAlgorithm::ChaCha20Poly1305, SealAlgorithm::Aes256Gcm],
    allowed_compressions: &[Compression::Lz4, Compression::Zstd, Compression::None],
    allows_asymmetric: true,
    allows_single_pass: true,
};

static V4_DESCRIPTOR: VersionDescriptor = VersionDescriptor {
    info_label: b"QLTX-V4-HKDF-KEY",
    allowed_algos: &[SealAlgorithm::Aes256Gcm],
    allowed_compressions: &[Compression::Lz4, Compression::Zstd, Compression::None],
    allows_asymmetric: false,
    allows_single_pass: true,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_byte_roundtrip() {
        for version in [
            FormatVersion::V1,
            FormatVersion::V2,
            FormatVersion::V3,
            FormatVersion::V4,
        ] {
            assert_eq!(FormatVersion::from_byte(version.as_byte()).unwrap(), version);
        }
    }

    #[test]
    fn unknown_version_byte_rejected() {
        assert!(FormatVersion::from_byte(0).is_err());
        assert!(FormatVersion::from_byte(5).is_err());
        assert!(FormatVersion::from_byte(255).is_err());
    }

    #[test]
    fn info_labels_are_distinct() {
        let labels = [
            FormatVersion::V1.descriptor().info_label,
            FormatVersion::V2.descriptor().info_label,
            FormatVersion::V3.descriptor().info_label,
            FormatVersion::V4.descriptor().info_label,
        ];
        for i in 0..labels.len() {
            for j in i + 1..labels.len() {
                assert_ne!(labels[i], labels[j]);
            }
        }
    }

    #[test]
    fn descriptor_capabilities() {
        assert!(!FormatVersion::V1.descriptor().allows_single_pass);
        assert!(!FormatVersion::V1
            .descriptor()
            .allowed_compressions
            .contains(&Compression::Zstd));
        assert!(FormatVersion::V3.descriptor().allows_asymmetric);
        assert!(!FormatVersion::V4.descriptor().allows_asymmetric);
        assert_eq!(
            FormatVersion::V4.descriptor().allowed_algos,
            &[SealAlgorithm::Aes256Gcm]
        );
    }

    #[test]
    fn serde_as_integer() {
        let json = serde_json::to_string(&FormatVersion::V3).unwrap();
        assert_eq!(json, "3");
        let parsed: FormatVersion = serde_json::from_str("4").unwrap();
        assert_eq!(parsed, FormatVersion::V4);
        assert!(serde_json::from_str::<FormatVersion>("9").is_err());
    }
}
