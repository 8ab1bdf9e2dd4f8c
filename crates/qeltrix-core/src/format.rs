//! On-disk container layout: header, canonical metadata, footer index.
//!
//! Layout: magic, version byte, three reserved zero bytes, big-endian u32
//! metadata length, metadata JSON, sealed blocks in index order, delimiter,
//! footer JSON, big-endian u32 footer length. The metadata bytes written to
//! disk are the exact bytes used as AEAD associated data, so metadata is
//! serialized once per container and carried around as `Vec<u8>`.

use std::io::{self, Read, Seek, SeekFrom, Write};

use serde::{Deserialize, Serialize};

use crate::codec::Compression;
use crate::error::{QltxError, QltxResult};
use crate::seal::{SealAlgorithm, NONCE_LEN};
use crate::version::FormatVersion;

/// Container magic.
pub const MAGIC: [u8; 4] = *b"QLTX";

/// Footer delimiter. The written literal is authoritative: `QDELIMITERQ`,
/// eleven bytes (early documentation described it as nine).
pub const DELIMITER: [u8; 11] = *b"QDELIMITERQ";

/// KDF salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Bytes before the metadata: magic, version, reserved, metadata length.
pub const HEADER_FIXED_LEN: usize = 12;

/// Upper bound on the metadata length field; a real metadata object is a
/// few hundred bytes, so anything larger is a corrupt or hostile header.
const MAX_METADATA_LEN: usize = 1 << 20;

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    pub fn decode_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }
}

mod b64_array {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        super::b64::serialize(bytes, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let bytes = super::b64::decode_str(deserializer)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {N} base64-encoded bytes")))
    }
}

mod b64_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&super::b64::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => STANDARD
                .decode(text.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

mod hex_digest {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        digest: &[u8; 32],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(digest))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected a 64-character hex digest"))
    }
}

mod hex_digest_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        digest: &Option<[u8; 32]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match digest {
            Some(digest) => serializer.serialize_str(&hex::encode(digest)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<[u8; 32]>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => {
                let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
                bytes
                    .as_slice()
                    .try_into()
                    .map(Some)
                    .map_err(|_| serde::de::Error::custom("expected a 64-character hex digest"))
            }
            None => Ok(None),
        }
    }
}

/// Key derivation strategy recorded in the metadata `mode` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KeyingMode {
    /// Hash every compressed block in index order before sealing anything.
    #[default]
    #[serde(rename = "two_pass")]
    TwoPass,
    /// Hash the first `head_bytes` raw bytes; enables one streaming pass.
    #[serde(rename = "single_pass_firstN")]
    SinglePassFirstN,
}

/// Container metadata. Fields are declared in alphabetical order so the
/// serialized JSON has sorted keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// AEAD cipher for every block.
    pub algo: SealAlgorithm,
    /// Raw bytes per block; the last block may be shorter.
    pub block_size: u64,
    /// Block codec.
    pub compression: Compression,
    /// Hex SHA-256 of the keying material: the compressed stream for
    /// two_pass, the raw head for single_pass_firstN. Absent when a wrapped
    /// DEK is carried instead.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "hex_digest_opt")]
    pub content_hash: Option<[u8; 32]>,
    /// Number of raw head bytes hashed for keying; present iff single-pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_bytes: Option<u64>,
    /// RSA-PSS signature over the metadata serialized without this field.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64_opt")]
    pub metadata_signature: Option<Vec<u8>>,
    /// Keying mode tag.
    #[serde(rename = "mode_tag")]
    pub mode: KeyingMode,
    /// Whether block bytes are permuted before sealing.
    pub permute: bool,
    /// Random per-container KDF salt.
    #[serde(with = "b64_array")]
    pub salt: [u8; SALT_LEN],
    /// Format revision; must match the header version byte.
    pub version: FormatVersion,
    /// DEK wrapped under the recipient public key (asymmetric only).
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64_opt")]
    pub wrapped_dek: Option<Vec<u8>>,
}

/// Location record for one sealed block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEntry {
    /// Absolute file offset of the ciphertext.
    pub offset: u64,
    /// AEAD nonce for this block.
    #[serde(with = "b64_array")]
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext length including the 16-byte tag.
    pub length: u64,
}

/// Footer index written after the delimiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Footer {
    /// One entry per sealed block, in index order.
    pub blocks: Vec<BlockEntry>,
    /// SHA-256 over the concatenated ciphertext of all sealed blocks.
    #[serde(with = "hex_digest")]
    pub global_ciphertext_sha256: [u8; 32],
}

/// Parsed header plus the exact metadata bytes (the AEAD associated data).
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    /// Format revision from the header byte.
    pub version: FormatVersion,
    /// Parsed metadata.
    pub metadata: Metadata,
    /// The metadata bytes exactly as stored on disk.
    pub metadata_bytes: Vec<u8>,
    /// File offset where the sealed-block region begins.
    pub blocks_start: u64,
}

/// Serialize metadata to its canonical byte form — the bytes written to
/// disk and used as AEAD associated data.
pub fn encode_metadata(metadata: &Metadata) -> QltxResult<Vec<u8>> {
    serde_json::to_vec(metadata).map_err(|e| QltxError::Format(format!("metadata encode: {e}")))
}

/// The bytes covered by a metadata signature: the metadata serialized with
/// the signature field cleared.
pub fn metadata_signing_bytes(metadata: &Metadata) -> QltxResult<Vec<u8>> {
    let mut unsigned = metadata.clone();
    unsigned.metadata_signature = None;
    encode_metadata(&unsigned)
}

/// Write magic, version byte, reserved bytes, and length-prefixed metadata.
pub fn write_header<W: Write>(
    out: &mut W,
    metadata_bytes: &[u8],
    version: FormatVersion,
) -> QltxResult<()> {
    out.write_all(&MAGIC)?;
    out.write_all(&[version.as_byte()])?;
    out.write_all(&[0u8; 3])?;
    let len = u32::try_from(metadata_bytes.len())
        .map_err(|_| QltxError::Format("metadata too large".into()))?;
    out.write_all(&len.to_be_bytes())?;
    out.write_all(metadata_bytes)?;
    Ok(())
}

fn read_exact_or_format<R: Read>(input: &mut R, buf: &mut [u8], what: &str) -> QltxResult<()> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => QltxError::Format(format!("truncated container: {what}")),
        _ => QltxError::Io(e),
    })
}

/// Parse and validate the header and metadata.
pub fn read_header<R: Read>(input: &mut R) -> QltxResult<ContainerHeader> {
    let mut magic = [0u8; 4];
    read_exact_or_format(input, &mut magic, "magic")?;
    if magic != MAGIC {
        return Err(QltxError::Format(format!(
            "bad magic {magic:02x?}, not a .qltx container"
        )));
    }

    let mut version_and_reserved = [0u8; 4];
    read_exact_or_format(input, &mut version_and_reserved, "version")?;
    let version = FormatVersion::from_byte(version_and_reserved[0])?;
    if version_and_reserved[1..] != [0u8; 3] {
        return Err(QltxError::Format("reserved header bytes are nonzero".into()));
    }

    let mut len_bytes = [0u8; 4];
    read_exact_or_format(input, &mut len_bytes, "metadata length")?;
    let meta_len = u32::from_be_bytes(len_bytes) as usize;
    if meta_len > MAX_METADATA_LEN {
        return Err(QltxError::Format(format!(
            "metadata length {meta_len} exceeds the {MAX_METADATA_LEN}-byte limit"
        )));
    }

    let mut metadata_bytes = vec![0u8; meta_len];
    read_exact_or_format(input, &mut metadata_bytes, "metadata")?;
    let metadata: Metadata = serde_json::from_slice(&metadata_bytes)
        .map_err(|e| QltxError::Format(format!("metadata parse: {e}")))?;

    validate_metadata(&metadata, version)?;

    Ok(ContainerHeader {
        version,
        metadata,
        metadata_bytes,
        blocks_start: (HEADER_FIXED_LEN + meta_len) as u64,
    })
}

fn validate_metadata(metadata: &Metadata, header_version: FormatVersion) -> QltxResult<()> {
    if metadata.version != header_version {
        return Err(QltxError::Format(format!(
            "metadata version {} disagrees with header version {}",
            metadata.version.as_byte(),
            header_version.as_byte()
        )));
    }
    if metadata.block_size == 0 {
        return Err(QltxError::Format("metadata block_size is zero".into()));
    }

    let descriptor = metadata.version.descriptor();
    if !descriptor.allowed_algos.contains(&metadata.algo) {
        return Err(QltxError::Format(format!(
            "cipher {:?} is not permitted by version {}",
            metadata.algo,
            metadata.version.as_byte()
        )));
    }
    if !descriptor.allowed_compressions.contains(&metadata.compression) {
        return Err(QltxError::Format(format!(
            "compression {:?} is not permitted by version {}",
            metadata.compression,
            metadata.version.as_byte()
        )));
    }

    match metadata.mode {
        KeyingMode::SinglePassFirstN => {
            if !descriptor.allows_single_pass {
                return Err(QltxError::Format(format!(
                    "single-pass keying is not permitted by version {}",
                    metadata.version.as_byte()
                )));
            }
            if metadata.head_bytes.is_none() {
                return Err(QltxError::Format(
                    "single-pass metadata is missing head_bytes".into(),
                ));
            }
        }
        KeyingMode::TwoPass => {
            if metadata.head_bytes.is_some() {
                return Err(QltxError::Format(
                    "two-pass metadata must not carry head_bytes".into(),
                ));
            }
        }
    }

    match (&metadata.content_hash, &metadata.wrapped_dek) {
        (Some(_), Some(_)) => Err(QltxError::Format(
            "metadata carries both a content hash and a wrapped key".into(),
        )),
        (None, None) => Err(QltxError::Format(
            "metadata carries neither a content hash nor a wrapped key".into(),
        )),
        (None, Some(_)) if !descriptor.allows_asymmetric => Err(QltxError::Format(format!(
            "wrapped keys are not permitted by version {}",
            metadata.version.as_byte()
        ))),
        _ => Ok(()),
    }
}

/// Write delimiter, footer JSON, and the trailing big-endian length.
pub fn write_footer<W: Write>(out: &mut W, footer: &Footer) -> QltxResult<()> {
    out.write_all(&DELIMITER)?;
    let bytes =
        serde_json::to_vec(footer).map_err(|e| QltxError::Format(format!("footer encode: {e}")))?;
    out.write_all(&bytes)?;
    let len =
        u32::try_from(bytes.len()).map_err(|_| QltxError::Format("footer too large".into()))?;
    out.write_all(&len.to_be_bytes())?;
    Ok(())
}

/// Locate and parse the footer by walking back from EOF. Returns the footer
/// and the file offset where the sealed-block region ends (the delimiter
/// position).
pub fn read_footer<R: Read + Seek>(file: &mut R, blocks_start: u64) -> QltxResult<(Footer, u64)> {
    let file_len = file.seek(SeekFrom::End(0))?;
    let fixed_tail = DELIMITER.len() as u64 + 4;
    if file_len < blocks_start + fixed_tail {
        return Err(QltxError::Format("container too short for a footer".into()));
    }

    file.seek(SeekFrom::End(-4))?;
    let mut len_bytes = [0u8; 4];
    read_exact_or_format(file, &mut len_bytes, "footer length")?;
    let footer_len = u64::from(u32::from_be_bytes(len_bytes));

    if blocks_start + footer_len + fixed_tail > file_len {
        return Err(QltxError::Format("footer length out of range".into()));
    }
    let delimiter_at = file_len - 4 - footer_len - DELIMITER.len() as u64;

    file.seek(SeekFrom::Start(delimiter_at))?;
    let mut delimiter = [0u8; DELIMITER.len()];
    read_exact_or_format(file, &mut delimiter, "delimiter")?;
    if delimiter != DELIMITER {
        return Err(QltxError::Format("footer delimiter not found".into()));
    }

    let mut footer_bytes = vec![0u8; footer_len as usize];
    read_exact_or_format(file, &mut footer_bytes, "footer")?;
    let footer: Footer = serde_json::from_slice(&footer_bytes)
        .map_err(|e| QltxError::Format(format!("footer parse: {e}")))?;

    Ok((footer, delimiter_at))
}

/// Check that the block index tiles the sealed region exactly.
pub fn validate_footer(footer: &Footer, blocks_start: u64, blocks_end: u64) -> QltxResult<()> {
    let mut expected = blocks_start;
    for (i, entry) in footer.blocks.iter().enumerate() {
        if entry.offset != expected {
            return Err(QltxError::Format(format!(
                "block {i} starts at offset {} but the previous block ends at {expected}",
                entry.offset
            )));
        }
        expected = entry
            .offset
            .checked_add(entry.length)
            .ok_or_else(|| QltxError::Format(format!("block {i} length overflows")))?;
    }
    if expected != blocks_end {
        return Err(QltxError::Format(format!(
            "block index ends at {expected} but the sealed region ends at {blocks_end}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_metadata() -> Metadata {
        Metadata {
            algo: SealAlgorithm::ChaCha20Poly1305,
            block_size: 1024,
            compression: Compression::Lz4,
            content_hash: Some([0xAB; 32]),
            head_bytes: None,
            metadata_signature: None,
            mode: KeyingMode::TwoPass,
            permute: true,
            salt: [0x11; SALT_LEN],
            version: FormatVersion::V2,
            wrapped_dek: None,
        }
    }

    fn sample_footer() -> Footer {
        Footer {
            blocks: vec![
                BlockEntry { offset: 100, nonce: [1; NONCE_LEN], length: 40 },
                BlockEntry { offset: 140, nonce: [2; NONCE_LEN], length: 60 },
            ],
            global_ciphertext_sha256: [0xCD; 32],
        }
    }

    #[test]
    fn header_roundtrip_preserves_exact_bytes() {
        let metadata = sample_metadata();
        let bytes = encode_metadata(&metadata).unwrap();
        let mut buf = Vec::new();
        write_header(&mut buf, &bytes, FormatVersion::V2).unwrap();

        let parsed = read_header(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.version, FormatVersion::V2);
        assert_eq!(parsed.metadata_bytes, bytes);
        assert_eq!(parsed.blocks_start, (HEADER_FIXED_LEN + bytes.len()) as u64);
        assert_eq!(parsed.metadata.block_size, 1024);
        assert_eq!(parsed.metadata.content_hash, Some([0xAB; 32]));
    }

    #[test]
    fn metadata_json_uses_wire_names() {
        let metadata = sample_metadata();
        let text = String::from_utf8(encode_metadata(&metadata).unwrap()).unwrap();
        assert!(text.contains("\"mode_tag\":\"two_pass\""));
        assert!(text.contains("\"compression\":\"lz4\""));
        assert!(text.contains("\"algo\":\"chacha20\""));
        assert!(text.contains("\"version\":2"));
        assert!(text.contains(&format!("\"content_hash\":\"{}\"", hex::encode([0xABu8; 32]))));
        assert!(!text.contains("head_bytes"));
        assert!(!text.contains("wrapped_dek"));

        let mut single = sample_metadata();
        single.mode = KeyingMode::SinglePassFirstN;
        single.head_bytes = Some(4096);
        let text = String::from_utf8(encode_metadata(&single).unwrap()).unwrap();
        assert!(text.contains("\"mode_tag\":\"single_pass_firstN\""));
        assert!(text.contains("\"head_bytes\":4096"));
    }

    #[test]
    fn bad_magic_rejected() {
        let metadata = encode_metadata(&sample_metadata()).unwrap();
        let mut buf = Vec::new();
        write_header(&mut buf, &metadata, FormatVersion::V2).unwrap();
        buf[0] = b'X';
        assert!(matches!(
            read_header(&mut Cursor::new(&buf)),
            Err(QltxError::Format(_))
        ));
    }

    #[test]
    fn unknown_version_rejected() {
        let metadata = encode_metadata(&sample_metadata()).unwrap();
        let mut buf = Vec::new();
        write_header(&mut buf, &metadata, FormatVersion::V2).unwrap();
        buf[4] = 9;
        assert!(matches!(
            read_header(&mut Cursor::new(&buf)),
            Err(QltxError::Format(_))
        ));
    }

    #[test]
    fn nonzero_reserved_rejected() {
        let metadata = encode_metadata(&sample_metadata()).unwrap();
        let mut buf = Vec::new();
        write_header(&mut buf, &metadata, FormatVersion::V2).unwrap();
        buf[6] = 1;
        assert!(matches!(
            read_header(&mut Cursor::new(&buf)),
            Err(QltxError::Format(_))
        ));
    }

    #[test]
    fn header_metadata_version_mismatch_rejected() {
        let metadata = encode_metadata(&sample_metadata()).unwrap();
        let mut buf = Vec::new();
        write_header(&mut buf, &metadata, FormatVersion::V3).unwrap();
        assert!(matches!(
            read_header(&mut Cursor::new(&buf)),
            Err(QltxError::Format(_))
        ));
    }

    #[test]
    fn truncated_metadata_rejected() {
        let metadata = encode_metadata(&sample_metadata()).unwrap();
        let mut buf = Vec::new();
        write_header(&mut buf, &metadata, FormatVersion::V2).unwrap();
        buf.truncate(buf.len() - 10);
        assert!(matches!(
            read_header(&mut Cursor::new(&buf)),
            Err(QltxError::Format(_))
        ));
    }

    #[test]
    fn disallowed_codec_for_version_rejected() {
        let mut metadata = sample_metadata();
        metadata.version = FormatVersion::V1;
        metadata.compression = Compression::Zstd;
        let bytes = encode_metadata(&metadata).unwrap();
        let mut buf = Vec::new();
        write_header(&mut buf, &bytes, FormatVersion::V1).unwrap();
        assert!(matches!(
            read_header(&mut Cursor::new(&buf)),
            Err(QltxError::Format(_))
        ));
    }

    #[test]
    fn key_material_must_be_exactly_one_of_two() {
        let mut both = sample_metadata();
        both.version = FormatVersion::V3;
        both.wrapped_dek = Some(vec![0; 256]);
        let bytes = encode_metadata(&both).unwrap();
        let mut buf = Vec::new();
        write_header(&mut buf, &bytes, FormatVersion::V3).unwrap();
        assert!(matches!(
            read_header(&mut Cursor::new(&buf)),
            Err(QltxError::Format(_))
        ));

        let mut neither = sample_metadata();
        neither.content_hash = None;
        let bytes = encode_metadata(&neither).unwrap();
        let mut buf = Vec::new();
        write_header(&mut buf, &bytes, FormatVersion::V2).unwrap();
        assert!(matches!(
            read_header(&mut Cursor::new(&buf)),
            Err(QltxError::Format(_))
        ));
    }

    #[test]
    fn wrapped_dek_needs_asymmetric_version() {
        let mut metadata = sample_metadata();
        metadata.content_hash = None;
        metadata.wrapped_dek = Some(vec![0; 256]);
        let bytes = encode_metadata(&metadata).unwrap();
        let mut buf = Vec::new();
        write_header(&mut buf, &bytes, FormatVersion::V2).unwrap();
        assert!(matches!(
            read_header(&mut Cursor::new(&buf)),
            Err(QltxError::Format(_))
        ));
    }

    #[test]
    fn footer_roundtrip() {
        let footer = sample_footer();
        let mut region = vec![0u8; 100];
        write_footer(&mut region, &footer).unwrap();

        let mut cursor = Cursor::new(region);
        let (parsed, blocks_end) = read_footer(&mut cursor, 0).unwrap();
        assert_eq!(blocks_end, 100);
        assert_eq!(parsed.blocks.len(), 2);
        assert_eq!(parsed.blocks[1].nonce, [2; NONCE_LEN]);
        assert_eq!(parsed.global_ciphertext_sha256, [0xCD; 32]);
    }

    #[test]
    fn missing_delimiter_rejected() {
        let footer = sample_footer();
        let mut region = Vec::new();
        write_footer(&mut region, &footer).unwrap();
        region[2] = b'x';
        assert!(matches!(
            read_footer(&mut Cursor::new(region), 0),
            Err(QltxError::Format(_))
        ));
    }

    #[test]
    fn footer_length_out_of_range_rejected() {
        let footer = sample_footer();
        let mut region = Vec::new();
        write_footer(&mut region, &footer).unwrap();
        let len = region.len();
        region[len - 4..].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            read_footer(&mut Cursor::new(region), 0),
            Err(QltxError::Format(_))
        ));
    }

    #[test]
    fn footer_tiling_validated() {
        let footer = sample_footer();
        assert!(validate_footer(&footer, 100, 200).is_ok());
        // Gap between blocks.
        assert!(validate_footer(&footer, 99, 200).is_err());
        // Region end disagrees with the index.
        assert!(validate_footer(&footer, 100, 201).is_err());
        // Empty container: the index must cover exactly nothing.
        let empty = Footer { blocks: vec![], global_ciphertext_sha256: [0; 32] };
        assert!(validate_footer(&empty, 50, 50).is_ok());
        assert!(validate_footer(&empty, 50, 51).is_err());
    }

    #[test]
    fn signing_bytes_exclude_signature() {
        let mut metadata = sample_metadata();
        let unsigned = metadata_signing_bytes(&metadata).unwrap();
        metadata.metadata_signature = Some(vec![9; 64]);
        assert_eq!(metadata_signing_bytes(&metadata).unwrap(), unsigned);
        assert_ne!(encode_metadata(&metadata).unwrap(), unsigned);
    }
}
