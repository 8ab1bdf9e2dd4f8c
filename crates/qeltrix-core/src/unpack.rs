//! Unpack pipeline: validate the container, verify the global ciphertext
//! hash, then open → unpermute → decompress block-parallel with in-order
//! emission.
//!
//! The metadata signature, when present and a verifier key is configured, is
//! checked before any block is opened. The global hash is verified in one
//! sequential streaming pass over the sealed region before decryption is
//! scheduled; per-block AEAD verification is mandatory either way.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::codec::{self, Compression};
use crate::error::{QltxError, QltxResult};
use crate::format::{self, ContainerHeader, Footer};
use crate::kdf::{self, DataKey};
use crate::pack::default_workers;
use crate::permute;
use crate::seal::{self, SealAlgorithm, NONCE_LEN};
use crate::transport::{ContentDerived, KeyTransport};

/// Configuration for unpack and seek runs.
#[derive(Debug, Clone)]
pub struct UnpackConfig {
    /// Worker thread count.
    pub workers: usize,
    /// Verify the footer's global ciphertext hash before decrypting.
    /// Disabling this skips only the whole-container hash; per-block AEAD
    /// verification always runs.
    pub verify: bool,
}

impl Default for UnpackConfig {
    fn default() -> Self {
        Self { workers: default_workers(), verify: true }
    }
}

/// Counters reported after a successful unpack.
#[derive(Debug, Clone, Default)]
pub struct UnpackSummary {
    /// Blocks decrypted.
    pub blocks: u64,
    /// Decompressed bytes emitted.
    pub bytes: u64,
}

/// A validated container with its derived or unwrapped data key.
pub(crate) struct OpenContainer {
    pub path: PathBuf,
    pub header: ContainerHeader,
    pub footer: Footer,
    pub key: DataKey,
}

/// Parse, validate, and key a container. `verify_global` additionally
/// streams the sealed region through SHA-256 and compares it to the footer.
pub(crate) fn open_container(
    path: &Path,
    transport: &dyn KeyTransport,
    verify_global: bool,
) -> QltxResult<OpenContainer> {
    let mut file = File::open(path)?;
    let header = format::read_header(&mut file)?;
    let (footer, blocks_end) = format::read_footer(&mut file, header.blocks_start)?;
    format::validate_footer(&footer, header.blocks_start, blocks_end)?;

    let metadata = &header.metadata;
    if let Some(signature) = &metadata.metadata_signature {
        let signed = format::metadata_signing_bytes(metadata)?;
        if transport.verify_metadata(&signed, signature)? {
            debug!("metadata signature verified");
        }
    }

    let key = match &metadata.wrapped_dek {
        Some(wrapped) => transport.unwrap_dek(wrapped)?,
        None => {
            let ikm = metadata.content_hash.ok_or_else(|| {
                QltxError::Format("metadata carries no content hash".into())
            })?;
            kdf::derive_data_key(&ikm, &metadata.salt, metadata.version)
        }
    };

    if verify_global {
        verify_global_hash(&mut file, header.blocks_start, blocks_end, &footer)?;
        debug!(blocks = footer.blocks.len(), "global ciphertext hash verified");
    }

    Ok(OpenContainer { path: path.to_path_buf(), header, footer, key })
}

fn verify_global_hash(
    file: &mut File,
    blocks_start: u64,
    blocks_end: u64,
    footer: &Footer,
) -> QltxResult<()> {
    file.seek(SeekFrom::Start(blocks_start))?;
    let mut hasher = Sha256::new();
    let mut remaining = blocks_end - blocks_start;
    let mut buf = vec![0u8; 64 * 1024];
    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        let n = file.read(&mut buf[..want])?;
        if n == 0 {
            return Err(QltxError::Format("truncated sealed region".into()));
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    let computed: [u8; 32] = hasher.finalize().into();
    if computed != footer.global_ciphertext_sha256 {
        return Err(QltxError::Integrity {
            expected: hex::encode(footer.global_ciphertext_sha256),
            computed: hex::encode(computed),
        });
    }
    Ok(())
}

struct DecryptJob {
    index: u64,
    offset: u64,
    length: u64,
    nonce: [u8; NONCE_LEN],
}

struct RawBlock {
    index: u64,
    data: Vec<u8>,
}

#[allow(clippy::too_many_arguments)]
fn open_one(
    file: &mut File,
    job: &DecryptJob,
    key: &DataKey,
    ad: &[u8],
    algo: SealAlgorithm,
    compression: Compression,
    permuted: bool,
    block_size: usize,
) -> QltxResult<RawBlock> {
    let length = usize::try_from(job.length)
        .map_err(|_| QltxError::Format(format!("block {} length too large", job.index)))?;
    file.seek(SeekFrom::Start(job.offset))?;
    let mut ciphertext = vec![0u8; length];
    file.read_exact(&mut ciphertext).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            QltxError::Format(format!("sealed block {} extends past end of file", job.index))
        }
        _ => QltxError::Io(e),
    })?;

    let opened = seal::open(algo, key, &job.nonce, &ciphertext, ad).map_err(|e| match e {
        QltxError::Auth(_) => {
            QltxError::Auth(format!("block {}: AEAD tag verification failed", job.index))
        }
        other => other,
    })?;
    let unpermuted = if permuted {
        permute::unpermute(&opened, key, job.index)
    } else {
        opened
    };
    let raw = codec::decompress(&unpermuted, compression, block_size)?;
    Ok(RawBlock { index: job.index, data: raw })
}

/// Decrypt blocks `first..=last` across workers, writing decompressed output
/// strictly in index order. Returns the number of bytes written.
pub(crate) fn decrypt_range<W: Write>(
    open: &OpenContainer,
    workers: usize,
    first: u64,
    last: u64,
    out: &mut W,
) -> QltxResult<u64> {
    let blocks = &open.footer.blocks;
    if blocks.is_empty() || first > last {
        return Ok(0);
    }
    let workers = workers.max(1);
    let metadata = &open.header.metadata;
    let ad = open.header.metadata_bytes.as_slice();
    let key = &open.key;
    let algo = metadata.algo;
    let compression = metadata.compression;
    let permuted = metadata.permute;
    let block_size = usize::try_from(metadata.block_size)
        .map_err(|_| QltxError::Format("block size too large for this platform".into()))?;
    let path = open.path.as_path();
    let cancel = AtomicBool::new(false);

    let mut written = 0u64;

    thread::scope(|scope| -> QltxResult<()> {
        let (job_tx, job_rx) = mpsc::sync_channel::<DecryptJob>(2 * workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::channel::<QltxResult<RawBlock>>();

        for _ in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let cancel = &cancel;
            scope.spawn(move || {
                let mut file = match File::open(path) {
                    Ok(file) => file,
                    Err(e) => {
                        let _ = result_tx.send(Err(e.into()));
                        return;
                    }
                };
                loop {
                    let job = match job_rx.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    let Ok(job) = job else { break };
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let result = open_one(
                        &mut file, &job, key, ad, algo, compression, permuted, block_size,
                    );
                    let failed = result.is_err();
                    if result_tx.send(result).is_err() || failed {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(result_tx);

        let feeder = {
            let cancel = &cancel;
            scope.spawn(move || {
                for index in first..=last {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let entry = &blocks[index as usize];
                    let job = DecryptJob {
                        index,
                        offset: entry.offset,
                        length: entry.length,
                        nonce: entry.nonce,
                    };
                    if job_tx.send(job).is_err() {
                        break;
                    }
                }
            })
        };

        let mut pending: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
        let mut next_index = first;
        let mut first_error: Option<QltxError> = None;
        for result in &result_rx {
            match result {
                Ok(block) => {
                    pending.insert(block.index, block.data);
                    while let Some(data) = pending.remove(&next_index) {
                        if let Err(e) = out.write_all(&data) {
                            cancel.store(true, Ordering::Relaxed);
                            return Err(e.into());
                        }
                        written += data.len() as u64;
                        next_index += 1;
                    }
                }
                Err(e) => {
                    cancel.store(true, Ordering::Relaxed);
                    first_error.get_or_insert(e);
                    break;
                }
            }
        }

        if let Err(payload) = feeder.join() {
            std::panic::resume_unwind(payload);
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        if next_index != last + 1 {
            return Err(QltxError::Crypto("decrypt pipeline terminated early".into()));
        }
        Ok(())
    })?;

    Ok(written)
}

/// Drives an unpack run end to end.
pub struct Unpacker {
    config: UnpackConfig,
    transport: Arc<dyn KeyTransport>,
}

impl Unpacker {
    /// Content-derived unpacker.
    pub fn new(config: UnpackConfig) -> Self {
        Self {
            config,
            transport: Arc::new(ContentDerived),
        }
    }

    /// Unpacker with an explicit key transport (recipient private key and
    /// optionally a signature verifier key).
    pub fn with_transport(config: UnpackConfig, transport: Arc<dyn KeyTransport>) -> Self {
        Self { config, transport }
    }

    /// Restore the original bytes into a file at `output`. On failure the
    /// partial output is removed and the first error is returned.
    pub fn unpack(&self, container: &Path, output: &Path) -> QltxResult<UnpackSummary> {
        let result = self.unpack_to_file(container, output);
        if result.is_err() {
            if let Err(e) = fs::remove_file(output) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %output.display(), error = %e, "failed to remove partial output");
                }
            }
        }
        result
    }

    fn unpack_to_file(&self, container: &Path, output: &Path) -> QltxResult<UnpackSummary> {
        let mut out = BufWriter::new(File::create(output)?);
        let summary = self.unpack_to_writer(container, &mut out)?;
        out.flush()?;
        Ok(summary)
    }

    /// Restore the original bytes into an arbitrary writer.
    pub fn unpack_to_writer<W: Write>(
        &self,
        container: &Path,
        out: &mut W,
    ) -> QltxResult<UnpackSummary> {
        let open = open_container(container, self.transport.as_ref(), self.config.verify)?;
        let blocks = open.footer.blocks.len() as u64;
        let bytes = if blocks == 0 {
            0
        } else {
            decrypt_range(&open, self.config.workers, 0, blocks - 1, out)?
        };
        debug!(blocks, bytes, "container unpacked");
        Ok(UnpackSummary { blocks, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{PackConfig, Packer};
    use std::io::Cursor;

    fn packed(data: &[u8], config: PackConfig) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let container = dir.path().join("c.qltx");
        Packer::new(config)
            .pack(Cursor::new(data.to_vec()), &container)
            .unwrap();
        (dir, container)
    }

    #[test]
    fn unpack_writes_output_file() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 199) as u8).collect();
        let (dir, container) = packed(&data, PackConfig { block_size: 4096, ..Default::default() });
        let output = dir.path().join("restored.bin");
        let summary = Unpacker::new(UnpackConfig::default())
            .unpack(&container, &output)
            .unwrap();
        assert_eq!(summary.bytes, data.len() as u64);
        assert_eq!(fs::read(&output).unwrap(), data);
    }

    #[test]
    fn tampered_ciphertext_is_integrity_error() {
        let data = vec![9u8; 30_000];
        let (dir, container) = packed(&data, PackConfig { block_size: 4096, ..Default::default() });

        let open = open_container(&container, &ContentDerived, false).unwrap();
        let mid = open.footer.blocks[1].offset + 5;
        let mut bytes = fs::read(&container).unwrap();
        bytes[mid as usize] ^= 0xFF;
        fs::write(&container, bytes).unwrap();

        let output = dir.path().join("restored.bin");
        let err = Unpacker::new(UnpackConfig::default())
            .unpack(&container, &output)
            .unwrap_err();
        assert!(matches!(err, QltxError::Integrity { .. }));
        assert!(!output.exists());

        let err = Unpacker::new(UnpackConfig { verify: false, ..Default::default() })
            .unpack(&container, &output)
            .unwrap_err();
        assert!(matches!(err, QltxError::Auth(_)));
        assert!(!output.exists());
    }

    #[test]
    fn tampered_metadata_fails_every_block_auth() {
        let data = vec![4u8; 20_000];
        let (dir, container) = packed(&data, PackConfig { block_size: 4096, ..Default::default() });

        // Flip one character inside the base64 salt value; the JSON stays
        // well-formed but the AD no longer matches what the blocks were
        // sealed against.
        let mut bytes = fs::read(&container).unwrap();
        let salt_key = b"\"salt\":\"";
        let at = bytes
            .windows(salt_key.len())
            .position(|w| w == salt_key)
            .unwrap()
            + salt_key.len();
        bytes[at] = if bytes[at] == b'A' { b'B' } else { b'A' };
        fs::write(&container, bytes).unwrap();

        let output = dir.path().join("restored.bin");
        let err = Unpacker::new(UnpackConfig::default())
            .unpack(&container, &output)
            .unwrap_err();
        assert!(matches!(err, QltxError::Auth(_)));
    }

    #[test]
    fn truncated_container_is_format_error() {
        let data = vec![1u8; 10_000];
        let (dir, container) = packed(&data, PackConfig { block_size: 4096, ..Default::default() });
        let bytes = fs::read(&container).unwrap();
        fs::write(&container, &bytes[..bytes.len() - 3]).unwrap();

        let output = dir.path().join("restored.bin");
        let err = Unpacker::new(UnpackConfig::default())
            .unpack(&container, &output)
            .unwrap_err();
        assert!(matches!(err, QltxError::Format(_)));
    }

    #[test]
    fn not_a_container_is_format_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.qltx");
        fs::write(&bogus, b"definitely not a qltx container").unwrap();
        let err = Unpacker::new(UnpackConfig::default())
            .unpack(&bogus, &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, QltxError::Format(_)));
    }
}
