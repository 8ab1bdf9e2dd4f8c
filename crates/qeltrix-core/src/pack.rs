//! Pack pipeline: chunk → compress → permute → seal → write, with a worker
//! pool and an in-order writer.
//!
//! Two-pass keying stages compressed blocks in a scratch directory while a
//! rolling SHA-256 runs over them in index order, then derives the key and
//! fans sealing out across workers. Single-pass keying derives the key from
//! the raw head and runs everything in one streaming fan-out. The asymmetric
//! transport knows its random DEK up front and always streams.
//!
//! The coordinator is the only thread that touches the output file. Workers
//! return sealed bytes which are reordered by block index before writing, so
//! sealed blocks, the global ciphertext hash, and the footer index are all
//! strictly in index order. The job queue is bounded at twice the worker
//! count, capping peak memory at O(workers × block_size).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use rand::RngCore;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::codec::{self, Compression};
use crate::error::{QltxError, QltxResult};
use crate::format::{self, BlockEntry, Footer, KeyingMode, Metadata, SALT_LEN};
use crate::kdf::{self, ContentHasher, DataKey};
use crate::permute;
use crate::seal::{self, SealAlgorithm, NONCE_LEN};
use crate::transport::{ContentDerived, KeyTransport};
use crate::version::FormatVersion;

/// Default raw block size: 1 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;
/// Default single-pass head: 64 KiB.
pub const DEFAULT_HEAD_BYTES: u64 = 64 * 1024;

pub(crate) fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Configuration for one pack run.
#[derive(Debug, Clone)]
pub struct PackConfig {
    /// Target format revision.
    pub version: FormatVersion,
    /// Raw bytes per block; the last block may be shorter.
    pub block_size: usize,
    /// Block codec.
    pub compression: Compression,
    /// AEAD cipher.
    pub algo: SealAlgorithm,
    /// Key derivation strategy.
    pub mode: KeyingMode,
    /// Raw head bytes hashed for single-pass keying; clamped to the input
    /// length when the input is shorter.
    pub head_bytes: u64,
    /// Permute block bytes before sealing.
    pub permute: bool,
    /// Worker thread count.
    pub workers: usize,
    /// Directory for two-pass staging files; the system default when `None`.
    pub tempdir: Option<PathBuf>,
    /// Fixed KDF salt, for reproducible containers; random per pack when
    /// `None`.
    pub salt: Option<[u8; SALT_LEN]>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            version: FormatVersion::V3,
            block_size: DEFAULT_BLOCK_SIZE,
            compression: Compression::Lz4,
            algo: SealAlgorithm::ChaCha20Poly1305,
            mode: KeyingMode::TwoPass,
            head_bytes: DEFAULT_HEAD_BYTES,
            permute: true,
            workers: default_workers(),
            tempdir: None,
            salt: None,
        }
    }
}

impl PackConfig {
    fn validate(&self, asymmetric: bool) -> QltxResult<()> {
        let descriptor = self.version.descriptor();
        if self.block_size == 0 {
            return Err(QltxError::Usage("block size must be nonzero".into()));
        }
        if !descriptor.allowed_compressions.contains(&self.compression) {
            return Err(QltxError::Usage(format!(
                "{:?} compression is not permitted by version {}",
                self.compression,
                self.version.as_byte()
            )));
        }
        if !descriptor.allowed_algos.contains(&self.algo) {
            return Err(QltxError::Usage(format!(
                "{:?} is not permitted by version {}",
                self.algo,
                self.version.as_byte()
            )));
        }
        if self.mode == KeyingMode::SinglePassFirstN {
            if !descriptor.allows_single_pass {
                return Err(QltxError::Usage(format!(
                    "single-pass keying is not permitted by version {}",
                    self.version.as_byte()
                )));
            }
            if self.head_bytes == 0 {
                return Err(QltxError::Usage("head_bytes must be nonzero".into()));
            }
        }
        if asymmetric && !descriptor.allows_asymmetric {
            return Err(QltxError::Usage(format!(
                "asymmetric key transport is not permitted by version {}",
                self.version.as_byte()
            )));
        }
        Ok(())
    }
}

/// Counters reported after a successful pack.
#[derive(Debug, Clone, Default)]
pub struct PackSummary {
    /// Sealed blocks written.
    pub blocks: u64,
    /// Raw input bytes consumed.
    pub input_bytes: u64,
    /// Final container size in bytes.
    pub output_bytes: u64,
}

enum SealInput {
    Raw(Vec<u8>),
    Staged(PathBuf),
}

struct SealJob {
    index: u64,
    input: SealInput,
}

struct SealedBlock {
    index: u64,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

enum JobSource<R> {
    Stream { reader: R, block_size: usize },
    Staged { dir: PathBuf, count: u64 },
}

/// Drives a pack run end to end.
pub struct Packer {
    config: PackConfig,
    transport: Arc<dyn KeyTransport>,
}

impl Packer {
    /// Content-derived packer.
    pub fn new(config: PackConfig) -> Self {
        Self {
            config,
            transport: Arc::new(ContentDerived),
        }
    }

    /// Packer with an explicit key transport (e.g. RSA-OAEP for a recipient).
    pub fn with_transport(config: PackConfig, transport: Arc<dyn KeyTransport>) -> Self {
        Self { config, transport }
    }

    /// Pack `input` into a container at `output`. On any failure the partial
    /// output and all staging files are removed and the first error is
    /// returned.
    pub fn pack<R: Read + Send>(&self, input: R, output: &Path) -> QltxResult<PackSummary> {
        self.config.validate(self.transport.is_asymmetric())?;
        let result = self.pack_inner(input, output);
        if result.is_err() {
            if let Err(e) = fs::remove_file(output) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %output.display(), error = %e, "failed to remove partial output");
                }
            }
        }
        result
    }

    fn pack_inner<R: Read + Send>(&self, mut input: R, output: &Path) -> QltxResult<PackSummary> {
        let cfg = &self.config;
        let salt = cfg.salt.unwrap_or_else(random_salt);

        if self.transport.is_asymmetric() {
            let dek = DataKey::random();
            let wrapped = self.transport.wrap_dek(&dek)?.ok_or_else(|| {
                QltxError::Crypto("asymmetric transport returned no wrapped key".into())
            })?;
            let metadata_bytes = self.build_metadata(salt, None, Some(wrapped))?;
            let source = JobSource::Stream { reader: input, block_size: cfg.block_size };
            return self.write_container(source, None, 0, &dek, metadata_bytes, output);
        }

        match cfg.mode {
            KeyingMode::SinglePassFirstN => {
                let head = read_head(&mut input, cfg.head_bytes)?;
                let ikm = kdf::head_digest(&head);
                let key = kdf::derive_data_key(&ikm, &salt, cfg.version);
                let metadata_bytes = self.build_metadata(salt, Some(ikm), None)?;
                let reader = Cursor::new(head).chain(input);
                let source = JobSource::Stream { reader, block_size: cfg.block_size };
                self.write_container(source, None, 0, &key, metadata_bytes, output)
            }
            KeyingMode::TwoPass => {
                let staging = match &cfg.tempdir {
                    Some(dir) => TempDir::new_in(dir)?,
                    None => TempDir::new()?,
                };
                let (count, input_bytes, ikm) = self.stage_blocks(&mut input, staging.path())?;
                let key = kdf::derive_data_key(&ikm, &salt, cfg.version);
                let metadata_bytes = self.build_metadata(salt, Some(ikm), None)?;
                let source: JobSource<io::Empty> =
                    JobSource::Staged { dir: staging.path().to_path_buf(), count };
                self.write_container(
                    source,
                    Some(staging.path()),
                    input_bytes,
                    &key,
                    metadata_bytes,
                    output,
                )
            }
        }
    }

    fn build_metadata(
        &self,
        salt: [u8; SALT_LEN],
        content_hash: Option<[u8; 32]>,
        wrapped_dek: Option<Vec<u8>>,
    ) -> QltxResult<Vec<u8>> {
        let cfg = &self.config;
        let mut metadata = Metadata {
            algo: cfg.algo,
            block_size: cfg.block_size as u64,
            compression: cfg.compression,
            content_hash,
            head_bytes: match cfg.mode {
                KeyingMode::SinglePassFirstN => Some(cfg.head_bytes),
                KeyingMode::TwoPass => None,
            },
            metadata_signature: None,
            mode: cfg.mode,
            permute: cfg.permute,
            salt,
            version: cfg.version,
            wrapped_dek,
        };
        let unsigned = format::metadata_signing_bytes(&metadata)?;
        if let Some(signature) = self.transport.sign_metadata(&unsigned)? {
            metadata.metadata_signature = Some(signature);
        }
        format::encode_metadata(&metadata)
    }

    /// Stage A of two-pass keying: compress every block to the scratch
    /// directory while hashing compressed bytes in index order.
    fn stage_blocks<R: Read>(
        &self,
        reader: &mut R,
        dir: &Path,
    ) -> QltxResult<(u64, u64, [u8; 32])> {
        let mut hasher = ContentHasher::new();
        let mut count = 0u64;
        let mut input_bytes = 0u64;
        while let Some(block) = read_block(reader, self.config.block_size)? {
            input_bytes += block.len() as u64;
            let compressed = codec::compress(&block, self.config.compression)?;
            hasher.update(&compressed);
            fs::write(staged_path(dir, count), &compressed)?;
            count += 1;
        }
        debug!(blocks = count, bytes = input_bytes, "staged compressed blocks");
        Ok((count, input_bytes, hasher.finalize()))
    }

    fn write_container<R: Read + Send>(
        &self,
        source: JobSource<R>,
        staged_dir: Option<&Path>,
        staged_input_bytes: u64,
        key: &DataKey,
        metadata_bytes: Vec<u8>,
        output: &Path,
    ) -> QltxResult<PackSummary> {
        let mut out = BufWriter::new(File::create(output)?);
        format::write_header(&mut out, &metadata_bytes, self.config.version)?;
        let blocks_start = (format::HEADER_FIXED_LEN + metadata_bytes.len()) as u64;

        let (entries, global_hash, streamed_bytes) = seal_pipeline(
            &self.config,
            key,
            &metadata_bytes,
            source,
            staged_dir,
            &mut out,
            blocks_start,
        )?;

        let blocks = entries.len() as u64;
        let footer = Footer { blocks: entries, global_ciphertext_sha256: global_hash };
        format::write_footer(&mut out, &footer)?;
        out.flush()?;
        let output_bytes = out.get_ref().metadata()?.len();

        debug!(blocks, output_bytes, path = %output.display(), "container written");
        Ok(PackSummary {
            blocks,
            input_bytes: streamed_bytes.max(staged_input_bytes),
            output_bytes,
        })
    }
}

fn staged_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{index}.blk"))
}

/// Read up to `block_size` bytes; `None` at end of input.
fn read_block<R: Read>(reader: &mut R, block_size: usize) -> QltxResult<Option<Vec<u8>>> {
    let mut buf = vec![0u8; block_size];
    let mut filled = 0;
    while filled < block_size {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if filled == 0 {
        return Ok(None);
    }
    buf.truncate(filled);
    Ok(Some(buf))
}

fn read_head<R: Read>(reader: &mut R, head_bytes: u64) -> QltxResult<Vec<u8>> {
    let mut head = Vec::new();
    reader
        .take(head_bytes)
        .read_to_end(&mut head)
        .map_err(QltxError::Io)?;
    Ok(head)
}

fn seal_one(
    job: SealJob,
    key: &DataKey,
    ad: &[u8],
    algo: SealAlgorithm,
    compression: Compression,
    do_permute: bool,
) -> QltxResult<SealedBlock> {
    let compressed = match job.input {
        SealInput::Raw(raw) => codec::compress(&raw, compression)?,
        SealInput::Staged(path) => fs::read(&path)?,
    };
    let permuted = if do_permute {
        permute::permute(&compressed, key, job.index)
    } else {
        compressed
    };
    let nonce = seal::random_nonce();
    let ciphertext = seal::seal(algo, key, &nonce, &permuted, ad)?;
    Ok(SealedBlock { index: job.index, nonce, ciphertext })
}

/// Fan sealing out across workers and write sealed blocks in index order.
/// Returns the footer entries, the global ciphertext digest, and the number
/// of raw bytes fed from a streaming source.
fn seal_pipeline<R: Read + Send, W: Write>(
    cfg: &PackConfig,
    key: &DataKey,
    ad: &[u8],
    source: JobSource<R>,
    staged_dir: Option<&Path>,
    out: &mut W,
    blocks_start: u64,
) -> QltxResult<(Vec<BlockEntry>, [u8; 32], u64)> {
    let workers = cfg.workers.max(1);
    let algo = cfg.algo;
    let compression = cfg.compression;
    let do_permute = cfg.permute;
    let cancel = AtomicBool::new(false);

    let mut entries = Vec::new();
    let mut hasher = Sha256::new();
    let mut ciphertext_bytes = 0u64;

    let streamed_bytes = thread::scope(|scope| -> QltxResult<u64> {
        let (job_tx, job_rx) = mpsc::sync_channel::<SealJob>(2 * workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::channel::<QltxResult<SealedBlock>>();

        for _ in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let cancel = &cancel;
            scope.spawn(move || loop {
                let job = match job_rx.lock() {
                    Ok(rx) => rx.recv(),
                    Err(_) => break,
                };
                let Ok(job) = job else { break };
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let sealed = seal_one(job, key, ad, algo, compression, do_permute);
                let failed = sealed.is_err();
                if result_tx.send(sealed).is_err() || failed {
                    break;
                }
            });
        }
        drop(job_rx);
        drop(result_tx);

        let feeder = {
            let cancel = &cancel;
            scope.spawn(move || -> QltxResult<(u64, u64)> {
                let mut jobs = 0u64;
                let mut raw_bytes = 0u64;
                match source {
                    JobSource::Stream { mut reader, block_size } => {
                        while !cancel.load(Ordering::Relaxed) {
                            let Some(block) = read_block(&mut reader, block_size)? else {
                                break;
                            };
                            raw_bytes += block.len() as u64;
                            let job = SealJob { index: jobs, input: SealInput::Raw(block) };
                            if job_tx.send(job).is_err() {
                                break;
                            }
                            jobs += 1;
                        }
                    }
                    JobSource::Staged { dir, count } => {
                        for index in 0..count {
                            if cancel.load(Ordering::Relaxed) {
                                break;
                            }
                            let job = SealJob {
                                index,
                                input: SealInput::Staged(staged_path(&dir, index)),
                            };
                            if job_tx.send(job).is_err() {
                                break;
                            }
                            jobs += 1;
                        }
                    }
                }
                Ok((jobs, raw_bytes))
            })
        };

        let mut pending: BTreeMap<u64, SealedBlock> = BTreeMap::new();
        let mut next_index = 0u64;
        let mut first_error: Option<QltxError> = None;
        for result in &result_rx {
            match result {
                Ok(block) => {
                    pending.insert(block.index, block);
                    while let Some(block) = pending.remove(&next_index) {
                        hasher.update(&block.ciphertext);
                        if let Err(e) = out.write_all(&block.ciphertext) {
                            cancel.store(true, Ordering::Relaxed);
                            return Err(e.into());
                        }
                        entries.push(BlockEntry {
                            offset: blocks_start + ciphertext_bytes,
                            nonce: block.nonce,
                            length: block.ciphertext.len() as u64,
                        });
                        ciphertext_bytes += block.ciphertext.len() as u64;
                        if let Some(dir) = staged_dir {
                            let _ = fs::remove_file(staged_path(dir, next_index));
                        }
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

        let feeder_result = match feeder.join() {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        };
        if let Some(e) = first_error {
            return Err(e);
        }
        let (jobs, raw_bytes) = feeder_result?;
        if next_index != jobs {
            return Err(QltxError::Crypto("seal pipeline terminated early".into()));
        }
        Ok(raw_bytes)
    })?;

    Ok((entries, hasher.finalize().into(), streamed_bytes))
}
