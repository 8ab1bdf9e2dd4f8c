//! `qltx`: command-line front end for the Qeltrix container engine.
//!
//! Exit codes: 0 success, 1 usage error, 2 format/integrity error,
//! 3 cryptographic error, 4 I/O error.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand, ValueEnum};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

use qeltrix_core::{
    Compression, FormatVersion, KeyingMode, PackConfig, Packer, QltxError, QltxResult,
    RsaOaepTransport, SealAlgorithm, Seeker, UnpackConfig, Unpacker, DEFAULT_BLOCK_SIZE,
    DEFAULT_HEAD_BYTES,
};

#[derive(Parser)]
#[command(name = "qltx")]
#[command(about = "Content-keyed, block-encrypted, seekable .qltx containers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pack a file into a .qltx container
    Pack {
        input: PathBuf,
        output: PathBuf,
        /// Container format revision (1-4)
        #[arg(long, default_value_t = 3)]
        format_version: u8,
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
        #[arg(long, value_enum, default_value_t = CompressionArg::Lz4)]
        compression: CompressionArg,
        #[arg(long, value_enum, default_value_t = AlgoArg::Chacha20)]
        algo: AlgoArg,
        #[arg(long, value_enum, default_value_t = ModeArg::TwoPass)]
        mode: ModeArg,
        /// Raw head bytes hashed for single-pass keying
        #[arg(long, default_value_t = DEFAULT_HEAD_BYTES)]
        head_bytes: u64,
        /// Skip the deterministic byte permutation
        #[arg(long)]
        no_permute: bool,
        #[arg(long)]
        workers: Option<usize>,
        /// Scratch directory for two-pass staging
        #[arg(long)]
        tempdir: Option<PathBuf>,
        /// Recipient RSA public key (PEM); switches to wrapped-DEK transport
        #[arg(long)]
        pubkey: Option<PathBuf>,
        /// Sender RSA private key (PEM) for metadata signing
        #[arg(long, requires = "pubkey")]
        signkey: Option<PathBuf>,
    },
    /// Restore the original bytes from a container
    Unpack {
        input: PathBuf,
        output: PathBuf,
        /// Skip the global ciphertext hash check (per-block AEAD still runs)
        #[arg(long)]
        no_verify: bool,
        #[arg(long)]
        workers: Option<usize>,
        /// Recipient RSA private key (PEM) for wrapped-DEK containers
        #[arg(long)]
        privkey: Option<PathBuf>,
        /// Sender RSA public key (PEM) for metadata signature verification
        #[arg(long)]
        verifykey: Option<PathBuf>,
    },
    /// Extract a byte range without unpacking the whole container
    Seek {
        input: PathBuf,
        offset: u64,
        length: u64,
        /// Write the range here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
        /// Recipient RSA private key (PEM) for wrapped-DEK containers
        #[arg(long)]
        privkey: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CompressionArg {
    Lz4,
    Zstd,
    None,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::Lz4 => Compression::Lz4,
            CompressionArg::Zstd => Compression::Zstd,
            CompressionArg::None => Compression::None,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgoArg {
    Chacha20,
    Aes256,
}

impl From<AlgoArg> for SealAlgorithm {
    fn from(arg: AlgoArg) -> Self {
        match arg {
            AlgoArg::Chacha20 => SealAlgorithm::ChaCha20Poly1305,
            AlgoArg::Aes256 => SealAlgorithm::Aes256Gcm,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    TwoPass,
    SinglePass,
}

impl From<ModeArg> for KeyingMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::TwoPass => KeyingMode::TwoPass,
            ModeArg::SinglePass => KeyingMode::SinglePassFirstN,
        }
    }
}

fn load_public_key(path: &Path) -> QltxResult<RsaPublicKey> {
    let pem = fs::read_to_string(path)?;
    RsaPublicKey::from_public_key_pem(&pem)
        .map_err(|e| QltxError::Crypto(format!("{}: {e}", path.display())))
}

fn load_private_key(path: &Path) -> QltxResult<RsaPrivateKey> {
    let pem = fs::read_to_string(path)?;
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .map_err(|e| QltxError::Crypto(format!("{}: {e}", path.display())))
}

fn exit_code(err: &QltxError) -> u8 {
    match err {
        QltxError::Usage(_) | QltxError::Range(_) => 1,
        QltxError::Format(_) | QltxError::Codec(_) | QltxError::Integrity { .. } => 2,
        QltxError::Auth(_) | QltxError::Crypto(_) => 3,
        QltxError::Io(_) | QltxError::Cancelled => 4,
    }
}

fn run(cli: Cli) -> QltxResult<()> {
    match cli.command {
        Command::Pack {
            input,
            output,
            format_version,
            block_size,
            compression,
            algo,
            mode,
            head_bytes,
            no_permute,
            workers,
            tempdir,
            pubkey,
            signkey,
        } => {
            let mut config = PackConfig {
                version: FormatVersion::from_byte(format_version)
                    .map_err(|_| QltxError::Usage(format!("bad format version {format_version}")))?,
                block_size,
                compression: compression.into(),
                algo: algo.into(),
                mode: mode.into(),
                head_bytes,
                permute: !no_permute,
                tempdir,
                ..Default::default()
            };
            if let Some(workers) = workers {
                config.workers = workers;
            }

            let source = fs::File::open(&input)?;
            let summary = match pubkey {
                Some(pubkey) => {
                    let mut transport =
                        RsaOaepTransport::new().with_recipient(load_public_key(&pubkey)?);
                    if let Some(signkey) = signkey {
                        transport = transport.with_signer(load_private_key(&signkey)?);
                    }
                    Packer::with_transport(config, Arc::new(transport)).pack(source, &output)?
                }
                None => Packer::new(config).pack(source, &output)?,
            };
            println!(
                "packed {} -> {} ({} blocks, {} bytes)",
                input.display(),
                output.display(),
                summary.blocks,
                summary.output_bytes
            );
            Ok(())
        }
        Command::Unpack { input, output, no_verify, workers, privkey, verifykey } => {
            let mut config = UnpackConfig { verify: !no_verify, ..Default::default() };
            if let Some(workers) = workers {
                config.workers = workers;
            }

            let unpacker = if privkey.is_some() || verifykey.is_some() {
                let mut transport = RsaOaepTransport::new();
                if let Some(privkey) = privkey {
                    transport = transport.with_private_key(load_private_key(&privkey)?);
                }
                if let Some(verifykey) = verifykey {
                    transport = transport.with_verifier(load_public_key(&verifykey)?);
                }
                Unpacker::with_transport(config, Arc::new(transport))
            } else {
                Unpacker::new(config)
            };
            let summary = unpacker.unpack(&input, &output)?;
            println!(
                "unpacked {} -> {} ({} blocks, {} bytes)",
                input.display(),
                output.display(),
                summary.blocks,
                summary.bytes
            );
            Ok(())
        }
        Command::Seek { input, offset, length, output, workers, privkey } => {
            let mut config = UnpackConfig::default();
            if let Some(workers) = workers {
                config.workers = workers;
            }

            let seeker = match privkey {
                Some(privkey) => Seeker::with_transport(
                    config,
                    Arc::new(RsaOaepTransport::new().with_private_key(load_private_key(&privkey)?)),
                ),
                None => Seeker::new(config),
            };
            let bytes = seeker.read_range(&input, offset, length)?;
            match output {
                Some(path) => fs::write(path, &bytes)?,
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                }
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("qltx: {err}");
            ExitCode::from(exit_code(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_error_taxonomy() {
        assert_eq!(exit_code(&QltxError::Usage("x".into())), 1);
        assert_eq!(exit_code(&QltxError::Range("x".into())), 1);
        assert_eq!(exit_code(&QltxError::Format("x".into())), 2);
        assert_eq!(
            exit_code(&QltxError::Integrity { expected: "a".into(), computed: "b".into() }),
            2
        );
        assert_eq!(exit_code(&QltxError::Auth("x".into())), 3);
        assert_eq!(exit_code(&QltxError::Crypto("x".into())), 3);
        assert_eq!(exit_code(&QltxError::Io(std::io::Error::other("x"))), 4);
    }

    #[test]
    fn cli_parses_pack_flags() {
        let cli = Cli::try_parse_from([
            "qltx",
            "pack",
            "in.bin",
            "out.qltx",
            "--mode",
            "single-pass",
            "--head-bytes",
            "4096",
            "--compression",
            "zstd",
            "--algo",
            "aes256",
            "--format-version",
            "4",
            "--no-permute",
        ])
        .unwrap();
        let Command::Pack { mode, head_bytes, format_version, no_permute, .. } = cli.command
        else {
            panic!("expected pack");
        };
        assert!(matches!(KeyingMode::from(mode), KeyingMode::SinglePassFirstN));
        assert_eq!(head_bytes, 4096);
        assert_eq!(format_version, 4);
        assert!(no_permute);
    }
}
