//! Pluggable key transport: content-derived pass-through, or RSA-OAEP
//! envelope wrapping with optional RSA-PSS metadata signatures.

use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;

use crate::error::{QltxError, QltxResult};
use crate::kdf::DataKey;

/// Moves the bulk data key into and out of a container.
///
/// Content-derived containers re-derive the key from the stored content
/// digest, so [`wrap_dek`](KeyTransport::wrap_dek) returns `None` and
/// nothing is persisted. Asymmetric transports wrap a random DEK for the
/// recipient and must return `Some`.
pub trait KeyTransport: Send + Sync {
    /// Wrap a freshly generated DEK for storage in the metadata.
    fn wrap_dek(&self, dek: &DataKey) -> QltxResult<Option<Vec<u8>>>;

    /// Recover the DEK from its wrapped form.
    fn unwrap_dek(&self, wrapped: &[u8]) -> QltxResult<DataKey>;

    /// True when the bulk key is a random wrapped DEK rather than
    /// content-derived.
    fn is_asymmetric(&self) -> bool {
        false
    }

    /// Sign the canonical metadata bytes, if a signing key is configured.
    fn sign_metadata(&self, _metadata: &[u8]) -> QltxResult<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Verify a metadata signature. Returns `Ok(true)` when verified,
    /// `Ok(false)` when no verifier key is configured (the check is
    /// skipped), and [`QltxError::Auth`] when verification fails.
    fn verify_metadata(&self, _metadata: &[u8], _signature: &[u8]) -> QltxResult<bool> {
        Ok(false)
    }
}

/// Pass-through transport for content-keyed containers.
#[derive(Debug, Default)]
pub struct ContentDerived;

impl KeyTransport for ContentDerived {
    fn wrap_dek(&self, _dek: &DataKey) -> QltxResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn unwrap_dek(&self, _wrapped: &[u8]) -> QltxResult<DataKey> {
        Err(QltxError::Crypto(
            "container carries a wrapped key but no private key was supplied".into(),
        ))
    }
}

/// RSA-OAEP(SHA-256) envelope transport with optional RSA-PSS(SHA-256)
/// metadata signatures.
#[derive(Default)]
pub struct RsaOaepTransport {
    recipient_public: Option<RsaPublicKey>,
    recipient_private: Option<RsaPrivateKey>,
    signer: Option<RsaPrivateKey>,
    verifier: Option<RsaPublicKey>,
}

impl RsaOaepTransport {
    /// Empty transport; attach keys with the builder methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recipient public key used to wrap the DEK when packing.
    pub fn with_recipient(mut self, public: RsaPublicKey) -> Self {
        self.recipient_public = Some(public);
        self
    }

    /// Recipient private key used to unwrap the DEK when unpacking.
    pub fn with_private_key(mut self, private: RsaPrivateKey) -> Self {
        self.recipient_private = Some(private);
        self
    }

    /// Sender private key; when present the metadata is signed.
    pub fn with_signer(mut self, signer: RsaPrivateKey) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Sender public key; when present metadata signatures are checked.
    pub fn with_verifier(mut self, verifier: RsaPublicKey) -> Self {
        self.verifier = Some(verifier);
        self
    }
}

impl KeyTransport for RsaOaepTransport {
    fn wrap_dek(&self, dek: &DataKey) -> QltxResult<Option<Vec<u8>>> {
        let public = self
            .recipient_public
            .as_ref()
            .ok_or_else(|| QltxError::Crypto("no recipient public key configured".into()))?;
        let wrapped = public
            .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha256>(), dek.as_bytes())
            .map_err(|e| QltxError::Crypto(format!("OAEP wrap failed: {e}")))?;
        debug!(wrapped_len = wrapped.len(), "wrapped DEK for recipient");
        Ok(Some(wrapped))
    }

    fn unwrap_dek(&self, wrapped: &[u8]) -> QltxResult<DataKey> {
        let private = self
            .recipient_private
            .as_ref()
            .ok_or_else(|| QltxError::Crypto("container requires the recipient private key".into()))?;
        let dek = private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|e| QltxError::Crypto(format!("OAEP unwrap failed: {e}")))?;
        let bytes: [u8; 32] = dek
            .as_slice()
            .try_into()
            .map_err(|_| QltxError::Crypto(format!("unwrapped key is {} bytes, expected 32", dek.len())))?;
        Ok(DataKey::from_bytes(bytes))
    }

    fn is_asymmetric(&self) -> bool {
        true
    }

    fn sign_metadata(&self, metadata: &[u8]) -> QltxResult<Option<Vec<u8>>> {
        let Some(signer) = self.signer.clone() else {
            return Ok(None);
        };
        let signing_key = BlindedSigningKey::<Sha256>::new(signer);
        let signature = signing_key.sign_with_rng(&mut rand::thread_rng(), metadata);
        Ok(Some(signature.to_vec()))
    }

    fn verify_metadata(&self, metadata: &[u8], signature: &[u8]) -> QltxResult<bool> {
        let Some(verifier) = self.verifier.clone() else {
            return Ok(false);
        };
        let verifying_key = VerifyingKey::<Sha256>::new(verifier);
        let signature = Signature::try_from(signature)
            .map_err(|e| QltxError::Auth(format!("malformed metadata signature: {e}")))?;
        verifying_key
            .verify(metadata, &signature)
            .map_err(|_| QltxError::Auth("metadata signature verification failed".into()))?;
        Ok(true)
    }
}
