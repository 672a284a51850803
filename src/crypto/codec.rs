//! Value Codec Module
//!
//! Turns serialized values into the bytes written to the store and back.
//! [`PlainCodec`] passes bytes through; [`AeadCodec`] seals them with
//! XChaCha20-Poly1305 under the [`SecretManager`]'s key.

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use zeroize::Zeroizing;

use super::secret::{SecretInput, SecretManager, SecretState};
use crate::error::{CacheError, Result};

// == Public Constants ==
/// XChaCha20 nonce length in bytes
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length in bytes
pub const TAG_LEN: usize = 16;

// == Encrypted Envelope ==
/// One sealed value: the nonce it was sealed with and the ciphertext
/// (which carries the authentication tag at its end).
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Store representation: `nonce || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Splits store bytes back into an envelope.
    ///
    /// Returns `None` when the input is too short to hold a nonce and a tag.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return None;
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let mut envelope = Self {
            nonce: [0u8; NONCE_LEN],
            ciphertext: ciphertext.to_vec(),
        };
        envelope.nonce.copy_from_slice(nonce);
        Some(envelope)
    }
}

impl fmt::Debug for EncryptedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedEnvelope")
            .field("nonce_len", &self.nonce.len())
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

// == Value Codec Trait ==
/// Encoding applied between the serialized value and the store.
pub trait ValueCodec: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Encodes a serialized value. The input buffer is erased when dropped.
    fn encode(&self, plaintext: Zeroizing<Vec<u8>>) -> Result<Vec<u8>>;

    /// Decodes store bytes; `None` when they cannot be authenticated.
    fn decode(&self, stored: &[u8]) -> Option<Zeroizing<Vec<u8>>>;

    /// Releases any key material held by the codec.
    fn dispose(&mut self) {}
}

// == Plain Codec ==
/// Identity codec for the plaintext client.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl ValueCodec for PlainCodec {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn encode(&self, plaintext: Zeroizing<Vec<u8>>) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decode(&self, stored: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        Some(Zeroizing::new(stored.to_vec()))
    }
}

// == AEAD Codec ==
/// Authenticated-encryption codec. Every call to [`AeadCodec::encrypt`] draws a
/// fresh nonce from the OS random source.
#[derive(Default)]
pub struct AeadCodec {
    secret: SecretManager,
}

impl AeadCodec {
    // == Constructors ==
    /// Wraps an existing secret manager.
    pub fn new(secret: SecretManager) -> Self {
        Self { secret }
    }

    /// Builds a codec provisioned from `input`.
    pub fn from_input(input: SecretInput<'_>) -> Result<Self> {
        Ok(Self::new(SecretManager::with_secret(input)?))
    }

    /// Lifecycle state of the underlying secret.
    pub fn secret_state(&self) -> SecretState {
        self.secret.state()
    }

    /// Mutable access for re-provisioning.
    pub fn secret_mut(&mut self) -> &mut SecretManager {
        &mut self.secret
    }

    // == Encrypt ==
    /// Seals `plaintext` under a fresh nonce.
    pub fn encrypt(&self, plaintext: Zeroizing<Vec<u8>>) -> Result<EncryptedEnvelope> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .secret
            .with_key(|key| {
                XChaCha20Poly1305::new(Key::from_slice(key))
                    .encrypt(XNonce::from_slice(&nonce), plaintext.as_slice())
            })?
            .map_err(|_| CacheError::EncryptionUnavailable("failed to seal value".to_string()))?;

        Ok(EncryptedEnvelope { nonce, ciphertext })
    }

    /// Serializes `value` as JSON and seals it.
    pub fn encrypt_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<EncryptedEnvelope> {
        let plaintext = serde_json::to_vec(value)
            .map(Zeroizing::new)
            .map_err(|err| CacheError::TypeMismatch(format!("value cannot be serialized: {}", err)))?;
        self.encrypt(plaintext)
    }

    // == Decrypt ==
    /// Opens an envelope; `None` on any authentication failure or missing key.
    pub fn decrypt(&self, envelope: &EncryptedEnvelope) -> Option<Zeroizing<Vec<u8>>> {
        let opened = self.secret.with_key(|key| {
            XChaCha20Poly1305::new(Key::from_slice(key)).decrypt(
                XNonce::from_slice(&envelope.nonce),
                envelope.ciphertext.as_slice(),
            )
        });

        match opened {
            Ok(Ok(plaintext)) => Some(Zeroizing::new(plaintext)),
            Ok(Err(_)) => {
                debug!("Envelope failed authentication");
                None
            }
            Err(err) => {
                debug!(error = %err, "Envelope not opened");
                None
            }
        }
    }

    /// Opens an envelope and deserializes it, falling back to `default`.
    pub fn decrypt_or<T: DeserializeOwned>(&self, envelope: &EncryptedEnvelope, default: T) -> T {
        self.decrypt(envelope)
            .and_then(|plaintext| serde_json::from_slice(&plaintext).ok())
            .unwrap_or(default)
    }
}

impl ValueCodec for AeadCodec {
    fn name(&self) -> &'static str {
        "xchacha20poly1305"
    }

    fn encode(&self, plaintext: Zeroizing<Vec<u8>>) -> Result<Vec<u8>> {
        Ok(self.encrypt(plaintext)?.to_bytes())
    }

    fn decode(&self, stored: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        EncryptedEnvelope::from_bytes(stored).and_then(|envelope| self.decrypt(&envelope))
    }

    fn dispose(&mut self) {
        self.secret.zero();
    }
}

impl fmt::Debug for AeadCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadCodec")
            .field("secret", &self.secret.state())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn random_secret() -> [u8; 32] {
        loop {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            if !bytes.iter().all(|b| (0x20..=0x7e).contains(b)) {
                return bytes;
            }
        }
    }

    fn codec() -> AeadCodec {
        AeadCodec::from_input(SecretInput::Raw(&random_secret())).unwrap()
    }

    fn plaintext(text: &str) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(text.as_bytes().to_vec())
    }

    #[test]
    fn test_encrypt_decrypt() {
        let codec = codec();
        let envelope = codec.encrypt(plaintext("hello")).unwrap();

        assert_eq!(envelope.ciphertext.len(), "hello".len() + TAG_LEN);
        assert_eq!(codec.decrypt(&envelope).unwrap().as_slice(), b"hello");
    }

    #[test]
    fn test_empty_plaintext() {
        let codec = codec();
        let envelope = codec.encrypt(plaintext("")).unwrap();

        assert_eq!(envelope.ciphertext.len(), TAG_LEN);
        assert!(codec.decrypt(&envelope).unwrap().is_empty());
    }

    #[test]
    fn test_nonces_are_unique() {
        let codec = codec();
        let nonces: HashSet<[u8; NONCE_LEN]> = (0..1000)
            .map(|_| codec.encrypt(plaintext("same")).unwrap().nonce)
            .collect();

        assert_eq!(nonces.len(), 1000);
    }

    #[test]
    fn test_same_plaintext_different_ciphertext() {
        let codec = codec();
        let a = codec.encrypt(plaintext("value")).unwrap();
        let b = codec.encrypt(plaintext("value")).unwrap();

        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let codec = codec();
        let envelope = codec.encrypt(plaintext("tamper me")).unwrap();

        for i in 0..envelope.ciphertext.len() {
            let mut tampered = envelope.clone();
            tampered.ciphertext[i] ^= 0x01;
            assert!(codec.decrypt(&tampered).is_none(), "flip at byte {} accepted", i);
        }
    }

    #[test]
    fn test_tampered_nonce_rejected() {
        let codec = codec();
        let mut envelope = codec.encrypt(plaintext("tamper me")).unwrap();
        envelope.nonce[0] ^= 0x80;

        assert!(codec.decrypt(&envelope).is_none());
    }

    #[test]
    fn test_wrong_key_falls_back_to_default() {
        let sealed = codec().encrypt_value(&"secret value").unwrap();
        let other = codec();

        assert!(other.decrypt(&sealed).is_none());
        assert_eq!(other.decrypt_or(&sealed, "fallback".to_string()), "fallback");
    }

    #[test]
    fn test_decrypt_or_round_trip() {
        let codec = codec();
        let sealed = codec.encrypt_value(&vec![1, 2, 3]).unwrap();

        assert_eq!(codec.decrypt_or(&sealed, Vec::<i32>::new()), vec![1, 2, 3]);
        // Wrong target type degrades to the default too.
        assert_eq!(codec.decrypt_or(&sealed, "none".to_string()), "none");
    }

    #[test]
    fn test_envelope_bytes_layout() {
        let codec = codec();
        let envelope = codec.encrypt(plaintext("layout")).unwrap();
        let bytes = envelope.to_bytes();

        assert_eq!(&bytes[..NONCE_LEN], &envelope.nonce);
        assert_eq!(&bytes[NONCE_LEN..], envelope.ciphertext.as_slice());
        assert_eq!(EncryptedEnvelope::from_bytes(&bytes), Some(envelope));
    }

    #[test]
    fn test_truncated_envelope() {
        assert!(EncryptedEnvelope::from_bytes(&[]).is_none());
        assert!(EncryptedEnvelope::from_bytes(&[0u8; NONCE_LEN + TAG_LEN - 1]).is_none());

        let codec = codec();
        let bytes = codec.encode(plaintext("truncate")).unwrap();
        assert!(codec.decode(&bytes[..bytes.len() - 1]).is_none());
        assert!(codec.decode(&bytes[..10]).is_none());
    }

    #[test]
    fn test_unset_secret_is_unavailable() {
        let codec = AeadCodec::default();

        assert!(matches!(
            codec.encrypt(plaintext("x")),
            Err(CacheError::EncryptionUnavailable(_))
        ));
    }

    #[test]
    fn test_dispose_zeroes_secret() {
        let mut codec = codec();
        let bytes = codec.encode(plaintext("before")).unwrap();

        ValueCodec::dispose(&mut codec);

        assert_eq!(codec.secret_state(), SecretState::Zeroed);
        assert!(codec.decode(&bytes).is_none());
        assert!(matches!(
            codec.encode(plaintext("after")),
            Err(CacheError::EncryptionUnavailable(_))
        ));
    }

    #[test]
    fn test_plain_codec_is_identity() {
        let codec = PlainCodec;
        let bytes = codec.encode(plaintext("plain")).unwrap();

        assert_eq!(bytes, b"plain");
        assert_eq!(codec.decode(&bytes).unwrap().as_slice(), b"plain");
    }

    #[test]
    fn test_debug_hides_material() {
        let codec = codec();
        let envelope = codec.encrypt(plaintext("debug")).unwrap();

        assert_eq!(format!("{:?}", codec), "AeadCodec { secret: Validated }");
        assert!(format!("{:?}", envelope).contains("nonce_len: 24"));
    }
}
