//! Crypto Module
//!
//! Secret lifecycle and the value codecs built on it.

mod codec;
mod secret;

pub use codec::{AeadCodec, EncryptedEnvelope, PlainCodec, ValueCodec, NONCE_LEN, TAG_LEN};
pub use secret::{SecretInput, SecretManager, SecretState, SECRET_LEN};
