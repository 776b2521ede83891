//! Payload encryption for SDK connections that ask for it.
//!
//! Payloads are sealed with AES-GCM. The envelope is `"<nonce>.<ciphertext>"`,
//! both halves standard base64, which SDKs split on the dot before decrypting.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

enum Cipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

pub struct PayloadEncryptor {
    cipher: Cipher,
}

impl PayloadEncryptor {
    /// Builds an encryptor from a base64 key of 16 or 32 bytes.
    pub fn from_base64_key(key: &str) -> CryptoResult<Self> {
        let key_bytes = BASE64.decode(key.trim())?;
        let cipher = match key_bytes.len() {
            16 => Cipher::Aes128(Box::new(
                Aes128Gcm::new_from_slice(&key_bytes)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
            )),
            32 => Cipher::Aes256(Box::new(
                Aes256Gcm::new_from_slice(&key_bytes)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
            )),
            len => {
                return Err(CryptoError::InvalidKey(format!(
                    "Key must be 16 or 32 bytes, got {len}"
                )))
            }
        };
        Ok(Self { cipher })
    }

    /// Generates a random 256-bit key, base64 encoded.
    pub fn generate_base64_key() -> String {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = match &self.cipher {
            Cipher::Aes128(cipher) => cipher.encrypt(nonce, plaintext.as_bytes()),
            Cipher::Aes256(cipher) => cipher.encrypt(nonce, plaintext.as_bytes()),
        }
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(format!(
            "{}.{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, envelope: &str) -> CryptoResult<String> {
        let (nonce_b64, ciphertext_b64) = envelope
            .split_once('.')
            .ok_or_else(|| CryptoError::InvalidData("missing nonce separator".to_string()))?;

        let nonce_bytes = BASE64.decode(nonce_b64)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::InvalidData(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce_bytes.len()
            )));
        }
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = BASE64.decode(ciphertext_b64)?;

        let plaintext = match &self.cipher {
            Cipher::Aes128(cipher) => cipher.decrypt(nonce, ciphertext.as_slice()),
            Cipher::Aes256(cipher) => cipher.decrypt(nonce, ciphertext.as_slice()),
        }
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {e}")))
    }
}
