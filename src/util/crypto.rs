use std::{fmt, str::FromStr, sync::Arc};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

/// 32-byte key for sealing secrets at rest, read from 64 hex characters.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

impl FromStr for EncryptionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| format!("invalid hex key: {e}"))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "encryption key must be 32 bytes (64 hex characters)".to_string())?;
        Ok(Self(key))
    }
}

impl From<[u8; 32]> for EncryptionKey {
    fn from(key: [u8; 32]) -> Self {
        Self(key)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("ciphertext failed authentication")]
    Aead(chacha20poly1305::aead::Error),
    #[error("ciphertext is not valid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("ciphertext is too short")]
    Shape,
    #[error("plaintext is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, thiserror::Error)]
#[error("encryption failed")]
pub struct EncryptError;

/// Seals secrets as base64url(nonce || ciphertext).
#[derive(Clone)]
pub struct Encrypter {
    aead: Arc<ChaCha20Poly1305>,
}

impl fmt::Debug for Encrypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encrypter").finish()
    }
}

impl Encrypter {
    pub fn new(key: &EncryptionKey) -> Self {
        let aead = ChaCha20Poly1305::new(Key::from_slice(&key.0));
        Self {
            aead: Arc::new(aead),
        }
    }

    pub fn encrypt_to_string(&self, decrypted: &[u8]) -> Result<String, EncryptError> {
        let nonce: [u8; 12] = rand::random();
        let encrypted = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), decrypted)
            .map_err(|_| EncryptError)?;
        let sealed = [&nonce[..], &encrypted].concat();
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    pub fn decrypt_string(&self, encrypted: &str) -> Result<Vec<u8>, DecryptError> {
        let encrypted = URL_SAFE_NO_PAD.decode(encrypted)?;
        if encrypted.len() < 12 {
            return Err(DecryptError::Shape);
        }
        let (nonce, payload) = encrypted.split_at(12);

        self.aead
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(DecryptError::Aead)
    }

    pub fn seal(&self, value: &str) -> Result<String, EncryptError> {
        self.encrypt_to_string(value.as_bytes())
    }

    pub fn open(&self, sealed: &str) -> Result<String, DecryptError> {
        let bytes = self.decrypt_string(sealed)?;
        Ok(String::from_utf8(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypter(byte: u8) -> Encrypter {
        Encrypter::new(&EncryptionKey::from([byte; 32]))
    }

    #[test]
    fn sealed_values_open_with_same_key() {
        let enc = encrypter(7);
        let sealed = enc.seal("upstream-refresh-token").unwrap();
        assert_ne!(sealed, "upstream-refresh-token");
        assert_eq!(enc.open(&sealed).unwrap(), "upstream-refresh-token");
    }

    #[test]
    fn nonce_makes_ciphertexts_differ() {
        let enc = encrypter(7);
        assert_ne!(enc.seal("same").unwrap(), enc.seal("same").unwrap());
    }

    #[test]
    fn other_key_cannot_open() {
        let sealed = encrypter(1).seal("secret").unwrap();
        assert!(matches!(encrypter(2).open(&sealed), Err(DecryptError::Aead(_))));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let enc = encrypter(1);
        assert!(matches!(enc.open("AAAA"), Err(DecryptError::Shape)));
        assert!(matches!(enc.open("not base64!"), Err(DecryptError::Base64(_))));
    }

    #[test]
    fn key_parses_from_hex() {
        let hex_key = "00".repeat(32);
        assert!(hex_key.parse::<EncryptionKey>().is_ok());
        assert!("abcd".parse::<EncryptionKey>().is_err());
        assert!("zz".repeat(32).parse::<EncryptionKey>().is_err());
    }
}
