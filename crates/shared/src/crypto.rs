//! Cryptographic utilities for refresh-token storage and channel signing.
//!
//! Refresh tokens are sealed with AES-256-GCM before they reach the database.
//! The stored form is `v1:<base64 nonce>:<base64 ciphertext>`; development
//! deployments may opt into `plain:<token>` values instead.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SEALED_PREFIX: &str = "v1:";
const PLAINTEXT_PREFIX: &str = "plain:";
const NONCE_LEN: usize = 12;

/// Error type for token sealing and signature checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption key is empty")]
    EmptyKey,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Malformed sealed value: {0}")]
    Malformed(String),

    #[error("Plaintext token storage is disabled")]
    PlaintextRefused,
}

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Signs `message` with HMAC-SHA256 under `secret`, hex encoded.
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex HMAC-SHA256 signature in constant time.
pub fn verify_hmac_sha256_hex(secret: &str, message: &str, signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message.as_bytes());
    mac.verify_slice(&signature).is_ok()
}

/// Seals and opens refresh tokens at rest.
///
/// The key is the SHA-256 digest of the configured secret, so any non-empty
/// secret string yields a valid 256-bit key.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Option<Aes256Gcm>,
    allow_plaintext: bool,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key", &"[REDACTED]")
            .field("sealing", &self.cipher.is_some())
            .field("allow_plaintext", &self.allow_plaintext)
            .finish()
    }
}

impl TokenCipher {
    /// Creates a cipher keyed from `secret`.
    pub fn new(secret: &str) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::EmptyKey)?;
        Ok(Self {
            cipher: Some(cipher),
            allow_plaintext: false,
        })
    }

    /// Creates a cipher that stores tokens without encryption.
    ///
    /// Only for development; configuration refuses this in production.
    pub fn plaintext() -> Self {
        Self {
            cipher: None,
            allow_plaintext: true,
        }
    }

    /// Builds a cipher from optional key material.
    pub fn from_settings(secret: Option<&str>, allow_plaintext: bool) -> Result<Self, CryptoError> {
        match secret.filter(|s| !s.is_empty()) {
            Some(secret) => {
                let mut cipher = Self::new(secret)?;
                cipher.allow_plaintext = allow_plaintext;
                Ok(cipher)
            }
            None if allow_plaintext => Ok(Self::plaintext()),
            None => Err(CryptoError::EmptyKey),
        }
    }

    /// Returns true when values are sealed with a key.
    pub fn is_sealing(&self) -> bool {
        self.cipher.is_some()
    }

    /// Seals a token into its storage form.
    pub fn seal(&self, token: &str) -> Result<String, CryptoError> {
        let Some(cipher) = self.cipher.as_ref() else {
            return Ok(format!("{PLAINTEXT_PREFIX}{token}"));
        };

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), token.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(format!(
            "{SEALED_PREFIX}{}:{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    /// Opens a stored value back into the token.
    pub fn open(&self, stored: &str) -> Result<String, CryptoError> {
        if let Some(token) = stored.strip_prefix(PLAINTEXT_PREFIX) {
            if !self.allow_plaintext {
                return Err(CryptoError::PlaintextRefused);
            }
            return Ok(token.to_string());
        }

        let body = stored
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| CryptoError::Malformed("unknown version prefix".into()))?;
        let (nonce_b64, ciphertext_b64) = body
            .split_once(':')
            .ok_or_else(|| CryptoError::Malformed("missing separator".into()))?;

        let nonce = BASE64
            .decode(nonce_b64)
            .map_err(|e| CryptoError::Malformed(format!("nonce: {e}")))?;
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::Malformed("nonce length".into()));
        }
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| CryptoError::Malformed(format!("ciphertext: {e}")))?;

        let cipher = self.cipher.as_ref().ok_or(CryptoError::DecryptionFailed)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}
