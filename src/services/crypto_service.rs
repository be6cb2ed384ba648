//! At-rest protection for provider credentials.
//!
//! API keys are sealed with AES-256-GCM under a PBKDF2-derived key and stored
//! as base64 text (`nonce || ciphertext || tag`) inside the settings document.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;
use zeroize::Zeroize;

use crate::types::errors::CryptoError;

/// PBKDF2 iteration count for key derivation.
const PBKDF2_ITERATIONS: u32 = 100_000;

/// AES-256-GCM key length in bytes.
const KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce/IV length in bytes.
const NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
const TAG_LENGTH: usize = 16;

/// Default vault identity. A deployment can pass its own through `with_passphrase`.
pub const DEFAULT_PASSPHRASE: &str = "smartmarks-provider-keys-v1";
pub const DEFAULT_SALT: &[u8] = b"smartmarks-vault";

/// A nonce sequence that yields exactly one nonce.
struct SingleNonce {
    nonce: Option<[u8; NONCE_LENGTH]>,
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        self.nonce
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

/// Seals and opens short secrets with a key held for the lifetime of the service.
pub struct CryptoService {
    rng: SystemRandom,
    key: Vec<u8>,
}

impl CryptoService {
    /// Derives the vault key from the built-in passphrase.
    pub fn new() -> Result<Self, CryptoError> {
        Self::with_passphrase(DEFAULT_PASSPHRASE, DEFAULT_SALT)
    }

    pub fn with_passphrase(passphrase: &str, salt: &[u8]) -> Result<Self, CryptoError> {
        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS)
            .ok_or_else(|| CryptoError::KeyDerivation("Invalid iteration count".to_string()))?;
        if salt.is_empty() {
            return Err(CryptoError::KeyDerivation("Salt must not be empty".to_string()));
        }

        let mut key = vec![0u8; KEY_LENGTH];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt,
            passphrase.as_bytes(),
            &mut key,
        );

        Ok(Self {
            rng: SystemRandom::new(),
            key,
        })
    }

    /// Encrypts `plaintext` and returns base64 text safe to embed in JSON.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::RandomGeneration("Failed to generate nonce".to_string()))?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| CryptoError::Encryption("Failed to create encryption key".to_string()))?;
        let mut sealing_key = aead::SealingKey::new(
            unbound_key,
            SingleNonce {
                nonce: Some(nonce_bytes),
            },
        );

        let mut in_out = plaintext.as_bytes().to_vec();
        sealing_key
            .seal_in_place_append_tag(Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Encryption("Encryption operation failed".to_string()))?;

        let mut packed = Vec::with_capacity(NONCE_LENGTH + in_out.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(&in_out);
        in_out.zeroize();

        Ok(BASE64.encode(packed))
    }

    /// Reverses [`seal`](Self::seal).
    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let mut packed = BASE64
            .decode(sealed.trim())
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        if packed.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::InvalidInput(format!(
                "sealed value must be at least {} bytes, got {}",
                NONCE_LENGTH + TAG_LENGTH,
                packed.len()
            )));
        }

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        nonce_bytes.copy_from_slice(&packed[..NONCE_LENGTH]);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| CryptoError::Decryption("Failed to create decryption key".to_string()))?;
        let mut opening_key = aead::OpeningKey::new(
            unbound_key,
            SingleNonce {
                nonce: Some(nonce_bytes),
            },
        );

        let plaintext = opening_key
            .open_in_place(Aad::empty(), &mut packed[NONCE_LENGTH..])
            .map_err(|_| {
                CryptoError::Decryption("invalid key or corrupted data".to_string())
            })?;
        let text = String::from_utf8(plaintext.to_vec())
            .map_err(|e| CryptoError::Decryption(e.to_string()));
        packed.zeroize();
        text
    }
}

impl Drop for CryptoService {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
