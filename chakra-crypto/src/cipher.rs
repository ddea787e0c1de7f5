//! Per-file box encryption.
//!
//! Every uploaded file gets a fresh X25519 keypair. File bytes are sealed with
//! XSalsa20-Poly1305 under the keypair's own shared secret, and a random
//! 24-byte nonce is prepended to the ciphertext. Only the 32-byte secret key
//! ever leaves the client (wrapped by the threshold network); the public half
//! is re-derived from it on download.

use crate::error::{CryptoError, CryptoResult};
use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{PublicKey, SalsaBox, SecretKey};

/// XSalsa20 nonce length prepended to every encrypted file.
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag length appended by the box construction.
pub const TAG_SIZE: usize = 16;

/// Length of the raw X25519 secret key.
pub const SECRET_KEY_SIZE: usize = 32;

/// Ephemeral X25519 keypair protecting a single file.
///
/// The secret key implements `ZeroizeOnDrop` automatically (from crypto_box).
pub struct FileKeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl FileKeyPair {
    /// Generates a fresh keypair. Never reuse one across files.
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Returns the public key as raw 32-byte array.
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Returns the secret key as raw 32-byte array.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Reconstructs a keypair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Reconstructs a keypair from a secret key slice of unchecked length.
    pub fn from_secret_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; SECRET_KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: SECRET_KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self::from_secret_bytes(array))
    }
}

impl std::fmt::Debug for FileKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Generates a fresh per-file keypair.
pub fn generate_file_keypair() -> FileKeyPair {
    FileKeyPair::generate()
}

/// Encrypts `plaintext` and returns `nonce || ciphertext`.
///
/// A new nonce is drawn from the OS RNG on every call.
pub fn encrypt_file(
    plaintext: &[u8],
    public: &PublicKey,
    secret: &SecretKey,
) -> CryptoResult<Vec<u8>> {
    let salsa_box = SalsaBox::new(public, secret);
    let nonce = SalsaBox::generate_nonce(&mut OsRng);

    let ciphertext = salsa_box
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(format!("file seal failed: {e}")))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(nonce.as_slice());
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypts a `nonce || ciphertext` blob produced by [`encrypt_file`].
pub fn decrypt_file(blob: &[u8], public: &PublicKey, secret: &SecretKey) -> CryptoResult<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption(format!(
            "encrypted message too short: {} bytes",
            blob.len()
        )));
    }

    let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
    let salsa_box = SalsaBox::new(public, secret);

    salsa_box
        .decrypt(crypto_box::Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            CryptoError::Decryption("file open failed (wrong key or tampered data)".to_string())
        })
}
