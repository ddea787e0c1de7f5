//! Client-side crypto for Chakra Drive private files.
//!
//! Provides the pieces that never leave the browser/client:
//! - Per-file X25519 keypairs and XSalsa20-Poly1305 box encryption
//! - The multipart envelope that frames a wrapped key with the ciphertext
//! - Sign-In With Solana message construction, parsing and verification
//! - Content addressing used to pin decryption policy programs
//!
//! # Data flow
//!
//! Upload: `generate_file_keypair` → `encrypt_file` → wrap the secret key
//! remotely → `seal_envelope`.
//!
//! Download: `decode_envelope` → unwrap the secret key remotely →
//! `FileKeyPair::from_secret_bytes` → `decrypt_file`.

pub mod cipher;
pub mod content_id;
pub mod envelope;
mod error;
pub mod siws;

pub use cipher::{
    decrypt_file, encrypt_file, generate_file_keypair, FileKeyPair, NONCE_SIZE, SECRET_KEY_SIZE,
    TAG_SIZE,
};
pub use content_id::{ContentHasher, IpfsCidV0, Sha256Hex};
pub use envelope::{
    decode_envelope, encode_envelope, seal_envelope, EnvelopeParts, WrappedKeyRecord,
    LENGTH_PREFIX_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use siws::{
    build_siws_message, decode_base58, format_timestamp, parse_siws_message, parse_timestamp,
    verify_siws_signature, SiwsInput, SiwsObject, StaleReason, StoredSiwsObject,
};
