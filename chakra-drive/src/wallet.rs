//! Wallet signing seam.

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};

/// A connected wallet that can sign arbitrary messages.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Base58 public key.
    fn public_key(&self) -> String;

    /// Signs `message`, or returns `None` if the user declined.
    async fn sign_message(&self, message: &[u8]) -> Option<Vec<u8>>;
}

/// Wallet backed by a local ed25519 keypair.
pub struct KeypairWallet {
    key: SigningKey,
}

impl KeypairWallet {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(&seed))
    }
}

impl std::fmt::Debug for KeypairWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairWallet")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn public_key(&self) -> String {
        bs58::encode(self.key.verifying_key().as_bytes()).into_string()
    }

    async fn sign_message(&self, message: &[u8]) -> Option<Vec<u8>> {
        Some(self.key.sign(message).to_bytes().to_vec())
    }
}
