//! Upload and download of encrypted files.
//!
//! Upload: fresh keypair → box-encrypt the file → wrap the secret key →
//! frame both into one envelope.
//!
//! Download:
//! 1. fetch the envelope and session signatures concurrently
//! 2. look up the cached decryption proof for the current login
//! 3. ask the wallet for a new proof if there is none or it is stale
//! 4. give up with an authentication error if the wallet declined
//! 5. parse the proof's message back into structured form
//! 6. unwrap the file key under the file's policy revision
//! 7. decrypt the file

use crate::api_client::{DriveApiClient, LoginData};
use crate::config::DriveConfig;
use crate::error::{DriveError, DriveResult};
use crate::key_wrapping::KeyWrappingClient;
use crate::session::{acquire_session_sigs, SessionSigSource};
use crate::siws::{create_siws_input_at, token_hash, SiwsIntent};
use crate::siws_store::SiwsCache;
use crate::wallet::WalletSigner;
use chakra_crypto::{
    build_siws_message, decode_envelope, decrypt_file, encrypt_file, generate_file_keypair,
    seal_envelope, SiwsObject, StoredSiwsObject,
};
use chakra_policy::{Clock, PolicyVersion, SessionSigsMap};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Called when the wallet declines to sign.
pub type SignFailedCallback<'a> = &'a (dyn Fn() + Send + Sync);

/// Result of encrypting a file for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedUpload {
    pub bytes: Vec<u8>,
    /// Revision to store alongside the file; needed to decrypt it later.
    pub private_version: PolicyVersion,
}

pub struct FileCrypto {
    config: DriveConfig,
    api: Arc<DriveApiClient>,
    keys: KeyWrappingClient,
    sessions: Arc<dyn SessionSigSource>,
    cache: Arc<dyn SiwsCache>,
    clock: Clock,
}

impl FileCrypto {
    /// Session signatures come from the API's broker endpoint.
    pub fn new(
        config: DriveConfig,
        api: Arc<DriveApiClient>,
        keys: KeyWrappingClient,
        cache: Arc<dyn SiwsCache>,
    ) -> Self {
        let sessions: Arc<dyn SessionSigSource> = api.clone();
        Self {
            config,
            api,
            keys,
            sessions,
            cache,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_session_source(mut self, sessions: Arc<dyn SessionSigSource>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Time source for proof issuance and cache freshness.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn api(&self) -> &DriveApiClient {
        &self.api
    }

    // ── Upload ──

    /// Encrypts `plaintext` for `owner` under the current policy revision.
    pub async fn construct_multipart_encrypted_bytes(
        &self,
        owner: &str,
        plaintext: &[u8],
    ) -> DriveResult<EncryptedUpload> {
        let version = self.config.current_version()?;
        let keypair = generate_file_keypair();
        let encrypted = encrypt_file(plaintext, &keypair.public, &keypair.secret)?;
        let record = self.keys.wrap_key(&keypair, owner, version).await?;
        let bytes = seal_envelope(&record, &encrypted)?;

        debug!(
            "encrypted {} bytes into {} byte envelope",
            plaintext.len(),
            bytes.len()
        );
        Ok(EncryptedUpload {
            bytes,
            private_version: version,
        })
    }

    // ── Sign-in proofs ──

    /// Asks the wallet to sign a fresh sign-in message.
    ///
    /// While logged in, the nonce is the token hash and the proof is cached
    /// under it. Returns `None` (after invoking `on_sign_failed`) if the
    /// wallet declined.
    pub async fn request_siws_message(
        &self,
        wallet: &dyn WalletSigner,
        intent: SiwsIntent,
        on_sign_failed: SignFailedCallback<'_>,
    ) -> DriveResult<Option<StoredSiwsObject>> {
        let hash = self.api.token().await.as_deref().map(token_hash);
        let input = create_siws_input_at(
            &self.config,
            &wallet.public_key(),
            intent,
            hash.as_deref(),
            self.now(),
        );
        let message = build_siws_message(&input);

        let Some(signature) = wallet.sign_message(message.as_bytes()).await else {
            info!("wallet declined to sign {intent:?} message");
            on_sign_failed();
            return Ok(None);
        };

        let stored = StoredSiwsObject::new(message.as_bytes(), &signature);
        if let Some(hash) = hash {
            self.cache.store(&hash, stored.clone()).await?;
        }
        Ok(Some(stored))
    }

    /// Signs a login message and exchanges it for a bearer token.
    pub async fn sign_in(&self, wallet: &dyn WalletSigner) -> DriveResult<LoginData> {
        let public_key = wallet.public_key();
        let input =
            create_siws_input_at(&self.config, &public_key, SiwsIntent::Login, None, self.now());
        let message = build_siws_message(&input);

        let signature = wallet
            .sign_message(message.as_bytes())
            .await
            .ok_or_else(|| DriveError::SignInRequired("wallet declined to sign in".into()))?;

        self.api
            .login(
                &public_key,
                &bs58::encode(signature).into_string(),
                &bs58::encode(message.as_bytes()).into_string(),
            )
            .await
    }

    async fn cached_proof(&self) -> DriveResult<Option<StoredSiwsObject>> {
        match self.api.token().await {
            Some(token) => self.cache.load(&token_hash(&token)).await,
            None => Ok(None),
        }
    }

    // ── Download ──

    /// Decrypts an envelope already in memory.
    pub async fn decrypt_multipart_bytes(
        &self,
        envelope: &[u8],
        owner: &str,
        session_sigs: SessionSigsMap,
        siws_object: &SiwsObject,
        version: PolicyVersion,
    ) -> DriveResult<Vec<u8>> {
        let parts = decode_envelope(envelope)?;
        let record = parts.wrapped_key()?;
        let keypair = self
            .keys
            .unwrap_key(owner, &record, session_sigs, siws_object, version)
            .await?;
        Ok(decrypt_file(
            parts.encrypted_message,
            &keypair.public,
            &keypair.secret,
        )?)
    }

    /// Downloads and decrypts a file stored with [`Self::construct_multipart_encrypted_bytes`].
    ///
    /// `private_version` is the revision recorded with the file.
    pub async fn fetch_and_decrypt_multipart_bytes(
        &self,
        url: &str,
        owner: &str,
        private_version: u32,
        wallet: &dyn WalletSigner,
        on_sign_failed: SignFailedCallback<'_>,
    ) -> DriveResult<Vec<u8>> {
        let version = PolicyVersion::try_from(private_version)?;
        let public_key = wallet.public_key();

        let (envelope, session_sigs) = tokio::try_join!(
            self.api.fetch_envelope(url),
            acquire_session_sigs(
                self.sessions.as_ref(),
                &public_key,
                self.config.session_retry()
            ),
        )?;

        let mut stored = self.cached_proof().await?;
        let stale = match &stored {
            None => true,
            Some(proof) => match proof.staleness(
                self.now(),
                self.config.freshness_window(),
                self.config.siws_cutoff()?,
            ) {
                Some(reason) => {
                    debug!("cached sign-in proof is stale: {reason:?}");
                    true
                }
                None => false,
            },
        };
        if stale {
            stored = self
                .request_siws_message(wallet, SiwsIntent::Decryption, on_sign_failed)
                .await?;
        }

        let Some(stored) = stored else {
            return Err(DriveError::SignInRequired(
                "no decryption signature available".into(),
            ));
        };

        let siws_object = stored.to_siws_object().ok_or_else(|| {
            DriveError::MalformedSiws("signed sign-in message does not parse".into())
        })?;

        self.decrypt_multipart_bytes(&envelope, owner, session_sigs, &siws_object, version)
            .await
    }
}
