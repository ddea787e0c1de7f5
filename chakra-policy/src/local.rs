//! In-process threshold network.
//!
//! Behaves like the remote network from the client's point of view: keys are
//! wrapped under a master key the client never sees, bound to the access
//! conditions they were encrypted with, and released only from inside a
//! registered policy program run with valid session signatures.
//!
//! Wrapped ciphertext is `base64(nonce[12] || ChaCha20-Poly1305(data))` with
//! `sha256(conditions_json || dataToEncryptHash)` as associated data, so a
//! ciphertext replayed under different conditions fails to open.

use crate::conditions::{evaluate, SolRpcConditions};
use crate::constants::{SOLANA_CHAIN, SOLANA_SIGN_MESSAGE};
use crate::error::{PolicyError, PolicyResult};
use crate::network::{
    EncryptRequest, ExecuteJsRequest, ExecuteJsResponse, NonceRegistry, SessionCapability,
    SessionSig, SessionSigRequest, SessionSigsMap, ThresholdNetwork, ACC_DECRYPTION_ABILITY,
    ACTION_EXECUTION_ABILITY, SESSION_SIG_DERIVED_VIA,
};
use crate::program::{run_policy, AuthSig, DecryptAndCombineRequest, SandboxRuntime};
use crate::registry::ProgramRegistry;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chakra_crypto::{decode_base58, ContentHasher, IpfsCidV0, WrappedKeyRecord};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Node URL session signatures are keyed under by default.
pub const DEFAULT_NODE_URL: &str = "local://threshold-node-0";

const WRAP_NONCE_SIZE: usize = 12;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct LocalThresholdNetwork {
    node_url: String,
    master_key: Key,
    node_key: SigningKey,
    registry: Arc<ProgramRegistry>,
    hasher: Arc<dyn ContentHasher>,
    nonce_registry: Option<Arc<dyn NonceRegistry>>,
    clock: Clock,
    connected: AtomicBool,
    connects: AtomicUsize,
}

impl fmt::Debug for LocalThresholdNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalThresholdNetwork")
            .field("node_url", &self.node_url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl LocalThresholdNetwork {
    /// Creates a network with fresh key material serving `registry`.
    pub fn new(registry: Arc<ProgramRegistry>) -> Self {
        Self {
            node_url: DEFAULT_NODE_URL.to_string(),
            master_key: ChaCha20Poly1305::generate_key(&mut OsRng),
            node_key: SigningKey::generate(&mut OsRng),
            registry,
            hasher: Arc::new(IpfsCidV0),
            nonce_registry: None,
            clock: Arc::new(Utc::now),
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn with_nonce_registry(mut self, registry: Arc<dyn NonceRegistry>) -> Self {
        self.nonce_registry = Some(registry);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_node_url(mut self, node_url: impl Into<String>) -> Self {
        self.node_url = node_url.into();
        self
    }

    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    /// Number of handshakes performed so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn node_address(&self) -> String {
        hex::encode(self.node_key.verifying_key().as_bytes())
    }

    /// Signs a capability grant for `request`, acting as the capacity holder.
    pub fn mint_session_sigs(&self, request: &SessionSigRequest) -> PolicyResult<SessionSigsMap> {
        let now = self.now();
        if request.expiration <= now {
            return Err(PolicyError::SessionSigs(
                "expiration must be in the future".into(),
            ));
        }

        let capability = SessionCapability {
            session_key: request.public_key.clone(),
            node_url: self.node_url.clone(),
            issued_at: now,
            expiration: request.expiration,
            resource_ability_requests: request.resource_ability_requests.clone(),
        };
        let signed_message = serde_json::to_string(&capability)?;
        let sig = self.node_key.sign(signed_message.as_bytes());

        debug!(
            "minted session sigs for {} until {}",
            request.public_key, request.expiration
        );

        let mut sigs = SessionSigsMap::new();
        sigs.insert(
            self.node_url.clone(),
            SessionSig {
                sig: hex::encode(sig.to_bytes()),
                derived_via: SESSION_SIG_DERIVED_VIA.to_string(),
                signed_message,
                address: self.node_address(),
                algo: "ed25519".to_string(),
            },
        );
        Ok(sigs)
    }

    fn verify_session(&self, sigs: &SessionSigsMap) -> PolicyResult<SessionCapability> {
        let entry = sigs.get(&self.node_url).ok_or_else(|| {
            PolicyError::SessionSigs(format!("no signature for node {}", self.node_url))
        })?;

        if entry.address != self.node_address() {
            return Err(PolicyError::SessionSigs(
                "signed by an unknown capacity holder".into(),
            ));
        }

        let sig_bytes = hex::decode(&entry.sig)
            .map_err(|e| PolicyError::SessionSigs(format!("signature is not hex: {e}")))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| PolicyError::SessionSigs(e.to_string()))?;
        self.node_key
            .verifying_key()
            .verify(entry.signed_message.as_bytes(), &signature)
            .map_err(|_| PolicyError::SessionSigs("signature mismatch".into()))?;

        let capability: SessionCapability = serde_json::from_str(&entry.signed_message)?;
        if capability.node_url != self.node_url {
            return Err(PolicyError::SessionSigs("signed for another node".into()));
        }
        if capability.expiration <= self.now() {
            return Err(PolicyError::SessionSigs("session expired".into()));
        }
        Ok(capability)
    }

    fn ensure_connected(&self) -> PolicyResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(PolicyError::NotConnected)
        }
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(&self.master_key)
    }

    fn unwrap_key(&self, request: &DecryptAndCombineRequest) -> PolicyResult<String> {
        let blob = STANDARD
            .decode(&request.ciphertext)
            .map_err(|e| PolicyError::Network(format!("ciphertext is not base64: {e}")))?;
        if blob.len() < WRAP_NONCE_SIZE {
            return Err(PolicyError::Network("ciphertext too short".into()));
        }
        let (nonce, sealed) = blob.split_at(WRAP_NONCE_SIZE);
        let aad = binding(&request.access_control_conditions, &request.data_to_encrypt_hash)?;

        let plaintext = self
            .cipher()
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                PolicyError::Network("ciphertext does not match its access conditions".into())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| PolicyError::Network("wrapped data is not UTF-8".into()))
    }
}

#[async_trait]
impl ThresholdNetwork for LocalThresholdNetwork {
    async fn connect(&self) -> PolicyResult<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        info!("connected to threshold network at {}", self.node_url);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn encrypt(&self, request: EncryptRequest) -> PolicyResult<WrappedKeyRecord> {
        self.ensure_connected()?;

        let data_to_encrypt_hash = hex::encode(Sha256::digest(&request.data_to_encrypt));
        let aad = binding(&request.sol_rpc_conditions, &data_to_encrypt_hash)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher()
            .encrypt(
                &nonce,
                Payload {
                    msg: &request.data_to_encrypt,
                    aad: &aad,
                },
            )
            .map_err(|_| PolicyError::Network("wrapping failed".into()))?;

        let mut blob = Vec::with_capacity(WRAP_NONCE_SIZE + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);

        Ok(WrappedKeyRecord {
            data_to_encrypt_hash,
            ciphertext: STANDARD.encode(blob),
        })
    }

    /// A run that ends in a policy rejection still reports `success: true`;
    /// the rejection is carried in `response`.
    async fn execute_js(&self, request: ExecuteJsRequest) -> PolicyResult<ExecuteJsResponse> {
        self.ensure_connected()?;

        let capability = self.verify_session(&request.session_sigs)?;
        if !capability.allows(ACTION_EXECUTION_ABILITY) {
            return Err(PolicyError::SessionSigs(format!(
                "session lacks {ACTION_EXECUTION_ABILITY}"
            )));
        }

        let (entry, action_id) = self
            .registry
            .resolve_source(&request.code, self.hasher.as_ref())?;
        debug!("executing policy {} ({action_id})", entry.version);

        let sandbox = LocalSandbox {
            network: self,
            action_id,
            can_decrypt: capability.allows(ACC_DECRYPTION_ABILITY),
            now: self.now(),
        };
        let outcome = run_policy(entry.validator.as_ref(), &request.js_params, &sandbox).await;

        Ok(ExecuteJsResponse {
            success: true,
            response: outcome.into_response(),
        })
    }
}

/// Primitives available to one program run.
struct LocalSandbox<'a> {
    network: &'a LocalThresholdNetwork,
    action_id: String,
    can_decrypt: bool,
    now: DateTime<Utc>,
}

#[async_trait]
impl SandboxRuntime for LocalSandbox<'_> {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    async fn verify_nonce(&self, hash: &str, public_key: &str) -> PolicyResult<bool> {
        match &self.network.nonce_registry {
            Some(registry) => registry.verify_hash(hash, public_key).await,
            None => Err(PolicyError::NonceRegistry(
                "no nonce registry configured".into(),
            )),
        }
    }

    async fn decrypt_and_combine(&self, request: DecryptAndCombineRequest) -> PolicyResult<String> {
        if !self.can_decrypt {
            return Err(PolicyError::SessionSigs(format!(
                "session lacks {ACC_DECRYPTION_ABILITY}"
            )));
        }
        if request.chain != SOLANA_CHAIN {
            return Err(PolicyError::InvalidAuthSig(format!(
                "unsupported chain {}",
                request.chain
            )));
        }
        verify_auth_sig(&request.auth_sig)?;

        if !evaluate(
            &request.access_control_conditions,
            &request.auth_sig.address,
            &self.action_id,
        ) {
            warn!(
                "conditions not met for {} under {}",
                request.auth_sig.address, self.action_id
            );
            return Err(PolicyError::ConditionsNotMet);
        }

        self.network.unwrap_key(&request)
    }
}

fn verify_auth_sig(auth_sig: &AuthSig) -> PolicyResult<()> {
    if auth_sig.derived_via != SOLANA_SIGN_MESSAGE {
        return Err(PolicyError::InvalidAuthSig(format!(
            "unsupported derivation {}",
            auth_sig.derived_via
        )));
    }

    let sig_bytes = hex::decode(&auth_sig.sig)
        .map_err(|e| PolicyError::InvalidAuthSig(format!("signature is not hex: {e}")))?;
    let signature =
        Signature::from_slice(&sig_bytes).map_err(|e| PolicyError::InvalidAuthSig(e.to_string()))?;

    let key_bytes: [u8; 32] = decode_base58(&auth_sig.address)?
        .try_into()
        .map_err(|_| PolicyError::InvalidAuthSig("address is not 32 bytes".into()))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| PolicyError::InvalidAuthSig(e.to_string()))?;

    key.verify(auth_sig.signed_message.as_bytes(), &signature)
        .map_err(|_| PolicyError::InvalidAuthSig("signature does not match address".into()))
}

fn binding(conditions: &SolRpcConditions, data_to_encrypt_hash: &str) -> PolicyResult<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(conditions)?);
    hasher.update(data_to_encrypt_hash.as_bytes());
    Ok(hasher.finalize().into())
}
