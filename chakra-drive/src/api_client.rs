//! HTTP client for the Chakra Drive API.
//!
//! Covers the endpoints the encrypted file flow depends on: wallet login,
//! the session signature broker, the bearer-token hash registry used by
//! revision 2 of the decryption policy, and raw envelope downloads.

use crate::config::DriveConfig;
use crate::error::{DriveError, DriveResult};
use async_trait::async_trait;
use chakra_policy::{NonceRegistry, PolicyError, PolicyResult, SessionSigsMap};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Default)]
struct AuthState {
    token: Option<String>,
    public_key: Option<String>,
}

pub struct DriveApiClient {
    client: Client,
    config: DriveConfig,
    auth: Arc<RwLock<AuthState>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    public_key: &'a str,
    signature: &'a str,
    message: &'a str,
}

/// Account summary returned on login.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveUser {
    pub public_key: String,
    #[serde(default)]
    pub storage_bytes_available: u64,
    #[serde(default)]
    pub storage_used: u64,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub token: String,
    pub user: DriveUser,
    #[serde(default)]
    pub is_new_user: bool,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionSigsResponse {
    session_sigs: SessionSigsMap,
}

#[derive(Deserialize)]
struct SuccessFlag {
    success: bool,
}

impl DriveApiClient {
    pub fn new(config: DriveConfig) -> DriveResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            config,
            auth: Arc::new(RwLock::new(AuthState::default())),
        })
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    /// Restores a saved session.
    pub async fn set_token(&self, token: String, public_key: String) {
        let mut auth = self.auth.write().await;
        auth.token = Some(token);
        auth.public_key = Some(public_key);
    }

    pub async fn token(&self) -> Option<String> {
        self.auth.read().await.token.clone()
    }

    pub async fn public_key(&self) -> Option<String> {
        self.auth.read().await.public_key.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.auth.read().await.token.is_some()
    }

    pub async fn logout(&self) {
        let mut auth = self.auth.write().await;
        auth.token = None;
        auth.public_key = None;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    // ── Auth ──

    /// Exchanges a signed login message for a bearer token.
    ///
    /// `signature` and `message` are base58, as the wallet produced them.
    pub async fn login(
        &self,
        public_key: &str,
        signature: &str,
        message: &str,
    ) -> DriveResult<LoginData> {
        let resp = self
            .client
            .post(self.url("/api/user/login"))
            .json(&LoginRequest {
                public_key,
                signature,
                message,
            })
            .send()
            .await?;

        let status = resp.status();
        let body: Envelope<LoginData> = resp.json().await.map_err(|e| {
            DriveError::Api(format!("login returned {status} with unreadable body: {e}"))
        })?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            return Err(DriveError::AuthenticationFailed(
                body.error.unwrap_or_else(|| status.to_string()),
            ));
        }
        if !status.is_success() {
            return Err(DriveError::Api(
                body.error.unwrap_or_else(|| status.to_string()),
            ));
        }

        let data = match (body.success, body.data) {
            (true, Some(data)) => data,
            _ => {
                return Err(DriveError::AuthenticationFailed(
                    body.error
                        .unwrap_or_else(|| "unsuccessful response from server".into()),
                ));
            }
        };

        self.set_token(data.token.clone(), public_key.to_string())
            .await;
        debug!("logged in as {public_key}");
        Ok(data)
    }

    // ── Decryption support ──

    /// Asks the broker for freshly minted session signatures. Single attempt;
    /// see [`crate::session::acquire_session_sigs`] for the retry loop.
    pub async fn request_session_sigs(&self, public_key: &str) -> DriveResult<SessionSigsMap> {
        let mut req = self
            .client
            .post(self.url("/api/decrypt/session_sigs"))
            .json(&serde_json::json!({ "publicKey": public_key }));
        if let Some(token) = self.token().await {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await?
            .error_for_status()
            .map_err(|e| DriveError::Api(e.to_string()))?;

        let body: SessionSigsResponse = resp.json().await?;
        Ok(body.session_sigs)
    }

    /// Whether `hash` was issued as a bearer token to `public_key`.
    pub async fn verify_hash(&self, hash: &str, public_key: &str) -> DriveResult<bool> {
        let resp = self
            .client
            .get(self.url("/api/verify_hash"))
            .query(&[("hash", hash), ("public_key", public_key)])
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| DriveError::Api(e.to_string()))?;

        let body: SuccessFlag = resp.json().await?;
        Ok(body.success)
    }

    /// Downloads the raw envelope bytes of a stored file.
    pub async fn fetch_envelope(&self, url: &str) -> DriveResult<Vec<u8>> {
        let resp = self.client.get(url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(DriveError::NotFound(url.to_string()));
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| DriveError::Api(e.to_string()))?;

        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl NonceRegistry for DriveApiClient {
    async fn verify_hash(&self, hash: &str, public_key: &str) -> PolicyResult<bool> {
        DriveApiClient::verify_hash(self, hash, public_key)
            .await
            .map_err(|e| {
                warn!("hash registry lookup failed: {e}");
                PolicyError::NonceRegistry(e.to_string())
            })
    }
}
