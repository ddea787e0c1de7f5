//! Shared harness for drive integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chakra_drive::{
    DriveApiClient, DriveConfig, FileCrypto, KeyWrappingClient, KeypairWallet,
    LocalSessionBroker, MemorySiwsCache, SharedNetwork, WalletSigner,
};
use chakra_policy::{Clock, LocalThresholdNetwork, NonceRegistry, ProgramRegistry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Wallet that counts signature prompts and can be told to decline.
pub struct CountingWallet {
    inner: KeypairWallet,
    decline: bool,
    prompts: AtomicUsize,
}

impl CountingWallet {
    pub fn new(seed: u8) -> Self {
        Self {
            inner: KeypairWallet::from_seed([seed; 32]),
            decline: false,
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn declining(seed: u8) -> Self {
        Self {
            decline: true,
            ..Self::new(seed)
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSigner for CountingWallet {
    fn public_key(&self) -> String {
        self.inner.public_key()
    }

    async fn sign_message(&self, message: &[u8]) -> Option<Vec<u8>> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if self.decline {
            return None;
        }
        self.inner.sign_message(message).await
    }
}

/// Counts `on_sign_failed` invocations.
#[derive(Default)]
pub struct SignFailures(AtomicUsize);

impl SignFailures {
    pub fn callback(&self) -> impl Fn() + Send + Sync + '_ {
        move || {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drive client wired to an in-process threshold network, with envelopes
/// hosted on a mock server.
pub struct Harness {
    pub server: MockServer,
    pub config: DriveConfig,
    pub network: Arc<LocalThresholdNetwork>,
    pub api: Arc<DriveApiClient>,
    pub cache: Arc<MemorySiwsCache>,
    pub files: FileCrypto,
}

/// Where the network looks up login-bound nonces.
enum Nonces {
    Unset,
    Registry(Arc<dyn NonceRegistry>),
    /// The drive API's own `/api/verify_hash` endpoint.
    Api,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(DriveConfig::default(), None).await
    }

    pub async fn with(config: DriveConfig, nonces: Option<Arc<dyn NonceRegistry>>) -> Self {
        let nonces = nonces.map_or(Nonces::Unset, Nonces::Registry);
        Self::build(config, nonces, None).await
    }

    /// Network and drive client share `clock`.
    pub async fn with_clock(clock: Clock) -> Self {
        Self::build(DriveConfig::default(), Nonces::Unset, Some(clock)).await
    }

    /// Nonces are checked against the mock server's `/api/verify_hash`.
    pub async fn with_api_nonces(config: DriveConfig) -> Self {
        Self::build(config, Nonces::Api, None).await
    }

    async fn build(mut config: DriveConfig, nonces: Nonces, clock: Option<Clock>) -> Self {
        chakra_drive::logging::init_tracing();
        let server = MockServer::start().await;
        config.api_base_url = server.uri();
        let api = Arc::new(DriveApiClient::new(config.clone()).unwrap());

        let registry = Arc::new(ProgramRegistry::builtin());
        let mut local = LocalThresholdNetwork::new(registry.clone());
        match nonces {
            Nonces::Unset => {}
            Nonces::Registry(nonces) => local = local.with_nonce_registry(nonces),
            Nonces::Api => local = local.with_nonce_registry(api.clone()),
        }
        if let Some(clock) = &clock {
            local = local.with_clock(clock.clone());
        }
        let network = Arc::new(local);

        let keys = KeyWrappingClient::new(Arc::new(SharedNetwork::new(network.clone())), registry);
        let cache = Arc::new(MemorySiwsCache::new());
        let broker = LocalSessionBroker::new(network.clone(), config.session_ttl());

        let mut files = FileCrypto::new(config.clone(), api.clone(), keys, cache.clone())
            .with_session_source(Arc::new(broker));
        if let Some(clock) = clock {
            files = files.with_clock(clock);
        }

        Self {
            server,
            config,
            network,
            api,
            cache,
            files,
        }
    }

    /// Serves `bytes` under `/files/{name}` and returns the URL.
    pub async fn host(&self, name: &str, bytes: Vec<u8>) -> String {
        let route = format!("/files/{name}");
        Mock::given(method("GET"))
            .and(path(route.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .mount(&self.server)
            .await;
        format!("{}{route}", self.server.uri())
    }
}
