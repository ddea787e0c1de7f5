//! Encrypted file client for Chakra Drive.
//!
//! Provides:
//! - Upload/download orchestration for private files ([`FileCrypto`])
//! - Key wrapping through the threshold network ([`KeyWrappingClient`])
//! - Sign-in proof creation and caching keyed by login
//! - Session signature acquisition with a fixed-delay retry
//! - API client for login, the session broker and the token hash registry
//! - The server-side token hash registry consulted by policy revision 2

pub mod api_client;
pub mod config;
pub mod connection;
pub mod error;
pub mod hash_registry;
pub mod key_wrapping;
pub mod logging;
pub mod session;
pub mod siws;
pub mod siws_store;
pub mod transfer;
pub mod wallet;

pub use api_client::{DriveApiClient, DriveUser, LoginData};
pub use config::{DriveConfig, RetryPolicy};
pub use connection::SharedNetwork;
pub use error::{DriveError, DriveResult, FailureKind};
pub use hash_registry::JwtHashRegistry;
pub use key_wrapping::KeyWrappingClient;
pub use session::{acquire_session_sigs, LocalSessionBroker, SessionSigSource};
pub use siws::{create_siws_input, token_hash, SiwsIntent};
pub use siws_store::{FileSiwsCache, MemorySiwsCache, SiwsCache};
pub use transfer::{EncryptedUpload, FileCrypto, SignFailedCallback};
pub use wallet::{KeypairWallet, WalletSigner};
