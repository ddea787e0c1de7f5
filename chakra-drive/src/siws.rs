//! Sign-in message construction for the two things a wallet signs.

use crate::config::DriveConfig;
use chakra_crypto::{format_timestamp, SiwsInput};
use chakra_policy::constants::{DECRYPTION_STATEMENT, LOGIN_STATEMENT};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// What a signature is being requested for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SiwsIntent {
    /// Web app login; exchanged for a bearer token.
    Login,
    /// Decryption proof presented to the policy programs.
    Decryption,
}

impl SiwsIntent {
    pub fn statement(self) -> &'static str {
        match self {
            SiwsIntent::Login => LOGIN_STATEMENT,
            SiwsIntent::Decryption => DECRYPTION_STATEMENT,
        }
    }
}

/// Builds a sign-in input issued now.
///
/// `nonce` is the bearer token hash when the caller is logged in; without
/// one a random UUID is used.
pub fn create_siws_input(
    config: &DriveConfig,
    address: &str,
    intent: SiwsIntent,
    nonce: Option<&str>,
) -> SiwsInput {
    create_siws_input_at(config, address, intent, nonce, Utc::now())
}

pub fn create_siws_input_at(
    config: &DriveConfig,
    address: &str,
    intent: SiwsIntent,
    nonce: Option<&str>,
    issued_at: DateTime<Utc>,
) -> SiwsInput {
    SiwsInput {
        domain: config.domain.clone(),
        address: address.to_string(),
        statement: Some(intent.statement().to_string()),
        uri: Some(config.uri.clone()),
        chain_id: Some(config.chain_id.clone()),
        nonce: Some(
            nonce
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        ),
        issued_at: Some(format_timestamp(issued_at)),
        ..Default::default()
    }
}

/// Hex SHA-256 of a bearer token: the sign-in cache key and the v2 nonce.
pub fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
