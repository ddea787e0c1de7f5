//! Shared wallet and proof helpers for policy tests.
#![allow(dead_code)]

use chakra_crypto::{build_siws_message, format_timestamp, SiwsInput, SiwsObject};
use chakra_policy::constants::{
    CANONICAL_DOMAIN, CANONICAL_URI, DECRYPTION_STATEMENT, SOLANA_MAINNET_CHAIN,
};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey};

pub fn wallet(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn address(key: &SigningKey) -> String {
    bs58::encode(key.verifying_key().as_bytes()).into_string()
}

/// A decryption proof input that passes every check at `now`.
pub fn decryption_input(key: &SigningKey, now: DateTime<Utc>) -> SiwsInput {
    SiwsInput {
        domain: CANONICAL_DOMAIN.into(),
        address: address(key),
        statement: Some(DECRYPTION_STATEMENT.into()),
        uri: Some(CANONICAL_URI.into()),
        version: Some("1".into()),
        chain_id: Some(SOLANA_MAINNET_CHAIN.into()),
        nonce: Some("2d1e4a8f-5a52-4d8c-bb9c-0f3f0e6b7a10".into()),
        issued_at: Some(format_timestamp(now)),
        ..Default::default()
    }
}

/// Signs `input` with `key` and returns the JSON `siwsObject` parameter.
pub fn signed_object(key: &SigningKey, input: SiwsInput) -> String {
    let message = build_siws_message(&input);
    let signature = bs58::encode(key.sign(message.as_bytes()).to_bytes()).into_string();
    serde_json::to_string(&SiwsObject {
        siws_input: input,
        signature,
    })
    .unwrap()
}
