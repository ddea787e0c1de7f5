//! SIWS message construction, parsing, signature checks and cache staleness.

use chakra_crypto::{
    build_siws_message, format_timestamp, parse_siws_message, verify_siws_signature, CryptoError,
    SiwsInput, StaleReason, StoredSiwsObject,
};
use chrono::{Duration, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey};
use pretty_assertions::assert_eq;

const STATEMENT: &str = "ONLY SIGN THIS MESSAGE IF YOU ARE SIGNING ON drive.chakra.network. \
                         DO NOT SIGN THIS MESSAGE IF YOU ARE SIGNING ON ANY OTHER SITE.";

fn signer(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn address(key: &SigningKey) -> String {
    bs58::encode(key.verifying_key().as_bytes()).into_string()
}

fn full_input(address: String) -> SiwsInput {
    SiwsInput {
        domain: "drive.chakra.network".into(),
        address,
        statement: Some(STATEMENT.into()),
        uri: Some("https://drive.chakra.network".into()),
        version: Some("1".into()),
        chain_id: Some("solana:mainnet".into()),
        nonce: Some("4f6d0b8e-8d3a-4e55-9e0b-3f5f2a0c9b11".into()),
        issued_at: Some("2024-10-19T12:00:00.000Z".into()),
        expiration_time: Some("2024-10-20T12:00:00.000Z".into()),
        not_before: Some("2024-10-19T11:00:00.000Z".into()),
        request_id: Some("req-7".into()),
        resources: Some(vec![
            "ipfs://bafy/one".into(),
            "https://drive.chakra.network/two".into(),
        ]),
    }
}

fn sign(key: &SigningKey, message: &str) -> String {
    bs58::encode(key.sign(message.as_bytes()).to_bytes()).into_string()
}

// ── Build / parse ──

#[test]
fn full_message_layout() {
    let message = build_siws_message(&full_input("ADDR".into()));
    let expected = format!(
        "drive.chakra.network wants you to sign in with your Solana account:\n\
         ADDR\n\
         \n\
         {STATEMENT}\n\
         \n\
         URI: https://drive.chakra.network\n\
         Version: 1\n\
         Chain ID: solana:mainnet\n\
         Nonce: 4f6d0b8e-8d3a-4e55-9e0b-3f5f2a0c9b11\n\
         Issued At: 2024-10-19T12:00:00.000Z\n\
         Expiration Time: 2024-10-20T12:00:00.000Z\n\
         Not Before: 2024-10-19T11:00:00.000Z\n\
         Request ID: req-7\n\
         Resources:\n\
         - ipfs://bafy/one\n\
         - https://drive.chakra.network/two"
    );
    assert_eq!(message, expected);
}

#[test]
fn parse_recovers_full_input() {
    let input = full_input("ADDR".into());
    let parsed = parse_siws_message(build_siws_message(&input).as_bytes()).unwrap();
    assert_eq!(parsed, input);
}

#[test]
fn parse_statement_without_fields() {
    let input = SiwsInput {
        domain: "drive.chakra.network".into(),
        address: "ADDR".into(),
        statement: Some("Sign In to Chakra Drive".into()),
        ..Default::default()
    };
    let parsed = parse_siws_message(build_siws_message(&input).as_bytes()).unwrap();
    assert_eq!(parsed, input);
}

#[test]
fn parse_fields_without_statement() {
    let input = SiwsInput {
        domain: "drive.chakra.network".into(),
        address: "ADDR".into(),
        nonce: Some("n-1".into()),
        ..Default::default()
    };
    let parsed = parse_siws_message(build_siws_message(&input).as_bytes()).unwrap();
    assert_eq!(parsed, input);
}

#[test]
fn parse_rejects_garbage() {
    assert!(parse_siws_message(b"hello").is_none());
    assert!(parse_siws_message(&[0xff, 0xfe, 0x00]).is_none());
    assert!(parse_siws_message(b" wants you to sign in with your Solana account:\nA").is_none());
    assert!(parse_siws_message(b"d wants you to sign in with your Solana account:\n").is_none());
}

#[test]
fn parse_rejects_missing_blank_line_after_address() {
    let text = "d wants you to sign in with your Solana account:\nA\nURI: a";
    assert!(parse_siws_message(text.as_bytes()).is_none());
}

#[test]
fn duplicate_field_lines_read_as_statement() {
    let text = "d wants you to sign in with your Solana account:\nA\n\nURI: a\nURI: b";
    let parsed = parse_siws_message(text.as_bytes()).unwrap();
    assert_eq!(parsed.statement.as_deref(), Some("URI: a\nURI: b"));
    assert_eq!(parsed.uri, None);
    assert_eq!(build_siws_message(&parsed), text);
}

#[test]
fn malformed_resource_list_reads_as_statement() {
    let text = "d wants you to sign in with your Solana account:\nA\n\nResources:\n* nope";
    let parsed = parse_siws_message(text.as_bytes()).unwrap();
    assert_eq!(parsed.resources, None);
    assert_eq!(build_siws_message(&parsed), text);
}

#[test]
fn statement_starting_with_field_label() {
    let input = SiwsInput {
        domain: "drive.chakra.network".into(),
        address: "ADDR".into(),
        statement: Some("Nonce: see below".into()),
        uri: Some("https://drive.chakra.network".into()),
        ..Default::default()
    };
    let message = build_siws_message(&input);
    let parsed = parse_siws_message(message.as_bytes()).unwrap();
    assert_eq!(parsed, input);
}

#[test]
fn multi_line_statement() {
    let input = SiwsInput {
        domain: "drive.chakra.network".into(),
        address: "ADDR".into(),
        statement: Some("line one\nline two".into()),
        nonce: Some("n-1".into()),
        ..Default::default()
    };
    let parsed = parse_siws_message(build_siws_message(&input).as_bytes()).unwrap();
    assert_eq!(parsed, input);
}

#[test]
fn statement_with_blank_lines_and_no_fields() {
    let input = SiwsInput {
        domain: "drive.chakra.network".into(),
        address: "ADDR".into(),
        statement: Some("first\n\nsecond\n".into()),
        ..Default::default()
    };
    let parsed = parse_siws_message(build_siws_message(&input).as_bytes()).unwrap();
    assert_eq!(parsed, input);
}

// ── Signature verification ──

#[test]
fn valid_signature_verifies() {
    let key = signer(1);
    let message = build_siws_message(&full_input(address(&key)));
    let signature = sign(&key, &message);
    assert!(verify_siws_signature(&message, &signature, &address(&key)).unwrap());
}

#[test]
fn flipped_message_byte_rejected() {
    let key = signer(2);
    let message = build_siws_message(&full_input(address(&key)));
    let signature = sign(&key, &message);

    let tampered = message.replacen("Version: 1", "Version: 2", 1);
    assert!(!verify_siws_signature(&tampered, &signature, &address(&key)).unwrap());
}

#[test]
fn different_public_key_rejected() {
    let key = signer(3);
    let other = signer(4);
    let message = build_siws_message(&full_input(address(&key)));
    let signature = sign(&key, &message);
    assert!(!verify_siws_signature(&message, &signature, &address(&other)).unwrap());
}

#[test]
fn short_signature_is_false_not_error() {
    let key = signer(5);
    let short = bs58::encode([1u8; 10]).into_string();
    assert!(!verify_siws_signature("m", &short, &address(&key)).unwrap());
}

#[test]
fn malformed_base58_is_error() {
    let key = signer(6);
    let err = verify_siws_signature("m", "0OIl", &address(&key)).unwrap_err();
    assert!(matches!(err, CryptoError::Base58(_)));
}

#[test]
fn wrong_length_public_key_is_error() {
    let key = signer(7);
    let signature = sign(&key, "m");
    let short_key = bs58::encode([9u8; 16]).into_string();
    let err = verify_siws_signature("m", &signature, &short_key).unwrap_err();
    assert!(matches!(err, CryptoError::InvalidPublicKey(_)));
}

// ── Cached proof staleness ──

fn stored_at(issued_at: &str) -> StoredSiwsObject {
    let input = SiwsInput {
        domain: "drive.chakra.network".into(),
        address: "ADDR".into(),
        issued_at: Some(issued_at.into()),
        ..Default::default()
    };
    StoredSiwsObject::new(build_siws_message(&input).as_bytes(), &[0u8; 64])
}

fn cutoff() -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(1_729_280_711_000).unwrap()
}

#[test]
fn fresh_proof_is_not_stale() {
    let now = cutoff() + Duration::days(10);
    let stored = stored_at(&format_timestamp(now - Duration::hours(1)));
    assert_eq!(stored.staleness(now, Duration::hours(24), cutoff()), None);
}

#[test]
fn proof_older_than_window_is_stale() {
    let now = cutoff() + Duration::days(10);
    let stored = stored_at(&format_timestamp(now - Duration::hours(25)));
    assert_eq!(
        stored.staleness(now, Duration::hours(24), cutoff()),
        Some(StaleReason::OutsideFreshnessWindow)
    );
}

#[test]
fn proof_before_cutoff_is_stale_even_inside_window() {
    let now = cutoff() + Duration::hours(1);
    let stored = stored_at(&format_timestamp(cutoff() - Duration::minutes(5)));
    assert_eq!(
        stored.staleness(now, Duration::hours(24), cutoff()),
        Some(StaleReason::BeforeCutoff)
    );
}

#[test]
fn proof_without_issued_at_is_stale() {
    let input = SiwsInput {
        domain: "d".into(),
        address: "A".into(),
        ..Default::default()
    };
    let stored = StoredSiwsObject::new(build_siws_message(&input).as_bytes(), &[0u8; 64]);
    assert_eq!(
        stored.staleness(Utc::now(), Duration::hours(24), cutoff()),
        Some(StaleReason::MissingIssuedAt)
    );
}

#[test]
fn unparsable_proof_is_stale() {
    let stored = StoredSiwsObject::new(b"not a sign-in message", &[0u8; 64]);
    assert_eq!(
        stored.staleness(Utc::now(), Duration::hours(24), cutoff()),
        Some(StaleReason::Unparsable)
    );
}

#[test]
fn stored_object_serializes_with_b58_keys() {
    let stored = StoredSiwsObject::new(b"m", b"s");
    let json = serde_json::to_value(&stored).unwrap();
    assert!(json.get("b58SignInMessage").is_some());
    assert!(json.get("b58Signature").is_some());
}

mod proptests {
    use super::*;
    use proptest::option;
    use proptest::prelude::*;

    fn value() -> impl Strategy<Value = String> {
        "[A-Za-z0-9][A-Za-z0-9 ./_-]{0,24}"
    }

    fn input_strategy() -> impl Strategy<Value = SiwsInput> {
        (
            "[a-z0-9][a-z0-9.]{0,20}",
            "[1-9A-HJ-NP-Za-km-z]{32,44}",
            option::of("[A-Za-z][A-Za-z0-9 .,:\n]{0,40}"),
            proptest::collection::vec(option::of(value()), 8),
            option::of(proptest::collection::vec(value(), 0..4)),
        )
            .prop_map(|(domain, address, statement, f, resources)| SiwsInput {
                domain,
                address,
                statement,
                uri: f[0].clone(),
                version: f[1].clone(),
                chain_id: f[2].clone(),
                nonce: f[3].clone(),
                issued_at: f[4].clone(),
                expiration_time: f[5].clone(),
                not_before: f[6].clone(),
                request_id: f[7].clone(),
                resources,
            })
    }

    proptest! {
        #[test]
        fn build_is_idempotent_under_parse(input in input_strategy()) {
            let message = build_siws_message(&input);
            let parsed = parse_siws_message(message.as_bytes());
            prop_assert!(parsed.is_some());
            prop_assert_eq!(build_siws_message(&parsed.unwrap()), message);
        }

        #[test]
        fn any_flipped_byte_breaks_signature(seed in any::<u8>(), pos in any::<prop::sample::Index>()) {
            let key = signer(seed);
            let message = build_siws_message(&full_input(address(&key)));
            let signature = sign(&key, &message);

            let mut bytes = message.clone().into_bytes();
            let i = pos.index(bytes.len());
            // Stay inside ASCII so the message remains valid UTF-8.
            bytes[i] ^= 0x01;
            let tampered = String::from_utf8(bytes).unwrap();
            prop_assert!(!verify_siws_signature(&tampered, &signature, &address(&key)).unwrap());
        }
    }
}
