//! Policy program checks against a scripted sandbox.

mod support;

use async_trait::async_trait;
use chakra_crypto::{build_siws_message, format_timestamp};
use chakra_policy::{
    run_policy, DecryptAndCombineRequest, FailureCause, PolicyError, PolicyFailure, PolicyOutcome,
    PolicyParams, PolicyResult, PolicyValidator, SandboxRuntime, SiwsPolicyV0, SiwsPolicyV1, SiwsPolicyV2,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Mutex;
use support::{address, decryption_input, signed_object, wallet};

const RELEASED: &str = "c2VjcmV0LWtleS1ieXRlcw==";

struct ScriptedRuntime {
    now: DateTime<Utc>,
    /// `None` makes the registry lookup itself fail.
    nonces: Option<HashSet<(String, String)>>,
    decrypt_fails: bool,
    requests: Mutex<Vec<DecryptAndCombineRequest>>,
}

impl ScriptedRuntime {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            nonces: Some(HashSet::new()),
            decrypt_fails: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn with_nonce(mut self, hash: &str, public_key: &str) -> Self {
        if let Some(set) = self.nonces.as_mut() {
            set.insert((hash.to_string(), public_key.to_string()));
        }
        self
    }

    fn decrypt_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl SandboxRuntime for ScriptedRuntime {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    async fn verify_nonce(&self, hash: &str, public_key: &str) -> PolicyResult<bool> {
        match &self.nonces {
            Some(set) => Ok(set.contains(&(hash.to_string(), public_key.to_string()))),
            None => Err(PolicyError::NonceRegistry("connection refused".into())),
        }
    }

    async fn decrypt_and_combine(&self, request: DecryptAndCombineRequest) -> PolicyResult<String> {
        self.requests.lock().unwrap().push(request);
        if self.decrypt_fails {
            Err(PolicyError::ConditionsNotMet)
        } else {
            Ok(RELEASED.to_string())
        }
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn params(siws_object: String) -> PolicyParams {
    PolicyParams {
        siws_object,
        sol_rpc_conditions: Vec::new(),
        ciphertext: "Y2lwaGVy".into(),
        data_to_encrypt_hash: "ab".repeat(32),
    }
}

async fn denial(
    validator: &dyn PolicyValidator,
    params: &PolicyParams,
    runtime: &ScriptedRuntime,
) -> PolicyFailure {
    match run_policy(validator, params, runtime).await {
        PolicyOutcome::Denied(failure) => failure,
        PolicyOutcome::Released(_) => panic!("expected a denial"),
    }
}

// ── Release ──

#[tokio::test]
async fn valid_proof_releases_key_v0_and_v1() {
    let key = wallet(1);
    let object = signed_object(&key, decryption_input(&key, now()));

    for validator in [&SiwsPolicyV0 as &dyn PolicyValidator, &SiwsPolicyV1] {
        let runtime = ScriptedRuntime::new(now());
        let outcome = run_policy(validator, &params(object.clone()), &runtime).await;
        assert_eq!(outcome, PolicyOutcome::Released(RELEASED.into()));
        assert_eq!(runtime.decrypt_calls(), 1);
    }
}

#[tokio::test]
async fn auth_sig_carries_hex_signature_and_rebuilt_message() {
    let key = wallet(2);
    let input = decryption_input(&key, now());
    let message = build_siws_message(&input);
    let object = signed_object(&key, input);
    let runtime = ScriptedRuntime::new(now());

    let p = params(object.clone());
    run_policy(&SiwsPolicyV1, &p, &runtime).await;

    let requests = runtime.requests.lock().unwrap();
    let request = &requests[0];
    let sent: chakra_crypto::SiwsObject = serde_json::from_str(&object).unwrap();
    let expected_sig = hex::encode(bs58::decode(&sent.signature).into_vec().unwrap());

    assert_eq!(request.chain, "solana");
    assert_eq!(request.auth_sig.derived_via, "solana.signMessage");
    assert_eq!(request.auth_sig.address, address(&key));
    assert_eq!(request.auth_sig.signed_message, message);
    assert_eq!(request.auth_sig.sig, expected_sig);
    assert_eq!(request.ciphertext, p.ciphertext);
    assert_eq!(request.data_to_encrypt_hash, p.data_to_encrypt_hash);
}

// ── Timestamps ──

#[tokio::test]
async fn future_expiration_is_not_yet_valid() {
    let key = wallet(3);
    let mut input = decryption_input(&key, now());
    input.expiration_time = Some(format_timestamp(now() + Duration::hours(1)));
    let runtime = ScriptedRuntime::new(now());

    let failure = denial(&SiwsPolicyV1, &params(signed_object(&key, input)), &runtime).await;
    assert_eq!(failure.message, "SIWS message is not yet valid");
    assert_eq!(runtime.decrypt_calls(), 0);
}

#[tokio::test]
async fn expiration_equal_to_now_is_not_yet_valid() {
    let key = wallet(3);
    let mut input = decryption_input(&key, now());
    input.expiration_time = Some(format_timestamp(now()));
    let runtime = ScriptedRuntime::new(now());

    let failure = denial(&SiwsPolicyV0, &params(signed_object(&key, input)), &runtime).await;
    assert_eq!(failure.message, "SIWS message is not yet valid");
}

#[tokio::test]
async fn past_expiration_passes() {
    let key = wallet(4);
    let mut input = decryption_input(&key, now());
    input.expiration_time = Some(format_timestamp(now() - Duration::minutes(1)));
    let runtime = ScriptedRuntime::new(now());

    let outcome = run_policy(&SiwsPolicyV1, &params(signed_object(&key, input)), &runtime).await;
    assert_eq!(outcome, PolicyOutcome::Released(RELEASED.into()));
}

#[tokio::test]
async fn issued_more_than_a_day_ago_is_expired() {
    let key = wallet(5);
    let mut input = decryption_input(&key, now());
    input.issued_at = Some(format_timestamp(now() - Duration::hours(25)));
    let runtime = ScriptedRuntime::new(now());

    let failure = denial(&SiwsPolicyV1, &params(signed_object(&key, input)), &runtime).await;
    assert_eq!(failure.message, "SIWS message expired");
}

#[tokio::test]
async fn issued_just_inside_window_passes() {
    let key = wallet(5);
    let mut input = decryption_input(&key, now());
    input.issued_at = Some(format_timestamp(now() - Duration::hours(23)));
    let runtime = ScriptedRuntime::new(now());

    let outcome = run_policy(&SiwsPolicyV0, &params(signed_object(&key, input)), &runtime).await;
    assert!(matches!(outcome, PolicyOutcome::Released(_)));
}

#[tokio::test]
async fn missing_timestamps_skip_their_checks() {
    let key = wallet(6);
    let mut input = decryption_input(&key, now());
    input.issued_at = None;
    input.expiration_time = None;
    let runtime = ScriptedRuntime::new(now());

    let outcome = run_policy(&SiwsPolicyV1, &params(signed_object(&key, input)), &runtime).await;
    assert!(matches!(outcome, PolicyOutcome::Released(_)));
}

// ── Statement, domain, signature ──

#[tokio::test]
async fn login_statement_is_not_a_decryption_proof() {
    let key = wallet(7);
    let mut input = decryption_input(&key, now());
    input.statement = Some("Sign In to Chakra Drive".into());
    let runtime = ScriptedRuntime::new(now());

    let failure = denial(&SiwsPolicyV1, &params(signed_object(&key, input)), &runtime).await;
    assert_eq!(failure.message, "Invalid SIWS message");
}

#[tokio::test]
async fn foreign_domain_rejected() {
    let key = wallet(8);
    let mut input = decryption_input(&key, now());
    input.domain = "drive.chakra.network.evil.io".into();
    let runtime = ScriptedRuntime::new(now());

    let failure = denial(&SiwsPolicyV1, &params(signed_object(&key, input)), &runtime).await;
    assert_eq!(failure.message, "SIWS message has not correct domain");
}

#[tokio::test]
async fn foreign_uri_rejected() {
    let key = wallet(8);
    let mut input = decryption_input(&key, now());
    input.uri = Some("https://phish.example".into());
    let runtime = ScriptedRuntime::new(now());

    let failure = denial(&SiwsPolicyV0, &params(signed_object(&key, input)), &runtime).await;
    assert_eq!(failure.message, "SIWS message has not correct domain");
}

#[tokio::test]
async fn signature_from_another_wallet_rejected() {
    let owner = wallet(9);
    let intruder = wallet(10);
    // Claims the owner's address but is signed by the intruder.
    let object = signed_object(&intruder, decryption_input(&owner, now()));
    let runtime = ScriptedRuntime::new(now());

    let failure = denial(&SiwsPolicyV1, &params(object), &runtime).await;
    assert_eq!(failure.message, "Signature is invalid.");
    assert_eq!(runtime.decrypt_calls(), 0);
}

#[tokio::test]
async fn edited_input_breaks_signature() {
    let key = wallet(11);
    let object = signed_object(&key, decryption_input(&key, now()));
    let edited = object.replace("\"version\":\"1\"", "\"version\":\"2\"");
    assert_ne!(edited, object);
    let runtime = ScriptedRuntime::new(now());

    let failure = denial(&SiwsPolicyV1, &params(edited), &runtime).await;
    assert_eq!(failure.message, "Signature is invalid.");
}

#[tokio::test]
async fn unparseable_object_reports_error() {
    let runtime = ScriptedRuntime::new(now());
    let failure = denial(&SiwsPolicyV1, &params("{not json".into()), &runtime).await;
    assert_eq!(failure.message, "Error verifying signature.");
    assert!(failure.error.is_some());
}

#[tokio::test]
async fn decrypt_failure_is_reported_with_error() {
    let key = wallet(12);
    let mut runtime = ScriptedRuntime::new(now());
    runtime.decrypt_fails = true;

    let object = signed_object(&key, decryption_input(&key, now()));
    let failure = denial(&SiwsPolicyV1, &params(object), &runtime).await;
    assert_eq!(failure.message, "Error decrypting data.");
    assert_eq!(
        failure.error.as_deref(),
        Some("access control conditions not satisfied")
    );
}

// ── v2 nonce registry ──

#[tokio::test]
async fn v2_accepts_registered_nonce() {
    let key = wallet(13);
    let input = decryption_input(&key, now());
    let nonce = input.nonce.clone().unwrap();
    let runtime = ScriptedRuntime::new(now()).with_nonce(&nonce, &address(&key));

    let outcome = run_policy(&SiwsPolicyV2, &params(signed_object(&key, input)), &runtime).await;
    assert_eq!(outcome, PolicyOutcome::Released(RELEASED.into()));
}

#[tokio::test]
async fn v2_rejects_unregistered_nonce() {
    let key = wallet(14);
    let runtime = ScriptedRuntime::new(now());
    let object = signed_object(&key, decryption_input(&key, now()));

    let failure = denial(&SiwsPolicyV2, &params(object), &runtime).await;
    assert_eq!(failure.message, "SIWS message has not correct nonce");
}

#[tokio::test]
async fn v2_rejects_nonce_issued_to_other_address() {
    let key = wallet(15);
    let other = wallet(16);
    let input = decryption_input(&key, now());
    let runtime =
        ScriptedRuntime::new(now()).with_nonce(input.nonce.as_deref().unwrap(), &address(&other));

    let failure = denial(&SiwsPolicyV2, &params(signed_object(&key, input)), &runtime).await;
    assert_eq!(failure.message, "SIWS message has not correct nonce");
}

#[tokio::test]
async fn v2_rejects_missing_nonce() {
    let key = wallet(17);
    let mut input = decryption_input(&key, now());
    input.nonce = None;
    let runtime = ScriptedRuntime::new(now());

    let failure = denial(&SiwsPolicyV2, &params(signed_object(&key, input)), &runtime).await;
    assert_eq!(failure.message, "SIWS message has not correct nonce");
}

#[tokio::test]
async fn v2_registry_outage_reported_as_error() {
    let key = wallet(18);
    let mut runtime = ScriptedRuntime::new(now());
    runtime.nonces = None;

    let object = signed_object(&key, decryption_input(&key, now()));
    let failure = denial(&SiwsPolicyV2, &params(object), &runtime).await;
    assert_eq!(failure.message, "Error verifying signature.");
    assert_eq!(failure.cause, FailureCause::Unavailable);
    assert!(failure.error.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn unregistered_nonce_is_a_plain_denial() {
    let key = wallet(21);
    let runtime = ScriptedRuntime::new(now());

    let object = signed_object(&key, decryption_input(&key, now()));
    let failure = denial(&SiwsPolicyV2, &params(object), &runtime).await;
    assert_eq!(failure.cause, FailureCause::Denied);
}

#[tokio::test]
async fn v2_checks_nonce_before_statement() {
    let key = wallet(19);
    let mut input = decryption_input(&key, now());
    input.statement = None;
    let runtime = ScriptedRuntime::new(now());

    let failure = denial(&SiwsPolicyV2, &params(signed_object(&key, input)), &runtime).await;
    assert_eq!(failure.message, "SIWS message has not correct nonce");
}

#[tokio::test]
async fn v0_and_v1_ignore_the_nonce_registry() {
    let key = wallet(20);
    let mut runtime = ScriptedRuntime::new(now());
    runtime.nonces = None;

    let object = signed_object(&key, decryption_input(&key, now()));
    let outcome = run_policy(&SiwsPolicyV1, &params(object), &runtime).await;
    assert!(matches!(outcome, PolicyOutcome::Released(_)));
}

// ── Response encoding ──

#[tokio::test]
async fn denial_response_is_recognizable_json() {
    let runtime = ScriptedRuntime::new(now());
    let outcome = run_policy(&SiwsPolicyV1, &params("{}".into()), &runtime).await;
    let response = outcome.into_response();

    let failure = PolicyFailure::from_response(&response).unwrap();
    assert!(!failure.success);
    assert_eq!(failure.message, "Error verifying signature.");
    assert_eq!(failure.cause, FailureCause::Malformed);
    assert!(response.contains(r#""cause":"malformed""#), "{response}");
}

#[tokio::test]
async fn plain_denial_keeps_deployed_response_shape() {
    let key = wallet(22);
    let mut input = decryption_input(&key, now());
    input.domain = "evil.example".into();
    let runtime = ScriptedRuntime::new(now());

    let response = run_policy(&SiwsPolicyV1, &params(signed_object(&key, input)), &runtime)
        .await
        .into_response();
    let json: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "success": false,
            "message": "SIWS message has not correct domain"
        })
    );
}

#[test]
fn released_key_is_not_mistaken_for_failure() {
    assert!(PolicyFailure::from_response(RELEASED).is_none());
    assert!(PolicyFailure::from_response(r#"{"success":true,"message":"ok"}"#).is_none());
}
