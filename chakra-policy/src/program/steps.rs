//! Checks shared by the program revisions.

use super::{
    AuthSig, DecryptAndCombineRequest, FailureCause, PolicyFailure, PolicyParams, SandboxRuntime,
};
use crate::constants::{
    CANONICAL_DOMAIN, CANONICAL_URI, DECRYPTION_STATEMENT, SIWS_MAX_AGE_SECS, SOLANA_CHAIN,
    SOLANA_SIGN_MESSAGE,
};
use chakra_crypto::{build_siws_message, decode_base58, verify_siws_signature, SiwsInput, SiwsObject};
use chrono::{DateTime, Duration, Utc};

/// Reported for anything a program did not anticipate (bad JSON, bad base58,
/// an unreachable registry).
pub(super) const UNEXPECTED: &str = "Error verifying signature.";

pub(super) const BAD_NONCE: &str = "SIWS message has not correct nonce";
pub(super) const BAD_STATEMENT: &str = "Invalid SIWS message";
pub(super) const EXPIRED: &str = "SIWS message expired";
pub(super) const NOT_YET_VALID: &str = "SIWS message is not yet valid";
pub(super) const BAD_DOMAIN: &str = "SIWS message has not correct domain";
pub(super) const BAD_SIGNATURE: &str = "Signature is invalid.";
pub(super) const DECRYPT_FAILED: &str = "Error decrypting data.";

pub(super) fn parse_siws_object(params: &PolicyParams) -> Result<SiwsObject, PolicyFailure> {
    serde_json::from_str(&params.siws_object)
        .map_err(|e| PolicyFailure::with_error(UNEXPECTED, e).with_cause(FailureCause::Malformed))
}

/// The nonce must be a bearer-token hash the server issued to this address.
pub(super) async fn check_nonce(
    input: &SiwsInput,
    runtime: &dyn SandboxRuntime,
) -> Result<(), PolicyFailure> {
    let Some(nonce) = input.nonce.as_deref() else {
        return Err(PolicyFailure::new(BAD_NONCE));
    };
    match runtime.verify_nonce(nonce, &input.address).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(PolicyFailure::new(BAD_NONCE)),
        Err(e) => {
            Err(PolicyFailure::with_error(UNEXPECTED, e).with_cause(FailureCause::Unavailable))
        }
    }
}

pub(super) fn check_statement(input: &SiwsInput) -> Result<(), PolicyFailure> {
    if input.statement.as_deref() != Some(DECRYPTION_STATEMENT) {
        return Err(PolicyFailure::new(BAD_STATEMENT));
    }
    Ok(())
}

// An absent or unparseable timestamp skips the comparison.
pub(super) fn check_issued_at(input: &SiwsInput, now: DateTime<Utc>) -> Result<(), PolicyFailure> {
    match input.issued_at_utc() {
        Some(issued_at) if issued_at < now - Duration::seconds(SIWS_MAX_AGE_SECS) => {
            Err(PolicyFailure::new(EXPIRED))
        }
        _ => Ok(()),
    }
}

pub(super) fn check_expiration(input: &SiwsInput, now: DateTime<Utc>) -> Result<(), PolicyFailure> {
    match input.expiration_time_utc() {
        Some(expiration) if expiration >= now => Err(PolicyFailure::new(NOT_YET_VALID)),
        _ => Ok(()),
    }
}

pub(super) fn check_domain(input: &SiwsInput) -> Result<(), PolicyFailure> {
    if input.domain != CANONICAL_DOMAIN || input.uri.as_deref() != Some(CANONICAL_URI) {
        return Err(PolicyFailure::new(BAD_DOMAIN));
    }
    Ok(())
}

/// Rebuilds the signed message, verifies it, then asks the sandbox to decrypt.
pub(super) async fn verify_and_release(
    object: &SiwsObject,
    params: &PolicyParams,
    runtime: &dyn SandboxRuntime,
) -> Result<String, PolicyFailure> {
    let address = &object.siws_input.address;
    let message = build_siws_message(&object.siws_input);

    let valid = verify_siws_signature(&message, &object.signature, address)
        .map_err(|e| PolicyFailure::with_error(UNEXPECTED, e))?;
    if !valid {
        return Err(PolicyFailure::new(BAD_SIGNATURE));
    }

    let signature =
        decode_base58(&object.signature).map_err(|e| PolicyFailure::with_error(UNEXPECTED, e))?;

    let request = DecryptAndCombineRequest {
        access_control_conditions: params.sol_rpc_conditions.clone(),
        ciphertext: params.ciphertext.clone(),
        data_to_encrypt_hash: params.data_to_encrypt_hash.clone(),
        auth_sig: AuthSig {
            sig: hex::encode(signature),
            derived_via: SOLANA_SIGN_MESSAGE.to_string(),
            signed_message: message,
            address: address.clone(),
        },
        chain: SOLANA_CHAIN.to_string(),
    };

    runtime
        .decrypt_and_combine(request)
        .await
        .map_err(|e| PolicyFailure::with_error(DECRYPT_FAILED, e))
}
